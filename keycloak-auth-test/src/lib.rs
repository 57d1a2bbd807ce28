//! Test helpers shared by the `keycloak-auth` tests and the demo service.

mod app;
mod jwt;

pub use app::{TestApp, TestRequest, TestResponse};
pub use jwt::{TestKeyPair, TokenBuilder, TEST_CLIENT_ID, TEST_KID, TEST_REALM, TEST_SERVER_URL};
