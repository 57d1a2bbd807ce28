use std::sync::Arc;

use axum::middleware;
use axum::routing::get;
use axum::{Extension, Router};
use keycloak_auth::{
    require_access, AccessGuard, Authenticator, ConfiguredValidator, JwksTokenValidator,
    KeycloakSettings, TokenClaims,
};
use keycloak_auth_test::{TestApp, TestKeyPair, TokenBuilder, TEST_CLIENT_ID, TEST_REALM, TEST_SERVER_URL};

fn authenticator() -> Arc<Authenticator> {
    let settings = KeycloakSettings::new(TEST_SERVER_URL, TEST_REALM, TEST_CLIENT_ID);
    let validator =
        JwksTokenValidator::new_with_static_key(TestKeyPair::shared().decoding_key(), settings);
    Arc::new(Authenticator::new(ConfiguredValidator::from(validator)))
}

async fn whoami(claims: TokenClaims) -> String {
    claims.sub().to_string()
}

async fn from_extension(Extension(claims): Extension<TokenClaims>) -> String {
    claims.sub().to_string()
}

fn app_with(guard: AccessGuard) -> TestApp {
    let router = Router::new()
        .route("/whoami", get(whoami))
        .route("/extension", get(from_extension))
        .route_layer(middleware::from_fn_with_state(guard, require_access))
        .with_state(authenticator());
    TestApp::new(router)
}

fn sign(builder: TokenBuilder) -> String {
    builder.sign(TestKeyPair::shared())
}

#[test]
fn guard_builder() {
    let guard = AccessGuard::new(authenticator())
        .with_roles(["admin", "auditor"])
        .for_client("my-app")
        .with_scopes(["orders:read"]);
    assert_eq!(guard.required_roles(), ["admin", "auditor"]);
    assert_eq!(guard.client_id(), Some("my-app"));
    assert_eq!(guard.required_scopes(), ["orders:read"]);

    let open = AccessGuard::new(authenticator());
    assert!(open.required_roles().is_empty());
    assert!(open.client_id().is_none());
}

#[tokio::test]
async fn authenticated_request_passes_plain_guard() {
    let app = app_with(AccessGuard::new(authenticator()));
    let resp = app
        .get("/whoami")
        .bearer(&sign(TokenBuilder::new()))
        .send()
        .await
        .assert_ok();
    assert_eq!(resp.text(), "user-123");
}

#[tokio::test]
async fn claims_are_stored_in_extensions() {
    let app = app_with(AccessGuard::new(authenticator()));
    let resp = app
        .get("/extension")
        .bearer(&sign(TokenBuilder::new().sub("bob")))
        .send()
        .await
        .assert_ok();
    assert_eq!(resp.text(), "bob");
}

#[tokio::test]
async fn missing_token_is_401() {
    let app = app_with(AccessGuard::new(authenticator()).with_roles(["admin"]));
    app.get("/whoami")
        .send()
        .await
        .assert_unauthorized()
        .assert_detail("Authorization header missing or invalid");
}

#[tokio::test]
async fn admin_role_grants_access() {
    let app = app_with(AccessGuard::new(authenticator()).with_roles(["admin"]));
    let token = sign(TokenBuilder::new().realm_roles(["user", "admin"]));
    app.get("/whoami").bearer(&token).send().await.assert_ok();
}

#[tokio::test]
async fn missing_role_is_403() {
    let app = app_with(AccessGuard::new(authenticator()).with_roles(["admin"]));
    let token = sign(TokenBuilder::new().realm_roles(["user"]));
    app.get("/whoami")
        .bearer(&token)
        .send()
        .await
        .assert_forbidden()
        .assert_detail("Missing required roles: admin");
}

#[tokio::test]
async fn client_role_guard() {
    let guard = AccessGuard::new(authenticator())
        .with_roles(["editor"])
        .for_client("my-app");
    let app = app_with(guard);

    let granted = sign(TokenBuilder::new().client_roles("my-app", ["editor"]));
    app.get("/whoami").bearer(&granted).send().await.assert_ok();

    let realm_only = sign(TokenBuilder::new().realm_roles(["editor"]));
    app.get("/whoami")
        .bearer(&realm_only)
        .send()
        .await
        .assert_forbidden();
}

#[tokio::test]
async fn scope_guard() {
    let app = app_with(AccessGuard::new(authenticator()).with_scopes(["orders:write"]));

    let granted = sign(TokenBuilder::new().scope("openid orders:write"));
    app.get("/whoami").bearer(&granted).send().await.assert_ok();

    let denied = sign(TokenBuilder::new().scope("openid orders:read"));
    app.get("/whoami")
        .bearer(&denied)
        .send()
        .await
        .assert_forbidden()
        .assert_detail("Missing required scopes: orders:write");
}

#[tokio::test]
async fn expired_token_is_401_before_role_check() {
    let app = app_with(AccessGuard::new(authenticator()).with_roles(["admin"]));
    let token = sign(TokenBuilder::new().realm_roles(["admin"]).expired());
    app.get("/whoami")
        .bearer(&token)
        .send()
        .await
        .assert_unauthorized()
        .assert_detail("Token has expired");
}
