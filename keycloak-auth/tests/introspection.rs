use std::time::Duration;

use keycloak_auth::{
    AuthError, ConfigError, IntrospectionTokenValidator, KeycloakSettings, TokenValidator,
};
use keycloak_auth_test::{TEST_CLIENT_ID, TEST_REALM};
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const INTROSPECT_PATH: &str = "/realms/test-realm/protocol/openid-connect/token/introspect";

fn settings_for(server: &MockServer) -> KeycloakSettings {
    KeycloakSettings::new(server.uri(), TEST_REALM, TEST_CLIENT_ID).with_client_secret("s3cret")
}

async fn respond_with(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path(INTROSPECT_PATH))
        .respond_with(response)
        .mount(server)
        .await;
}

#[tokio::test]
async fn active_token_yields_claims() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(INTROSPECT_PATH))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("token=opaque-token"))
        .and(body_string_contains("client_id=test-client"))
        .and(body_string_contains("client_secret=s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "active": true,
            "sub": "user-123",
            "exp": 4102444800i64,
            "preferred_username": "testuser",
            "realm_access": { "roles": ["admin"] },
            "resource_access": { "test-client": { "roles": ["reader"] } },
            "scope": "openid orders:read",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let validator = IntrospectionTokenValidator::new(&settings_for(&server)).unwrap();
    let claims = validator.validate("opaque-token").await.unwrap();

    assert_eq!(claims.sub(), "user-123");
    assert!(claims.has_role("admin", None));
    assert!(claims.has_role("reader", Some("test-client")));
    assert!(claims.has_scope("orders:read"));
    assert_eq!(claims.claim("active"), Some(&json!(true)));
}

#[tokio::test]
async fn inactive_token_is_invalid() {
    let server = MockServer::start().await;
    respond_with(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({ "active": false })),
    )
    .await;

    let validator = IntrospectionTokenValidator::new(&settings_for(&server)).unwrap();
    let err = validator.validate("revoked").await.unwrap_err();
    assert!(matches!(err, AuthError::TokenInvalid(ref r) if r == "Token is not active"));
    assert_eq!(err.status_code(), 401);
}

#[tokio::test]
async fn missing_active_flag_is_inactive() {
    let server = MockServer::start().await;
    respond_with(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({ "sub": "user-123", "exp": 1 })),
    )
    .await;

    let validator = IntrospectionTokenValidator::new(&settings_for(&server)).unwrap();
    let err = validator.validate("token").await.unwrap_err();
    assert!(matches!(err, AuthError::TokenInvalid(_)));
}

#[tokio::test]
async fn active_response_without_subject_is_invalid() {
    let server = MockServer::start().await;
    respond_with(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({ "active": true, "exp": 4102444800i64 })),
    )
    .await;

    let validator = IntrospectionTokenValidator::new(&settings_for(&server)).unwrap();
    let err = validator.validate("token").await.unwrap_err();
    assert!(matches!(err, AuthError::TokenInvalid(ref r) if r.contains("'sub'")));
}

#[tokio::test]
async fn server_error_is_unavailable() {
    let server = MockServer::start().await;
    respond_with(&server, ResponseTemplate::new(500)).await;

    let validator = IntrospectionTokenValidator::new(&settings_for(&server)).unwrap();
    let err = validator.validate("token").await.unwrap_err();
    assert!(matches!(err, AuthError::ProviderUnavailable(_)));
    assert_eq!(err.detail(), "Authentication service unavailable");
}

#[tokio::test]
async fn rejected_client_credentials_are_unavailable() {
    let server = MockServer::start().await;
    respond_with(
        &server,
        ResponseTemplate::new(401).set_body_json(json!({ "error": "invalid_client" })),
    )
    .await;

    let validator = IntrospectionTokenValidator::new(&settings_for(&server)).unwrap();
    let err = validator.validate("token").await.unwrap_err();
    assert!(matches!(err, AuthError::ProviderUnavailable(_)));
}

#[tokio::test]
async fn non_json_response_is_unavailable() {
    let server = MockServer::start().await;
    respond_with(&server, ResponseTemplate::new(200).set_body_string("ok")).await;

    let validator = IntrospectionTokenValidator::new(&settings_for(&server)).unwrap();
    let err = validator.validate("token").await.unwrap_err();
    assert!(matches!(err, AuthError::ProviderUnavailable(_)));
}

#[tokio::test]
async fn slow_provider_times_out() {
    let server = MockServer::start().await;
    respond_with(
        &server,
        ResponseTemplate::new(200)
            .set_body_json(json!({ "active": true }))
            .set_delay(Duration::from_secs(3)),
    )
    .await;

    let settings = settings_for(&server).with_http_timeout(1);
    let validator = IntrospectionTokenValidator::new(&settings).unwrap();
    let err = validator.validate("token").await.unwrap_err();
    assert!(matches!(err, AuthError::ProviderUnavailable(_)));
}

#[tokio::test]
async fn client_secret_is_required() {
    let settings = KeycloakSettings::new("http://kc", TEST_REALM, TEST_CLIENT_ID);
    let err = IntrospectionTokenValidator::new(&settings).err().unwrap();
    assert!(matches!(err, ConfigError::MissingClientSecret));

    let empty = settings.with_client_secret("");
    assert!(matches!(
        IntrospectionTokenValidator::new(&empty),
        Err(ConfigError::MissingClientSecret)
    ));
}

#[tokio::test]
async fn introspection_uri_is_derived_from_realm() {
    let settings = KeycloakSettings::new("http://kc:8080", "acme", "api").with_client_secret("x");
    let validator = IntrospectionTokenValidator::new(&settings).unwrap();
    assert_eq!(
        validator.introspection_uri(),
        "http://kc:8080/realms/acme/protocol/openid-connect/token/introspect"
    );
}
