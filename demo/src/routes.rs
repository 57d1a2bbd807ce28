use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::middleware;
use axum::routing::get;
use axum::{Json, Router};
use keycloak_auth::{require_access, AccessGuard, Authenticator, TokenClaims};
use serde_json::{json, Value};
use tower_http::cors::{AllowHeaders, CorsLayer};
use tower_http::trace::TraceLayer;

const FRONTEND_ORIGIN: &str = "http://localhost:4200";

pub fn router(authenticator: Arc<Authenticator>) -> Router {
    let admin_guard = AccessGuard::new(Arc::clone(&authenticator)).with_roles(["admin"]);

    let admin_routes = Router::new()
        .route("/api/admin", get(admin))
        .route_layer(middleware::from_fn_with_state(admin_guard, require_access));

    Router::new()
        .route("/health", get(health))
        .route("/api/profile", get(profile))
        .merge(admin_routes)
        .layer(cors())
        .layer(TraceLayer::new_for_http())
        .with_state(authenticator)
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(HeaderValue::from_static(FRONTEND_ORIGIN))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(AllowHeaders::mirror_request())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// The authenticated user's profile claims.
async fn profile(claims: TokenClaims) -> Json<Value> {
    Json(json!({
        "sub": claims.sub(),
        "username": claims.preferred_username(),
        "email": claims.email(),
        "name": claims.name(),
        "realm_roles": claims.realm_roles(),
    }))
}

async fn admin(claims: TokenClaims) -> Json<Value> {
    Json(json!({
        "message": format!("Welcome admin {}", claims.preferred_username().unwrap_or_default()),
        "realm_roles": claims.realm_roles(),
    }))
}
