//! Route table

use crate::handlers::{
    admin_keys, authorize, device, discovery, introspect, jwks, par, revoke, scim, token, userinfo,
};
use crate::state::AppState;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

pub fn api_router(state: AppState) -> Router {
    Router::new()
        // Discovery
        .route(
            "/.well-known/openid-configuration",
            get(discovery::openid_configuration),
        )
        .route("/.well-known/jwks.json", get(jwks::jwks))
        // OAuth/OIDC
        .route(
            "/authorize",
            get(authorize::authorize_get).post(authorize::authorize_post),
        )
        .route("/token", post(token::token))
        .route(
            "/userinfo",
            get(userinfo::userinfo_get).post(userinfo::userinfo_post),
        )
        .route("/introspect", post(introspect::introspect))
        .route("/revoke", post(revoke::revoke))
        .route("/par", post(par::par))
        .route("/device/code", post(device::device_code))
        .route("/device/verify", post(device::device_verify))
        // SCIM v2
        .route("/scim/v2/Users", get(scim::list_users).post(scim::create_user))
        .route(
            "/scim/v2/Users/:id",
            get(scim::get_user)
                .put(scim::replace_user)
                .patch(scim::patch_user)
                .delete(scim::delete_user),
        )
        .route(
            "/scim/v2/Groups",
            get(scim::list_groups).post(scim::create_group),
        )
        .route(
            "/scim/v2/Groups/:id",
            get(scim::get_group)
                .put(scim::replace_group)
                .patch(scim::patch_group)
                .delete(scim::delete_group),
        )
        // Admin
        .route("/api/admin/signing-keys/status", get(admin_keys::status))
        .route("/api/admin/signing-keys/rotate", post(admin_keys::rotate))
        .route(
            "/api/admin/signing-keys/emergency-rotate",
            post(admin_keys::emergency_rotate),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
