pub mod edit_session;
pub mod profiles;

use aide::axum::{
    routing::{get, post},
    ApiRouter,
};

/// Creates the v1 API router with all v1 handler routes
pub fn handler() -> ApiRouter {
    ApiRouter::new()
        .api_route("/v1/profiles/{id}", get(profiles::get_profile))
        .api_route("/v1/profiles/{id}/photo-url", get(profiles::get_photo_url))
        .api_route(
            "/v1/profiles/{id}/edit-session",
            post(edit_session::start_session)
                .get(edit_session::get_session)
                .delete(edit_session::cancel_session),
        )
        .api_route(
            "/v1/profiles/{id}/edit-session/photo",
            post(edit_session::upload_photo).delete(edit_session::delete_photo),
        )
        .api_route(
            "/v1/profiles/{id}/edit-session/save",
            post(edit_session::save_session),
        )
}
