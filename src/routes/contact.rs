use axum::{
    Json, Router, extract::State, middleware::from_fn_with_state, routing::post,
};
use validator::Validate;

use crate::{
    dto::contact::ContactRequest,
    error::AppResult,
    middleware::rate_limit::contact_rate_limit,
    response::ApiResponse,
    services::contact_service,
    state::AppState,
};

pub fn router(state: &AppState) -> Router<AppState> {
    Router::new().route(
        "/",
        post(submit_contact).layer(from_fn_with_state(state.clone(), contact_rate_limit)),
    )
}

#[utoipa::path(
    post,
    path = "/api/contact",
    request_body = ContactRequest,
    responses(
        (status = 200, description = "Message accepted", body = ApiResponse<serde_json::Value>),
        (status = 400, description = "Missing phone and email"),
        (status = 429, description = "Too many messages")
    ),
    tag = "Contact"
)]
pub async fn submit_contact(
    State(state): State<AppState>,
    Json(payload): Json<ContactRequest>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    payload.validate()?;
    let resp = contact_service::submit_contact(&state, payload).await?;
    Ok(Json(resp))
}
