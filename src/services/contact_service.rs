use crate::{
    dto::contact::ContactRequest,
    error::{AppError, AppResult},
    notify,
    response::ApiResponse,
    state::AppState,
};

fn has_reply_channel(payload: &ContactRequest) -> bool {
    let filled = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
    filled(&payload.phone) || filled(&payload.email)
}

/// Forward a contact form to the store chat. Delivery is best-effort, so the
/// caller gets success even when Telegram is down or not configured.
pub async fn submit_contact(
    state: &AppState,
    payload: ContactRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    if !has_reply_channel(&payload) {
        return Err(AppError::BadRequest("phone or email is required".into()));
    }

    state.notify(notify::contact_message(&payload));
    tracing::info!(name = %payload.name, "contact request received");

    Ok(ApiResponse::success(
        "Message sent",
        serde_json::json!({}),
        None,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(phone: Option<&str>, email: Option<&str>) -> ContactRequest {
        ContactRequest {
            name: "Oleg".into(),
            phone: phone.map(str::to_string),
            email: email.map(str::to_string),
            message: "Hi".into(),
        }
    }

    #[test]
    fn needs_phone_or_email() {
        assert!(!has_reply_channel(&request(None, None)));
        assert!(!has_reply_channel(&request(Some("  "), None)));
        assert!(has_reply_channel(&request(Some("+7 900"), None)));
        assert!(has_reply_channel(&request(None, Some("a@b.c"))));
    }
}
