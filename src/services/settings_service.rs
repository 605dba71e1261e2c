use chrono::Utc;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};

use crate::{
    audit,
    dto::settings::UpdateSettingsRequest,
    entity::settings::{ActiveModel as SettingsActive, Entity as SettingsEntity},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::Settings,
    response::{ApiResponse, Meta},
    state::AppState,
};

/// Primary key of the only settings row.
pub const SETTINGS_ID: i32 = 1;

fn blank_to_none(value: String) -> Option<String> {
    let value = value.trim().to_string();
    (!value.is_empty()).then_some(value)
}

pub async fn get_settings(state: &AppState) -> AppResult<ApiResponse<Settings>> {
    let settings = SettingsEntity::find_by_id(SETTINGS_ID)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound("Settings"))?;
    Ok(ApiResponse::success("Settings", Settings::from(settings), None))
}

/// Partial update. An empty string clears an optional field.
pub async fn update_settings(
    state: &AppState,
    user: &AuthUser,
    payload: UpdateSettingsRequest,
) -> AppResult<ApiResponse<Settings>> {
    ensure_admin(user)?;
    let existing = SettingsEntity::find_by_id(SETTINGS_ID)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound("Settings"))?;

    let mut active: SettingsActive = existing.into();
    if let Some(store_name) = payload.store_name {
        active.store_name = Set(store_name.trim().to_string());
    }
    if let Some(phone) = payload.phone {
        active.phone = Set(blank_to_none(phone));
    }
    if let Some(email) = payload.email {
        active.email = Set(blank_to_none(email));
    }
    if let Some(address) = payload.address {
        active.address = Set(blank_to_none(address));
    }
    if let Some(working_hours) = payload.working_hours {
        active.working_hours = Set(blank_to_none(working_hours));
    }
    if let Some(delivery_info) = payload.delivery_info {
        active.delivery_info = Set(blank_to_none(delivery_info));
    }
    active.updated_at = Set(Utc::now().into());
    let settings = active.update(&state.orm).await?;

    audit::record(
        &state.orm,
        user,
        "settings_update",
        "settings",
        serde_json::json!({ "store_name": settings.store_name }),
    )
    .await;

    Ok(ApiResponse::success(
        "Updated",
        Settings::from(settings),
        Some(Meta::empty()),
    ))
}
