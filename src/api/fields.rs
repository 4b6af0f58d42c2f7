//! Field management for a form's owner.
//!
//! Fields are hard-deleted (removing an input slot from the builder is
//! final); settings always pass through the typed parser for the field's
//! type before touching storage.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::api::auth::AuthUser;
use crate::api::error::{ApiError, ValidationErrorBuilder};
use crate::api::forms::{fetch_fields, load_owned_form};
use crate::api::validation::{validate_label, validate_uuid};
use crate::db::{CreateFieldRequest, FieldResponse, FieldSettings, FieldType, FormField, UpdateFieldRequest};
use crate::sanitize::sanitize_string;
use crate::AppState;

const FIELD_NOT_FOUND: &str = "Campo não encontrado";

async fn load_field(
    state: &AppState,
    form_id: &str,
    field_id: &str,
) -> Result<FormField, ApiError> {
    if validate_uuid(field_id).is_err() {
        return Err(ApiError::not_found(FIELD_NOT_FOUND));
    }

    let field: Option<FormField> =
        sqlx::query_as("SELECT * FROM form_fields WHERE id = ? AND form_id = ?")
            .bind(field_id)
            .bind(form_id)
            .fetch_optional(&state.db)
            .await?;

    field.ok_or_else(|| ApiError::not_found(FIELD_NOT_FOUND))
}

fn settings_to_text(settings: &FieldSettings) -> Result<String, ApiError> {
    serde_json::to_string(&settings.to_json()).map_err(|e| {
        tracing::error!("Failed to serialize field settings: {}", e);
        ApiError::internal("Failed to store field settings")
    })
}

/// POST /api/forms/:id/fields
pub async fn create_field(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(form_id): Path<String>,
    Json(request): Json<CreateFieldRequest>,
) -> Result<(StatusCode, Json<FieldResponse>), ApiError> {
    let form = load_owned_form(&state, &user.id, &form_id).await?;

    let mut errors = ValidationErrorBuilder::new();
    if let Err(e) = validate_label(&request.label) {
        errors.add("label", e);
    }
    errors.finish()?;

    let settings = FieldSettings::parse(request.field_type, request.settings.as_ref())
        .map_err(|e| ApiError::validation_field("settings", e.to_string()))?;

    let field = FormField {
        id: uuid::Uuid::new_v4().to_string(),
        form_id: form.id,
        field_type: request.field_type.as_str().to_string(),
        label: sanitize_string(&request.label),
        required: request.required,
        position: request.order,
        settings: Some(settings_to_text(&settings)?),
        created_at: chrono::Utc::now().to_rfc3339(),
    };

    sqlx::query(
        "INSERT INTO form_fields (id, form_id, field_type, label, required, position, settings, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&field.id)
    .bind(&field.form_id)
    .bind(&field.field_type)
    .bind(&field.label)
    .bind(field.required)
    .bind(field.position)
    .bind(&field.settings)
    .bind(&field.created_at)
    .execute(&state.db)
    .await?;

    tracing::info!(form_id = %field.form_id, field_id = %field.id, "Field created");

    Ok((StatusCode::CREATED, Json(FieldResponse::from(field))))
}

/// GET /api/forms/:id/fields
pub async fn list_fields(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(form_id): Path<String>,
) -> Result<Json<Vec<FieldResponse>>, ApiError> {
    let form = load_owned_form(&state, &user.id, &form_id).await?;
    let fields = fetch_fields(&state, &form.id).await?;
    Ok(Json(fields.into_iter().map(FieldResponse::from).collect()))
}

/// PUT /api/forms/:id/fields/:fieldId
pub async fn update_field(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path((form_id, field_id)): Path<(String, String)>,
    Json(request): Json<UpdateFieldRequest>,
) -> Result<Json<FieldResponse>, ApiError> {
    let form = load_owned_form(&state, &user.id, &form_id).await?;
    let mut field = load_field(&state, &form.id, &field_id).await?;

    if let Some(label) = &request.label {
        let mut errors = ValidationErrorBuilder::new();
        if let Err(e) = validate_label(label) {
            errors.add("label", e);
        }
        errors.finish()?;
        field.label = sanitize_string(label);
    }
    if let Some(required) = request.required {
        field.required = required;
    }
    if let Some(order) = request.order {
        field.position = order;
    }
    if let Some(raw) = &request.settings {
        // Stored type string came from FieldType::as_str at creation
        let field_type = FieldType::parse(&field.field_type)
            .ok_or_else(|| ApiError::internal("Corrupt field type in storage"))?;
        let settings = FieldSettings::parse(field_type, Some(raw))
            .map_err(|e| ApiError::validation_field("settings", e.to_string()))?;
        field.settings = Some(settings_to_text(&settings)?);
    }

    sqlx::query(
        "UPDATE form_fields SET label = ?, required = ?, position = ?, settings = ? WHERE id = ?",
    )
    .bind(&field.label)
    .bind(field.required)
    .bind(field.position)
    .bind(&field.settings)
    .bind(&field.id)
    .execute(&state.db)
    .await?;

    Ok(Json(FieldResponse::from(field)))
}

/// DELETE /api/forms/:id/fields/:fieldId
pub async fn delete_field(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path((form_id, field_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let form = load_owned_form(&state, &user.id, &form_id).await?;
    let field = load_field(&state, &form.id, &field_id).await?;

    sqlx::query("DELETE FROM form_fields WHERE id = ?")
        .bind(&field.id)
        .execute(&state.db)
        .await?;

    tracing::info!(form_id = %form.id, field_id = %field.id, "Field deleted");

    Ok(StatusCode::NO_CONTENT)
}
