//! Form CRUD for owners plus the public form view.
//!
//! Ownership is enforced by scoping every query to the authenticated user;
//! a form that exists but belongs to someone else answers exactly like one
//! that never existed.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::api::auth::AuthUser;
use crate::api::error::{ApiError, ValidationErrorBuilder};
use crate::api::validation::{validate_description, validate_name, validate_uuid};
use crate::db::{
    CreateFormRequest, FieldResponse, Form, FormDetailResponse, FormField, FormListResponse,
    FormStats, FormSummary, FormWithCount, PageQuery, PublicFormResponse, UpdateFormRequest,
};
use crate::sanitize::{sanitize_optional, sanitize_string};
use crate::AppState;

pub const FORM_NOT_FOUND: &str = "Formulário não encontrado";

const DEFAULT_FORM_PAGE_SIZE: i64 = 10;

/// Load a non-deleted form owned by the user, or 404. Malformed ids get the
/// same 404 so the error reveals nothing about what exists.
pub async fn load_owned_form(
    state: &AppState,
    user_id: &str,
    form_id: &str,
) -> Result<Form, ApiError> {
    if validate_uuid(form_id).is_err() {
        return Err(ApiError::not_found(FORM_NOT_FOUND));
    }

    let form: Option<Form> =
        sqlx::query_as("SELECT * FROM forms WHERE id = ? AND user_id = ? AND deleted_at IS NULL")
            .bind(form_id)
            .bind(user_id)
            .fetch_optional(&state.db)
            .await?;

    form.ok_or_else(|| ApiError::not_found(FORM_NOT_FOUND))
}

/// Fields of a form in display order.
pub async fn fetch_fields(state: &AppState, form_id: &str) -> Result<Vec<FormField>, ApiError> {
    let fields: Vec<FormField> =
        sqlx::query_as("SELECT * FROM form_fields WHERE form_id = ? ORDER BY position ASC")
            .bind(form_id)
            .fetch_all(&state.db)
            .await?;
    Ok(fields)
}

async fn count_responses(state: &AppState, form_id: &str) -> Result<i64, ApiError> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM form_responses WHERE form_id = ? AND deleted_at IS NULL",
    )
    .bind(form_id)
    .fetch_one(&state.db)
    .await?;
    Ok(count)
}

/// POST /api/forms
pub async fn create_form(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(request): Json<CreateFormRequest>,
) -> Result<(StatusCode, Json<FormSummary>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Err(e) = validate_name(&request.name) {
        errors.add("name", e);
    }
    if let Err(e) = validate_description(&request.description) {
        errors.add("description", e);
    }
    errors.finish()?;

    let form = Form {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user.id,
        name: sanitize_string(&request.name),
        description: sanitize_optional(request.description.as_deref()),
        created_at: chrono::Utc::now().to_rfc3339(),
        deleted_at: None,
    };

    sqlx::query(
        "INSERT INTO forms (id, user_id, name, description, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&form.id)
    .bind(&form.user_id)
    .bind(&form.name)
    .bind(&form.description)
    .bind(&form.created_at)
    .execute(&state.db)
    .await?;

    tracing::info!(form_id = %form.id, "Form created");

    Ok((StatusCode::CREATED, Json(FormSummary::from(form))))
}

/// GET /api/forms
pub async fn list_forms(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<FormListResponse>, ApiError> {
    let (page, limit, offset) = query.normalize(DEFAULT_FORM_PAGE_SIZE);

    let items: Vec<FormWithCount> = sqlx::query_as(
        "SELECT f.id, f.name, f.description, f.created_at, \
         (SELECT COUNT(*) FROM form_responses r WHERE r.form_id = f.id AND r.deleted_at IS NULL) AS response_count \
         FROM forms f \
         WHERE f.user_id = ? AND f.deleted_at IS NULL \
         ORDER BY f.created_at DESC \
         LIMIT ? OFFSET ?",
    )
    .bind(&user.id)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.db)
    .await?;

    let (total,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM forms WHERE user_id = ? AND deleted_at IS NULL")
            .bind(&user.id)
            .fetch_one(&state.db)
            .await?;

    Ok(Json(FormListResponse {
        items,
        total,
        page,
        limit,
        has_more: page * limit < total,
    }))
}

/// GET /api/forms/:id
pub async fn get_form(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(form_id): Path<String>,
) -> Result<Json<FormDetailResponse>, ApiError> {
    let form = load_owned_form(&state, &user.id, &form_id).await?;
    let fields = fetch_fields(&state, &form.id).await?;
    let responses = count_responses(&state, &form.id).await?;

    Ok(Json(FormDetailResponse {
        id: form.id,
        name: form.name,
        description: form.description,
        fields: fields.into_iter().map(FieldResponse::from).collect(),
        created_at: form.created_at,
        stats: FormStats { responses },
    }))
}

/// PUT /api/forms/:id
pub async fn update_form(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(form_id): Path<String>,
    Json(request): Json<UpdateFormRequest>,
) -> Result<Json<FormSummary>, ApiError> {
    let mut form = load_owned_form(&state, &user.id, &form_id).await?;

    let mut errors = ValidationErrorBuilder::new();
    if let Some(name) = &request.name {
        if let Err(e) = validate_name(name) {
            errors.add("name", e);
        }
    }
    if request.description.is_some() {
        if let Err(e) = validate_description(&request.description) {
            errors.add("description", e);
        }
    }
    errors.finish()?;

    if let Some(name) = &request.name {
        form.name = sanitize_string(name);
    }
    if let Some(description) = &request.description {
        form.description = Some(sanitize_string(description));
    }

    sqlx::query("UPDATE forms SET name = ?, description = ? WHERE id = ?")
        .bind(&form.name)
        .bind(&form.description)
        .bind(&form.id)
        .execute(&state.db)
        .await?;

    Ok(Json(FormSummary::from(form)))
}

/// DELETE /api/forms/:id
pub async fn delete_form(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(form_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let form = load_owned_form(&state, &user.id, &form_id).await?;

    sqlx::query("UPDATE forms SET deleted_at = ? WHERE id = ?")
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(&form.id)
        .execute(&state.db)
        .await?;

    tracing::info!(form_id = %form.id, "Form soft-deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/public/forms/:id
pub async fn get_public_form(
    State(state): State<Arc<AppState>>,
    Path(form_id): Path<String>,
) -> Result<Json<PublicFormResponse>, ApiError> {
    if validate_uuid(&form_id).is_err() {
        return Err(ApiError::not_found(FORM_NOT_FOUND));
    }

    let form: Option<Form> =
        sqlx::query_as("SELECT * FROM forms WHERE id = ? AND deleted_at IS NULL")
            .bind(&form_id)
            .fetch_optional(&state.db)
            .await?;
    let form = form.ok_or_else(|| ApiError::not_found(FORM_NOT_FOUND))?;

    let fields = fetch_fields(&state, &form.id).await?;

    Ok(Json(PublicFormResponse {
        id: form.id,
        name: form.name,
        description: form.description,
        fields: fields.into_iter().map(FieldResponse::from).collect(),
        created_at: form.created_at,
    }))
}
