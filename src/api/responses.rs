//! Public response ingestion and the owner-side query/filter engine.
//!
//! Date-range and IP filters run in SQL. Field-value and free-text search
//! need the stored JSON payload, so those load the date/IP-matched rows and
//! filter in memory; `total` then reflects the post-filter count so the
//! pagination invariant holds for every filter combination.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use crate::api::auth::AuthUser;
use crate::api::error::ApiError;
use crate::api::forms::{fetch_fields, load_owned_form, FORM_NOT_FOUND};
use crate::api::rate_limit::client_ip;
use crate::api::validation::validate_uuid;
use crate::db::{
    parse_entries, render_value, Form, FormResponse, ResponseEntry, ResponseListOut, ResponseOut,
    SubmitResponseRequest,
};
use crate::sanitize::sanitize_json;
use crate::AppState;

const RESPONSE_NOT_FOUND: &str = "Resposta não encontrada";

const DEFAULT_RESPONSE_PAGE_SIZE: i64 = 25;

#[derive(Debug, Serialize)]
pub struct SubmitResponseOut {
    pub id: String,
}

/// POST /api/public/forms/:id/responses
pub async fn submit_response(
    State(state): State<Arc<AppState>>,
    Path(form_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<SubmitResponseRequest>,
) -> Result<(StatusCode, Json<SubmitResponseOut>), ApiError> {
    if validate_uuid(&form_id).is_err() {
        return Err(ApiError::not_found(FORM_NOT_FOUND));
    }

    let form: Option<Form> =
        sqlx::query_as("SELECT * FROM forms WHERE id = ? AND deleted_at IS NULL")
            .bind(&form_id)
            .fetch_optional(&state.db)
            .await?;
    let form = form.ok_or_else(|| ApiError::not_found(FORM_NOT_FOUND))?;

    // Entries are only kept when they reference a field this form declares
    let known_ids: HashSet<String> = fetch_fields(&state, &form.id)
        .await?
        .into_iter()
        .map(|f| f.id)
        .collect();

    let entries: Vec<ResponseEntry> = request
        .fields
        .as_ref()
        .map(|raw| parse_entries(&sanitize_json(raw)))
        .unwrap_or_default()
        .into_iter()
        .filter(|entry| known_ids.contains(&entry.field_id))
        .collect();

    if entries.is_empty() {
        return Err(ApiError::bad_request("fields is required"));
    }

    let data = serde_json::to_string(&entries).map_err(|e| {
        tracing::error!("Failed to serialize response data: {}", e);
        ApiError::internal("Failed to store response")
    })?;

    let metadata = match &request.metadata {
        Some(raw) => Some(serde_json::to_string(&sanitize_json(raw)).map_err(|e| {
            tracing::error!("Failed to serialize response metadata: {}", e);
            ApiError::internal("Failed to store response")
        })?),
        None => None,
    };

    let id = uuid::Uuid::new_v4().to_string();
    let ip = client_ip(&headers).to_string();

    sqlx::query(
        "INSERT INTO form_responses (id, form_id, data, ip, metadata, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&form.id)
    .bind(&data)
    .bind(&ip)
    .bind(&metadata)
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(&state.db)
    .await?;

    tracing::info!(form_id = %form.id, response_id = %id, "Response received");

    Ok((StatusCode::CREATED, Json(SubmitResponseOut { id })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub ip: Option<String>,
    pub field_id: Option<String>,
    pub field_value: Option<String>,
    pub search: Option<String>,
}

impl ResponseQuery {
    fn normalize(&self) -> (i64, i64, i64) {
        let page = self.page.filter(|p| *p >= 1).unwrap_or(1);
        let limit = self
            .limit
            .filter(|l| *l >= 1)
            .unwrap_or(DEFAULT_RESPONSE_PAGE_SIZE);
        (page, limit, (page - 1) * limit)
    }

    /// Field-value and search filters cannot be pushed into SQL.
    fn needs_in_memory_pass(&self) -> bool {
        let has_field_filter = matches!(
            (&self.field_id, &self.field_value),
            (Some(id), Some(value)) if !id.is_empty() && !value.is_empty()
        );
        let has_search = self.search.as_deref().is_some_and(|s| !s.is_empty());
        has_field_filter || has_search
    }
}

/// Normalize an RFC 3339 bound to a UTC string comparable with stored
/// timestamps (which always carry +00:00).
fn normalize_date(raw: &str, param: &str) -> Result<String, ApiError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc).to_rfc3339())
        .map_err(|_| ApiError::validation_field(param, format!("{param} deve ser RFC 3339")))
}

/// Case-insensitive substring match against one named field's value.
fn matches_field(entries: &[ResponseEntry], field_id: &str, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    entries.iter().any(|entry| {
        entry.field_id == field_id
            && render_value(&entry.value)
                .is_some_and(|v| v.to_lowercase().contains(&needle))
    })
}

/// Case-insensitive substring match against any field value or the IP.
fn matches_search(entries: &[ResponseEntry], ip: Option<&str>, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    let in_fields = entries
        .iter()
        .any(|entry| render_value(&entry.value).is_some_and(|v| v.to_lowercase().contains(&needle)));
    in_fields || ip.is_some_and(|ip| ip.to_lowercase().contains(&needle))
}

/// Make user input safe inside a LIKE pattern: `%` and `_` must match
/// literally, not as wildcards. Pair with `ESCAPE '\'` in the query.
fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn matches_query(response: &FormResponse, query: &ResponseQuery) -> bool {
    let entries = response.entries();

    if let (Some(field_id), Some(value)) = (&query.field_id, &query.field_value) {
        if !field_id.is_empty() && !value.is_empty() && !matches_field(&entries, field_id, value) {
            return false;
        }
    }

    if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
        if !matches_search(&entries, response.ip.as_deref(), search) {
            return false;
        }
    }

    true
}

/// GET /api/forms/:id/responses
pub async fn list_responses(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(form_id): Path<String>,
    Query(query): Query<ResponseQuery>,
) -> Result<Json<ResponseListOut>, ApiError> {
    let form = load_owned_form(&state, &user.id, &form_id).await?;
    let (page, limit, offset) = query.normalize();

    let mut conditions = String::new();
    let mut params: Vec<String> = Vec::new();

    if let Some(raw) = query.start_date.as_deref().filter(|s| !s.is_empty()) {
        conditions.push_str(" AND created_at >= ?");
        params.push(normalize_date(raw, "startDate")?);
    }
    if let Some(raw) = query.end_date.as_deref().filter(|s| !s.is_empty()) {
        conditions.push_str(" AND created_at <= ?");
        params.push(normalize_date(raw, "endDate")?);
    }
    if let Some(ip) = query.ip.as_deref().filter(|s| !s.is_empty()) {
        conditions.push_str(" AND LOWER(ip) LIKE ? ESCAPE '\\'");
        params.push(format!("%{}%", escape_like(&ip.to_lowercase())));
    }

    let (items, total) = if query.needs_in_memory_pass() {
        let sql = format!(
            "SELECT * FROM form_responses WHERE form_id = ? AND deleted_at IS NULL{conditions} \
             ORDER BY created_at DESC"
        );
        let mut q = sqlx::query_as::<_, FormResponse>(&sql).bind(&form.id);
        for param in &params {
            q = q.bind(param);
        }
        let rows = q.fetch_all(&state.db).await?;

        let filtered: Vec<FormResponse> = rows
            .into_iter()
            .filter(|row| matches_query(row, &query))
            .collect();
        let total = filtered.len() as i64;

        let items = filtered
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(ResponseOut::from)
            .collect();
        (items, total)
    } else {
        let sql = format!(
            "SELECT * FROM form_responses WHERE form_id = ? AND deleted_at IS NULL{conditions} \
             ORDER BY created_at DESC LIMIT ? OFFSET ?"
        );
        let mut q = sqlx::query_as::<_, FormResponse>(&sql).bind(&form.id);
        for param in &params {
            q = q.bind(param);
        }
        let rows = q.bind(limit).bind(offset).fetch_all(&state.db).await?;

        let count_sql = format!(
            "SELECT COUNT(*) FROM form_responses WHERE form_id = ? AND deleted_at IS NULL{conditions}"
        );
        let mut q = sqlx::query_as::<_, (i64,)>(&count_sql).bind(&form.id);
        for param in &params {
            q = q.bind(param);
        }
        let (total,) = q.fetch_one(&state.db).await?;

        (rows.into_iter().map(ResponseOut::from).collect(), total)
    };

    Ok(Json(ResponseListOut {
        items,
        total,
        page,
        limit,
    }))
}

async fn load_owned_response(
    state: &AppState,
    user_id: &str,
    form_id: &str,
    response_id: &str,
) -> Result<FormResponse, ApiError> {
    let form = load_owned_form(state, user_id, form_id).await?;

    if validate_uuid(response_id).is_err() {
        return Err(ApiError::not_found(RESPONSE_NOT_FOUND));
    }

    let response: Option<FormResponse> = sqlx::query_as(
        "SELECT * FROM form_responses WHERE id = ? AND form_id = ? AND deleted_at IS NULL",
    )
    .bind(response_id)
    .bind(&form.id)
    .fetch_optional(&state.db)
    .await?;

    response.ok_or_else(|| ApiError::not_found(RESPONSE_NOT_FOUND))
}

/// GET /api/forms/:id/responses/:responseId
pub async fn get_response(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path((form_id, response_id)): Path<(String, String)>,
) -> Result<Json<ResponseOut>, ApiError> {
    let response = load_owned_response(&state, &user.id, &form_id, &response_id).await?;
    Ok(Json(ResponseOut::from(response)))
}

/// DELETE /api/forms/:id/responses/:responseId
pub async fn delete_response(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path((form_id, response_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let response = load_owned_response(&state, &user.id, &form_id, &response_id).await?;

    sqlx::query("UPDATE form_responses SET deleted_at = ? WHERE id = ?")
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(&response.id)
        .execute(&state.db)
        .await?;

    tracing::info!(response_id = %response.id, "Response soft-deleted");

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entries() -> Vec<ResponseEntry> {
        parse_entries(&json!([
            {"fieldId": "name", "value": "Maria Silva"},
            {"fieldId": "score", "value": 9},
            {"fieldId": "optin", "value": true},
            {"fieldId": "tags", "value": ["web", "Mobile"]}
        ]))
    }

    #[test]
    fn field_match_is_scoped_and_case_insensitive() {
        let entries = entries();
        assert!(matches_field(&entries, "name", "maria"));
        assert!(matches_field(&entries, "score", "9"));
        assert!(!matches_field(&entries, "name", "9"));
        assert!(!matches_field(&entries, "missing", "maria"));
    }

    #[test]
    fn field_match_sees_rendered_values() {
        let entries = entries();
        // Booleans render as Sim/Não, arrays join with ", "
        assert!(matches_field(&entries, "optin", "sim"));
        assert!(matches_field(&entries, "tags", "mobile"));
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("192.168"), "192.168");
        assert_eq!(escape_like("10%"), "10\\%");
        assert_eq!(escape_like("a_b"), "a\\_b");
        assert_eq!(escape_like("a\\b"), "a\\\\b");
    }

    #[test]
    fn search_spans_all_fields_and_ip() {
        let entries = entries();
        assert!(matches_search(&entries, None, "silva"));
        assert!(matches_search(&entries, Some("203.0.113.7"), "113"));
        assert!(!matches_search(&entries, Some("203.0.113.7"), "absent"));
    }

    #[test]
    fn date_bounds_are_normalized_to_utc() {
        let normalized = normalize_date("2026-03-01T10:00:00-03:00", "startDate").unwrap();
        assert_eq!(normalized, "2026-03-01T13:00:00+00:00");
        assert!(normalize_date("yesterday", "startDate").is_err());
    }

    #[test]
    fn query_defaults_to_25_per_page() {
        let query = ResponseQuery::default();
        assert_eq!(query.normalize(), (1, 25, 0));
        assert!(!query.needs_in_memory_pass());

        let query = ResponseQuery {
            search: Some("x".to_string()),
            ..Default::default()
        };
        assert!(query.needs_in_memory_pass());

        // fieldId without fieldValue does not trigger the in-memory pass
        let query = ResponseQuery {
            field_id: Some("f1".to_string()),
            ..Default::default()
        };
        assert!(!query.needs_in_memory_pass());
    }
}
