//! Dashboard aggregation: totals, completion rate, activity feed, top forms.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use std::sync::Arc;

use crate::api::auth::AuthUser;
use crate::api::error::ApiError;
use crate::db::FormWithCount;
use crate::AppState;

const MAX_ACTIVITIES: usize = 10;
const MAX_FORM_EVENTS: usize = 3;
const MAX_RESPONSE_EVENTS: usize = 5;
const MAX_TOP_FORMS: usize = 5;
const RECENT_RESPONSES_PER_FORM: i64 = 10;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_forms: i64,
    pub total_responses: i64,
    pub average_responses_per_form: f64,
    pub completion_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    #[serde(rename = "type")]
    pub activity_type: &'static str,
    pub form_id: String,
    pub form_name: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_count: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopForm {
    pub id: String,
    pub name: String,
    pub response_count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardResponse {
    pub stats: DashboardStats,
    pub activities: Vec<Activity>,
    pub top_forms: Vec<TopForm>,
}

#[derive(Debug, FromRow, Deserialize)]
struct RecentResponse {
    id: String,
    created_at: String,
    metadata: Option<String>,
}

/// Share of responses marked complete, over those that carry object
/// metadata. A response counts as completed unless `metadata.completed` is
/// explicitly false; non-object metadata is ignored. No object metadata
/// anywhere means nothing signalled an abandon, so the rate reads 100.
fn completion_rate(metadata: &[Option<Value>]) -> f64 {
    let with_metadata: Vec<&serde_json::Map<String, Value>> = metadata
        .iter()
        .flatten()
        .filter_map(Value::as_object)
        .collect();
    if with_metadata.is_empty() {
        return 100.0;
    }

    let completed = with_metadata
        .iter()
        .filter(|m| m.get("completed").and_then(Value::as_bool) != Some(false))
        .count();

    completed as f64 / with_metadata.len() as f64 * 100.0
}

/// GET /api/dashboard/stats
pub async fn dashboard_stats(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<DashboardResponse>, ApiError> {
    let forms: Vec<FormWithCount> = sqlx::query_as(
        "SELECT f.id, f.name, f.description, f.created_at, \
         (SELECT COUNT(*) FROM form_responses r WHERE r.form_id = f.id AND r.deleted_at IS NULL) AS response_count \
         FROM forms f \
         WHERE f.user_id = ? AND f.deleted_at IS NULL \
         ORDER BY f.created_at DESC",
    )
    .bind(&user.id)
    .fetch_all(&state.db)
    .await?;

    let total_forms = forms.len() as i64;
    let total_responses: i64 = forms.iter().map(|f| f.response_count).sum();
    let average_responses_per_form = if total_forms > 0 {
        total_responses as f64 / total_forms as f64
    } else {
        0.0
    };

    let mut metadata: Vec<Option<Value>> = Vec::new();
    let mut response_events: Vec<Activity> = Vec::new();

    for form in &forms {
        let recent: Vec<RecentResponse> = sqlx::query_as(
            "SELECT id, created_at, metadata FROM form_responses \
             WHERE form_id = ? AND deleted_at IS NULL \
             ORDER BY created_at DESC LIMIT ?",
        )
        .bind(&form.id)
        .bind(RECENT_RESPONSES_PER_FORM)
        .fetch_all(&state.db)
        .await?;

        for response in recent {
            metadata.push(
                response
                    .metadata
                    .as_ref()
                    .and_then(|s| serde_json::from_str(s).ok()),
            );
            response_events.push(Activity {
                id: response.id,
                activity_type: "response_received",
                form_id: form.id.clone(),
                form_name: form.name.clone(),
                timestamp: response.created_at,
                response_count: Some(form.response_count),
            });
        }
    }

    // Feed: 3 newest form creations plus 5 newest responses, merged desc
    let mut form_events: Vec<Activity> = forms
        .iter()
        .take(MAX_FORM_EVENTS)
        .map(|form| Activity {
            id: form.id.clone(),
            activity_type: "form_created",
            form_id: form.id.clone(),
            form_name: form.name.clone(),
            timestamp: form.created_at.clone(),
            response_count: None,
        })
        .collect();

    response_events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    response_events.truncate(MAX_RESPONSE_EVENTS);

    let mut activities = Vec::with_capacity(form_events.len() + response_events.len());
    activities.append(&mut form_events);
    activities.extend(response_events);
    activities.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    activities.truncate(MAX_ACTIVITIES);

    let mut top_forms: Vec<TopForm> = forms
        .iter()
        .map(|form| TopForm {
            id: form.id.clone(),
            name: form.name.clone(),
            response_count: form.response_count,
        })
        .collect();
    top_forms.sort_by(|a, b| b.response_count.cmp(&a.response_count));
    top_forms.truncate(MAX_TOP_FORMS);

    Ok(Json(DashboardResponse {
        stats: DashboardStats {
            total_forms,
            total_responses,
            average_responses_per_form,
            completion_rate: completion_rate(&metadata),
        },
        activities,
        top_forms,
    }))
}
