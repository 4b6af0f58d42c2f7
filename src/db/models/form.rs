//! Form models and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::FieldResponse;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Form {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
    pub deleted_at: Option<String>,
}

/// Compact summary returned by create/update.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSummary {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
}

impl From<Form> for FormSummary {
    fn from(form: Form) -> Self {
        Self {
            id: form.id,
            name: form.name,
            description: form.description,
            created_at: form.created_at,
        }
    }
}

/// List item: summary plus the form's live response count.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FormWithCount {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
    pub response_count: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormListResponse {
    pub items: Vec<FormWithCount>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub has_more: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormStats {
    pub responses: i64,
}

/// Owner view of a form: fields in order plus response stats.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormDetailResponse {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub fields: Vec<FieldResponse>,
    pub created_at: String,
    pub stats: FormStats,
}

/// Public view of a form: no owner data, no stats.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicFormResponse {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub fields: Vec<FieldResponse>,
    pub created_at: String,
}

// DTOs for API

#[derive(Debug, Deserialize)]
pub struct CreateFormRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateFormRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PageQuery {
    /// Normalized (page, limit, offset) with the given default page size.
    pub fn normalize(&self, default_limit: i64) -> (i64, i64, i64) {
        let page = self.page.filter(|p| *p >= 1).unwrap_or(1);
        let limit = self.limit.filter(|l| *l >= 1).unwrap_or(default_limit);
        (page, limit, (page - 1) * limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_query_normalizes_defaults_and_bad_input() {
        let q = PageQuery::default();
        assert_eq!(q.normalize(25), (1, 25, 0));

        let q = PageQuery {
            page: Some(3),
            limit: Some(10),
        };
        assert_eq!(q.normalize(25), (3, 10, 20));

        let q = PageQuery {
            page: Some(0),
            limit: Some(-5),
        };
        assert_eq!(q.normalize(25), (1, 25, 0));
    }
}
