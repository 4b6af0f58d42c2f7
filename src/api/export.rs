//! Response export: CSV, JSON and PDF downloads.
//!
//! Exports are built synchronously in memory over the form's full
//! non-deleted response set, newest first. Dates are rendered in the pt-BR
//! `dd/mm/yyyy, HH:MM:SS` shape the dashboard uses.

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::header,
    response::Response,
};
use chrono::DateTime;
use genpdf::elements::{Break, FrameCellDecorator, Paragraph, TableLayout};
use genpdf::style::{Color, Style};
use genpdf::Element;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::auth::AuthUser;
use crate::api::error::ApiError;
use crate::api::forms::{fetch_fields, load_owned_form};
use crate::db::{render_value, Form, FormField, FormResponse, ResponseEntry};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ExportQuery {
    pub format: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonExportRow {
    id: String,
    created_at: String,
    ip: Option<String>,
    data: Vec<ResponseEntry>,
}

/// GET /api/forms/:id/export?format=csv|json|pdf
pub async fn export_responses(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(form_id): Path<String>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    let form = load_owned_form(&state, &user.id, &form_id).await?;
    let fields = fetch_fields(&state, &form.id).await?;

    let responses: Vec<FormResponse> = sqlx::query_as(
        "SELECT * FROM form_responses WHERE form_id = ? AND deleted_at IS NULL ORDER BY created_at DESC",
    )
    .bind(&form.id)
    .fetch_all(&state.db)
    .await?;

    let format = query.format.as_deref().unwrap_or("csv");
    let (bytes, content_type, extension) = match format {
        "csv" => (
            build_csv(&fields, &responses).into_bytes(),
            "text/csv; charset=utf-8",
            "csv",
        ),
        "json" => (build_json(&responses)?, "application/json", "json"),
        "pdf" => (
            build_pdf(&state, &form, &fields, &responses)?,
            "application/pdf",
            "pdf",
        ),
        other => {
            return Err(ApiError::bad_request(format!(
                "Formato de exportação não suportado: {other}"
            )))
        }
    };

    tracing::info!(form_id = %form.id, format = %format, rows = responses.len(), "Export generated");

    let filename = export_filename(&form.name, extension);
    Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        )
        .body(Body::from(bytes))
        .map_err(|e| {
            tracing::error!("Failed to build export response: {}", e);
            ApiError::internal("Failed to build export")
        })
}

/// Quote a CSV cell when it contains a comma, quote or newline.
fn escape_csv(cell: &str) -> String {
    if cell.contains(',') || cell.contains('"') || cell.contains('\n') || cell.contains('\r') {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

/// pt-BR timestamp rendering; corrupt values pass through untouched.
fn format_timestamp(rfc3339: &str) -> String {
    DateTime::parse_from_rfc3339(rfc3339)
        .map(|dt| dt.format("%d/%m/%Y, %H:%M:%S").to_string())
        .unwrap_or_else(|_| rfc3339.to_string())
}

fn cell_for(entries: &[ResponseEntry], field_id: &str) -> Option<String> {
    entries
        .iter()
        .find(|entry| entry.field_id == field_id)
        .and_then(|entry| render_value(&entry.value))
}

fn build_csv(fields: &[FormField], responses: &[FormResponse]) -> String {
    let mut lines = Vec::with_capacity(responses.len() + 1);

    let header: Vec<String> = std::iter::once("Data/Hora".to_string())
        .chain(fields.iter().map(|f| f.label.clone()))
        .chain(std::iter::once("IP".to_string()))
        .map(|cell| escape_csv(&cell))
        .collect();
    lines.push(header.join(","));

    for response in responses {
        let entries = response.entries();
        let row: Vec<String> = std::iter::once(format_timestamp(&response.created_at))
            .chain(
                fields
                    .iter()
                    .map(|f| cell_for(&entries, &f.id).unwrap_or_default()),
            )
            .chain(std::iter::once(response.ip.clone().unwrap_or_default()))
            .map(|cell| escape_csv(&cell))
            .collect();
        lines.push(row.join(","));
    }

    lines.join("\n")
}

fn build_json(responses: &[FormResponse]) -> Result<Vec<u8>, ApiError> {
    let rows: Vec<JsonExportRow> = responses
        .iter()
        .map(|r| JsonExportRow {
            id: r.id.clone(),
            created_at: r.created_at.clone(),
            ip: r.ip.clone(),
            data: r.entries(),
        })
        .collect();

    serde_json::to_vec_pretty(&rows).map_err(|e| {
        tracing::error!("Failed to serialize JSON export: {}", e);
        ApiError::internal("Failed to build export")
    })
}

fn build_pdf(
    state: &AppState,
    form: &Form,
    fields: &[FormField],
    responses: &[FormResponse],
) -> Result<Vec<u8>, ApiError> {
    let pdf_error = |e: genpdf::error::Error| {
        tracing::error!("PDF generation failed: {}", e);
        ApiError::internal("Falha ao gerar o PDF")
    };

    let font_family =
        genpdf::fonts::from_files(&state.config.export.fonts_dir, "LiberationSans", None)
            .map_err(pdf_error)?;

    let mut doc = genpdf::Document::new(font_family);
    doc.set_title(format!("Respostas: {}", form.name));
    // A4 landscape
    doc.set_paper_size(genpdf::Size::new(297.0, 210.0));

    let mut decorator = genpdf::SimplePageDecorator::new();
    decorator.set_margins(10);
    doc.set_page_decorator(decorator);

    doc.push(
        Paragraph::new(format!("Respostas: {}", form.name))
            .styled(Style::new().bold().with_font_size(14)),
    );
    doc.push(
        Paragraph::new(format!(
            "Total de respostas: {} | Gerado em: {}",
            responses.len(),
            format_timestamp(&chrono::Utc::now().to_rfc3339())
        ))
        .styled(Style::new().with_font_size(9)),
    );
    doc.push(Break::new(1));

    let columns = fields.len() + 2;
    let mut table = TableLayout::new(vec![1; columns]);
    table.set_cell_decorator(FrameCellDecorator::new(true, true, false));

    let header_style = Style::new().bold().with_font_size(8);
    let mut row = table.row();
    row.push_element(Paragraph::new("Data/Hora").styled(header_style));
    for field in fields {
        row.push_element(Paragraph::new(field.label.clone()).styled(header_style));
    }
    row.push_element(Paragraph::new("IP").styled(header_style));
    row.push().map_err(pdf_error)?;

    for (index, response) in responses.iter().enumerate() {
        // Alternate row tint as a stripe effect
        let style = if index % 2 == 0 {
            Style::new().with_font_size(8)
        } else {
            Style::new()
                .with_font_size(8)
                .with_color(Color::Rgb(80, 80, 80))
        };

        let entries = response.entries();
        let mut row = table.row();
        row.push_element(Paragraph::new(format_timestamp(&response.created_at)).styled(style));
        for field in fields {
            let cell = cell_for(&entries, &field.id).unwrap_or_else(|| "-".to_string());
            row.push_element(Paragraph::new(cell).styled(style));
        }
        row.push_element(
            Paragraph::new(response.ip.clone().unwrap_or_else(|| "-".to_string())).styled(style),
        );
        row.push().map_err(pdf_error)?;
    }

    doc.push(table);

    let mut buffer = Vec::new();
    doc.render(&mut buffer).map_err(pdf_error)?;
    Ok(buffer)
}

fn export_filename(form_name: &str, extension: &str) -> String {
    let safe: String = form_name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '"' => '-',
            c if c.is_control() => '-',
            c => c,
        })
        .collect();
    format!("{}-respostas.{}", safe.trim(), extension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(id: &str, label: &str) -> FormField {
        FormField {
            id: id.to_string(),
            form_id: "f".to_string(),
            field_type: "TEXT".to_string(),
            label: label.to_string(),
            required: false,
            position: 0,
            settings: None,
            created_at: "2026-01-01T00:00:00+00:00".to_string(),
        }
    }

    fn response(data: serde_json::Value) -> FormResponse {
        FormResponse {
            id: "r1".to_string(),
            form_id: "f".to_string(),
            data: data.to_string(),
            ip: Some("203.0.113.7".to_string()),
            metadata: None,
            created_at: "2026-03-15T14:30:05+00:00".to_string(),
            deleted_at: None,
        }
    }

    #[test]
    fn escape_quotes_only_when_needed() {
        assert_eq!(escape_csv("plain"), "plain");
        assert_eq!(escape_csv("a,b"), "\"a,b\"");
        assert_eq!(escape_csv("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_csv("line\nbreak"), "\"line\nbreak\"");
    }

    #[test]
    fn timestamps_render_pt_br() {
        assert_eq!(
            format_timestamp("2026-03-15T14:30:05+00:00"),
            "15/03/2026, 14:30:05"
        );
        assert_eq!(format_timestamp("garbage"), "garbage");
    }

    #[test]
    fn csv_has_header_and_quoted_date_cells() {
        let fields = vec![field("f1", "Nome"), field("f2", "Aceita contato?")];
        let responses = vec![response(json!([
            {"fieldId": "f1", "value": "Silva, Maria"},
            {"fieldId": "f2", "value": true}
        ]))];

        let csv = build_csv(&fields, &responses);
        let mut lines = csv.lines();
        assert_eq!(lines.next().unwrap(), "Data/Hora,Nome,Aceita contato?,IP");
        // Date contains ", " so the whole cell is quoted
        assert_eq!(
            lines.next().unwrap(),
            "\"15/03/2026, 14:30:05\",\"Silva, Maria\",Sim,203.0.113.7"
        );
        assert!(lines.next().is_none());
    }

    #[test]
    fn csv_renders_missing_values_empty() {
        let fields = vec![field("f1", "Nome"), field("f2", "Email")];
        let responses = vec![response(json!([{"fieldId": "f1", "value": "Ana"}]))];

        let csv = build_csv(&fields, &responses);
        let row = csv.lines().nth(1).unwrap();
        assert_eq!(row, "\"15/03/2026, 14:30:05\",Ana,,203.0.113.7");
    }

    #[test]
    fn json_export_shape() {
        let responses = vec![response(json!([{"fieldId": "f1", "value": "Ana"}]))];
        let bytes = build_json(&responses).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed[0]["id"], "r1");
        assert_eq!(parsed[0]["createdAt"], "2026-03-15T14:30:05+00:00");
        assert_eq!(parsed[0]["data"][0]["fieldId"], "f1");
    }

    #[test]
    fn filenames_are_safe() {
        assert_eq!(
            export_filename("Pesquisa 2026", "csv"),
            "Pesquisa 2026-respostas.csv"
        );
        assert_eq!(export_filename("a/b\"c", "pdf"), "a-b-c-respostas.pdf");
    }
}
