//! Remote conversion through a docling-serve instance.
//!
//! `POST {base_url}/v1/convert/file` with the PDF as multipart part `files`
//! and the conversion options as text fields. The response is JSON; only
//! `status == "success"` with an object `document` counts as a result.

use crate::config::DoclingConfig;
use crate::error::RowError;
use crate::method::OutputFormat;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

const CONVERT_PATH: &str = "/v1/convert/file";

#[derive(Debug, Deserialize)]
struct ConvertResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    document: serde_json::Value,
    #[serde(default)]
    errors: serde_json::Value,
}

/// Full endpoint URL for a base URL with or without a trailing slash.
pub fn endpoint(base_url: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), CONVERT_PATH)
}

/// Text form fields sent alongside the file.
pub fn form_fields(config: &DoclingConfig, format: OutputFormat) -> Vec<(&'static str, String)> {
    let to_format = match format {
        OutputFormat::Markdown => "md",
        OutputFormat::Text => "text",
    };
    let mut fields = vec![
        ("to_formats", json_array(&[to_format])),
        ("target_type", "inbody".to_string()),
        ("document_timeout", config.document_timeout_secs.to_string()),
        ("include_images", "true".to_string()),
        ("image_export_mode", "embedded".to_string()),
        ("images_scale", "2".to_string()),
        ("md_page_break_placeholder", String::new()),
        ("pipeline", "standard".to_string()),
        ("do_ocr", "true".to_string()),
        ("force_ocr", "false".to_string()),
        ("ocr_engine", config.ocr_engine.clone()),
        ("ocr_lang", json_array(&config.ocr_lang)),
        ("pdf_backend", config.pdf_backend.clone()),
        ("table_mode", config.table_mode.as_str().to_string()),
        ("abort_on_error", "false".to_string()),
    ];
    if let Some((start, end)) = config.page_range {
        fields.push(("page_range", format!("[{start},{end}]")));
    }
    fields
}

fn json_array<S: AsRef<str>>(items: &[S]) -> String {
    let items: Vec<&str> = items.iter().map(AsRef::as_ref).collect();
    serde_json::to_string(&items).unwrap_or_else(|_| "[]".to_string())
}

/// Convert one PDF and return the Markdown (or text) payload.
pub async fn convert(
    pdf_path: &Path,
    config: &DoclingConfig,
    format: OutputFormat,
) -> Result<String, RowError> {
    let url = endpoint(&config.base_url);
    info!("Sending {} to docling-serve at {}", pdf_path.display(), url);

    let bytes = tokio::fs::read(pdf_path)
        .await
        .map_err(|e| failed(format!("Failed to read {}: {}", pdf_path.display(), e)))?;
    let file_name = pdf_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "document.pdf".to_string());

    let part = reqwest::multipart::Part::bytes(bytes)
        .file_name(file_name)
        .mime_str("application/pdf")
        .map_err(|e| failed(e.to_string()))?;
    let mut form = reqwest::multipart::Form::new().part("files", part);
    for (key, value) in form_fields(config, format) {
        form = form.text(key, value);
    }

    let response = config
        .client
        .post(&url)
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .bearer_auth(&config.api_key)
        .multipart(form)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                failed(format!(
                    "docling-serve request timed out after {}s",
                    config.request_timeout_secs
                ))
            } else {
                failed(format!("docling-serve request failed: {}", e))
            }
        })?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| failed(format!("Failed to read docling-serve response: {}", e)))?;

    if status != reqwest::StatusCode::OK {
        warn!("docling-serve returned {}", status);
        return Err(failed(format!("docling-serve HTTP {}: {}", status, body.trim())));
    }

    let text = parse_response(&body, format)?;
    debug!("docling-serve returned {} bytes of content", text.len());
    Ok(text)
}

/// Extract the content field from a docling-serve JSON body.
pub fn parse_response(body: &str, format: OutputFormat) -> Result<String, RowError> {
    let parsed: ConvertResponse = serde_json::from_str(body)
        .map_err(|e| failed(format!("Invalid docling-serve response: {}", e)))?;

    if parsed.status != "success" {
        return Err(failed(format!(
            "docling-serve status '{}', errors: {}",
            parsed.status, parsed.errors
        )));
    }

    let document = parsed
        .document
        .as_object()
        .ok_or_else(|| failed(format!("docling-serve returned no document: {}", parsed.document)))?;

    let field = match format {
        OutputFormat::Markdown => "md_content",
        OutputFormat::Text => "text_content",
    };
    Ok(document
        .get(field)
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_string())
}

fn failed(detail: String) -> RowError {
    RowError::ConvertFailed {
        status: None,
        detail,
    }
}
