//! Integration tests: docling-serve backend against a local HTTP server.

mod common;

use common::http_server::{self, Route};
use edgequake_pdf2zip::backend::docling;
use edgequake_pdf2zip::{
    convert_pdf, BackendConfig, DoclingConfig, Method, OutputFormat, RowError,
};
use tempfile::tempdir;

const SUCCESS: &str = r##"{"status":"success","document":{"md_content":"# Hello\n\nWorld","text_content":"Hello World"},"errors":[],"processing_time":0.4}"##;

fn sample_pdf(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("sample.pdf");
    std::fs::write(&path, common::PDF_BODY).unwrap();
    path
}

#[tokio::test]
async fn posts_multipart_with_bearer_token() {
    let server = http_server::start(vec![("/v1/convert/file", Route::json(SUCCESS))]);
    let dir = tempdir().unwrap();
    let pdf = sample_pdf(dir.path());
    let mut cfg = DoclingConfig::new(format!("{}/", server.base_url()), "secret-token");
    cfg.page_range = Some((1, 3));

    let md = docling::convert(&pdf, &cfg, OutputFormat::Markdown)
        .await
        .unwrap();
    assert_eq!(md, "# Hello\n\nWorld");

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    let req = &requests[0];
    assert_eq!(req.method, "POST");
    assert_eq!(req.path, "/v1/convert/file");
    assert_eq!(req.header("authorization"), Some("Bearer secret-token"));
    assert!(req
        .header("content-type")
        .is_some_and(|ct| ct.starts_with("multipart/form-data")));

    let body = req.body_text();
    assert!(body.contains(r#"name="files"; filename="sample.pdf""#), "{body}");
    assert!(body.contains("application/pdf"));
    assert!(body.contains("%PDF-1.4"));
    assert!(body.contains(r#"["en","fr","de","it"]"#));
    assert!(body.contains(r#"name="table_mode""#));
    assert!(body.contains("[1,3]"));
}

#[tokio::test]
async fn text_format_reads_text_content() {
    let server = http_server::start(vec![("/v1/convert/file", Route::json(SUCCESS))]);
    let dir = tempdir().unwrap();
    let pdf = sample_pdf(dir.path());
    let cfg = DoclingConfig::new(server.base_url(), "k");

    let text = docling::convert(&pdf, &cfg, OutputFormat::Text).await.unwrap();
    assert_eq!(text, "Hello World");
    assert!(server.requests()[0].body_text().contains(r#"["text"]"#));
}

#[tokio::test]
async fn server_error_is_a_row_failure() {
    let server = http_server::start(vec![(
        "/v1/convert/file",
        Route::status(500, "model crashed"),
    )]);
    let dir = tempdir().unwrap();
    let pdf = sample_pdf(dir.path());
    let cfg = DoclingConfig::new(server.base_url(), "k");

    let err = docling::convert(&pdf, &cfg, OutputFormat::Markdown)
        .await
        .unwrap_err();
    match err {
        RowError::ConvertFailed { status: None, detail } => {
            assert!(detail.contains("500"), "{detail}");
            assert!(detail.contains("model crashed"), "{detail}");
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn failure_status_reports_errors() {
    let server = http_server::start(vec![(
        "/v1/convert/file",
        Route::json(r#"{"status":"failure","document":{},"errors":[{"error_message":"timeout"}]}"#),
    )]);
    let dir = tempdir().unwrap();
    let pdf = sample_pdf(dir.path());
    let cfg = DoclingConfig::new(server.base_url(), "k");

    let err = docling::convert(&pdf, &cfg, OutputFormat::Markdown)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("failure"), "{err}");
}

#[tokio::test]
async fn strategy_table_dispatches_to_docling() {
    let server = http_server::start(vec![("/v1/convert/file", Route::json(SUCCESS))]);
    let dir = tempdir().unwrap();
    let pdf = sample_pdf(dir.path());
    let backend = BackendConfig {
        pdfium_lib_path: None,
        docling: Some(DoclingConfig::new(server.base_url(), "k")),
    };
    let method = Method::resolve("docling-serve", OutputFormat::Markdown);

    let md = convert_pdf(&pdf, &method, &backend).await.unwrap();
    assert_eq!(md, "# Hello\n\nWorld");
    assert_eq!(server.hits("/v1/convert/file"), 1);
}

#[tokio::test]
async fn requests_go_through_the_configured_client() {
    let server = http_server::start(vec![("/v1/convert/file", Route::json(SUCCESS))]);
    let dir = tempdir().unwrap();
    let pdf = sample_pdf(dir.path());

    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert("x-batch", reqwest::header::HeaderValue::from_static("nightly"));
    let mut cfg = DoclingConfig::new(server.base_url(), "k");
    cfg.client = reqwest::Client::builder()
        .default_headers(headers)
        .build()
        .unwrap();

    for _ in 0..2 {
        docling::convert(&pdf, &cfg, OutputFormat::Markdown)
            .await
            .unwrap();
    }

    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|r| r.header("x-batch") == Some("nightly")));
}
