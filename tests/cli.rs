//! Integration tests for the `pdf2zip` binary.

#![cfg(feature = "cli")]

mod common;

use edgequake_pdf2zip::ArchiveCache;
use std::process::Command;
use tempfile::tempdir;

fn pdf2zip(dir: &std::path::Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_pdf2zip"));
    cmd.current_dir(dir)
        .env_remove("RUST_LOG")
        .env_remove("DOCLING_HTTP_CLIENT")
        .env_remove("DOCLING_API_KEY");
    cmd
}

#[test]
fn list_and_show_read_the_archive() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cache.zip");
    let mut archive = ArchiveCache::ensure(&path).unwrap();
    archive.write("b_pdfium.md", b"# B\n").unwrap();
    archive.write("a_pdfium.md", b"# A\n").unwrap();

    let out = pdf2zip(dir.path()).args(["list", "cache.zip"]).output().unwrap();
    assert!(out.status.success());
    assert_eq!(String::from_utf8_lossy(&out.stdout), "a_pdfium.md\nb_pdfium.md\n");

    let out = pdf2zip(dir.path())
        .args(["show", "cache.zip", "b_pdfium.md"])
        .output()
        .unwrap();
    assert!(out.status.success());
    assert_eq!(String::from_utf8_lossy(&out.stdout), "# B\n");

    let out = pdf2zip(dir.path())
        .args(["show", "cache.zip", "nope.md"])
        .output()
        .unwrap();
    assert!(!out.status.success());
}

#[test]
fn worker_fails_with_diagnostics_on_stderr() {
    let dir = tempdir().unwrap();
    let out = pdf2zip(dir.path())
        .args(["convert", "in.pdf", "docling-serve", "--format", "md"])
        .output()
        .unwrap();

    assert!(!out.status.success());
    assert!(out.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("DOCLING_HTTP_CLIENT"), "{stderr}");
}

#[test]
fn run_reports_json_and_writes_output_table() {
    let dir = tempdir().unwrap();
    common::write_csv(
        &dir.path().join("in.csv"),
        &["pdf,id", ",empty-url", "ftp://x/a.pdf,wrong-scheme"],
    );

    let out = pdf2zip(dir.path())
        .args([
            "run",
            "in.csv",
            "--url-column",
            "pdf",
            "--name-column",
            "id",
            "--archive",
            "out/cache.zip",
            "--merge-output",
            "--output",
            "out/table.csv",
            "--json",
        ])
        .output()
        .unwrap();

    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(report["stats"]["invalid"], 2);
    assert_eq!(report["outcomes"][1]["status"], "invalid");
    assert!(dir.path().join("out/cache.zip").exists());

    let table = std::fs::read_to_string(dir.path().join("out/table.csv")).unwrap();
    assert!(table.starts_with("pdf,id,pdf_md_pdfium"), "{table}");
}

#[test]
fn missing_column_exits_non_zero() {
    let dir = tempdir().unwrap();
    common::write_csv(&dir.path().join("in.csv"), &["link,id", "http://x/a.pdf,a"]);

    let out = pdf2zip(dir.path()).args(["run", "in.csv"]).output().unwrap();

    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("'url'"), "{stderr}");
}
