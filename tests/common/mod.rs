#![allow(dead_code)]

pub mod http_server;

use std::path::Path;

/// Smallest body that passes the `%PDF` magic check.
pub const PDF_BODY: &[u8] = b"%PDF-1.4\n1 0 obj\n<<>>\nendobj\ntrailer\n<<>>\n%%EOF\n";

/// Write a CSV file from a header line and data lines.
pub fn write_csv(path: &Path, lines: &[&str]) {
    let mut content = lines.join("\n");
    content.push('\n');
    std::fs::write(path, content).unwrap();
}
