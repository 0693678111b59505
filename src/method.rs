//! Conversion method selection.
//!
//! A method is a caller-chosen label (`"pdfium"`, `"docling-serve"`,
//! `"pymupdf"`, …) plus the backend it resolves to. The label is part of the
//! archive entry name, so two runs with different labels never share cache
//! entries even when they resolve to the same backend. Unknown labels fall
//! back to the default backend for the output format.

use crate::naming;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Label used when the caller does not name a method.
pub const DEFAULT_METHOD_ID: &str = "pdfium";

/// What kind of artifact a conversion produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Markdown with headings and page rules. (default)
    #[default]
    Markdown,
    /// Plain page text.
    Text,
}

impl OutputFormat {
    /// File extension for archive entries, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Markdown => "md",
            OutputFormat::Text => "txt",
        }
    }

    /// Infix used in the default output column name (`<url>_md_<method>`).
    pub fn column_tag(self) -> &'static str {
        self.extension()
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "md" | "markdown" => Ok(OutputFormat::Markdown),
            "txt" | "text" => Ok(OutputFormat::Text),
            other => Err(format!("unknown output format '{other}' (expected md or txt)")),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// The extraction strategy a method resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Backend {
    /// pdfium text layer, headings inferred from font size and weight.
    Heuristic,
    /// pdfium text layer, page text joined by newlines.
    PlainText,
    /// Remote docling-serve OCR API.
    DoclingServe,
}

impl Backend {
    /// Backend used for labels the strategy table does not know.
    pub fn default_for(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Markdown => Backend::Heuristic,
            OutputFormat::Text => Backend::PlainText,
        }
    }

    /// Look a label up in the strategy table.
    fn lookup(id: &str, format: OutputFormat) -> Self {
        match id.to_ascii_lowercase().as_str() {
            "docling-serve" | "docling_serve" => Backend::DoclingServe,
            "text" | "plain" | "pdfium-text" => Backend::PlainText,
            "heuristic" | "pdfium-md" if format == OutputFormat::Markdown => Backend::Heuristic,
            _ => Backend::default_for(format),
        }
    }

    /// True for backends that need network credentials.
    pub fn is_remote(self) -> bool {
        matches!(self, Backend::DoclingServe)
    }
}

/// A resolved conversion method: label, backend and output format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Method {
    id: String,
    backend: Backend,
    format: OutputFormat,
}

impl Method {
    /// Resolve a caller-supplied label for the given output format.
    ///
    /// Never fails: unrecognised labels keep their name but use the default
    /// backend for `format`. A label with nothing usable in an entry name
    /// (empty, or only punctuation) becomes the default label.
    pub fn resolve(id: &str, format: OutputFormat) -> Self {
        let id = id.trim();
        let id = if naming::sanitize_key(id).is_empty() {
            DEFAULT_METHOD_ID
        } else {
            id
        };
        Self {
            id: id.to_string(),
            backend: Backend::lookup(id, format),
            format,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Archive entry name for a naming key, or `None` if the key is unusable.
    pub fn target_name(&self, key: &str) -> Option<String> {
        naming::entry_name(key, &self.id, self.format.extension())
    }

    /// Default output column for a URL column: `<url_column>_<md|txt>_<id>`.
    pub fn default_output_column(&self, url_column: &str) -> String {
        format!("{}_{}_{}", url_column, self.format.column_tag(), self.id)
    }
}

impl Default for Method {
    fn default() -> Self {
        Self::resolve(DEFAULT_METHOD_ID, OutputFormat::Markdown)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}, {})", self.id, self.backend, self.format)
    }
}
