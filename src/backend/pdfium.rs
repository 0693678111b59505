//! Local extraction from the PDF text layer via pdfium.
//!
//! pdfium is a C++ library with thread-local state, so every call runs inside
//! `spawn_blocking` on a fresh binding. Extraction produces [`TextLine`]
//! records; turning those into Markdown is the pure [`lines_to_markdown`].

use crate::error::RowError;
use once_cell::sync::Lazy;
use pdfium_render::prelude::*;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One line of text as laid out on a page.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    pub text: String,
    /// Largest font size (points) among the line's visible characters.
    pub font_size: f32,
    /// Any visible character in the line uses a bold face.
    pub bold: bool,
    /// 0-based page index.
    pub page: usize,
}

impl TextLine {
    pub fn new(text: impl Into<String>, font_size: f32, bold: bool, page: usize) -> Self {
        Self {
            text: text.into(),
            font_size,
            bold,
            page,
        }
    }
}

static MULTI_NEWLINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

const TERMINAL_PUNCTUATION: &[char] = &['.', ',', ';', ':', '?', '!'];

/// Render extracted lines as Markdown.
///
/// Headings come from font size (`#` ≥ 18pt, `##` ≥ 16pt, `###` ≥ 14pt) and
/// apply to lines that are either set above 12pt or short (< 80 chars)
/// without closing punctuation. Bold lines that are not headings are wrapped
/// in `**`. A horizontal rule separates pages.
pub fn lines_to_markdown(lines: &[TextLine]) -> String {
    let mut blocks: Vec<String> = Vec::with_capacity(lines.len());
    let mut prev_page: Option<usize> = None;

    for line in lines {
        let text = line.text.trim();
        if text.is_empty() {
            continue;
        }
        if prev_page.is_some_and(|p| p != line.page) {
            blocks.push("\n---\n".to_string());
        }
        prev_page = Some(line.page);
        blocks.push(format_line(text, line.font_size, line.bold));
    }

    let joined = blocks.join("\n\n");
    MULTI_NEWLINE.replace_all(&joined, "\n\n").into_owned()
}

fn format_line(text: &str, font_size: f32, bold: bool) -> String {
    let heading_candidate = font_size > 12.0
        || (text.chars().count() < 80 && !text.ends_with(TERMINAL_PUNCTUATION));

    if heading_candidate {
        if font_size >= 18.0 {
            return format!("# {text}");
        }
        if font_size >= 16.0 {
            return format!("## {text}");
        }
        if font_size >= 14.0 {
            return format!("### {text}");
        }
    }
    if bold {
        format!("**{text}**")
    } else {
        text.to_string()
    }
}

/// Markdown from the text layer of `pdf_path`.
pub async fn extract_markdown(pdf_path: &Path, lib_path: Option<&Path>) -> Result<String, RowError> {
    let lines = run_blocking(pdf_path, lib_path, extract_lines_blocking).await?;
    info!("Extracted {} text lines", lines.len());
    Ok(lines_to_markdown(&lines))
}

/// Page text joined by newlines.
pub async fn extract_text(pdf_path: &Path, lib_path: Option<&Path>) -> Result<String, RowError> {
    run_blocking(pdf_path, lib_path, extract_text_blocking).await
}

async fn run_blocking<T, F>(pdf_path: &Path, lib_path: Option<&Path>, f: F) -> Result<T, RowError>
where
    T: Send + 'static,
    F: FnOnce(&Path, Option<&Path>) -> Result<T, RowError> + Send + 'static,
{
    let path = pdf_path.to_path_buf();
    let lib: Option<PathBuf> = lib_path.map(Path::to_path_buf);

    tokio::task::spawn_blocking(move || f(&path, lib.as_deref()))
        .await
        .map_err(|e| failed(format!("Extraction task panicked: {}", e)))?
}

/// Bind pdfium: an explicit library file, a directory holding the platform
/// library, or (when unset) the working directory then the system search path.
fn bind(lib_path: Option<&Path>) -> Result<Pdfium, RowError> {
    let bindings = match lib_path {
        Some(p) if p.is_dir() => {
            Pdfium::bind_to_library(&Pdfium::pdfium_platform_library_name_at_path(p))
        }
        Some(p) => Pdfium::bind_to_library(p),
        None => Pdfium::bind_to_library(&Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| failed(format!("Failed to load pdfium library: {:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

fn open<'a>(pdfium: &'a Pdfium, pdf_path: &Path) -> Result<PdfDocument<'a>, RowError> {
    pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| failed(format!("Failed to open {}: {:?}", pdf_path.display(), e)))
}

fn extract_lines_blocking(pdf_path: &Path, lib_path: Option<&Path>) -> Result<Vec<TextLine>, RowError> {
    let pdfium = bind(lib_path)?;
    let document = open(&pdfium, pdf_path)?;
    let mut lines = Vec::new();

    for (page_idx, page) in document.pages().iter().enumerate() {
        let text = page
            .text()
            .map_err(|e| failed(format!("Page {}: {:?}", page_idx + 1, e)))?;

        let mut current = LineBuilder::default();
        for ch in text.chars().iter() {
            let Some(c) = ch.unicode_char() else {
                continue;
            };
            if c == '\n' || c == '\r' {
                current.finish_into(&mut lines, page_idx);
                continue;
            }
            let visible = !c.is_whitespace();
            let size = if visible { ch.scaled_font_size().value } else { 0.0 };
            let bold = visible && is_bold(&ch);
            current.push(c, size, bold);
        }
        current.finish_into(&mut lines, page_idx);
        debug!("Page {}: {} lines so far", page_idx + 1, lines.len());
    }

    Ok(lines)
}

fn extract_text_blocking(pdf_path: &Path, lib_path: Option<&Path>) -> Result<String, RowError> {
    let pdfium = bind(lib_path)?;
    let document = open(&pdfium, pdf_path)?;
    let mut pages = Vec::new();

    for (page_idx, page) in document.pages().iter().enumerate() {
        let text = page
            .text()
            .map_err(|e| failed(format!("Page {}: {:?}", page_idx + 1, e)))?;
        pages.push(text.all());
    }

    Ok(pages.join("\n"))
}

fn is_bold(ch: &PdfPageTextChar) -> bool {
    let name = ch.font_name().to_ascii_lowercase();
    if name.contains("bold") || name.contains("black") || name.contains("heavy") {
        return true;
    }
    match ch.font_weight() {
        Some(PdfFontWeight::Weight700Bold)
        | Some(PdfFontWeight::Weight800)
        | Some(PdfFontWeight::Weight900) => true,
        Some(PdfFontWeight::Custom(w)) => w >= 700,
        _ => false,
    }
}

#[derive(Default)]
struct LineBuilder {
    text: String,
    font_size: f32,
    bold: bool,
}

impl LineBuilder {
    fn push(&mut self, c: char, size: f32, bold: bool) {
        self.text.push(c);
        self.font_size = self.font_size.max(size);
        self.bold |= bold;
    }

    fn finish_into(&mut self, lines: &mut Vec<TextLine>, page: usize) {
        let done = std::mem::take(self);
        if !done.text.trim().is_empty() {
            lines.push(TextLine::new(done.text.trim(), done.font_size, done.bold, page));
        }
    }
}

fn failed(detail: String) -> RowError {
    RowError::ConvertFailed {
        status: None,
        detail,
    }
}
