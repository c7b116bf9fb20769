use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use tutor_core::error::{codes, AppError};

use super::TextExtractor;

/// Accepts UTF-8 text formats by extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "rst", "csv", "tsv", "json", "yaml", "yml", "xml", "html", "htm",
    "tex", "log",
];

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, path: &Path) -> Result<String, AppError> {
        let ext = extension_of(path);
        if !TEXT_EXTENSIONS.contains(&ext.as_str()) {
            return Err(AppError::new(codes::INGEST_UNSUPPORTED_FORMAT, "Unsupported file format")
                .with_details(format!("path={}; extension={ext}", path.display())));
        }
        fs::read_to_string(path).map_err(|e| {
            AppError::new(codes::INGEST_FILE_UNREADABLE, "Failed to read file as UTF-8 text")
                .with_details(format!("path={}; err={}", path.display(), e))
        })
    }
}

/// Course material extractor: PDF and DOCX, plus everything [`PlainTextExtractor`] reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentTextExtractor;

impl TextExtractor for DocumentTextExtractor {
    fn extract(&self, path: &Path) -> Result<String, AppError> {
        match extension_of(path).as_str() {
            "pdf" => pdf_text(&read_bytes(path)?).map_err(|e| with_path(e, path)),
            "docx" => docx_text(&read_bytes(path)?).map_err(|e| with_path(e, path)),
            _ => PlainTextExtractor.extract(path),
        }
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, AppError> {
    fs::read(path).map_err(|e| {
        AppError::new(codes::INGEST_FILE_UNREADABLE, "Failed to read file")
            .with_details(format!("path={}; err={}", path.display(), e))
    })
}

fn with_path(err: AppError, path: &Path) -> AppError {
    let details = match err.details.as_deref() {
        Some(d) => format!("path={}; {d}", path.display()),
        None => format!("path={}", path.display()),
    };
    err.with_details(details)
}

/// Runs `pdf-extract` first. It panics on some malformed font tables, so a panic or error
/// falls back to scanning the page content streams with `lopdf`.
pub(crate) fn pdf_text(data: &[u8]) -> Result<String, AppError> {
    let primary = panic::catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(data)));
    let raw = match primary {
        Ok(Ok(text)) if !text.trim().is_empty() => text,
        Ok(Ok(_)) => pdf_text_fallback(data)?,
        Ok(Err(e)) => {
            tracing::warn!(err = %e, "pdf-extract failed, scanning content streams");
            pdf_text_fallback(data)?
        }
        Err(_) => {
            tracing::warn!("pdf-extract panicked, scanning content streams");
            pdf_text_fallback(data)?
        }
    };
    Ok(tidy_pdf_text(&raw))
}

fn pdf_text_fallback(data: &[u8]) -> Result<String, AppError> {
    let doc = lopdf::Document::load_mem(data).map_err(|e| {
        AppError::new(codes::INGEST_PARSE_FAILED, "Failed to parse PDF")
            .with_details(format!("err={e}"))
    })?;

    let mut out = String::new();
    for (page_num, page_id) in doc.get_pages() {
        match doc.get_page_content(page_id) {
            Ok(content) => {
                let text = content_stream_text(&content);
                if !text.is_empty() {
                    out.push_str(&text);
                    out.push('\n');
                }
            }
            Err(e) => tracing::debug!(page = page_num, err = %e, "no content stream for page"),
        }
    }
    if out.trim().is_empty() {
        return Err(AppError::new(
            codes::INGEST_PARSE_FAILED,
            "PDF has no extractable text (image-only or encrypted)",
        ));
    }
    Ok(out)
}

/// Collects the literal strings shown by `Tj`/`TJ` inside `BT`..`ET` blocks.
pub(crate) fn content_stream_text(content: &[u8]) -> String {
    let content = String::from_utf8_lossy(content);
    let mut text = String::new();
    let mut block = String::new();
    let mut in_text = false;

    for line in content.lines().map(str::trim) {
        match line {
            "BT" => in_text = true,
            "ET" => {
                in_text = false;
                if !block.is_empty() {
                    text.push_str(&block);
                    text.push(' ');
                    block.clear();
                }
            }
            _ if in_text && (line.ends_with("Tj") || line.ends_with("TJ")) => {
                if let (Some(open), Some(close)) = (line.find('('), line.rfind(')')) {
                    if open < close {
                        block.push_str(&unescape_pdf_string(&line[open + 1..close]));
                    }
                }
            }
            _ => {}
        }
    }
    text.trim_end().to_string()
}

fn unescape_pdf_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

fn tidy_pdf_text(raw: &str) -> String {
    raw.replace('\0', "")
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Paragraph text in document order, one paragraph per line. Tables are not read.
pub(crate) fn docx_text(data: &[u8]) -> Result<String, AppError> {
    let doc = docx_rs::read_docx(data).map_err(|e| {
        AppError::new(codes::INGEST_PARSE_FAILED, "Failed to parse DOCX")
            .with_details(format!("err={e}"))
    })?;

    let mut out = String::new();
    for child in doc.document.children {
        if let docx_rs::DocumentChild::Paragraph(p) = child {
            for child in p.children {
                if let docx_rs::ParagraphChild::Run(run) = child {
                    for child in run.children {
                        if let docx_rs::RunChild::Text(t) = child {
                            out.push_str(&t.text);
                        }
                    }
                }
            }
            out.push('\n');
        }
    }
    Ok(out)
}
