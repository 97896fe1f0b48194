//! Content-type detection from a file's leading bytes

use tokio::io::{AsyncRead, AsyncReadExt};

/// Number of leading bytes inspected
pub const SNIFF_LEN: usize = 512;

/// Type used when nothing better is known
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const TEXT_HTML: &str = "text/html; charset=utf-8";
const TEXT_XML: &str = "text/xml; charset=utf-8";

const HTML_PREFIXES: &[&str] = &[
    "<!doctype html",
    "<html",
    "<head",
    "<body",
    "<script",
    "<iframe",
    "<h1",
    "<div",
    "<table",
    "<p>",
    "<!--",
];

/// Read up to [`SNIFF_LEN`] bytes from `reader`
pub async fn read_head<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<Vec<u8>> {
    let mut head = Vec::with_capacity(SNIFF_LEN);
    reader.take(SNIFF_LEN as u64).read_to_end(&mut head).await?;
    Ok(head)
}

/// Guess a MIME type for content starting with `head`
pub fn detect_content_type(head: &[u8]) -> &'static str {
    if head.is_empty() {
        return DEFAULT_CONTENT_TYPE;
    }

    if let Some(kind) = infer::get(head) {
        if kind.matcher_type() != infer::MatcherType::Text {
            return kind.mime_type();
        }
        // infer's text matchers report bare types without a charset
        if looks_like_text(head) {
            match kind.mime_type() {
                "text/html" => return TEXT_HTML,
                "text/xml" => return TEXT_XML,
                _ => {}
            }
        }
    }

    if looks_like_text(head) {
        let trimmed = String::from_utf8_lossy(head);
        let lower = trimmed.trim_start().to_ascii_lowercase();
        if HTML_PREFIXES.iter().any(|p| lower.starts_with(p)) {
            return TEXT_HTML;
        }
        return TEXT_PLAIN;
    }

    DEFAULT_CONTENT_TYPE
}

/// UTF-8 (allowing a code point cut at the sniff boundary) with no binary control bytes
fn looks_like_text(head: &[u8]) -> bool {
    let valid = match std::str::from_utf8(head) {
        Ok(_) => true,
        // a truncated trailing sequence only happens at the sniff boundary
        Err(e) => e.error_len().is_none() && head.len() == SNIFF_LEN,
    };

    valid
        && head
            .iter()
            .all(|&b| b >= 0x20 || matches!(b, b'\t' | b'\n' | b'\r' | 0x0c | 0x1b))
}
