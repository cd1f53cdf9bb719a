//! Text extraction from uploaded file bytes

use crate::error::{CoreError, IngestError};
use crate::ingest::types::DocumentMime;

/// Extract normalized text from raw file bytes according to its MIME type
///
/// Newlines within paragraphs are preserved, leading/trailing whitespace is
/// trimmed, and control characters (other than `\n`/`\t`) are stripped.
pub fn extract_text(bytes: &[u8], mime: DocumentMime) -> Result<String, CoreError> {
    let raw = match mime {
        DocumentMime::PlainText => String::from_utf8(bytes.to_vec())
            .map_err(|e| IngestError::ExtractionFailed(format!("invalid UTF-8: {e}")))?,
        DocumentMime::Pdf => extract_pdf(bytes)?,
        DocumentMime::Docx => extract_docx(bytes)?,
    };

    Ok(normalize_text(&raw))
}

fn extract_pdf(bytes: &[u8]) -> Result<String, CoreError> {
    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| IngestError::ExtractionFailed(format!("PDF extraction failed: {e}")).into())
}

fn extract_docx(bytes: &[u8]) -> Result<String, CoreError> {
    let document = docx_rs::read_docx(bytes)
        .map_err(|e| IngestError::ExtractionFailed(format!("DOCX extraction failed: {e}")))?;

    let mut text = String::new();
    for child in document.document.children {
        collect_docx_paragraph_text(&child, &mut text);
    }

    Ok(text)
}

fn collect_docx_paragraph_text(child: &docx_rs::DocumentChild, out: &mut String) {
    use docx_rs::DocumentChild;

    if let DocumentChild::Paragraph(paragraph) = child {
        for run_child in &paragraph.children {
            if let docx_rs::ParagraphChild::Run(run) = run_child {
                for run_content in &run.children {
                    if let docx_rs::RunChild::Text(t) = run_content {
                        out.push_str(&t.text);
                    }
                }
            }
        }
        out.push('\n');
    }
}

/// Strip control characters (keeping `\n`/`\t`) and trim leading/trailing whitespace
fn normalize_text(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect();
    cleaned.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_passthrough() {
        let text = extract_text(b"  hello\nworld  ", DocumentMime::PlainText).unwrap();
        assert_eq!(text, "hello\nworld");
    }

    #[test]
    fn test_control_characters_stripped() {
        let raw = "hello\x00\x01world\n\tok";
        let cleaned = normalize_text(raw);
        assert_eq!(cleaned, "helloworld\n\tok");
    }

    #[test]
    fn test_invalid_utf8_fails() {
        let bytes: &[u8] = &[0xff, 0xfe, 0x00, 0x01];
        let result = extract_text(bytes, DocumentMime::PlainText);
        assert!(result.is_err());
    }
}
