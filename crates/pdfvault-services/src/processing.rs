//! Document content processing.
//!
//! The upload pipeline hands every stored file to a [`ContentProcessor`] once
//! it reaches `processing`; the processor's outcome decides whether the
//! upload completes or fails. The built-in [`PdfProcessor`] validates the PDF
//! signature, extracts text, and reads basic document info. Redaction/masking
//! of document content is a separate concern behind its own collaborator and
//! is not part of this pipeline.

use async_trait::async_trait;
use pdfvault_core::constants::PDF_MAGIC;
use pdfvault_core::AppError;
use serde::{Deserialize, Serialize};

/// Basic document info extracted during processing, stored on the upload row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub page_count: Option<u32>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub producer: Option<String>,
}

/// Result of processing one document.
#[derive(Debug)]
pub struct DocumentContent {
    pub extracted_text: Option<String>,
    pub metadata: DocumentMetadata,
}

impl DocumentContent {
    pub fn metadata_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.metadata).unwrap_or_default()
    }
}

/// Content-processing collaborator invoked for every upload that reaches
/// `processing`.
#[async_trait]
pub trait ContentProcessor: Send + Sync {
    async fn process(&self, filename: &str, data: Vec<u8>) -> Result<DocumentContent, AppError>;
}

/// PDF processor: signature validation, text extraction, document info.
#[derive(Debug, Default, Clone)]
pub struct PdfProcessor;

#[async_trait]
impl ContentProcessor for PdfProcessor {
    async fn process(&self, filename: &str, data: Vec<u8>) -> Result<DocumentContent, AppError> {
        if data.len() < PDF_MAGIC.len() || &data[..PDF_MAGIC.len()] != PDF_MAGIC {
            return Err(AppError::Processing(format!(
                "{} is not a PDF document (missing %PDF signature)",
                filename
            )));
        }

        let metadata = extract_pdf_info(&data);

        // Text extraction is best effort: scanned or malformed documents
        // without a text layer still complete, with no extracted text. The
        // parser is CPU-bound and not panic-free on arbitrary input, so it
        // runs on a blocking thread and a panic counts as a failed
        // extraction, not a dead worker.
        let extraction =
            tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&data)).await;
        let extracted_text = match extraction {
            Ok(Ok(text)) => {
                let trimmed = text.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    filename = %filename,
                    error = %e,
                    "PDF text extraction failed, continuing without text"
                );
                None
            }
            Err(e) => {
                tracing::warn!(
                    filename = %filename,
                    error = %e,
                    "PDF text extraction panicked, continuing without text"
                );
                None
            }
        };

        Ok(DocumentContent {
            extracted_text,
            metadata,
        })
    }
}

/// Pull page count and document info entries out of the raw PDF bytes.
/// Covers uncompressed info dictionaries; anything else just yields `None`s.
fn extract_pdf_info(data: &[u8]) -> DocumentMetadata {
    let data_str = String::from_utf8_lossy(data);

    let page_count = data_str.split("/Count").nth(1).and_then(|s| {
        let num_str = s
            .chars()
            .skip_while(|c| !c.is_ascii_digit())
            .take_while(|c| c.is_ascii_digit())
            .collect::<String>();
        num_str.parse::<u32>().ok()
    });

    DocumentMetadata {
        page_count,
        title: extract_info_string(&data_str, "/Title"),
        author: extract_info_string(&data_str, "/Author"),
        producer: extract_info_string(&data_str, "/Producer"),
    }
}

/// Extract a literal-string info entry like `/Title (Annual Report)`.
fn extract_info_string(data_str: &str, key: &str) -> Option<String> {
    data_str.split(key).nth(1).and_then(|s| {
        let mut chars = s.chars().skip_while(|c| *c != '(' && *c != '<' && *c != '/');
        if chars.next() == Some('(') {
            let value: String = chars.take_while(|c| *c != ')').collect();
            Some(value).filter(|v| !v.is_empty())
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_non_pdf_data() {
        let processor = PdfProcessor;
        let result = processor
            .process("evil.pdf", b"MZ\x90\x00binary".to_vec())
            .await;
        assert!(matches!(result, Err(AppError::Processing(_))));
    }

    #[tokio::test]
    async fn accepts_pdf_signature_and_reads_info() {
        let processor = PdfProcessor;
        let data = b"%PDF-1.4\n1 0 obj\n<< /Type /Pages /Count 3 >>\nendobj\n2 0 obj\n<< /Title (Annual Report) /Author (Finance Team) >>\nendobj\n%%EOF";
        let content = processor
            .process("report.pdf", data.to_vec())
            .await
            .unwrap();
        assert_eq!(content.metadata.page_count, Some(3));
        assert_eq!(content.metadata.title.as_deref(), Some("Annual Report"));
        assert_eq!(content.metadata.author.as_deref(), Some("Finance Team"));
    }

    #[test]
    fn info_extraction_ignores_non_literal_values() {
        let meta = extract_pdf_info(b"%PDF-1.4\n<< /Title /NameValue >>");
        assert_eq!(meta.title, None);
        assert_eq!(meta.page_count, None);
    }

    #[test]
    fn metadata_serializes_to_json() {
        let content = DocumentContent {
            extracted_text: None,
            metadata: DocumentMetadata {
                page_count: Some(2),
                title: Some("T".into()),
                author: None,
                producer: None,
            },
        };
        let json = content.metadata_json();
        assert_eq!(json["page_count"], 2);
        assert_eq!(json["title"], "T");
    }
}
