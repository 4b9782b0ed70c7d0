use super::BackendError;

/// Pulls the text layer out of a PDF for text-only backends.
pub trait PdfTextExtractor: Send + Sync {
    fn extract_text(&self, pdf_bytes: &[u8]) -> Result<String, BackendError>;
}

/// `pdf-extract` backed implementation. CPU-bound: call from a blocking thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractText;

impl PdfTextExtractor for PdfExtractText {
    fn extract_text(&self, pdf_bytes: &[u8]) -> Result<String, BackendError> {
        let text = pdf_extract::extract_text_from_mem(pdf_bytes)
            .map_err(|e| BackendError::Preprocessing(e.to_string()))?;

        if text.trim().is_empty() {
            return Err(BackendError::Preprocessing(
                "PDF has no extractable text layer".into(),
            ));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_bytes_fail_preprocessing() {
        let err = PdfExtractText.extract_text(b"definitely not a pdf").unwrap_err();
        assert!(matches!(err, BackendError::Preprocessing(_)));
    }
}
