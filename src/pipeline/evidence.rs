//! Evidence file classification.

use crate::models::{EvidenceKind, EvidenceMetadata};

/// Classify an upload by declared content type, falling back to the
/// file name's extension.
pub fn detect_evidence_kind(file_name: &str, content_type: Option<&str>) -> EvidenceKind {
    let declared = content_type
        .map(|ct| ct.trim().to_ascii_lowercase())
        .filter(|ct| !ct.is_empty() && ct != "application/octet-stream");

    let mime = match declared {
        Some(ct) => ct,
        None => mime_guess::from_path(file_name)
            .first_raw()
            .unwrap_or_default()
            .to_string(),
    };

    if mime == "text/csv" || file_name.to_ascii_lowercase().ends_with(".csv") {
        EvidenceKind::Survey
    } else if mime.starts_with("image/") {
        EvidenceKind::Photo
    } else {
        EvidenceKind::Document
    }
}

/// Data rows in a CSV body: non-blank lines minus the header.
pub fn csv_row_count(content: &[u8]) -> usize {
    String::from_utf8_lossy(content)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .count()
        .saturating_sub(1)
}

/// Metadata known at upload time.
pub fn upload_metadata(kind: EvidenceKind, content: Option<&[u8]>) -> EvidenceMetadata {
    EvidenceMetadata {
        row_count: match (kind, content) {
            (EvidenceKind::Survey, Some(bytes)) => Some(csv_row_count(bytes)),
            _ => None,
        },
        ..EvidenceMetadata::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_from_content_type() {
        assert_eq!(detect_evidence_kind("x", Some("text/csv")), EvidenceKind::Survey);
        assert_eq!(detect_evidence_kind("x", Some("image/jpeg")), EvidenceKind::Photo);
        assert_eq!(detect_evidence_kind("x", Some("application/pdf")), EvidenceKind::Document);
    }

    #[test]
    fn kind_from_file_name() {
        assert_eq!(detect_evidence_kind("survey.CSV", None), EvidenceKind::Survey);
        assert_eq!(detect_evidence_kind("site.png", None), EvidenceKind::Photo);
        assert_eq!(
            detect_evidence_kind("site.jpg", Some("application/octet-stream")),
            EvidenceKind::Photo
        );
        assert_eq!(detect_evidence_kind("minutes.docx", None), EvidenceKind::Document);
        assert_eq!(detect_evidence_kind("noext", None), EvidenceKind::Document);
    }

    #[test]
    fn row_count_skips_header_and_blank_lines() {
        assert_eq!(csv_row_count(b"name,age\na,1\nb,2\n\n"), 2);
        assert_eq!(csv_row_count(b"header only\n"), 0);
        assert_eq!(csv_row_count(b""), 0);
    }

    #[test]
    fn metadata_counts_rows_for_surveys_only() {
        let csv = b"h\n1\n2\n3";
        assert_eq!(upload_metadata(EvidenceKind::Survey, Some(csv)).row_count, Some(3));
        assert_eq!(upload_metadata(EvidenceKind::Photo, Some(csv)).row_count, None);
        assert_eq!(upload_metadata(EvidenceKind::Survey, None).row_count, None);
    }
}
