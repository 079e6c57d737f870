use std::collections::BTreeSet;

use crate::models::{MissingDocument, RequiredDocument};

pub const REQUIRED_DOCUMENTS: &[RequiredDocument] = &[
    RequiredDocument {
        doc_type: "passport",
        label: "Passport",
    },
    RequiredDocument {
        doc_type: "transcript",
        label: "Academic transcript",
    },
    RequiredDocument {
        doc_type: "sop",
        label: "Statement of purpose",
    },
    RequiredDocument {
        doc_type: "cv",
        label: "CV / resume",
    },
    RequiredDocument {
        doc_type: "english_test",
        label: "English proficiency test",
    },
];

/// Catalogue entries not yet on file, in catalogue order.
pub fn missing_documents(
    on_file: &BTreeSet<String>,
    catalogue: &[RequiredDocument],
) -> Vec<MissingDocument> {
    catalogue
        .iter()
        .filter(|required| !on_file.contains(required.doc_type))
        .map(|required| MissingDocument {
            doc_type: required.doc_type.to_string(),
            label: required.label.to_string(),
        })
        .collect()
}

pub fn is_known_type(doc_type: &str) -> bool {
    REQUIRED_DOCUMENTS
        .iter()
        .any(|required| required.doc_type == doc_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn on_file(types: &[&str]) -> BTreeSet<String> {
        types.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn nothing_on_file_returns_full_catalogue() {
        let missing = missing_documents(&BTreeSet::new(), REQUIRED_DOCUMENTS);
        let types: Vec<&str> = missing.iter().map(|doc| doc.doc_type.as_str()).collect();
        assert_eq!(types, vec!["passport", "transcript", "sop", "cv", "english_test"]);
    }

    #[test]
    fn keeps_catalogue_order_not_alphabetical() {
        let missing = missing_documents(&on_file(&["passport", "cv"]), REQUIRED_DOCUMENTS);
        let labels: Vec<&str> = missing.iter().map(|doc| doc.label.as_str()).collect();
        assert_eq!(
            labels,
            vec![
                "Academic transcript",
                "Statement of purpose",
                "English proficiency test"
            ]
        );
    }

    #[test]
    fn complete_set_and_extra_types_yield_nothing_missing() {
        let mut types: Vec<&str> = REQUIRED_DOCUMENTS.iter().map(|doc| doc.doc_type).collect();
        types.push("portfolio");
        assert!(missing_documents(&on_file(&types), REQUIRED_DOCUMENTS).is_empty());
    }

    #[test]
    fn recognises_catalogue_types() {
        assert!(is_known_type("sop"));
        assert!(!is_known_type("portfolio"));
    }
}
