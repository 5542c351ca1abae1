//! Cross-checks between the catalogued citation and its own result page.
//!
//! Both checks are literal: a case-insensitive substring test for titles and a
//! case-insensitive subset test for author names.

use std::collections::HashSet;

use crate::crawl::extract::{ExtractedArticle, ELLIPSIS};
use crate::models::Citation;

/// Warning when the catalogued title does not occur in the extracted one
pub fn title_warning(catalogued: &str, extracted: &str) -> Option<String> {
    let needle = catalogued.replace(ELLIPSIS, "").trim().to_lowercase();
    if extracted.to_lowercase().contains(&needle) {
        None
    } else {
        Some(format!("Title mismatch: `{}` and `{}`", catalogued, extracted))
    }
}

/// Warning when a previewed author is missing from the extracted list
pub fn author_warning(partial: &[&str], extracted: &[&str]) -> Option<String> {
    let known: HashSet<String> = extracted.iter().map(|a| a.to_lowercase()).collect();
    if partial.iter().all(|a| known.contains(&a.to_lowercase())) {
        None
    } else {
        Some(format!("Author mismatch: {:?} and {:?}", partial, extracted))
    }
}

/// All warnings for a citation; empty when both sources agree
pub fn reconcile(citation: &Citation, extracted: &ExtractedArticle) -> Vec<String> {
    let partial = citation.partial_author_names();
    let names = extracted.author_names();

    title_warning(&citation.title, &extracted.title)
        .into_iter()
        .chain(author_warning(&partial, &names))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Author;
    use serde_json::json;

    #[test]
    fn test_title_containment() {
        assert_eq!(title_warning("Deep Learning for X", "Deep Learning for X and Y"), None);
        assert_eq!(title_warning("deep learning FOR x…", "Deep Learning for X and Y"), None);

        let warning = title_warning("Deep Learning for X", "Shallow Learning").unwrap();
        assert!(warning.contains("Deep Learning for X"));
        assert!(warning.contains("Shallow Learning"));
    }

    #[test]
    fn test_author_subset() {
        assert_eq!(author_warning(&["A. Smith"], &["A. Smith", "B. Lee"]), None);
        assert_eq!(author_warning(&["a. smith"], &["A. Smith"]), None);
        assert_eq!(author_warning(&[], &["A. Smith"]), None);

        let warning = author_warning(&["A. Smith", "C. Doe"], &["A. Smith"]).unwrap();
        assert!(warning.contains("C. Doe"));
        assert_eq!(
            warning,
            r#"Author mismatch: ["A. Smith", "C. Doe"] and ["A. Smith"]"#
        );
    }

    #[test]
    fn test_reconcile_collects_both() {
        let citation = Citation::from_item(json!({
            "title": "Deep Learning for X",
            "result_id": "r",
            "publication_info": {"authors": [{"name": "A. Smith"}, {"name": "C. Doe"}]}
        }))
        .unwrap();

        let agreeing = ExtractedArticle {
            title: "Deep Learning for X".to_string(),
            authors: vec![Author::new("A. Smith"), Author::new("C. Doe")],
        };
        assert!(reconcile(&citation, &agreeing).is_empty());

        let diverging = ExtractedArticle {
            title: "Shallow Learning".to_string(),
            authors: vec![Author::new("A. Smith")],
        };
        let warnings = reconcile(&citation, &diverging);
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].starts_with("Title mismatch"));
        assert!(warnings[1].starts_with("Author mismatch"));
    }
}
