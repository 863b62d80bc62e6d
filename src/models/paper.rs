use serde::{ Deserialize, Serialize };

/// A paper as returned by a search tool. Order within a result list is
/// the only identity a record has.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperRecord {
    pub title: String,
    pub authors: Vec<String>,
    pub summary: String,
    pub pdf_url: String,
}

impl PaperRecord {
    pub fn joined_authors(&self) -> String {
        self.authors.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_field_is_rejected() {
        let raw = r#"{"title":"t","authors":["a"],"summary":"s"}"#;
        let err = serde_json::from_str::<PaperRecord>(raw).unwrap_err();
        assert!(err.to_string().contains("pdf_url"));
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let raw = r#"{"title":"t","authors":["a","b"],"summary":"s","pdf_url":"u","published":"2024"}"#;
        let paper: PaperRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(paper.joined_authors(), "a, b");
    }
}
