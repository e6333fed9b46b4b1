//! Strict parsing of schema-constrained provider output.
//!
//! The provider is asked to answer in JSON matching a declared schema, but its
//! conformance is not trusted: the answer is deserialized into the Rust type
//! and then checked field by field. Anything that fails is reported as
//! `UpstreamError::Validation` so the caller falls back.

use serde::de::DeserializeOwned;

use crate::error::{UpstreamError, UpstreamResult};

/// Range and presence checks run after deserialization.
pub trait Validate {
    fn validate(&self) -> Result<(), String>;
}

pub fn parse_structured<T>(raw: &str) -> UpstreamResult<T>
where
    T: DeserializeOwned + Validate,
{
    let cleaned = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let json_str = match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if end > start => &cleaned[start..=end],
        _ => cleaned,
    };

    let value: T = serde_json::from_str(json_str).map_err(|e| {
        let preview: String = json_str.chars().take(200).collect();
        UpstreamError::Validation(format!("{} (response: {})", e, preview))
    })?;

    value.validate().map_err(UpstreamError::Validation)?;
    Ok(value)
}

pub fn require_text(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{} must not be empty", field));
    }
    Ok(())
}

pub fn require_items<T>(field: &str, items: &[T]) -> Result<(), String> {
    if items.is_empty() {
        return Err(format!("{} must contain at least one item", field));
    }
    Ok(())
}

pub fn require_texts(field: &str, items: &[String]) -> Result<(), String> {
    require_items(field, items)?;
    if items.iter().any(|s| s.trim().is_empty()) {
        return Err(format!("{} must not contain empty strings", field));
    }
    Ok(())
}

pub fn require_unit_range(field: &str, value: f64) -> Result<(), String> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(format!("{} must be in [0, 1], got {}", field, value));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Scored {
        label: String,
        score: f64,
    }

    impl Validate for Scored {
        fn validate(&self) -> Result<(), String> {
            require_text("label", &self.label)?;
            require_unit_range("score", self.score)
        }
    }

    #[test]
    fn test_parse_plain_json() {
        let parsed: Scored = parse_structured(r#"{"label":"ai","score":0.4}"#).unwrap();
        assert_eq!(parsed.label, "ai");
    }

    #[test]
    fn test_parse_json_with_fences() {
        let raw = "```json\n{\"label\":\"space\",\"score\":1.0}\n```";
        let parsed: Scored = parse_structured(raw).unwrap();
        assert_eq!(parsed.label, "space");
    }

    #[test]
    fn test_parse_json_with_surrounding_text() {
        let raw = r#"Sure! {"label":"rust","score":0.0} Hope that helps."#;
        let parsed: Scored = parse_structured(raw).unwrap();
        assert_eq!(parsed.score, 0.0);
    }

    #[test]
    fn test_missing_field_is_validation_error() {
        let err = parse_structured::<Scored>(r#"{"label":"ai"}"#).unwrap_err();
        assert!(matches!(err, UpstreamError::Validation(_)));
    }

    #[test]
    fn test_out_of_range_is_validation_error() {
        let err = parse_structured::<Scored>(r#"{"label":"ai","score":1.5}"#).unwrap_err();
        match err {
            UpstreamError::Validation(msg) => assert!(msg.contains("score")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_garbage_is_validation_error() {
        let err = parse_structured::<Scored>("I cannot help with that").unwrap_err();
        assert_eq!(err.category(), "validation");
    }

    #[test]
    fn test_require_texts_rejects_blank_entries() {
        let items = vec!["ok".to_string(), "  ".to_string()];
        assert!(require_texts("insights", &items).is_err());
        assert!(require_texts("insights", &[]).is_err());
        assert!(require_texts("insights", &["fine".to_string()]).is_ok());
    }
}
