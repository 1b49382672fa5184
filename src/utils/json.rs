use serde::{Deserialize, Deserializer};

use crate::error::AppError;

/// Deserializes a field so that an omitted key, an explicit `null` and a value stay distinct.
///
/// Use with `#[serde(default, deserialize_with = "nullable")]` on an `Option<Option<T>>`:
/// omitted is `None`, `null` is `Some(None)`, a value is `Some(Some(v))`.
pub fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Trims a required text field, rejecting blanks.
pub fn required_text(value: Option<&str>, field: &str) -> Result<String, AppError> {
    match value.map(str::trim) {
        Some(trimmed) if !trimmed.is_empty() => Ok(trimmed.to_string()),
        Some(_) => Err(AppError::bad_request(format!("{field} must not be empty"))),
        None => Err(AppError::bad_request(format!("{field} is required"))),
    }
}

/// Like [`required_text`] but an omitted field passes through as `None`.
pub fn optional_text(value: Option<&str>, field: &str) -> Result<Option<String>, AppError> {
    value.map(|v| required_text(Some(v), field)).transpose()
}

pub fn required<T>(value: Option<T>, field: &str) -> Result<T, AppError> {
    value.ok_or_else(|| AppError::bad_request(format!("{field} is required")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "nullable")]
        phone: Option<Option<String>>,
    }

    #[test]
    fn nullable_distinguishes_null_from_omitted() {
        let omitted: Patch = serde_json::from_value(json!({})).unwrap();
        let cleared: Patch = serde_json::from_value(json!({ "phone": null })).unwrap();
        let set: Patch = serde_json::from_value(json!({ "phone": "555" })).unwrap();

        assert_eq!(omitted.phone, None);
        assert_eq!(cleared.phone, Some(None));
        assert_eq!(set.phone, Some(Some("555".to_string())));
    }

    #[test]
    fn required_text_trims_and_rejects_blanks() {
        assert_eq!(required_text(Some("  HR "), "name").unwrap(), "HR");
        assert_eq!(
            required_text(Some("   "), "name").unwrap_err().message(),
            "name must not be empty"
        );
        assert_eq!(
            required_text(None, "name").unwrap_err().message(),
            "name is required"
        );
        assert_eq!(optional_text(None, "name").unwrap(), None);
    }
}
