use once_cell::sync::Lazy;

use crate::error::{invalid_argument, StoreResult};

/// Field name reserved for ordering and filtering on the document key.
pub const KEY_FIELD_NAME: &str = "__name__";

static KEY_FIELD_PATH: Lazy<FieldPath> = Lazy::new(|| FieldPath {
    segments: vec![KEY_FIELD_NAME.to_string()],
});

/// Dot-separated path to a field inside a document, never empty.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    pub fn new<S, I>(segments: I) -> StoreResult<Self>
    where
        S: Into<String>,
        I: IntoIterator<Item = S>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(invalid_argument("FieldPath must contain at least one segment"));
        }
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(invalid_argument("FieldPath segments must not be empty"));
        }
        Ok(Self { segments })
    }

    pub fn from_dot_separated(path: &str) -> StoreResult<Self> {
        if path.trim().is_empty() {
            return Err(invalid_argument("FieldPath string cannot be empty"));
        }
        FieldPath::new(path.split('.'))
    }

    /// The singleton path addressing the document key.
    pub fn key_field_path() -> &'static FieldPath {
        &KEY_FIELD_PATH
    }

    pub fn is_key_field_path(&self) -> bool {
        self.segments.len() == 1 && self.segments[0] == KEY_FIELD_NAME
    }

    pub fn first_segment(&self) -> &str {
        // non-empty by construction
        &self.segments[0]
    }

    pub fn last_segment(&self) -> &str {
        &self.segments[self.segments.len() - 1]
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn canonical_string(&self) -> String {
        self.segments.join(".")
    }
}

/// Converts common user inputs into a validated [`FieldPath`].
pub trait IntoFieldPath {
    fn into_field_path(self) -> StoreResult<FieldPath>;
}

impl IntoFieldPath for FieldPath {
    fn into_field_path(self) -> StoreResult<FieldPath> {
        Ok(self)
    }
}

impl<'a> IntoFieldPath for &'a FieldPath {
    fn into_field_path(self) -> StoreResult<FieldPath> {
        Ok(self.clone())
    }
}

impl IntoFieldPath for String {
    fn into_field_path(self) -> StoreResult<FieldPath> {
        FieldPath::from_dot_separated(&self)
    }
}

impl<'a> IntoFieldPath for &'a str {
    fn into_field_path(self) -> StoreResult<FieldPath> {
        FieldPath::from_dot_separated(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_dot_path() {
        let field = FieldPath::from_dot_separated("foo.bar").unwrap();
        assert_eq!(field.segments(), &["foo", "bar"]);
        assert_eq!(field.canonical_string(), "foo.bar");
    }

    #[test]
    fn rejects_empty() {
        let err = FieldPath::from_dot_separated("").unwrap_err();
        assert_eq!(err.code_str(), "localstore/invalid-argument");
        let err = FieldPath::from_dot_separated("foo..bar").unwrap_err();
        assert_eq!(err.code_str(), "localstore/invalid-argument");
    }

    #[test]
    fn key_field_path_is_recognized() {
        assert!(FieldPath::key_field_path().is_key_field_path());
        let ordinary = FieldPath::from_dot_separated("__name").unwrap();
        assert!(!ordinary.is_key_field_path());
    }
}
