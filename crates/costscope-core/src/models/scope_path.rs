//! Scope path newtype

use rusqlite::types::{FromSql, FromSqlError, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

/// Label used wherever the empty path is shown to users
pub const UNATTRIBUTED: &str = "<unattributed>";

/// Ordered sequence of nested scope names, outermost first.
///
/// The empty path is the root of the cost tree and holds unattributed calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopePath(Vec<String>);

impl ScopePath {
    /// The empty (unattributed) path
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn is_unattributed(&self) -> bool {
        self.0.is_empty()
    }

    /// Outermost scope name, `None` for the root
    pub fn top_level(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// Innermost scope name, `None` for the root
    pub fn leaf(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Path extended by one segment
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.into());
        Self(segments)
    }

    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    pub fn starts_with(&self, prefix: &ScopePath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    pub fn into_inner(self) -> Vec<String> {
        self.0
    }
}

impl fmt::Display for ScopePath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "{}", UNATTRIBUTED)
        } else {
            write!(f, "{}", self.0.join(" > "))
        }
    }
}

impl From<Vec<String>> for ScopePath {
    fn from(segments: Vec<String>) -> Self {
        Self(segments)
    }
}

impl From<&[&str]> for ScopePath {
    fn from(segments: &[&str]) -> Self {
        Self::new(segments.iter().copied())
    }
}

impl Deref for ScopePath {
    type Target = [String];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// Stored as a JSON array so segment names may contain any character
impl ToSql for ScopePath {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let encoded = serde_json::to_string(&self.0)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        Ok(ToSqlOutput::from(encoded))
    }
}

impl FromSql for ScopePath {
    fn column_result(value: ValueRef<'_>) -> Result<Self, FromSqlError> {
        let text = value.as_str()?;
        serde_json::from_str::<Vec<String>>(text)
            .map(ScopePath)
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_is_unattributed() {
        let root = ScopePath::root();
        assert!(root.is_unattributed());
        assert_eq!(root.to_string(), UNATTRIBUTED);
        assert!(root.parent().is_none());
    }

    #[test]
    fn test_child_and_parent() {
        let path = ScopePath::new(["pipeline"]).child("fetch");
        assert_eq!(path.depth(), 2);
        assert_eq!(path.top_level(), Some("pipeline"));
        assert_eq!(path.leaf(), Some("fetch"));
        assert_eq!(path.parent(), Some(ScopePath::new(["pipeline"])));
        assert_eq!(path.to_string(), "pipeline > fetch");
    }

    #[test]
    fn test_recursive_names_stay_distinct() {
        let once = ScopePath::new(["walk"]);
        let twice = once.child("walk");
        assert_ne!(once, twice);
        assert!(twice.starts_with(&once));
    }
}
