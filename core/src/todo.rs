//! Todo records exchanged across the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ExternalServiceError;

/// The canonical todo shape exchanged across every boundary of the pipeline.
///
/// `id` is an opaque, locally generated identifier. The provider's numeric id
/// never appears here; it is only used to address the provider (see [`ProviderId`]).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoRecord {
    /// Local, opaque identifier.
    pub id: String,
    /// Todo title.
    pub title: String,
}

impl TodoRecord {
    /// Create a new record.
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

/// Identifier assigned by the external provider.
///
/// Used as the addressing key for `get_by_id`, `update` and `delete`, and as the
/// suffix of the per-item cache key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(i64);

impl ProviderId {
    /// Wrap a raw provider id.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// The raw numeric id.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for ProviderId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProviderId {
    type Err = ExternalServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|_| ExternalServiceError::InvalidProviderId(s.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)] // Panics: Test will fail if parsing fails
mod tests {
    use super::*;

    #[test]
    fn provider_id_parses_integers() {
        let id: ProviderId = "42".parse().expect("42 is a valid provider id");
        assert_eq!(id, ProviderId::new(42));
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn provider_id_rejects_uuid_strings() {
        let result = "6f1c2a9e-0000-4000-8000-000000000000".parse::<ProviderId>();
        assert!(matches!(
            result,
            Err(ExternalServiceError::InvalidProviderId(_))
        ));
    }

    #[test]
    fn todo_record_uses_plain_json_shape() {
        let record = TodoRecord::new("local-1", "Buy milk");
        let json = serde_json::to_value(&record).expect("record should serialize");
        assert_eq!(json, serde_json::json!({ "id": "local-1", "title": "Buy milk" }));
    }
}
