//! Wire types of the JSONPlaceholder todo resource

use serde::{Deserialize, Serialize};
use todo_sync_core::{ProviderId, TodoRecord};

/// A todo as the provider sends and receives it.
///
/// ```json
/// { "id": 1, "userId": 1, "title": "delectus aut autem", "completed": false }
/// ```
///
/// `id` is omitted on create; the provider assigns it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExternalProviderItem {
    /// Provider-assigned id
    #[serde(rename = "id", default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<ProviderId>,
    /// Owning user on the provider side
    #[serde(rename = "userId", default)]
    pub owner_id: i64,
    /// Todo title
    pub title: String,
    /// Completion flag
    #[serde(default)]
    pub completed: bool,
}

impl ExternalProviderItem {
    /// An item to send on create or update. New items are never completed.
    #[must_use]
    pub fn outgoing(provider_id: Option<ProviderId>, owner_id: i64, title: impl Into<String>) -> Self {
        Self {
            provider_id,
            owner_id,
            title: title.into(),
            completed: false,
        }
    }

    /// Translate to the local shape under a freshly minted `local_id`.
    #[must_use]
    pub fn into_record(self, local_id: String) -> TodoRecord {
        TodoRecord::new(local_id, self.title)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;

    #[test]
    fn decodes_provider_json() {
        let item: ExternalProviderItem = serde_json::from_str(
            r#"{"userId":1,"id":7,"title":"quis ut nam","completed":true}"#,
        )
        .unwrap();

        assert_eq!(item.provider_id, Some(ProviderId::new(7)));
        assert_eq!(item.owner_id, 1);
        assert_eq!(item.title, "quis ut nam");
        assert!(item.completed);
    }

    #[test]
    fn create_body_omits_id() {
        let json = serde_json::to_value(ExternalProviderItem::outgoing(None, 1, "New")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "userId": 1, "title": "New", "completed": false })
        );
    }

    #[test]
    fn update_body_carries_id() {
        let json =
            serde_json::to_value(ExternalProviderItem::outgoing(Some(ProviderId::new(3)), 1, "Renamed"))
                .unwrap();
        assert_eq!(json["id"], 3);
    }

    #[test]
    fn provider_id_never_leaks_into_the_record() {
        let item = ExternalProviderItem::outgoing(Some(ProviderId::new(99)), 1, "Title");
        let record = item.into_record("local-1".to_string());
        assert_eq!(record, TodoRecord::new("local-1", "Title"));
    }
}
