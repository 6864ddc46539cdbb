use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Who and what triggered a notification.
///
/// Embedded in exactly one `NotificationRecord`; it has no lifecycle of its
/// own. `display_name` is captured when the event fires and is never
/// re-derived, so a later rename leaves historic notifications unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idea_id: Option<String>,
    /// Recipient of the notification.
    #[serde(default)]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiator_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub type_id: String,
}

impl EventMetadata {
    pub fn builder(user_id: impl Into<String>, type_id: impl Into<String>) -> MetadataBuilder {
        MetadataBuilder {
            user_id: user_id.into(),
            type_id: type_id.into(),
            group_id: None,
            idea_id: None,
            member_id: None,
            initiator_id: None,
            display_name: None,
        }
    }

    /// Checks the required fields. Used for metadata that arrives over the
    /// wire and therefore skipped the builder.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.user_id.trim().is_empty() {
            return Err(AppError::validation("metadata.userId is required"));
        }
        if self.type_id.trim().is_empty() {
            return Err(AppError::validation("metadata.typeId is required"));
        }
        Ok(())
    }
}

/// Chainable construction of `EventMetadata`. Ids are opaque and are not
/// checked against any entity store.
#[derive(Debug, Clone)]
pub struct MetadataBuilder {
    user_id: String,
    type_id: String,
    group_id: Option<String>,
    idea_id: Option<String>,
    member_id: Option<String>,
    initiator_id: Option<String>,
    display_name: Option<String>,
}

impl MetadataBuilder {
    pub fn group_id(mut self, id: impl Into<String>) -> Self {
        self.group_id = Some(id.into());
        self
    }

    pub fn idea_id(mut self, id: impl Into<String>) -> Self {
        self.idea_id = Some(id.into());
        self
    }

    pub fn member_id(mut self, id: impl Into<String>) -> Self {
        self.member_id = Some(id.into());
        self
    }

    pub fn initiator_id(mut self, id: impl Into<String>) -> Self {
        self.initiator_id = Some(id.into());
        self
    }

    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn build(self) -> Result<EventMetadata, AppError> {
        let metadata = EventMetadata {
            group_id: self.group_id,
            idea_id: self.idea_id,
            user_id: self.user_id,
            member_id: self.member_id,
            initiator_id: self.initiator_id,
            display_name: self.display_name,
            type_id: self.type_id,
        };
        metadata.validate()?;
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_optional_fields() {
        let meta = EventMetadata::builder("owner-1", "idea-9")
            .idea_id("idea-9")
            .initiator_id("actor-2")
            .display_name("Ada Obi")
            .build()
            .unwrap();

        assert_eq!(meta.user_id, "owner-1");
        assert_eq!(meta.type_id, "idea-9");
        assert_eq!(meta.idea_id.as_deref(), Some("idea-9"));
        assert_eq!(meta.initiator_id.as_deref(), Some("actor-2"));
        assert_eq!(meta.display_name.as_deref(), Some("Ada Obi"));
        assert!(meta.group_id.is_none());
        assert!(meta.member_id.is_none());
    }

    #[test]
    fn test_builder_rejects_missing_user_id() {
        let err = EventMetadata::builder("", "idea-9").build().unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_builder_rejects_blank_type_id() {
        let err = EventMetadata::builder("owner-1", "   ").build().unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_wire_format_is_camel_case_and_skips_absent_fields() {
        let meta = EventMetadata::builder("u1", "t1")
            .group_id("g1")
            .build()
            .unwrap();
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["typeId"], "t1");
        assert_eq!(json["groupId"], "g1");
        assert!(json.get("memberId").is_none());
    }

    #[test]
    fn test_deserialized_metadata_without_type_id_fails_validation() {
        let meta: EventMetadata = serde_json::from_value(serde_json::json!({
            "userId": "u1"
        }))
        .unwrap();
        assert!(meta.validate().is_err());
    }
}
