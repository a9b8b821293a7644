use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Unix timestamp in milliseconds
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnixTimeMs(pub u64);

impl UnixTimeMs {
    pub fn now() -> Self {
        Self(
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
        )
    }

    #[must_use]
    pub fn saturating_add(self, ms: u64) -> Self {
        Self(self.0.saturating_add(ms))
    }
}

/// Validated action identifier - immutable after construction
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionId(String);

impl ActionId {
    const MAX_LENGTH: usize = 128;

    pub fn new(id: impl Into<String>) -> Result<Self, ActionError> {
        let id = id.into().trim().to_string();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(id: &str) -> Result<(), ActionError> {
        if id.is_empty() {
            return Err(ActionError::InvalidId("ActionId cannot be empty".into()));
        }
        if id.len() > Self::MAX_LENGTH {
            return Err(ActionError::InvalidId(format!(
                "ActionId exceeds {} characters",
                Self::MAX_LENGTH
            )));
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ActionError::InvalidId(
                "ActionId contains invalid characters (allowed: a-z, A-Z, 0-9, -, _)".into(),
            ));
        }
        Ok(())
    }
}

/// Client-generated placeholder identifier for a resource the server has not
/// confirmed yet. Carries a recognizable prefix so payload references can be
/// classified without consulting the mapping table.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TempId(String);

impl TempId {
    pub const PREFIX: &'static str = "temp-";
    const MAX_LENGTH: usize = 128;

    pub fn new(id: impl Into<String>) -> Result<Self, ActionError> {
        let id = id.into().trim().to_string();
        if !id.starts_with(Self::PREFIX) {
            return Err(ActionError::InvalidId(format!(
                "TempId must start with \"{}\"",
                Self::PREFIX
            )));
        }
        if id.len() > Self::MAX_LENGTH {
            return Err(ActionError::InvalidId(format!(
                "TempId exceeds {} characters",
                Self::MAX_LENGTH
            )));
        }
        Ok(Self(id))
    }

    pub fn generate() -> Self {
        Self(format!("{}{}", Self::PREFIX, Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether a raw resource reference looks like a temp id.
    pub fn matches(raw: &str) -> bool {
        raw.starts_with(Self::PREFIX)
    }
}

/// Mutation kind. Priority is derived from this, never stored independently.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// Drain ordering band. Deletes go first so destructive operations reach the
/// server before anything that might depend on the deleted resource; creates
/// are safe to delay since nothing references their server id yet.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
}

impl Priority {
    #[must_use]
    pub const fn for_operation(operation: Operation) -> Self {
        match operation {
            Operation::Delete => Self::High,
            Operation::Update => Self::Normal,
            Operation::Create => Self::Low,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Processing,
    Failed,
}

impl ActionStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Failed)
    }
}

/// Operation-specific payload. Each variant statically carries exactly the
/// fields that operation requires.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionPayload {
    Create {
        temp_id: TempId,
        data: serde_json::Value,
    },
    Update {
        resource_id: String,
        updates: serde_json::Value,
    },
    Delete {
        resource_id: String,
    },
}

impl ActionPayload {
    /// The resource reference this payload points at, if any. Creates point at
    /// nothing yet; their temp id names the resource being born.
    pub fn resource_ref(&self) -> Option<&str> {
        match self {
            Self::Create { .. } => None,
            Self::Update { resource_id, .. } | Self::Delete { resource_id } => Some(resource_id),
        }
    }

    /// Rewrite a temp-id reference to the server-assigned id.
    pub fn rewrite_resource_ref(&mut self, real_id: &str) {
        match self {
            Self::Create { .. } => {}
            Self::Update { resource_id, .. } | Self::Delete { resource_id } => {
                *resource_id = real_id.to_string();
            }
        }
    }

    /// Validate that the payload shape agrees with the declared operation.
    pub fn validate_for(&self, operation: Operation) -> Result<(), ActionError> {
        let ok = matches!(
            (operation, self),
            (Operation::Create, Self::Create { .. })
                | (Operation::Update, Self::Update { .. })
                | (Operation::Delete, Self::Delete { .. })
        );
        if ok {
            Ok(())
        } else {
            Err(ActionError::PayloadMismatch {
                operation: operation.as_str(),
            })
        }
    }
}

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("payload shape does not match operation {operation}")]
    PayloadMismatch { operation: &'static str },

    #[error("validation error: {0}")]
    Validation(String),
}

/// A single queued mutation intent awaiting remote execution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueuedAction {
    pub id: ActionId,
    pub operation: Operation,
    pub resource_type: String,
    pub payload: ActionPayload,
    pub user_id: String,
    pub status: ActionStatus,
    pub priority: Priority,
    pub timestamp: UnixTimeMs,
    pub retry_count: u32,
    pub max_retries: u32,
    pub next_retry_at: Option<UnixTimeMs>,
    pub last_error: Option<String>,
}

impl QueuedAction {
    pub fn new(
        operation: Operation,
        resource_type: impl Into<String>,
        payload: ActionPayload,
        user_id: impl Into<String>,
        now: UnixTimeMs,
        max_retries: u32,
    ) -> Result<Self, ActionError> {
        payload.validate_for(operation)?;
        Ok(Self {
            id: ActionId::generate(),
            operation,
            resource_type: resource_type.into(),
            payload,
            user_id: user_id.into(),
            status: ActionStatus::Pending,
            priority: Priority::for_operation(operation),
            timestamp: now,
            retry_count: 0,
            max_retries,
            next_retry_at: None,
            last_error: None,
        })
    }

    /// Eligible for an attempt: pending and not waiting out a backoff window.
    #[must_use]
    pub fn is_due(&self, now: UnixTimeMs) -> bool {
        self.status == ActionStatus::Pending
            && self.next_retry_at.map_or(true, |at| at.0 <= now.0)
    }

    #[must_use]
    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_now() -> UnixTimeMs {
        UnixTimeMs(1_700_000_000_000)
    }

    #[test]
    fn test_action_id_validation() {
        assert!(ActionId::new("valid-id_123").is_ok());
        assert!(ActionId::new("").is_err());
        assert!(ActionId::new("   ").is_err());
        assert!(ActionId::new("invalid id").is_err());
        assert!(ActionId::new("a".repeat(129)).is_err());
    }

    #[test]
    fn test_action_id_trims_whitespace() {
        let id = ActionId::new("  test-id  ").unwrap();
        assert_eq!(id.as_str(), "test-id");
    }

    #[test]
    fn test_temp_id_requires_prefix() {
        assert!(TempId::new("temp-abc").is_ok());
        assert!(TempId::new("abc").is_err());
        assert!(TempId::matches("temp-123"));
        assert!(!TempId::matches("123"));
    }

    #[test]
    fn test_generated_temp_id_matches() {
        let temp = TempId::generate();
        assert!(TempId::matches(temp.as_str()));
    }

    #[test]
    fn test_priority_derivation() {
        assert_eq!(Priority::for_operation(Operation::Delete), Priority::High);
        assert_eq!(Priority::for_operation(Operation::Update), Priority::Normal);
        assert_eq!(Priority::for_operation(Operation::Create), Priority::Low);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
    }

    #[test]
    fn test_payload_operation_mismatch_rejected() {
        let payload = ActionPayload::Delete {
            resource_id: "a-1".into(),
        };
        let result = QueuedAction::new(
            Operation::Create,
            "assignment",
            payload,
            "user-1",
            make_now(),
            3,
        );
        assert!(matches!(result, Err(ActionError::PayloadMismatch { .. })));
    }

    #[test]
    fn test_is_due_respects_backoff_window() {
        let now = make_now();
        let mut action = QueuedAction::new(
            Operation::Update,
            "assignment",
            ActionPayload::Update {
                resource_id: "a-1".into(),
                updates: serde_json::json!({"title": "B"}),
            },
            "user-1",
            now,
            3,
        )
        .unwrap();

        assert!(action.is_due(now));

        action.next_retry_at = Some(UnixTimeMs(now.0 + 5_000));
        assert!(!action.is_due(now));
        assert!(action.is_due(UnixTimeMs(now.0 + 5_000)));

        action.status = ActionStatus::Failed;
        assert!(!action.is_due(UnixTimeMs(now.0 + 10_000)));
    }

    #[test]
    fn test_rewrite_resource_ref() {
        let mut payload = ActionPayload::Update {
            resource_id: "temp-123".into(),
            updates: serde_json::json!({}),
        };
        payload.rewrite_resource_ref("srv-9");
        assert_eq!(payload.resource_ref(), Some("srv-9"));

        let mut create = ActionPayload::Create {
            temp_id: TempId::new("temp-1").unwrap(),
            data: serde_json::json!({}),
        };
        create.rewrite_resource_ref("srv-9");
        assert_eq!(create.resource_ref(), None);
    }

    #[test]
    fn test_action_serde_roundtrip() {
        let action = QueuedAction::new(
            Operation::Create,
            "study_session",
            ActionPayload::Create {
                temp_id: TempId::generate(),
                data: serde_json::json!({"title": "Revision"}),
            },
            "user-1",
            make_now(),
            3,
        )
        .unwrap();

        let json = serde_json::to_string(&action).unwrap();
        let back: QueuedAction = serde_json::from_str(&json).unwrap();
        assert_eq!(back, action);
    }
}
