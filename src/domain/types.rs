//! Shared domain enumerations aligned with persisted database enums.

use serde::{Deserialize, Serialize};

use crate::domain::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "cache_point_status", rename_all = "snake_case")]
pub enum CachePointStatus {
    Active,
    Inactive,
}

impl CachePointStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CachePointStatus::Active => "active",
            CachePointStatus::Inactive => "inactive",
        }
    }
}

/// Persisted lifecycle state of an asset entry.
///
/// `deleted` is terminal and never stored: the row is removed instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "asset_state", rename_all = "snake_case")]
pub enum AssetState {
    PendingUpload,
    Active,
    Disabled,
}

/// States an administrator may request through a bulk action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestedState {
    Active,
    Disabled,
    Deleted,
}

/// Result of applying a [`RequestedState`] to an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    To(AssetState),
    Remove,
}

impl AssetState {
    pub fn as_str(self) -> &'static str {
        match self {
            AssetState::PendingUpload => "pending_upload",
            AssetState::Active => "active",
            AssetState::Disabled => "disabled",
        }
    }

    /// Resolve an administrative request against the entry lifecycle.
    ///
    /// `has_remote` reports whether the entry already has an uploaded copy;
    /// re-enabling an entry without one puts it back in the upload queue.
    pub fn transition(self, requested: RequestedState, has_remote: bool) -> Transition {
        match (self, requested) {
            (_, RequestedState::Deleted) => Transition::Remove,
            (AssetState::PendingUpload, RequestedState::Disabled) => {
                Transition::To(AssetState::Disabled)
            }
            (AssetState::Active, RequestedState::Disabled) => Transition::To(AssetState::Disabled),
            (AssetState::Disabled, RequestedState::Active) if has_remote => {
                Transition::To(AssetState::Active)
            }
            (AssetState::Disabled, RequestedState::Active) => {
                Transition::To(AssetState::PendingUpload)
            }
            (AssetState::Disabled, RequestedState::Disabled)
            | (AssetState::Active, RequestedState::Active)
            | (AssetState::PendingUpload, RequestedState::Active) => Transition::Unchanged,
        }
    }
}

impl TryFrom<&str> for RequestedState {
    type Error = DomainError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "active" | "enable" => Ok(RequestedState::Active),
            "disabled" | "disable" => Ok(RequestedState::Disabled),
            "deleted" | "delete" => Ok(RequestedState::Deleted),
            other => Err(DomainError::validation(format!(
                "unknown asset state `{other}`"
            ))),
        }
    }
}
