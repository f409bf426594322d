use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ReplayError;
use crate::stash::StashKey;
use crate::transform::TransformSpec;

/// Opaque action identifier. New ids sort by creation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(String);

impl ActionId {
    pub fn new() -> Self {
        ActionId(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ActionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for ActionId {
    fn from(value: String) -> Self {
        ActionId(value)
    }
}

impl From<&str> for ActionId {
    fn from(value: &str) -> Self {
        ActionId(value.to_string())
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl ActionStatus {
    fn rank(&self) -> u8 {
        match self {
            ActionStatus::Pending => 0,
            ActionStatus::Running => 1,
            ActionStatus::Succeeded | ActionStatus::Failed => 2,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ActionStatus::Succeeded | ActionStatus::Failed)
    }

    /// Forward moves only. `Running -> Running` is allowed so a device can
    /// report progress; nothing leaves a terminal status.
    pub fn can_become(&self, next: ActionStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next.rank() > self.rank() || (*self == ActionStatus::Running && next == *self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Pending => "pending",
            ActionStatus::Running => "running",
            ActionStatus::Succeeded => "succeeded",
            ActionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(ActionStatus::Pending),
            "running" => Ok(ActionStatus::Running),
            "succeeded" => Ok(ActionStatus::Succeeded),
            "failed" => Ok(ActionStatus::Failed),
            other => Err(format!("unknown status {other:?}")),
        }
    }
}

/// What to replay: a capture in the stash and the transforms to run on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayInput {
    pub capture: StashKey,
    #[serde(default)]
    pub transforms: Vec<TransformSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayOutput {
    /// Rewritten stream, stored in the stash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<StashKey>,
    /// Atoms emitted by the pass.
    #[serde(default)]
    pub atoms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReplayOutput {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: ActionId,
    /// Target device the action runs on.
    pub device: String,
    pub input: ReplayInput,
    pub status: ActionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<ReplayOutput>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Action {
    pub(crate) fn new(device: impl Into<String>, input: ReplayInput) -> Self {
        let now = Utc::now();
        Self {
            id: ActionId::new(),
            device: device.into(),
            input,
            status: ActionStatus::Pending,
            output: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The action after moving to `status`. `output`, when given, replaces
    /// the previous output.
    pub(crate) fn transitioned(
        &self,
        status: ActionStatus,
        output: Option<ReplayOutput>,
    ) -> Result<Self, ReplayError> {
        if !self.status.can_become(status) {
            return Err(ReplayError::IllegalTransition {
                action: self.id.clone(),
                from: self.status,
                to: status,
            });
        }
        let mut next = self.clone();
        next.status = status;
        if output.is_some() {
            next.output = output;
        }
        next.updated_at = Utc::now();
        Ok(next)
    }

    pub fn task(&self) -> Task {
        Task {
            action: self.id.clone(),
            input: self.input.clone(),
        }
    }
}

/// Work delivered to a device handler for one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub action: ActionId,
    pub input: ReplayInput,
}

/// Filter for [`super::Manager::search`]. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ActionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ActionStatus>,
}

impl Query {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_id(id: ActionId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn matches(&self, action: &Action) -> bool {
        self.id.as_ref().is_none_or(|id| *id == action.id)
            && self.device.as_ref().is_none_or(|d| *d == action.device)
            && self.status.is_none_or(|s| s == action.status)
    }
}
