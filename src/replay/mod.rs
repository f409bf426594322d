//! Replay work: submission, per-device dispatch and status tracking.
//!
//! An [`Action`] is created by [`Manager::do_action`] and moves through
//! `Pending -> Running -> {Succeeded, Failed}`. Registered devices receive
//! a [`Task`] per action and report back through [`Manager::update`].

mod action;
mod manager;
mod worker;

use thiserror::Error;

use crate::capture::FrameError;
use crate::error::ErrorKind;
use crate::ledger::LedgerError;
use crate::stash::StashError;
use crate::transform::PassError;

pub use action::{Action, ActionId, ActionStatus, Query, ReplayInput, ReplayOutput, Task};
pub use manager::{ActionSink, LocalManager, Manager, TaskHandler};
pub use worker::{execute, ReplayWorker};

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("unknown action {0}")]
    UnknownAction(ActionId),

    #[error("action {action} is {from}; cannot move to {to}")]
    IllegalTransition {
        action: ActionId,
        from: ActionStatus,
        to: ActionStatus,
    },

    #[error("{host} -> {target} is already registered")]
    AlreadyRegistered { host: String, target: String },

    #[error("task handler failed: {0}")]
    Handler(String),

    #[error("action consumer failed: {0}")]
    Sink(String),

    #[error("manager is shutting down")]
    Shutdown,

    /// Error reported by a remote manager.
    #[error("{message}")]
    Remote { kind: ErrorKind, message: String },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Stash(#[from] StashError),

    #[error(transparent)]
    Pass(#[from] PassError),

    #[error(transparent)]
    Capture(#[from] FrameError),
}

impl ReplayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReplayError::UnknownAction(_) => ErrorKind::Validation,
            ReplayError::IllegalTransition { .. } | ReplayError::AlreadyRegistered { .. } => {
                ErrorKind::Protocol
            }
            ReplayError::Handler(_) | ReplayError::Sink(_) | ReplayError::Shutdown => {
                ErrorKind::Io
            }
            ReplayError::Remote { kind, .. } => *kind,
            ReplayError::Ledger(e) => e.kind(),
            ReplayError::Stash(e) => e.kind(),
            ReplayError::Pass(e) => e.kind(),
            ReplayError::Capture(e) => e.kind(),
        }
    }
}

impl From<reqwest::Error> for ReplayError {
    fn from(err: reqwest::Error) -> Self {
        ReplayError::Remote {
            kind: ErrorKind::Io,
            message: err.to_string(),
        }
    }
}
