//! Append-only record logs.

mod file;

use std::io;

use thiserror::Error;

use crate::capture::FrameError;
use crate::error::ErrorKind;

pub use file::FileLedger;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger i/o: {0}")]
    Io(#[from] io::Error),

    #[error("ledger frame: {0}")]
    Frame(#[from] FrameError),

    #[error("ledger record: {0}")]
    Encode(#[from] serde_json::Error),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Io
    }
}

/// An append-only log of `T` records.
pub trait Ledger<T>: Send + Sync {
    fn append(&self, record: &T) -> Result<(), LedgerError>;

    /// Feed every record, oldest first, to `handler`. A handler error stops
    /// the read and is returned.
    fn read(&self, handler: &mut dyn FnMut(T) -> Result<(), LedgerError>)
        -> Result<(), LedgerError>;
}

/// Ledger that keeps nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLedger;

impl<T> Ledger<T> for NullLedger {
    fn append(&self, _record: &T) -> Result<(), LedgerError> {
        Ok(())
    }

    fn read(
        &self,
        _handler: &mut dyn FnMut(T) -> Result<(), LedgerError>,
    ) -> Result<(), LedgerError> {
        Ok(())
    }
}
