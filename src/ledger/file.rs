use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{Ledger, LedgerError};
use crate::capture::{FrameError, FrameReader, FrameWriter, DEFAULT_MAX_FRAME_SIZE, HEADER_LEN};

/// Ledger stored as length-framed JSON records in one file. Every append is
/// flushed before it returns.
///
/// A frame cut short by a crash mid-append ends the log: opening or reading
/// the ledger drops it with a warning and cuts the file back to the last
/// complete record.
pub struct FileLedger<T> {
    path: PathBuf,
    writer: Mutex<FrameWriter<BufWriter<File>>>,
    max_frame_size: u32,
    _record: PhantomData<fn() -> T>,
}

impl<T> FileLedger<T> {
    /// Open `path` for appending, creating it and its parent directory if
    /// needed. Existing records are kept.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        Self::with_max_frame_size(path, DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(
        path: impl AsRef<Path>,
        max_frame_size: u32,
    ) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if path.exists() {
            scan(&path, max_frame_size, &mut |_| Ok(()))?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(FrameWriter::with_max_frame_size(
                BufWriter::new(file),
                max_frame_size,
            )),
            max_frame_size,
            _record: PhantomData,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<T> Ledger<T> for FileLedger<T>
where
    T: Serialize + DeserializeOwned,
{
    fn append(&self, record: &T) -> Result<(), LedgerError> {
        let payload = serde_json::to_vec(record)?;
        let mut writer = self.writer.lock();
        writer.write_frame(&payload)?;
        writer.flush()?;
        Ok(())
    }

    fn read(
        &self,
        handler: &mut dyn FnMut(T) -> Result<(), LedgerError>,
    ) -> Result<(), LedgerError> {
        // Hold the writer so no append lands mid-read.
        let mut writer = self.writer.lock();
        writer.flush()?;
        scan(&self.path, self.max_frame_size, &mut |payload| {
            handler(serde_json::from_slice(&payload)?)
        })?;
        drop(writer);
        Ok(())
    }
}

/// Feed every complete frame in `path` to `on_frame`. A truncated last frame
/// is cut off the file.
fn scan(
    path: &Path,
    max_frame_size: u32,
    on_frame: &mut dyn FnMut(Vec<u8>) -> Result<(), LedgerError>,
) -> Result<(), LedgerError> {
    let file = File::open(path)?;
    let mut frames = FrameReader::with_max_frame_size(BufReader::new(file), max_frame_size);
    let mut complete: u64 = 0;
    loop {
        match frames.read_frame() {
            Ok(Some(payload)) => {
                complete += (HEADER_LEN + payload.len()) as u64;
                on_frame(payload)?;
            }
            Ok(None) => return Ok(()),
            Err(FrameError::Truncated { expected, got }) => {
                tracing::warn!(
                    path = %path.display(),
                    offset = complete,
                    expected,
                    got,
                    "dropping truncated ledger record"
                );
                OpenOptions::new().write(true).open(path)?.set_len(complete)?;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
    }
}

impl<T> Drop for FileLedger<T> {
    fn drop(&mut self) {
        if let Err(e) = self.writer.get_mut().flush() {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to flush ledger");
        }
    }
}
