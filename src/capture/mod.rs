//! Capture files: a sequence of length-framed atom records.
//!
//! Each frame holds one JSON [`CapturedAtom`]. The same format carries the
//! rewritten stream a replay produces.

mod frame;

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::atom::{Atom, AtomId};
use crate::transform::{AtomSink, TransformError};

pub use frame::{FrameError, FrameReader, FrameWriter, DEFAULT_MAX_FRAME_SIZE, HEADER_LEN};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedAtom {
    pub id: AtomId,
    pub atom: Atom,
}

/// Iterates the records of a capture.
pub struct CaptureReader<R> {
    frames: FrameReader<R>,
    done: bool,
}

impl<R: Read> CaptureReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_max_frame_size(inner, DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(inner: R, max_frame_size: u32) -> Self {
        Self {
            frames: FrameReader::with_max_frame_size(inner, max_frame_size),
            done: false,
        }
    }

    fn next_record(&mut self) -> Result<Option<(AtomId, Atom)>, FrameError> {
        let Some(payload) = self.frames.read_frame()? else {
            return Ok(None);
        };
        let record: CapturedAtom = serde_json::from_slice(&payload)?;
        Ok(Some((record.id, record.atom)))
    }
}

impl CaptureReader<BufReader<File>> {
    pub fn open(path: &Path, max_frame_size: u32) -> Result<Self, FrameError> {
        let file = File::open(path)?;
        Ok(Self::with_max_frame_size(
            BufReader::new(file),
            max_frame_size,
        ))
    }
}

impl<R: Read> Iterator for CaptureReader<R> {
    type Item = Result<(AtomId, Atom), FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = self.next_record().transpose();
        // A broken frame leaves the reader misaligned; stop after it.
        if !matches!(item, Some(Ok(_))) {
            self.done = true;
        }
        item
    }
}

/// Writes records as they leave a pass.
pub struct CaptureWriter<W: Write> {
    frames: FrameWriter<W>,
    written: u64,
}

impl<W: Write> CaptureWriter<W> {
    pub fn new(inner: W) -> Self {
        Self::with_max_frame_size(inner, DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(inner: W, max_frame_size: u32) -> Self {
        Self {
            frames: FrameWriter::with_max_frame_size(inner, max_frame_size),
            written: 0,
        }
    }

    pub fn append(&mut self, id: AtomId, atom: Atom) -> Result<(), FrameError> {
        let payload = serde_json::to_vec(&CapturedAtom { id, atom })?;
        self.frames.write_frame(&payload)?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn finish(mut self) -> Result<W, FrameError> {
        self.frames.flush()?;
        Ok(self.frames.into_inner())
    }
}

impl CaptureWriter<BufWriter<File>> {
    pub fn create(path: &Path, max_frame_size: u32) -> Result<Self, FrameError> {
        let file = File::create(path)?;
        Ok(Self::with_max_frame_size(
            BufWriter::new(file),
            max_frame_size,
        ))
    }
}

impl<W: Write> AtomSink for CaptureWriter<W> {
    fn write(&mut self, id: AtomId, atom: Atom) -> Result<(), TransformError> {
        Ok(self.append(id, atom)?)
    }
}

/// Encode a whole capture in memory.
pub fn encode_atoms<'a>(
    atoms: impl IntoIterator<Item = &'a (AtomId, Atom)>,
) -> Result<Vec<u8>, FrameError> {
    let mut writer = CaptureWriter::new(Vec::new());
    for (id, atom) in atoms {
        writer.append(*id, atom.clone())?;
    }
    writer.finish()
}

/// Decode a whole in-memory capture.
pub fn decode_atoms(bytes: &[u8], max_frame_size: u32) -> Result<Vec<(AtomId, Atom)>, FrameError> {
    CaptureReader::with_max_frame_size(bytes, max_frame_size).collect()
}
