use std::io::{self, Read, Write};

use thiserror::Error;

use crate::error::ErrorKind;

/// Largest frame accepted by default (64 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 64 << 20;

/// Bytes of the little-endian length prefix before each payload.
pub const HEADER_LEN: usize = 4;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("truncated frame: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },

    #[error("frame of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: u64, limit: u32 },

    #[error("malformed record: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl FrameError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Io
    }
}

/// Writes length-prefixed frames: a little-endian `u32` byte count followed
/// by the payload.
#[derive(Debug)]
pub struct FrameWriter<W> {
    inner: W,
    max_frame_size: u32,
}

impl<W: Write> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self::with_max_frame_size(inner, DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(inner: W, max_frame_size: u32) -> Self {
        Self {
            inner,
            max_frame_size,
        }
    }

    pub fn write_frame(&mut self, payload: &[u8]) -> Result<(), FrameError> {
        let size = u32::try_from(payload.len())
            .ok()
            .filter(|size| *size <= self.max_frame_size)
            .ok_or(FrameError::TooLarge {
                size: payload.len() as u64,
                limit: self.max_frame_size,
            })?;
        self.inner.write_all(&size.to_le_bytes())?;
        self.inner.write_all(payload)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), FrameError> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Reads frames written by [`FrameWriter`].
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    max_frame_size: u32,
}

impl<R: Read> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_max_frame_size(inner, DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(inner: R, max_frame_size: u32) -> Self {
        Self {
            inner,
            max_frame_size,
        }
    }

    /// Next payload, or `None` at a clean end of stream. End of stream in
    /// the middle of a frame is [`FrameError::Truncated`].
    pub fn read_frame(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        let mut header = [0u8; HEADER_LEN];
        let got = read_full(&mut self.inner, &mut header)?;
        if got == 0 {
            return Ok(None);
        }
        if got < HEADER_LEN {
            return Err(FrameError::Truncated {
                expected: HEADER_LEN,
                got,
            });
        }

        let size = u32::from_le_bytes(header);
        if size > self.max_frame_size {
            return Err(FrameError::TooLarge {
                size: u64::from(size),
                limit: self.max_frame_size,
            });
        }
        let mut payload = vec![0u8; size as usize];
        let got = read_full(&mut self.inner, &mut payload)?;
        if got < payload.len() {
            return Err(FrameError::Truncated {
                expected: payload.len(),
                got,
            });
        }
        Ok(Some(payload))
    }
}

/// Fill `buf` unless the reader ends first; returns the bytes read.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
