use std::collections::HashMap;

use thiserror::Error;

use super::id_set::IdSet;
use crate::error::ErrorKind;

/// Default probe bound for [`IdSpace::allocate`].
pub const DEFAULT_MAX_PROBES: u32 = 1 << 16;

const TAG_SHIFT: u32 = 24;
const COUNTER_MASK: u32 = 0x00ff_ffff;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no unused id for tag '{}' after {probes} probes", tag_char(.tag))]
pub struct AllocationExhausted {
    pub tag: u8,
    pub probes: u32,
}

fn tag_char(tag: &u8) -> char {
    char::from(*tag)
}

impl AllocationExhausted {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::AllocationExhausted
    }
}

/// Pass-local allocator of synthetic object names.
///
/// Candidates are `tag << 24 | counter`, where each tag owns a counter that
/// only moves forward within the pass, so allocation is deterministic for a
/// given atom sequence. A candidate is accepted when neither the caller's
/// `is_used` check nor the record of ids already handed out this pass claims
/// it. Not shared between passes.
#[derive(Debug, Clone)]
pub struct IdSpace {
    allocated: IdSet<u32>,
    counters: HashMap<u8, u32>,
    max_probes: u32,
}

impl IdSpace {
    pub fn new() -> Self {
        Self::with_max_probes(DEFAULT_MAX_PROBES)
    }

    pub fn with_max_probes(max_probes: u32) -> Self {
        Self {
            allocated: IdSet::new(),
            counters: HashMap::new(),
            max_probes: max_probes.max(1),
        }
    }

    /// Marks `id` as in use for the rest of the pass.
    pub fn add(&mut self, id: u32) {
        self.allocated.add(id);
    }

    pub fn remove(&mut self, id: u32) {
        self.allocated.remove(id);
    }

    pub fn contains(&self, id: u32) -> bool {
        self.allocated.contains(id)
    }

    /// Returns the first candidate for `tag` that `is_used` rejects and that
    /// has not been allocated earlier in this pass.
    pub fn allocate(
        &mut self,
        tag: u8,
        is_used: impl Fn(u32) -> bool,
    ) -> Result<u32, AllocationExhausted> {
        let counter = self.counters.entry(tag).or_insert(1);
        for _ in 0..self.max_probes {
            let candidate = (u32::from(tag) << TAG_SHIFT) | (*counter & COUNTER_MASK);
            *counter = counter.wrapping_add(1);
            if candidate == 0 || self.allocated.contains(candidate) || is_used(candidate) {
                continue;
            }
            self.allocated.add(candidate);
            return Ok(candidate);
        }
        tracing::warn!(tag = %char::from(tag), probes = self.max_probes, "id allocation exhausted");
        Err(AllocationExhausted {
            tag,
            probes: self.max_probes,
        })
    }
}

impl Default for IdSpace {
    fn default() -> Self {
        Self::new()
    }
}
