//! 5G-TMSI allocation
//!
//! A TMSI is `random(22) << 10 | counter(10)`. The 10-bit counter advances
//! after every successful allocation, so consecutive TMSIs spread evenly over
//! the low bits; the random part keeps them unpredictable.

use std::collections::HashSet;
use std::sync::Mutex;

use ogs_core::rand::ogs_random_bits;
use ogs_core::CancelToken;

use crate::error::{AmfError, AmfResult};
use crate::types::Tmsi;

/// Width of the round-robin counter in the low bits
pub const TMSI_LSB_BITS: u32 = 10;
const TMSI_LSB_MASK: u16 = (1 << TMSI_LSB_BITS) - 1;

/// Candidates tried before an allocation gives up
pub const TMSI_MAX_ATTEMPTS: u32 = 1 << 16;

struct TmsiState {
    allocated: HashSet<u32>,
    next_lsb: u16,
}

/// Allocator of unique 5G-TMSIs
pub struct TmsiAllocator {
    state: Mutex<TmsiState>,
}

impl TmsiAllocator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TmsiState {
                allocated: HashSet::new(),
                next_lsb: 0,
            }),
        }
    }

    /// Allocate a TMSI not currently in use.
    ///
    /// `cancel` is checked before every candidate.
    pub fn allocate(&self, cancel: &CancelToken) -> AmfResult<Tmsi> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        for _ in 0..TMSI_MAX_ATTEMPTS {
            if cancel.is_cancelled() {
                log::warn!("TMSI allocation cancelled");
                return Err(AmfError::Cancelled);
            }

            let candidate =
                (ogs_random_bits(32 - TMSI_LSB_BITS) << TMSI_LSB_BITS) | state.next_lsb as u32;
            let Ok(tmsi) = Tmsi::new(candidate) else {
                continue;
            };
            if !state.allocated.insert(candidate) {
                continue;
            }

            state.next_lsb = (state.next_lsb + 1) & TMSI_LSB_MASK;
            log::debug!("TMSI allocated: {}", tmsi);
            return Ok(tmsi);
        }

        log::error!(
            "TMSI allocation failed after {} attempts ({} in use)",
            TMSI_MAX_ATTEMPTS,
            state.allocated.len()
        );
        Err(AmfError::Exhausted(format!(
            "no free TMSI after {} attempts",
            TMSI_MAX_ATTEMPTS
        )))
    }

    /// Return a TMSI to the pool. Freeing an unallocated TMSI is a no-op.
    pub fn free(&self, tmsi: Tmsi) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.allocated.remove(&tmsi.value()) {
            log::debug!("TMSI freed: {}", tmsi);
        }
    }

    pub fn is_allocated(&self, tmsi: Tmsi) -> bool {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.allocated.contains(&tmsi.value())
    }

    pub fn allocated_count(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.allocated.len()
    }
}

impl Default for TmsiAllocator {
    fn default() -> Self {
        Self::new()
    }
}
