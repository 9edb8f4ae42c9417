use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use heapless::Deque;
use log::{debug, warn};
use vdma_core::utils::is_word_channel;
use vdma_core::{TransferHandler, TransferRequest, TransferType};

use crate::memory::GuestMemory;

pub const FIFO_CAPACITY: usize = 1024;

/// Counters updated from the after-transfer callback
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FifoStats {
    pub transfers: u64,       // Callbacks that moved data
    pub units: u64,           // Bytes or words moved
    pub terminal_counts: u64, // Times the channel hit TC
}

struct FifoState {
    fifo: Deque<u8, FIFO_CAPACITY>,
    stats: FifoStats,
}

/// DMA device buffering data in a fixed-size FIFO, e.g. a DAC or a disk buffer
///
/// Read transfers fill the FIFO from guest memory, write transfers empty it
/// into guest memory. The device side is driven through `drain` and `feed`.
pub struct FifoDevice {
    memory: Arc<GuestMemory>,
    burst: u32, // Upper bound of units per sweep
    state: Mutex<FifoState>,
}

// Address of the n-th unit of a transfer
fn unit_address(base: u32, unit: u32, unit_bytes: u32, descending: bool) -> u32 {
    let offset = unit.wrapping_mul(unit_bytes);
    if descending {
        base.wrapping_sub(offset)
    } else {
        base.wrapping_add(offset)
    }
}

impl FifoDevice {
    pub fn new(memory: Arc<GuestMemory>, burst: u32) -> Self {
        Self {
            memory,
            burst: burst.max(1),
            state: Mutex::new(FifoState {
                fifo: Deque::new(),
                stats: FifoStats::default(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, FifoState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Consumes up to `max` bytes from the device side
    pub fn drain(&self, max: usize) -> Vec<u8> {
        let mut state = self.state();
        let mut out = Vec::with_capacity(max.min(state.fifo.len()));
        while out.len() < max {
            match state.fifo.pop_front() {
                Some(byte) => out.push(byte),
                None => break,
            }
        }
        out
    }

    /// Produces bytes on the device side; returns how many fit
    pub fn feed(&self, data: &[u8]) -> usize {
        let mut state = self.state();
        let mut accepted = 0;
        for byte in data {
            if state.fifo.push_back(*byte).is_err() {
                break;
            }
            accepted += 1;
        }
        accepted
    }

    pub fn len(&self) -> usize {
        self.state().fifo.len()
    }

    pub fn stats(&self) -> FifoStats {
        self.state().stats
    }
}

impl TransferHandler for FifoDevice {
    fn handle_transfer(&self, request: &TransferRequest) -> u32 {
        let unit_bytes: u32 = if is_word_channel(request.channel) { 2 } else { 1 };
        let mut state = self.state();
        let budget = request.max_count.min(self.burst);

        match request.transfer_type {
            TransferType::Read => {
                let free = (FIFO_CAPACITY - state.fifo.len()) as u32 / unit_bytes;
                let units = budget.min(free);
                let mut word = [0u8; 2];
                for unit in 0..units {
                    let addr = unit_address(
                        request.physical_addr,
                        unit,
                        unit_bytes,
                        request.descending,
                    );
                    let buf = &mut word[..unit_bytes as usize];
                    self.memory.read(addr, buf);
                    for byte in buf.iter() {
                        // Space was checked above
                        let _ = state.fifo.push_back(*byte);
                    }
                }
                units
            }
            TransferType::Write => {
                let available = state.fifo.len() as u32 / unit_bytes;
                let units = budget.min(available);
                let mut word = [0u8; 2];
                for unit in 0..units {
                    let addr = unit_address(
                        request.physical_addr,
                        unit,
                        unit_bytes,
                        request.descending,
                    );
                    let buf = &mut word[..unit_bytes as usize];
                    for slot in buf.iter_mut() {
                        *slot = state.fifo.pop_front().unwrap_or(0);
                    }
                    self.memory.write(addr, buf);
                }
                units
            }
            TransferType::Verify => budget,
            TransferType::Invalid => {
                warn!(
                    "Invalid transfer type programmed on DMA channel {}",
                    request.channel
                );
                0
            }
        }
    }

    fn handle_after_transfer(&self, channel: usize, transferred: u32, terminal_count: bool) {
        let mut state = self.state();
        state.stats.transfers += 1;
        state.stats.units += transferred as u64;
        if terminal_count {
            state.stats.terminal_counts += 1;
            debug!(
                "DMA channel {} reached terminal count ({} units in last burst)",
                channel, transferred
            );
        }
    }
}
