// Recording collaborators for exercising the transfer thread in tests

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::constants::NUM_DMA_CHANNELS;
use crate::error::GatewayFault;
use crate::gateway::{DmaInfo, DmaServices, UpdateScope};
use crate::handler::{TransferHandler, TransferRequest};

#[derive(Default)]
struct ServicesState {
    channels: [DmaInfo; NUM_DMA_CHANNELS],
    scopes: [Option<UpdateScope>; NUM_DMA_CHANNELS],
    failing: [bool; NUM_DMA_CHANNELS],
    failing_writes: [bool; NUM_DMA_CHANNELS],
    read_delay: Duration,
    get_calls: usize,
    set_calls: usize,
}

pub struct MockServices {
    state: Mutex<ServicesState>,
}

impl MockServices {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ServicesState::default()),
        }
    }

    pub fn store(&self, channel: usize, info: DmaInfo) {
        self.state.lock().unwrap().channels[channel] = info;
    }

    pub fn load(&self, channel: usize) -> DmaInfo {
        self.state.lock().unwrap().channels[channel]
    }

    pub fn last_scope(&self, channel: usize) -> Option<UpdateScope> {
        self.state.lock().unwrap().scopes[channel]
    }

    pub fn fail_channel(&self, channel: usize, failing: bool) {
        self.state.lock().unwrap().failing[channel] = failing;
    }

    /// Fails only the write-back, reads keep working
    pub fn fail_writes(&self, channel: usize, failing: bool) {
        self.state.lock().unwrap().failing_writes[channel] = failing;
    }

    pub fn set_read_delay(&self, delay: Duration) {
        self.state.lock().unwrap().read_delay = delay;
    }

    pub fn get_calls(&self) -> usize {
        self.state.lock().unwrap().get_calls
    }

    pub fn set_calls(&self) -> usize {
        self.state.lock().unwrap().set_calls
    }
}

impl DmaServices for MockServices {
    fn get_dma_state(&self, channel: usize) -> Result<DmaInfo, GatewayFault> {
        let delay = self.state.lock().unwrap().read_delay;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        let mut state = self.state.lock().unwrap();
        state.get_calls += 1;
        if state.failing[channel] {
            return Err(GatewayFault::new("injected read fault"));
        }
        Ok(state.channels[channel])
    }

    fn set_dma_state(
        &self,
        channel: usize,
        scope: UpdateScope,
        info: &DmaInfo,
    ) -> Result<(), GatewayFault> {
        let mut state = self.state.lock().unwrap();
        state.set_calls += 1;
        if state.failing[channel] || state.failing_writes[channel] {
            return Err(GatewayFault::new("injected write fault"));
        }
        let stored = &mut state.channels[channel];
        stored.status = info.status;
        if scope == UpdateScope::All {
            stored.addr = info.addr;
            stored.count = info.count;
            stored.mode = info.mode;
            stored.mask = info.mask;
        }
        state.scopes[channel] = Some(scope);
        Ok(())
    }
}

/// Handler replaying a script of transfer sizes, then reporting nothing moved
pub struct RecordingHandler {
    script: Mutex<VecDeque<u32>>,
    transfers: Mutex<Vec<TransferRequest>>,
    completions: Mutex<Vec<(usize, u32, bool)>>,
}

impl RecordingHandler {
    pub fn new(script: &[u32]) -> Self {
        Self {
            script: Mutex::new(script.iter().copied().collect()),
            transfers: Mutex::new(Vec::new()),
            completions: Mutex::new(Vec::new()),
        }
    }

    pub fn transfers(&self) -> Vec<TransferRequest> {
        self.transfers.lock().unwrap().clone()
    }

    pub fn completions(&self) -> Vec<(usize, u32, bool)> {
        self.completions.lock().unwrap().clone()
    }
}

impl TransferHandler for RecordingHandler {
    fn handle_transfer(&self, request: &TransferRequest) -> u32 {
        self.transfers.lock().unwrap().push(*request);
        self.script.lock().unwrap().pop_front().unwrap_or(0)
    }

    fn handle_after_transfer(&self, channel: usize, transferred: u32, terminal_count: bool) {
        self.completions
            .lock()
            .unwrap()
            .push((channel, transferred, terminal_count));
    }
}
