use std::sync::Arc;

use crate::constants::reset;
use crate::constants::NUM_DMA_CHANNELS;
use crate::handler::TransferHandler;

/// Per-channel bookkeeping owned by the transfer thread
pub struct Channel {
    pub handler: Option<Arc<dyn TransferHandler>>, // Inert while empty
    pub is_active: bool,   // A start was requested and not yet stopped
    pub in_progress: bool, // Address and count captured for this transfer
    pub saved_addr: u16,   // Address at transfer start (auto-init reload)
    pub saved_count: u16,  // Count at transfer start (auto-init reload)
}

impl Channel {
    pub fn new() -> Self {
        Self {
            handler: None,
            is_active: false,
            in_progress: false,
            saved_addr: reset::ADDR_UNKNOWN,
            saved_count: reset::COUNT_UNKNOWN,
        }
    }

    /// Attaches a handler and forgets any previous transfer state
    pub fn attach(&mut self, handler: Arc<dyn TransferHandler>) {
        self.handler = Some(handler);
        self.is_active = false;
        self.in_progress = false;
        self.saved_addr = reset::ADDR_UNKNOWN;
        self.saved_count = reset::COUNT_UNKNOWN;
    }

    pub fn detach(&mut self) {
        self.handler = None;
        self.is_active = false;
        self.in_progress = false;
    }

    pub fn start(&mut self) {
        self.is_active = true;
        self.in_progress = false; // Recapture address/count on the next eligible sweep
    }

    pub fn stop(&mut self) {
        self.is_active = false;
        self.in_progress = false;
    }

    pub fn capture(&mut self, addr: u16, count: u16) {
        self.saved_addr = addr;
        self.saved_count = count;
        self.in_progress = true;
    }
}

impl Default for Channel {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed table of channels indexed directly by channel number
pub struct ChannelTable {
    channels: [Channel; NUM_DMA_CHANNELS],
}

impl ChannelTable {
    pub fn new() -> Self {
        Self {
            channels: core::array::from_fn(|_| Channel::new()),
        }
    }

    pub fn get(&self, idx: usize) -> Option<&Channel> {
        self.channels.get(idx)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut Channel> {
        self.channels.get_mut(idx)
    }

    pub fn any_active(&self) -> bool {
        self.channels
            .iter()
            .any(|ch| ch.handler.is_some() && ch.is_active)
    }

    /// Drops every handler reference held by the table
    pub fn detach_all(&mut self) {
        for ch in self.channels.iter_mut() {
            ch.detach();
        }
    }
}

impl Default for ChannelTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod channel_tests {
    use super::*;
    use crate::handler::TransferRequest;

    struct Nop;

    impl TransferHandler for Nop {
        fn handle_transfer(&self, _request: &TransferRequest) -> u32 {
            0
        }
        fn handle_after_transfer(&self, _channel: usize, _transferred: u32, _tc: bool) {}
    }

    #[test]
    fn test_attach_resets_state() {
        let mut ch = Channel::new();
        ch.attach(Arc::new(Nop));
        ch.start();
        ch.capture(0x1234, 0x0010);
        ch.detach();

        ch.attach(Arc::new(Nop));
        assert!(!ch.is_active);
        assert!(!ch.in_progress);
        assert_eq!(ch.saved_addr, 0x0000);
        assert_eq!(ch.saved_count, 0xFFFF);
    }

    #[test]
    fn test_start_forces_recapture() {
        let mut ch = Channel::default();
        assert_eq!((ch.saved_addr, ch.saved_count), (0x0000, 0xFFFF));
        ch.attach(Arc::new(Nop));
        ch.start();
        ch.capture(0x0100, 0x00FF);
        assert!(ch.in_progress);
        ch.start();
        assert!(ch.is_active);
        assert!(!ch.in_progress);
    }

    #[test]
    fn test_active_requires_handler() {
        let mut table = ChannelTable::default();
        assert!(!table.any_active());
        if let Some(ch) = table.get_mut(2) {
            ch.start();
        }
        assert!(!table.any_active());
        if let Some(ch) = table.get_mut(2) {
            ch.attach(Arc::new(Nop));
            ch.start();
        }
        assert!(table.any_active());
        table.detach_all();
        assert!(!table.any_active());
        assert!(table.get(8).is_none());
    }
}
