use crate::constants::mode;

/// Direction of a transfer as seen from memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferType {
    Verify, // No data moves
    Write,  // Device to memory
    Read,   // Memory to device
    Invalid,
}

/// Transfer mode programmed in the channel's mode register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    Demand,
    Single,
    Block,
    Cascade,
}

const TYPES: [TransferType; 4] = [
    TransferType::Verify,
    TransferType::Write,
    TransferType::Read,
    TransferType::Invalid,
];

const MODES: [TransferMode; 4] = [
    TransferMode::Demand,
    TransferMode::Single,
    TransferMode::Block,
    TransferMode::Cascade,
];

impl TransferType {
    pub fn from_mode(mode_reg: u8) -> Self {
        TYPES[(mode_reg & mode::TYPE_MASK) as usize]
    }
}

impl TransferMode {
    pub fn from_mode(mode_reg: u8) -> Self {
        MODES[((mode_reg >> mode::MODE_SHIFT) & mode::MODE_MASK) as usize]
    }
}

/// Everything a handler needs to know to move data for one sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferRequest {
    pub channel: usize,
    pub transfer_type: TransferType,
    pub transfer_mode: TransferMode,
    pub auto_init: bool,
    pub physical_addr: u32,
    pub max_count: u32, // Units the channel can still take
    pub descending: bool,
}

/// Device side of a DMA channel
///
/// Handlers are called from the transfer thread and must return promptly.
/// `handle_transfer` returns the number of units moved, never more than
/// `request.max_count`.
pub trait TransferHandler: Send + Sync {
    fn handle_transfer(&self, request: &TransferRequest) -> u32;
    fn handle_after_transfer(&self, channel: usize, transferred: u32, terminal_count: bool);
}

#[cfg(test)]
mod decode_tests {
    use super::*;

    #[test]
    fn test_type_decoding() {
        assert_eq!(TransferType::from_mode(0x00), TransferType::Verify);
        assert_eq!(TransferType::from_mode(0x45), TransferType::Write);
        assert_eq!(TransferType::from_mode(0x5A), TransferType::Read);
        assert_eq!(TransferType::from_mode(0xFF), TransferType::Invalid);
    }

    #[test]
    fn test_mode_decoding() {
        assert_eq!(TransferMode::from_mode(0x18), TransferMode::Demand);
        assert_eq!(TransferMode::from_mode(mode::MODE_SINGLE), TransferMode::Single);
        assert_eq!(TransferMode::from_mode(mode::MODE_BLOCK | 0x3F), TransferMode::Block);
        assert_eq!(TransferMode::from_mode(mode::MODE_CASCADE), TransferMode::Cascade);
    }
}
