use crate::constants::masks;
use crate::constants::CHANNELS_PER_CONTROLLER;

// Terminal count bit of a channel in its controller's status register
pub fn channel_mask(channel: usize) -> u8 {
    masks::STATUS_TC_BASE << (channel & 0x03)
}

// DREQ bit of a channel in its controller's status register
pub fn dreq_mask(channel: usize) -> u8 {
    masks::STATUS_DREQ_BASE << (channel & 0x03)
}

// Channels 4-7 sit on the 16-bit controller
pub fn is_word_channel(channel: usize) -> bool {
    channel >= CHANNELS_PER_CONTROLLER
}

/// Builds the 24-bit physical address seen by the guest for a channel
/// 16-bit channels address words, so the offset is shifted left by one
pub fn physical_address(channel: usize, page: u16, addr: u16) -> u32 {
    if is_word_channel(channel) {
        (((page & masks::DMA16_PAGE_MASK) as u32) << 16)
            | (((addr & masks::DMA16_OFFSET_MASK) as u32) << 1)
    } else {
        (((page & masks::DMA8_PAGE_MASK) as u32) << 16) | ((addr & masks::DMA8_OFFSET_MASK) as u32)
    }
}

// Moves a 16-bit address register by `units` in the programmed direction
pub fn step_address(addr: u16, units: u32, descending: bool) -> u16 {
    if descending {
        addr.wrapping_sub(units as u16)
    } else {
        addr.wrapping_add(units as u16)
    }
}
