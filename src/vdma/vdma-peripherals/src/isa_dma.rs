use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, warn};
use vdma_core::constants::{masks, CHANNELS_PER_CONTROLLER, NUM_DMA_CHANNELS};
use vdma_core::utils::channel_mask;
use vdma_core::{DmaInfo, DmaServices, GatewayFault, UpdateScope};

const NUM_CONTROLLERS: usize = NUM_DMA_CHANNELS / CHANNELS_PER_CONTROLLER;

#[derive(Clone, Copy, Default)]
struct ChannelRegs {
    page: u16,
    addr: u16,
    count: u16,
    mode: u8, // Type in bits 0-1, channel select already stripped
}

#[derive(Clone, Copy)]
struct ControllerRegs {
    status: u8,
    mask: u8,
}

struct Registers {
    channels: [ChannelRegs; NUM_DMA_CHANNELS],
    controllers: [ControllerRegs; NUM_CONTROLLERS],
    faulty: u8, // Channels whose accesses fail
}

/// Register file of the two cascaded 8237 controllers of a PC/AT
/// Channels 0-3 live on the 8-bit controller, 4-7 on the 16-bit one
pub struct Isa8237 {
    regs: Mutex<Registers>,
}

fn controller_of(channel: usize) -> usize {
    channel / CHANNELS_PER_CONTROLLER
}

impl Isa8237 {
    /// All channels come out of reset masked
    pub fn new() -> Self {
        Self {
            regs: Mutex::new(Registers {
                channels: [ChannelRegs::default(); NUM_DMA_CHANNELS],
                controllers: [ControllerRegs {
                    status: 0,
                    mask: masks::STATUS_TC_BITS,
                }; NUM_CONTROLLERS],
                faulty: 0,
            }),
        }
    }

    fn regs(&self) -> MutexGuard<'_, Registers> {
        self.regs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Programs page, base address, count (biased by one) and mode of a channel
    pub fn program_channel(&self, channel: usize, page: u16, addr: u16, count: u16, mode: u8) {
        if channel >= NUM_DMA_CHANNELS {
            warn!("Ignoring programming of unknown DMA channel {}", channel);
            return;
        }
        let mut regs = self.regs();
        regs.channels[channel] = ChannelRegs {
            page,
            addr,
            count,
            mode,
        };
        debug!(
            "DMA channel {} programmed: page/offset = {:04x}/{:04x}, count = {:04x}, mode = {:02x}",
            channel, page, addr, count, mode
        );
    }

    /// Accepts a raw 8237 mode register write (bits 0-1 select the channel)
    pub fn write_mode_register(&self, controller: usize, value: u8) {
        if controller >= NUM_CONTROLLERS {
            return;
        }
        let channel = controller * CHANNELS_PER_CONTROLLER + (value & 0x03) as usize;
        // Transfer type moves from bits 2-3 down to bits 0-1
        self.regs().channels[channel].mode = (value & 0xF0) | ((value >> 2) & 0x03);
    }

    pub fn set_masked(&self, channel: usize, masked: bool) {
        if channel >= NUM_DMA_CHANNELS {
            return;
        }
        let bit = channel_mask(channel);
        let mut regs = self.regs();
        let ctrl = &mut regs.controllers[controller_of(channel)];
        if masked {
            ctrl.mask |= bit;
        } else {
            ctrl.mask &= !bit;
        }
    }

    /// Reads a controller's status register; like the real part this clears the TC bits
    pub fn read_status(&self, controller: usize) -> u8 {
        let mut regs = self.regs();
        match regs.controllers.get_mut(controller) {
            Some(ctrl) => {
                let status = ctrl.status;
                ctrl.status &= !masks::STATUS_TC_BITS;
                status
            }
            None => 0xFF,
        }
    }

    /// Snapshot of a channel without side effects
    pub fn channel_state(&self, channel: usize) -> DmaInfo {
        let regs = self.regs();
        Self::snapshot(&regs, channel % NUM_DMA_CHANNELS)
    }

    /// Makes every access to a channel fail until cleared
    pub fn inject_fault(&self, channel: usize, faulty: bool) {
        let bit = 1u8 << (channel % NUM_DMA_CHANNELS);
        let mut regs = self.regs();
        if faulty {
            regs.faulty |= bit;
        } else {
            regs.faulty &= !bit;
        }
    }

    fn snapshot(regs: &Registers, channel: usize) -> DmaInfo {
        let ch = &regs.channels[channel];
        let ctrl = &regs.controllers[controller_of(channel)];
        DmaInfo {
            page: ch.page,
            addr: ch.addr,
            count: ch.count,
            status: ctrl.status,
            mode: ch.mode,
            mask: ctrl.mask,
        }
    }

    fn check(regs: &Registers, channel: usize) -> Result<(), GatewayFault> {
        if channel >= NUM_DMA_CHANNELS {
            return Err(GatewayFault::new(format!("no such DMA channel {}", channel)));
        }
        if regs.faulty & (1 << channel) != 0 {
            return Err(GatewayFault::new(format!(
                "DMA channel {} registers unavailable",
                channel
            )));
        }
        Ok(())
    }
}

impl Default for Isa8237 {
    fn default() -> Self {
        Self::new()
    }
}

impl DmaServices for Isa8237 {
    fn get_dma_state(&self, channel: usize) -> Result<DmaInfo, GatewayFault> {
        let regs = self.regs();
        Self::check(&regs, channel)?;
        Ok(Self::snapshot(&regs, channel))
    }

    fn set_dma_state(
        &self,
        channel: usize,
        scope: UpdateScope,
        info: &DmaInfo,
    ) -> Result<(), GatewayFault> {
        let mut regs = self.regs();
        Self::check(&regs, channel)?;

        let ctrl = &mut regs.controllers[controller_of(channel)];
        ctrl.status = info.status;
        if scope == UpdateScope::All {
            ctrl.mask = info.mask;
            let ch = &mut regs.channels[channel];
            ch.addr = info.addr;
            ch.count = info.count;
            ch.mode = info.mode;
        }
        Ok(())
    }
}

#[cfg(test)]
mod isa_tests {
    use super::*;
    use vdma_core::constants::mode;

    #[test]
    fn test_reset_state_masked() {
        let dma = Isa8237::default();
        for channel in 0..NUM_DMA_CHANNELS {
            let info = dma.get_dma_state(channel).unwrap();
            assert_ne!(info.mask & channel_mask(channel), 0);
        }
        dma.set_masked(6, false);
        assert_eq!(dma.channel_state(6).mask, 0x0B);
        assert_eq!(dma.channel_state(2).mask, 0x0F);
    }

    #[test]
    fn test_status_only_keeps_registers() {
        let dma = Isa8237::new();
        dma.program_channel(1, 0x03, 0x1000, 0x00FF, mode::TYPE_READ);
        let mut info = dma.get_dma_state(1).unwrap();
        info.status = 0x20;
        info.addr = 0x5555;
        dma.set_dma_state(1, UpdateScope::StatusOnly, &info).unwrap();

        let stored = dma.channel_state(1);
        assert_eq!(stored.status, 0x20);
        assert_eq!(stored.addr, 0x1000);
        // Status is shared by the whole controller
        assert_eq!(dma.channel_state(3).status, 0x20);
        assert_eq!(dma.channel_state(5).status, 0x00);

        dma.set_dma_state(1, UpdateScope::All, &info).unwrap();
        assert_eq!(dma.channel_state(1).addr, 0x5555);
        assert_eq!(dma.channel_state(1).page, 0x03);
    }

    #[test]
    fn test_status_read_clears_tc() {
        let dma = Isa8237::new();
        let mut info = dma.get_dma_state(4).unwrap();
        info.status = 0x31;
        dma.set_dma_state(4, UpdateScope::StatusOnly, &info).unwrap();

        assert_eq!(dma.read_status(1), 0x31);
        assert_eq!(dma.read_status(1), 0x30);
        assert_eq!(dma.read_status(0), 0x00);
    }

    #[test]
    fn test_raw_mode_register() {
        let dma = Isa8237::new();
        // Channel 2, read transfer, auto-init, single mode
        dma.write_mode_register(0, 0x40 | 0x10 | 0x08 | 0x02);
        assert_eq!(
            dma.channel_state(2).mode,
            mode::MODE_SINGLE | mode::AUTO_INIT | mode::TYPE_READ
        );
        // Channel 7, write transfer, decrement
        dma.write_mode_register(1, 0x20 | 0x04 | 0x03);
        assert_eq!(dma.channel_state(7).mode, mode::DECREMENT | mode::TYPE_WRITE);
    }

    #[test]
    fn test_fault_injection() {
        let dma = Isa8237::new();
        dma.inject_fault(3, true);
        assert!(dma.get_dma_state(3).is_err());
        assert!(dma
            .set_dma_state(3, UpdateScope::All, &DmaInfo::default())
            .is_err());
        assert!(dma.get_dma_state(2).is_ok());
        dma.inject_fault(3, false);
        assert!(dma.get_dma_state(3).is_ok());
        assert!(dma.get_dma_state(8).is_err());
    }
}
