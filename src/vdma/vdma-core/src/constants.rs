// Two cascaded controllers with four channels each
pub const NUM_DMA_CHANNELS: usize = 8;
pub const CHANNELS_PER_CONTROLLER: usize = 4;

// Dependency name of the hardware state service
pub const VDM_SERVICES: &str = "VDMSrv";

pub mod masks {
    // Nominally 0x0f, but some games go beyond that
    pub const DMA8_PAGE_MASK: u16 = 0x00FF;
    // 0x7f on pre-386 machines
    pub const DMA16_PAGE_MASK: u16 = 0x00FF;

    pub const DMA8_OFFSET_MASK: u16 = 0xFFFF;
    pub const DMA16_OFFSET_MASK: u16 = 0x7FFF;

    // Status register: TC bits in the low nibble, DREQ bits in the high nibble
    pub const STATUS_TC_BASE: u8 = 0x01;
    pub const STATUS_DREQ_BASE: u8 = 0x10;
    pub const STATUS_TC_BITS: u8 = 0x0F;
}

pub mod mode {
    // Mode register fields
    pub const TYPE_MASK: u8 = 0x03;
    pub const AUTO_INIT: u8 = 0x10;
    pub const DECREMENT: u8 = 0x20;
    pub const MODE_SHIFT: u8 = 6;
    pub const MODE_MASK: u8 = 0x03;

    // Transfer types (bits 0-1)
    pub const TYPE_VERIFY: u8 = 0x00;
    pub const TYPE_WRITE: u8 = 0x01;
    pub const TYPE_READ: u8 = 0x02;

    // Transfer modes (bits 6-7)
    pub const MODE_DEMAND: u8 = 0x00;
    pub const MODE_SINGLE: u8 = 0x40;
    pub const MODE_BLOCK: u8 = 0x80;
    pub const MODE_CASCADE: u8 = 0xC0;
}

pub mod reset {
    // Channel values right after a handler is attached
    pub const ADDR_UNKNOWN: u16 = 0x0000;
    pub const COUNT_UNKNOWN: u16 = 0xFFFF;
}

pub mod timing {
    use core::time::Duration;

    // Not too low for a worker that runs this often
    pub const DEFAULT_IDLE_PAUSE: Duration = Duration::from_millis(15);
    pub const DEFAULT_REQUEST_QUEUE_DEPTH: usize = 256;
}

pub const DEFAULT_THREAD_NAME: &str = "vdma-transfer";

