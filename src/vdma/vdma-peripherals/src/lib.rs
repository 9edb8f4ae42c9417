//! Devices and hardware state for the emulated DMA controller

pub mod fifo;
pub mod isa_dma;
pub mod memory;

pub use fifo::{FifoDevice, FifoStats};
pub use isa_dma::Isa8237;
pub use memory::GuestMemory;
