//! Emulated 8-channel DMA controller for a virtual machine
//!
//! A dedicated transfer thread polls the virtualized DMA registers, hands
//! eligible channels to their registered transfer handlers and writes the
//! updated register state back. Callers drive it through [`DmaController`].

pub mod channel;
pub mod constants;
pub mod controller;
pub mod error;
pub mod gateway;
pub mod handler;
pub mod scheduler;
pub mod utils;

#[cfg(test)]
mod testing;

pub use controller::{ControllerConfig, DmaController};
pub use error::{DmaError, GatewayFault, Result};
pub use gateway::{DependencyProvider, DmaInfo, DmaServices, UpdateScope};
pub use handler::{TransferHandler, TransferMode, TransferRequest, TransferType};
