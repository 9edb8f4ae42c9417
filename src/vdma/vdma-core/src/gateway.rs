use std::sync::Arc;

use crate::error::GatewayFault;

/// Register snapshot of one DMA channel as exposed by the hardware state service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DmaInfo {
    pub page: u16,  // High address bits
    pub addr: u16,  // Current address register
    pub count: u16, // Remaining count, biased by one
    pub status: u8, // Controller status (TC and DREQ bits)
    pub mode: u8,   // Channel mode register
    pub mask: u8,   // Controller mask register
}

/// Which part of a snapshot a write back should store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateScope {
    StatusOnly,
    All,
}

/// Read/write access to the virtualized DMA registers
pub trait DmaServices: Send + Sync {
    fn get_dma_state(&self, channel: usize) -> Result<DmaInfo, GatewayFault>;
    fn set_dma_state(
        &self,
        channel: usize,
        scope: UpdateScope,
        info: &DmaInfo,
    ) -> Result<(), GatewayFault>;
}

/// Resolves named modules handed over by the host at initialization
pub trait DependencyProvider {
    fn get(&self, name: &str) -> Option<Arc<dyn DmaServices>>;
}
