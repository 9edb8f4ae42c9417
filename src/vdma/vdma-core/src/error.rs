use thiserror::Error;

/// Errors reported by the DMA controller to its callers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DmaError {
    #[error("DMA channel {0} is out of range")]
    InvalidChannel(u8),

    #[error("No transfer handler supplied")]
    NullHandler,

    #[error("DMA channel {0} already has a transfer handler")]
    HandlerAlreadyRegistered(u8),

    #[error("DMA channel {0} has no matching transfer handler")]
    HandlerNotRegistered(u8),

    #[error("The dependency module '{0}' is not available")]
    DependencyUnavailable(String),

    #[error("Hardware state fault on DMA channel {channel}: {reason}")]
    GatewayFault { channel: u8, reason: String },

    #[error("Unable to start the transfer thread: {0}")]
    WorkerSpawn(String),
}

pub type Result<T> = core::result::Result<T, DmaError>;

/// Failure raised by a hardware state service while reading or writing a channel
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct GatewayFault(pub String);

impl GatewayFault {
    pub fn new(reason: impl Into<String>) -> Self {
        GatewayFault(reason.into())
    }

    pub fn on_channel(self, channel: u8) -> DmaError {
        DmaError::GatewayFault {
            channel,
            reason: self.0,
        }
    }
}
