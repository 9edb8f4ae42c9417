use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{error, info, warn};
use thread_priority::{set_current_thread_priority, ThreadPriority};

use crate::constants::{timing, DEFAULT_THREAD_NAME, NUM_DMA_CHANNELS, VDM_SERVICES};
use crate::error::{DmaError, Result};
use crate::gateway::{DependencyProvider, DmaServices};
use crate::handler::TransferHandler;
use crate::scheduler::{ChannelScheduler, Request, RequestKind};

/// Caller-side view of a channel registration
enum Slot {
    Registered(Arc<dyn TransferHandler>),
    Removing(Arc<dyn TransferHandler>), // Reserved until the detach is acknowledged
}

type HandlerSlots = [Option<Slot>; NUM_DMA_CHANNELS];

/// Tunables of the transfer thread
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub idle_pause: Duration,        // Pause between sweeps while channels are active
    pub request_queue_depth: usize,  // Capacity of the request queue
    pub thread_name: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            idle_pause: timing::DEFAULT_IDLE_PAUSE,
            request_queue_depth: timing::DEFAULT_REQUEST_QUEUE_DEPTH,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }
}

/// Thread-safe front of the emulated 8-channel DMA controller
///
/// Callers never touch channel state directly. Every operation is turned
/// into a request for the transfer thread, which owns the channel table.
/// Synchronous operations return once the transfer thread has completed a
/// full sweep with the request applied.
pub struct DmaController {
    handlers: Mutex<HandlerSlots>, // Registration table used for validation
    requests: Sender<Request>,
    shutdown: Sender<()>,
    worker: Option<JoinHandle<()>>,
    services: Option<Arc<dyn DmaServices>>,
}

// Data pointer identity, vtables may differ between codegen units
fn same_handler(a: &Arc<dyn TransferHandler>, b: &Arc<dyn TransferHandler>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

impl DmaController {
    /// Resolves the hardware state service from the host and starts the transfer thread
    pub fn init(provider: &dyn DependencyProvider, config: ControllerConfig) -> Result<Self> {
        let services = provider
            .get(VDM_SERVICES)
            .ok_or_else(|| DmaError::DependencyUnavailable(VDM_SERVICES.to_string()))?;
        Self::with_services(services, config)
    }

    /// Starts the transfer thread on an already resolved hardware state service
    pub fn with_services(services: Arc<dyn DmaServices>, config: ControllerConfig) -> Result<Self> {
        let (requests, requests_rx) = bounded(config.request_queue_depth.max(1));
        let (shutdown, shutdown_rx) = bounded(1);

        let scheduler = ChannelScheduler::new(
            Arc::clone(&services),
            requests_rx,
            shutdown_rx,
            config.idle_pause,
        );

        let worker = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || {
                // Best effort, unprivileged hosts may refuse
                if let Err(e) = set_current_thread_priority(ThreadPriority::Max) {
                    warn!("Transfer thread keeps default priority: {:?}", e);
                }
                scheduler.run()
            })
            .map_err(|e| DmaError::WorkerSpawn(e.to_string()))?;

        info!("TransferMgr initialized");

        Ok(Self {
            handlers: Mutex::new(Default::default()),
            requests,
            shutdown,
            worker: Some(worker),
            services: Some(services),
        })
    }

    fn slots(&self) -> MutexGuard<'_, HandlerSlots> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_channel(channel: u8) -> Result<usize> {
        let idx = channel as usize;
        if idx >= NUM_DMA_CHANNELS {
            return Err(DmaError::InvalidChannel(channel));
        }
        Ok(idx)
    }

    fn registered(&self, channel: u8) -> Result<usize> {
        let idx = Self::check_channel(channel)?;
        match self.slots()[idx] {
            Some(Slot::Registered(_)) => Ok(idx),
            _ => Err(DmaError::HandlerNotRegistered(channel)),
        }
    }

    /// Registers the device side of a channel; the channel starts out idle
    pub fn add_handler(
        &self,
        channel: u8,
        handler: Option<Arc<dyn TransferHandler>>,
    ) -> Result<()> {
        let idx = Self::check_channel(channel)?;
        let handler = handler.ok_or(DmaError::NullHandler)?;

        let mut slots = self.slots();
        if slots[idx].is_some() {
            return Err(DmaError::HandlerAlreadyRegistered(channel));
        }
        slots[idx] = Some(Slot::Registered(Arc::clone(&handler)));

        // Queued under the lock so a concurrent removal cannot overtake it
        self.deliver(idx, RequestKind::Attach(handler), false, "AddDMAHandler");
        Ok(())
    }

    /// Aborts any transfer on the channel, then forgets its handler
    pub fn remove_handler(
        &self,
        channel: u8,
        handler: Option<Arc<dyn TransferHandler>>,
    ) -> Result<()> {
        let idx = Self::check_channel(channel)?;
        let handler = handler.ok_or(DmaError::NullHandler)?;

        {
            let mut slots = self.slots();
            match slots[idx].take() {
                Some(Slot::Registered(current)) if same_handler(&current, &handler) => {
                    slots[idx] = Some(Slot::Removing(current));
                }
                other => {
                    slots[idx] = other;
                    return Err(DmaError::HandlerNotRegistered(channel));
                }
            }
        }

        self.post(idx, RequestKind::Stop, true, "AbortTransfer");
        self.deliver(idx, RequestKind::Detach, true, "RemoveDMAHandler");

        let mut slots = self.slots();
        if let Some(Slot::Removing(current)) = &slots[idx] {
            if same_handler(current, &handler) {
                slots[idx] = None;
            }
        }
        Ok(())
    }

    /// Asks the transfer thread to start servicing a channel
    pub fn initiate_transfer(&self, channel: u8, synchronous: bool) -> Result<()> {
        let idx = self.registered(channel)?;
        self.post(idx, RequestKind::Start, synchronous, "InitiateTransfer");
        Ok(())
    }

    /// Asks the transfer thread to stop servicing a channel
    pub fn abort_transfer(&self, channel: u8, synchronous: bool) -> Result<()> {
        let idx = self.registered(channel)?;
        self.post(idx, RequestKind::Stop, synchronous, "AbortTransfer");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    // Fire-and-forget: a full queue is logged, never reported to the caller
    fn post(&self, channel: usize, kind: RequestKind, synchronous: bool, operation: &str) {
        let (ack, done) = Self::ack_pair(synchronous);
        match self.requests.try_send(Request { channel, kind, ack }) {
            Ok(()) => Self::wait(done, channel, operation),
            Err(e) => error!(
                "{}: Error encountered while posting request for channel {}: {}",
                operation, channel, e
            ),
        }
    }

    // Registration changes must not be dropped, so these wait for queue space
    fn deliver(&self, channel: usize, kind: RequestKind, synchronous: bool, operation: &str) {
        let (ack, done) = Self::ack_pair(synchronous);
        match self.requests.send(Request { channel, kind, ack }) {
            Ok(()) => Self::wait(done, channel, operation),
            Err(e) => error!(
                "{}: Error encountered while posting request for channel {}: {}",
                operation, channel, e
            ),
        }
    }

    fn ack_pair(synchronous: bool) -> (Option<Sender<()>>, Option<Receiver<()>>) {
        if synchronous {
            let (tx, rx) = bounded(1);
            (Some(tx), Some(rx))
        } else {
            (None, None)
        }
    }

    fn wait(done: Option<Receiver<()>>, channel: usize, operation: &str) {
        if let Some(done) = done {
            if done.recv().is_err() {
                warn!(
                    "{}: transfer thread exited before acknowledging channel {}",
                    operation, channel
                );
            }
        }
    }

    /// Stops the transfer thread and releases every handler and the hardware state service
    pub fn destroy(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = self.shutdown.try_send(());
            if worker.join().is_err() {
                error!("Transfer manager thread terminated abnormally");
            }
        }

        for slot in self.slots().iter_mut() {
            *slot = None;
        }

        if self.services.take().is_some() {
            info!("TransferMgr released");
        }
    }
}

impl Drop for DmaController {
    fn drop(&mut self) {
        self.destroy();
    }
}
