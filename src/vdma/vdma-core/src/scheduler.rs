use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::{debug, error, info, warn};

use crate::channel::{Channel, ChannelTable};
use crate::constants::{mode, reset, NUM_DMA_CHANNELS};
use crate::error::GatewayFault;
use crate::gateway::{DmaServices, UpdateScope};
use crate::handler::{TransferHandler, TransferMode, TransferRequest, TransferType};
use crate::utils::{channel_mask, dreq_mask, physical_address, step_address};

/// What a caller asks the transfer thread to do with a channel
pub enum RequestKind {
    Start,
    Stop,
    Attach(Arc<dyn TransferHandler>),
    Detach,
}

impl RequestKind {
    fn name(&self) -> &'static str {
        match self {
            RequestKind::Start => "start",
            RequestKind::Stop => "stop",
            RequestKind::Attach(_) => "attach",
            RequestKind::Detach => "detach",
        }
    }
}

/// Message queued to the transfer thread, consumed exactly once
pub struct Request {
    pub channel: usize,
    pub kind: RequestKind,
    pub ack: Option<Sender<()>>, // Present for synchronous requests
}

enum Incoming {
    Request(Request),
    Quit,
    Empty,
}

/// Transfer thread state: owns the channel table and services it in sweeps
pub struct ChannelScheduler {
    channels: ChannelTable,
    services: Arc<dyn DmaServices>,
    requests: Receiver<Request>,
    shutdown: Receiver<()>,
    idle_pause: Duration,
    pending_acks: Vec<Sender<()>>,
}

impl ChannelScheduler {
    pub fn new(
        services: Arc<dyn DmaServices>,
        requests: Receiver<Request>,
        shutdown: Receiver<()>,
        idle_pause: Duration,
    ) -> Self {
        Self {
            channels: ChannelTable::new(),
            services,
            requests,
            shutdown,
            idle_pause,
            pending_acks: Vec::new(),
        }
    }

    pub fn channel(&self, idx: usize) -> Option<&Channel> {
        self.channels.get(idx)
    }

    /// Main loop of the transfer thread; returns once cancelled
    pub fn run(mut self) {
        info!(
            "Transfer manager thread started ({})",
            std::thread::current().name().unwrap_or("unnamed")
        );

        loop {
            let active = self.sweep();

            // By now DREQ reflects every request applied before this sweep
            self.acknowledge();

            match self.next_request(!active) {
                Incoming::Quit => {
                    info!("Transfer manager thread cancelled");
                    break;
                }
                Incoming::Request(request) => self.apply(request),
                Incoming::Empty => {}
            }
        }

        self.channels.detach_all();
    }

    /// Services every channel once; returns whether any channel is still active
    pub fn sweep(&mut self) -> bool {
        for idx in 0..NUM_DMA_CHANNELS {
            if let Err(fault) = self.service_channel(idx) {
                error!("TransferData: {}", fault.on_channel(idx as u8));
            }
        }
        self.channels.any_active()
    }

    fn service_channel(&mut self, idx: usize) -> Result<(), GatewayFault> {
        let channel = match self.channels.get_mut(idx) {
            Some(ch) => ch,
            None => return Ok(()),
        };
        // No one registered with this channel, don't touch it
        let handler = match &channel.handler {
            Some(handler) => Arc::clone(handler),
            None => return Ok(()),
        };

        let mut info = self.services.get_dma_state(idx)?;
        let ch_mask = channel_mask(idx);
        let dreq = dreq_mask(idx);

        if !channel.is_active {
            if info.status & dreq != 0 {
                debug!("Deasserting DREQ on (now inactive) DMA channel {}", idx);
            }
            info.status &= !dreq;
            return self
                .services
                .set_dma_state(idx, UpdateScope::StatusOnly, &info);
        }

        debug!(
            "Polling (active) DMA channel {}: page/offset = {:04x}/{:04x}, count = {:04x} ; status = {:02x}, mode = {:02x}, mask = {:02x}",
            idx, info.page, info.addr, info.count, info.status, info.mode, info.mask
        );

        info.status |= dreq;

        if info.mask & ch_mask != 0 {
            // Masked: advertise the request but leave the transfer alone
            return self
                .services
                .set_dma_state(idx, UpdateScope::StatusOnly, &info);
        }

        if !channel.in_progress {
            channel.capture(info.addr, info.count);
        }

        let auto_init = info.mode & mode::AUTO_INIT != 0;
        let descending = info.mode & mode::DECREMENT != 0;
        let max_count = info.count as u32 + 1;

        let request = TransferRequest {
            channel: idx,
            transfer_type: TransferType::from_mode(info.mode),
            transfer_mode: TransferMode::from_mode(info.mode),
            auto_init,
            physical_addr: physical_address(idx, info.page, info.addr),
            max_count,
            descending,
        };

        let transferred = handler.handle_transfer(&request);
        assert!(
            transferred <= max_count,
            "DMA handler on channel {} moved {} units, only {} were offered",
            idx,
            transferred,
            max_count
        );

        if transferred == 0 {
            return Ok(());
        }

        let terminal_count = transferred > info.count as u32;
        if terminal_count {
            info.status |= ch_mask;

            if auto_init {
                info.addr = channel.saved_addr;
                info.count = channel.saved_count;
            } else {
                info.status &= !dreq;
                info.addr = step_address(info.addr, transferred, descending);
                info.count = reset::COUNT_UNKNOWN;

                let expected =
                    step_address(channel.saved_addr, channel.saved_count as u32 + 1, descending);
                if info.addr != expected {
                    warn!(
                        "DMA channel {} ended at {:04x}, expected {:04x}",
                        idx, info.addr, expected
                    );
                }

                channel.stop();
            }
        } else {
            info.addr = step_address(info.addr, transferred, descending);
            info.count = info.count.wrapping_sub(transferred as u16);
        }

        self.services.set_dma_state(idx, UpdateScope::All, &info)?;
        handler.handle_after_transfer(idx, transferred, terminal_count);
        Ok(())
    }

    /// Applies a caller request to the channel table
    pub fn apply(&mut self, request: Request) {
        let Request { channel, kind, ack } = request;

        match self.channels.get_mut(channel) {
            Some(ch) => {
                debug!(
                    "Received DMA {} request ({}) on {} channel {}",
                    kind.name(),
                    if ack.is_some() { "synchronous" } else { "asynchronous" },
                    if ch.is_active { "active" } else { "inactive" },
                    channel
                );
                match kind {
                    RequestKind::Start if ch.handler.is_none() => {
                        warn!("Ignoring start on DMA channel {} without a handler", channel)
                    }
                    RequestKind::Start => ch.start(),
                    RequestKind::Stop => ch.stop(),
                    RequestKind::Attach(handler) => ch.attach(handler),
                    RequestKind::Detach => ch.detach(),
                }
            }
            None => warn!("Dropping {} request for DMA channel {}", kind.name(), channel),
        }

        if let Some(ack) = ack {
            self.pending_acks.push(ack);
        }
    }

    fn acknowledge(&mut self) {
        for ack in self.pending_acks.drain(..) {
            // The waiter may have given up already
            let _ = ack.try_send(());
        }
    }

    // Blocks only when nothing needs servicing
    fn next_request(&self, idle: bool) -> Incoming {
        match self.shutdown.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => return Incoming::Quit,
            Err(TryRecvError::Empty) => {}
        }

        if idle {
            return crossbeam_channel::select! {
                recv(self.shutdown) -> _ => Incoming::Quit,
                recv(self.requests) -> msg => match msg {
                    Ok(request) => Incoming::Request(request),
                    Err(_) => Incoming::Quit,
                },
            };
        }

        match self.requests.try_recv() {
            Ok(request) => Incoming::Request(request),
            Err(TryRecvError::Disconnected) => Incoming::Quit,
            Err(TryRecvError::Empty) => match self.shutdown.recv_timeout(self.idle_pause) {
                Err(RecvTimeoutError::Timeout) => Incoming::Empty,
                _ => Incoming::Quit,
            },
        }
    }
}
