extern crate clap;
use crossbeam_channel::{bounded, Receiver}; // Inter-thread communication
use log::{error, info};
use std::sync::Arc;
use std::time::{Duration, Instant};

// Internal project modules
use vdma_core::constants::{mode, timing, VDM_SERVICES};
use vdma_core::utils::is_word_channel;
use vdma_core::{ControllerConfig, DependencyProvider, DmaController, DmaServices, TransferHandler};
use vdma_peripherals::{FifoDevice, GuestMemory, Isa8237};

// Guest machine layout
pub const GUEST_MEMORY_SIZE: usize = 0x20_0000;
pub const BUFFER_PAGE: u16 = 0x01;

/// Hands the emulated 8237 pair to the controller at init
struct Machine {
    dma: Arc<Isa8237>,
}

impl DependencyProvider for Machine {
    fn get(&self, name: &str) -> Option<Arc<dyn DmaServices>> {
        if name == VDM_SERVICES {
            let services: Arc<dyn DmaServices> = self.dma.clone();
            Some(services)
        } else {
            None
        }
    }
}

/// Configures command-line interface using clap
fn get_cli_config<'a>() -> clap::ArgMatches<'a> {
    let description = "Emulated 8-channel ISA DMA controller";
    clap::App::new("Virtual DMA controller (VDMA)")
        .version("0.1")
        .about(description)
        .arg(
            clap::Arg::with_name("idle-ms")
                .long("idle-ms")
                .takes_value(true)
                .help("Pause between sweeps while channels are active (ms)"),
        )
        .arg(
            clap::Arg::with_name("queue-depth")
                .long("queue-depth")
                .takes_value(true)
                .help("Capacity of the request queue"),
        )
        .subcommand(
            clap::SubCommand::with_name("play")
                .about("Stream a guest buffer into a FIFO device over one channel")
                .arg(
                    clap::Arg::with_name("channel")
                        .long("channel")
                        .takes_value(true)
                        .help("DMA channel (0-7)"),
                )
                .arg(
                    clap::Arg::with_name("length")
                        .long("length")
                        .takes_value(true)
                        .help("Transfer length in units (bytes or words)"),
                )
                .arg(
                    clap::Arg::with_name("burst")
                        .long("burst")
                        .takes_value(true)
                        .help("Units the device accepts per sweep"),
                )
                .arg(
                    clap::Arg::with_name("drain")
                        .long("drain")
                        .takes_value(true)
                        .help("Bytes the device consumes per millisecond"),
                )
                .arg(
                    clap::Arg::with_name("duration-ms")
                        .long("duration-ms")
                        .takes_value(true)
                        .help("Stop an auto-init transfer after this long"),
                )
                .arg(clap::Arg::with_name("auto-init").long("auto-init"))
                .arg(clap::Arg::with_name("descending").long("descending")),
        )
        .get_matches()
}

fn parse_arg<T: std::str::FromStr>(args: &clap::ArgMatches, name: &str, default: T) -> T {
    match args.value_of(name) {
        Some(text) => match text.parse() {
            Ok(value) => value,
            Err(_) => {
                error!("Invalid value '{}' for --{}, using default", text, name);
                default
            }
        },
        None => default,
    }
}

/// Runs one transfer from guest memory into a FIFO device
fn play(
    args: &clap::ArgMatches,
    config: ControllerConfig,
    signal_receiver: &Receiver<()>,
) -> vdma_core::Result<()> {
    let channel: u8 = parse_arg(args, "channel", 1);
    let units: u32 = parse_arg::<u32>(args, "length", 4096).clamp(1, 0x10000);
    let burst: u32 = parse_arg(args, "burst", 64);
    let drain_rate: usize = parse_arg(args, "drain", 8);
    let duration = Duration::from_millis(parse_arg(args, "duration-ms", 2000));
    let auto_init = args.is_present("auto-init");
    let descending = args.is_present("descending");

    let dma = Arc::new(Isa8237::new());
    let memory = Arc::new(GuestMemory::new(GUEST_MEMORY_SIZE));
    let machine = Machine { dma: dma.clone() };
    let mut controller = DmaController::init(&machine, config)?;

    // Fill the guest buffer with a recognizable ramp
    let unit_bytes = if is_word_channel(channel as usize) { 2 } else { 1 };
    let buffer: Vec<u8> = (0..units as usize * unit_bytes).map(|i| i as u8).collect();
    memory.write((BUFFER_PAGE as u32) << 16, &buffer);

    let mut mode_reg = mode::TYPE_READ | mode::MODE_SINGLE;
    if auto_init {
        mode_reg |= mode::AUTO_INIT;
    }
    let mut start = 0x0000u16;
    if descending {
        mode_reg |= mode::DECREMENT;
        start = (units - 1) as u16;
    }
    dma.program_channel(channel as usize, BUFFER_PAGE, start, (units - 1) as u16, mode_reg);
    dma.set_masked(channel as usize, false);

    let device = Arc::new(FifoDevice::new(memory.clone(), burst));
    let handler: Arc<dyn TransferHandler> = device.clone();
    controller.add_handler(channel, Some(handler.clone()))?;
    controller.initiate_transfer(channel, true)?;
    info!(
        "Transfer started on channel {} ({} units, {})",
        channel,
        units,
        if auto_init { "auto-init" } else { "single cycle" }
    );

    // Device loop: consume FIFO data at a fixed rate
    let started = Instant::now();
    let mut tick = Instant::now();
    let mut consumed = 0usize;
    loop {
        if !signal_receiver.is_empty() {
            info!("Interrupted");
            break;
        }

        let elapsed = tick.elapsed();
        if elapsed.as_millis() == 0 {
            std::thread::sleep(Duration::from_micros(1000));
            continue;
        }
        consumed += device.drain(elapsed.as_millis() as usize * drain_rate).len();
        tick = Instant::now();

        let stats = device.stats();
        if !auto_init && stats.terminal_counts > 0 && device.len() == 0 {
            break;
        }
        if auto_init && started.elapsed() >= duration {
            break;
        }
    }

    controller.abort_transfer(channel, true)?;
    controller.remove_handler(channel, Some(handler))?;
    controller.destroy();

    let stats = device.stats();
    let state = dma.channel_state(channel as usize);
    println!(
        "channel {}: {} units in {} bursts, {} terminal count(s), {} bytes consumed in {:?}",
        channel,
        stats.units,
        stats.transfers,
        stats.terminal_counts,
        consumed,
        started.elapsed()
    );
    println!(
        "registers: page/offset = {:04x}/{:04x}, count = {:04x}, status = {:02x}, mask = {:02x}",
        state.page, state.addr, state.count, state.status, state.mask
    );
    Ok(())
}

/// Main entry point for the DMA controller front end
fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Set up Ctrl-C handler with channel communication
    let (signal_sender, signal_receiver) = bounded(1);
    let handler_result = ctrlc::set_handler(move || {
        if signal_sender.is_full() {
            std::process::exit(-1); // Emergency exit if channel blocked
        }
        let _send_result = signal_sender.send(()); // Send shutdown signal
    });

    if let Err(e) = handler_result {
        error!("Signal handler failed: {:?}", e);
        return;
    }

    // Parse command-line arguments
    let cli_matches = get_cli_config();

    let config = ControllerConfig {
        idle_pause: Duration::from_millis(parse_arg(
            &cli_matches,
            "idle-ms",
            timing::DEFAULT_IDLE_PAUSE.as_millis() as u64,
        )),
        request_queue_depth: parse_arg(
            &cli_matches,
            "queue-depth",
            timing::DEFAULT_REQUEST_QUEUE_DEPTH,
        ),
        ..ControllerConfig::default()
    };

    match cli_matches.subcommand() {
        ("play", Some(args)) => {
            if let Err(e) = play(args, config, &signal_receiver) {
                error!("{}", e);
                std::process::exit(1);
            }
        }
        _ => {
            error!("No command specified, try 'play'");
        }
    }
}
