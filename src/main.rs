//! `bluebox` command line front end
//!
//!   RUST_LOG=bluebox_lib=info bluebox play "555 1234#"
//!   bluebox listen --persistence 2 --seconds 60
//!   bluebox loopback 159D

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use crossbeam_channel::select;

use bluebox_lib::adapters::{loopback, CpalAudioInput, CpalAudioOutput};
use bluebox_lib::dtmf::{parse_symbols, EventBus, ToneRecognizer, ToneSynthesizer};
use bluebox_lib::ports::{AudioInput, AudioOutput, InputFactory, OutputFactory};
use bluebox_lib::profiles::ProfileStore;
use bluebox_lib::{CodecConfig, DtmfResult, DtmfSymbol, ErrorEvent};

/// Frames the loopback device renders per tick
const LOOPBACK_BLOCK_FRAMES: usize = 256;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Load settings from this saved profile
    #[arg(short = 'p', long = "profile")]
    profile: Option<String>,

    /// Directory holding saved profiles
    #[arg(long = "profile-dir", default_value = "profiles")]
    profile_dir: PathBuf,

    /// Tone length in milliseconds
    #[arg(long = "tone-ms")]
    tone_ms: Option<u64>,

    /// Silence between tones in milliseconds
    #[arg(long = "gap-ms")]
    gap_ms: Option<u64>,

    /// Consecutive blocks needed to confirm a symbol
    #[arg(long = "persistence")]
    persistence: Option<usize>,

    /// Minimum bin magnitude for a tone to count
    #[arg(long = "threshold")]
    threshold: Option<f32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Play a dial string on the speaker
    Play {
        digits: String,
        /// Output device name (default device if omitted)
        #[arg(long = "device")]
        device: Option<String>,
    },
    /// Print symbols heard on the microphone
    Listen {
        /// Input device name (default device if omitted)
        #[arg(long = "device")]
        device: Option<String>,
        /// Stop after this many seconds
        #[arg(long = "seconds", default_value_t = 30)]
        seconds: u64,
    },
    /// Synthesize a dial string straight into the recognizer and print what it hears
    Loopback { digits: String },
    /// List audio devices
    Devices,
    /// Save the effective settings as a named profile
    SaveProfile { name: String },
}

fn effective_config(args: &Args) -> DtmfResult<CodecConfig> {
    let mut config = match &args.profile {
        Some(name) => ProfileStore::open(&args.profile_dir)?.load(name)?,
        None => CodecConfig::default(),
    };
    if let Some(tone_ms) = args.tone_ms {
        config.tone_duration_ms = tone_ms;
    }
    if let Some(gap_ms) = args.gap_ms {
        config.intertone_gap_ms = gap_ms;
    }
    if let Some(persistence) = args.persistence {
        config.required_persistence_count = persistence.max(1);
    }
    if let Some(threshold) = args.threshold {
        config.detection_threshold = threshold;
    }
    config.validate()?;
    Ok(config)
}

fn print_symbol(symbol: DtmfSymbol) {
    print!("{symbol}");
    let _ = std::io::stdout().flush();
}

fn play(config: &CodecConfig, digits: &str, device: Option<String>) -> DtmfResult<()> {
    let symbols = parse_symbols(digits)?;
    let errors = EventBus::<ErrorEvent>::new();
    let error_rx = errors.subscribe();

    let factory: OutputFactory = Arc::new(move || {
        let output = match &device {
            Some(name) => CpalAudioOutput::with_device(name.clone()),
            None => CpalAudioOutput::new(),
        };
        Box::new(output) as Box<dyn AudioOutput>
    });

    let mut synth = ToneSynthesizer::new(config, factory, errors.sink());
    synth.play(&symbols, config.tone_duration_ms, config.intertone_gap_ms)?;
    synth.wait();

    for event in error_rx.try_iter() {
        log::error!("{event}");
    }
    Ok(())
}

fn listen(config: &CodecConfig, device: Option<String>, seconds: u64) -> DtmfResult<()> {
    let symbols = EventBus::<DtmfSymbol>::new();
    let errors = EventBus::<ErrorEvent>::new();
    let symbol_rx = symbols.subscribe();
    let error_rx = errors.subscribe();

    let factory: InputFactory = Arc::new(move || {
        let input = match &device {
            Some(name) => CpalAudioInput::with_device(name.clone()),
            None => CpalAudioInput::new(),
        };
        Box::new(input) as Box<dyn AudioInput>
    });

    let mut recognizer = ToneRecognizer::new(config, factory, symbols.sink(), errors.sink());
    let format = recognizer.start()?;
    log::info!("Listening on {} Hz input for {seconds} s", format.sample_rate);

    let deadline = Instant::now() + Duration::from_secs(seconds);
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        select! {
            recv(symbol_rx) -> symbol => {
                if let Ok(symbol) = symbol {
                    print_symbol(symbol);
                }
            }
            recv(error_rx) -> event => {
                if let Ok(event) = event {
                    log::error!("{event}");
                    break;
                }
            }
            default(remaining) => break,
        }
    }
    println!();

    recognizer.stop()
}

fn run_loopback(config: &CodecConfig, digits: &str) -> DtmfResult<()> {
    let symbols = parse_symbols(digits)?;
    let (output, input) = loopback(
        config.sample_rate,
        LOOPBACK_BLOCK_FRAMES,
        config.sample_rate as usize,
    );

    let detected = EventBus::<DtmfSymbol>::new();
    let errors = EventBus::<ErrorEvent>::new();
    let detected_rx = detected.subscribe();

    let mut recognizer =
        ToneRecognizer::new(config, input.factory(), detected.sink(), errors.sink());
    let mut synth = ToneSynthesizer::new(config, output.factory(), errors.sink());

    recognizer.start()?;
    synth.play(&symbols, config.tone_duration_ms, config.intertone_gap_ms)?;
    synth.wait();
    // Let the last blocks drain through the recognizer
    thread::sleep(Duration::from_millis(100));
    recognizer.stop()?;

    let heard: String = detected_rx.try_iter().map(|s| s.to_char()).collect();
    println!("sent:  {digits}");
    println!("heard: {heard}");
    Ok(())
}

fn list_devices() -> DtmfResult<()> {
    let inputs = CpalAudioInput::new().list_devices()?;
    let outputs = CpalAudioOutput::new().list_devices()?;
    for device in inputs.iter().chain(outputs.iter()) {
        println!(
            "{:6} {}{}",
            if device.is_input { "input" } else { "output" },
            device.name,
            if device.is_default { " (default)" } else { "" }
        );
    }
    Ok(())
}

fn run(args: Args) -> DtmfResult<()> {
    let config = effective_config(&args)?;
    match args.command {
        Command::Play { digits, device } => play(&config, &digits, device),
        Command::Listen { device, seconds } => listen(&config, device, seconds),
        Command::Loopback { digits } => run_loopback(&config, &digits),
        Command::Devices => list_devices(),
        Command::SaveProfile { name } => {
            ProfileStore::open(&args.profile_dir)?.save(&name, &config)
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
