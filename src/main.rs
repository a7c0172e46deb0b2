//! EasyDAQ USBDO96 Control CLI
//!
//! Command-line interface for switching the outputs of a USBDO96 card.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeSet;
use std::io::BufRead;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;
use tracing::warn;

use usbdo96::config::ControllerConfig;
use usbdo96::device::{Transport, Usbdo96, find_device, list_devices};
use usbdo96::storage::{self, AppConfig, SavedSession};
use usbdo96::utils::logging;
use usbdo96::utils::parsing::{format_channel_list, parse_channel_list, parse_port};

// =============================================================================
// CLI Arguments
// =============================================================================

/// EasyDAQ USBDO96 Control Tool
#[derive(Parser, Debug)]
#[command(name = "usbdo96-cli")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Serial device (e.g. /dev/ttyUSB0 or COM3). Auto-detected if omitted.
    #[arg(short, long, global = true)]
    device: Option<String>,

    /// Pause after every command, in milliseconds
    #[arg(long, global = true)]
    settle_ms: Option<u64>,

    /// Leave the outputs as set when the tool exits
    #[arg(long, global = true)]
    keep: bool,

    /// Increase log verbosity (-v info, -vv every byte sent)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List connected USBDO96 devices
    List,

    /// Initialize the card (all outputs off, saved outputs forgotten)
    Init,

    /// Turn channels on, e.g. `on 1,3,5-8`
    On {
        /// Channel list
        channels: String,
    },

    /// Turn channels off
    Off {
        /// Channel list
        channels: String,
    },

    /// Turn some channels on and others off in one request
    Set {
        /// Channels to turn on
        #[arg(long, default_value = "")]
        on: String,

        /// Channels to turn off
        #[arg(long, default_value = "")]
        off: String,
    },

    /// Set all 96 outputs to 0 simultaneously
    Reset,

    /// Set all 96 outputs to 1 simultaneously
    SetAll,

    /// Enable outputs
    Enable,

    /// Disable outputs (values are kept)
    Disable,

    /// Read a port register (B, C or D)
    Read {
        /// Port name
        port: String,
    },

    /// Turn channels on and keep them on until Ctrl+C
    Hold {
        /// Channel list
        channels: String,
    },

    /// Apply a saved pattern (channels on, everything else off)
    Pattern {
        /// Pattern name
        name: String,
    },

    /// Save a named pattern
    SavePattern {
        /// Pattern name
        name: String,

        /// Channel list
        channels: String,
    },

    /// Interactive session reading commands from stdin
    Shell,

    /// Show configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration as JSON
    Show,

    /// Print the configuration file path
    Path,

    /// Save the current --device/--settle-ms/--keep options as defaults
    Save,
}

// =============================================================================
// Main
// =============================================================================

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.verbose);

    let mut app = storage::load_config().context("Failed to load configuration")?;
    apply_overrides(&mut app.controller, &args);
    let config = app.controller.clone();

    match args.command {
        Command::List => cmd_list(),
        Command::Init => cmd_init(&config),
        Command::On { channels } => cmd_set(&config, &channels, ""),
        Command::Off { channels } => cmd_set(&config, "", &channels),
        Command::Set { on, off } => cmd_set(&config, &on, &off),
        Command::Reset => with_card(&config, |card| Ok(card.reset_all()?)),
        Command::SetAll => with_card(&config, |card| Ok(card.set_all()?)),
        Command::Enable => with_card(&config, |card| Ok(card.enable()?)),
        Command::Disable => with_card(&config, |card| Ok(card.disable()?)),
        Command::Read { port } => cmd_read(&config, &port),
        Command::Hold { channels } => cmd_hold(&config, &channels),
        Command::Pattern { name } => cmd_pattern(&config, &app, &name),
        Command::SavePattern { name, channels } => cmd_save_pattern(&mut app, &name, &channels),
        Command::Shell => cmd_shell(&config, &app),
        Command::Config { action } => cmd_config(&app, action),
    }
}

fn apply_overrides(config: &mut ControllerConfig, args: &Args) {
    if let Some(device) = &args.device {
        config.device = Some(device.clone());
    }
    if let Some(ms) = args.settle_ms {
        config.settle_delay_ms = ms;
    }
    if args.keep {
        config.reset_on_exit = false;
    }
}

/// Open the card, attaching to the outputs a previous `--keep` run left on.
fn open_card(config: &ControllerConfig) -> Result<Usbdo96> {
    let device = match &config.device {
        Some(device) => device.clone(),
        None => find_device().context("Failed to find USBDO96")?,
    };
    let config = config.clone().with_device(device.clone());

    let saved = match storage::load_session() {
        Ok(session) => session.and_then(|session| session.board_for(&device)),
        Err(e) => {
            warn!(error = %e, "ignoring saved session");
            None
        }
    };

    match saved {
        Some(board) => Usbdo96::resume(&config, board).context("Failed to attach to USBDO96"),
        None => Usbdo96::open(&config).context("Failed to open USBDO96"),
    }
}

/// Close the card and record the outputs it is left driving.
fn finish_card(mut card: Usbdo96, reset: bool) -> Result<()> {
    let session = SavedSession::capture(card.device(), card.board());
    let closed = card.close(reset);

    if reset || closed.is_err() {
        storage::clear_session().context("Failed to clear saved outputs")?;
    } else {
        storage::save_session(&session).context("Failed to save outputs")?;
    }

    closed.context("Failed to close USBDO96")?;
    Ok(())
}

/// Forget the saved outputs after a failed command; the cache may be off.
fn forget_session() {
    if let Err(e) = storage::clear_session() {
        warn!(error = %e, "failed to clear saved outputs");
    }
}

fn with_card<F>(config: &ControllerConfig, action: F) -> Result<()>
where
    F: FnOnce(&mut Usbdo96) -> Result<()>,
{
    let mut card = open_card(config)?;
    if let Err(e) = action(&mut card) {
        forget_session();
        return Err(e);
    }
    print_status(&card);
    finish_card(card, config.reset_on_exit)
}

/// Flag cleared by Ctrl+C.
fn stop_flag() -> Result<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    Ok(running)
}

fn print_status<T: Transport>(card: &Usbdo96<T>) {
    let on = card.channels_on();
    println!(
        "Outputs {} | on: {}",
        if card.is_enabled() { "enabled" } else { "disabled" },
        if on.is_empty() {
            "none".to_string()
        } else {
            format_channel_list(&on)
        }
    );
}

// =============================================================================
// Command Implementations
// =============================================================================

fn cmd_list() -> Result<()> {
    let devices = list_devices().context("Failed to enumerate serial ports")?;

    if devices.is_empty() {
        println!("❌ No USBDO96 devices found.");
        return Ok(());
    }

    println!("🔍 Found {} device(s):\n", devices.len());
    for (i, path) in devices.iter().enumerate() {
        println!("  {}. {}", i + 1, path);
    }

    Ok(())
}

fn cmd_init(config: &ControllerConfig) -> Result<()> {
    let card = Usbdo96::open(config).context("Failed to open USBDO96")?;
    println!("✅ USBDO96 initialized, all outputs off");
    finish_card(card, false)
}

fn cmd_set(config: &ControllerConfig, on: &str, off: &str) -> Result<()> {
    let on = parse_channel_list(on)?;
    let off = parse_channel_list(off)?;

    with_card(config, |card| {
        card.set_channels(&on, &off)
            .context("Failed to set channels")?;
        Ok(())
    })
}

fn cmd_read(config: &ControllerConfig, port: &str) -> Result<()> {
    let port = parse_port(port)?;

    with_card(config, |card| {
        let value = card.read_port(port).context("Failed to read port")?;
        println!("Port {}: {:#04x} ({:08b})", port, value, value);
        Ok(())
    })
}

fn cmd_hold(config: &ControllerConfig, channels: &str) -> Result<()> {
    let channels = parse_channel_list(channels)?;
    let running = stop_flag()?;

    let mut card = open_card(config)?;
    if let Err(e) = card.turn_on(&channels) {
        forget_session();
        return Err(e).context("Failed to turn channels on");
    }

    println!(
        "💡 Holding channels {} on (Ctrl+C to stop)...",
        format_channel_list(&card.channels_on())
    );

    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));
    }

    println!("\n🛑 Stopping...");
    finish_card(card, config.reset_on_exit)
}

fn cmd_pattern(config: &ControllerConfig, app: &AppConfig, name: &str) -> Result<()> {
    let on = app.pattern(name)?;
    let off: BTreeSet<u8> = (1..=usbdo96::protocol::CHANNEL_COUNT)
        .filter(|channel| !on.contains(channel))
        .collect();

    with_card(config, |card| {
        card.set_channels(&on, &off)
            .context("Failed to apply pattern")?;
        Ok(())
    })
}

fn cmd_save_pattern(app: &mut AppConfig, name: &str, channels: &str) -> Result<()> {
    let channels = parse_channel_list(channels)?;
    app.set_pattern(name, &channels)?;
    storage::save_config(app).context("Failed to save configuration")?;
    println!(
        "✅ Pattern '{}' saved: {}",
        name.to_lowercase(),
        format_channel_list(&channels.into_iter().collect::<Vec<_>>())
    );
    Ok(())
}

fn cmd_config(app: &AppConfig, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            println!("{}", serde_json::to_string_pretty(app)?);
        }
        ConfigAction::Path => {
            println!("{}", storage::get_config_path()?.display());
        }
        ConfigAction::Save => {
            storage::save_config(app).context("Failed to save configuration")?;
            println!("✅ Configuration saved to {}", storage::get_config_path()?.display());
        }
    }
    Ok(())
}

// =============================================================================
// Interactive Shell
// =============================================================================

const SHELL_HELP: &str = "\
Commands:
  on <channels>          turn channels on (e.g. on 1,3,5-8)
  off <channels>         turn channels off
  set <on> <off>         both at once, '-' for none
  reset | set-all        all outputs to 0 / 1 simultaneously
  enable | disable       switch the outputs on/off, values are kept
  read <port>            read port B, C or D
  pattern <name>         apply a saved pattern
  status                 show cached outputs
  quit";

fn cmd_shell(config: &ControllerConfig, app: &AppConfig) -> Result<()> {
    let running = stop_flag()?;
    let mut card = open_card(config)?;
    println!("USBDO96 ready. Type 'help' for commands.");

    let lines = spawn_stdin_reader();
    if let Err(e) = run_shell(&mut card, app, &lines, &running) {
        forget_session();
        return Err(e);
    }
    if !running.load(Ordering::SeqCst) {
        println!("\n🛑 Stopping...");
    }

    finish_card(card, config.reset_on_exit)
}

/// Forward stdin lines to a channel so the shell can watch for Ctrl+C
/// while waiting for input.
fn spawn_stdin_reader() -> Receiver<std::io::Result<String>> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Run shell lines until `quit`, end of input or Ctrl+C.
fn run_shell<T: Transport>(
    card: &mut Usbdo96<T>,
    app: &AppConfig,
    lines: &Receiver<std::io::Result<String>>,
    running: &AtomicBool,
) -> Result<()> {
    while running.load(Ordering::SeqCst) {
        let line = match lines.recv_timeout(Duration::from_millis(100)) {
            Ok(line) => line.context("Failed to read stdin")?,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        match run_shell_line(card, app, &line) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => println!("❌ {:#}", e),
        }
    }
    Ok(())
}

/// Run one shell line. Returns `false` when the session should end.
fn run_shell_line<T: Transport>(
    card: &mut Usbdo96<T>,
    app: &AppConfig,
    line: &str,
) -> Result<bool> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let list = |index: usize| -> Result<BTreeSet<u8>> {
        match words.get(index) {
            Some(&"-") | None => Ok(BTreeSet::new()),
            Some(list) => Ok(parse_channel_list(list)?),
        }
    };

    match words.first().copied() {
        None => return Ok(true),
        Some("quit") | Some("exit") => return Ok(false),
        Some("help") => {
            println!("{}", SHELL_HELP);
            return Ok(true);
        }
        Some("on") => card.turn_on(&list(1)?)?,
        Some("off") => card.turn_off(&list(1)?)?,
        Some("set") => card.set_channels(&list(1)?, &list(2)?)?,
        Some("reset") => card.reset_all()?,
        Some("set-all") => card.set_all()?,
        Some("enable") => card.enable()?,
        Some("disable") => card.disable()?,
        Some("read") => {
            let port = parse_port(words.get(1).copied().unwrap_or(""))?;
            let value = card.read_port(port)?;
            println!("Port {}: {:#04x} ({:08b})", port, value, value);
            return Ok(true);
        }
        Some("pattern") => {
            let on = app.pattern(words.get(1).copied().unwrap_or(""))?;
            let off: BTreeSet<u8> = (1..=usbdo96::protocol::CHANNEL_COUNT)
                .filter(|channel| !on.contains(channel))
                .collect();
            card.set_channels(&on, &off)?;
        }
        Some("status") => {}
        Some(other) => anyhow::bail!("Unknown command '{}'. Type 'help'.", other),
    }

    print_status(card);
    Ok(true)
}
