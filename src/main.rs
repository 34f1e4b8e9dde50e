//! Troublewatch CLI
//!
//! Join a room, watch your own feed for sustained distress, and see who else
//! in the room is troubled.

use clap::{Parser, Subcommand};
use crossbeam_channel::{unbounded, Receiver};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use troublewatch::{
    camera::{FrameSource, SilentFrameSource, StillFrameSource},
    channel::{HttpChannel, HttpChannelConfig, PresenceChannel},
    classify::{BlockingClassifier, ClassifierConfig},
    config::Config,
    session::{self, SessionNotice},
    VERSION,
};

#[derive(Parser)]
#[command(name = "troublewatch")]
#[command(version = VERSION)]
#[command(about = "Room presence agent with distress flagging", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Join a room and start watching
    Join {
        /// Room to join
        room: String,

        /// Participant name (defaults to a hostname-derived identity)
        #[arg(long)]
        name: Option<String>,

        /// Presence authority base URL (defaults to configuration)
        #[arg(long)]
        server: Option<String>,

        /// Classifier base URL (defaults to configuration)
        #[arg(long)]
        classifier: Option<String>,

        /// Transport: "stream" (request/stream hybrid) or "socket"
        #[arg(long, default_value = "stream")]
        transport: String,

        /// Path to a JPEG still re-read on every sampling tick
        #[arg(long)]
        frame: Option<PathBuf>,

        /// Stability window capacity
        #[arg(long)]
        window: Option<usize>,

        /// Distress confirmation window in milliseconds
        #[arg(long)]
        confirm_ms: Option<u64>,

        /// Sampling period in milliseconds
        #[arg(long)]
        sample_ms: Option<u64>,
    },

    /// Run the reference presence authority
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "8080")]
        port: u16,
    },

    /// Show configuration
    Config,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("troublewatch=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Join {
            room,
            name,
            server,
            classifier,
            transport,
            frame,
            window,
            confirm_ms,
            sample_ms,
        } => {
            cmd_join(
                &room, name, server, classifier, &transport, frame, window, confirm_ms, sample_ms,
            );
        }
        Commands::Serve { port } => {
            cmd_serve(port);
        }
        Commands::Config => {
            cmd_config();
        }
    }
}

enum UiCommand {
    Resolve,
    Quit,
}

#[allow(clippy::too_many_arguments)]
fn cmd_join(
    room: &str,
    name: Option<String>,
    server: Option<String>,
    classifier_url: Option<String>,
    transport: &str,
    frame: Option<PathBuf>,
    window: Option<usize>,
    confirm_ms: Option<u64>,
    sample_ms: Option<u64>,
) {
    println!("Troublewatch v{VERSION}");
    println!();

    // Load or create configuration, then apply flag overrides
    let mut config = Config::load().unwrap_or_default();
    if let Some(window) = window {
        config.window_capacity = window;
    }
    if let Some(ms) = confirm_ms {
        config.confirm_after = Duration::from_millis(ms);
    }
    if let Some(ms) = sample_ms {
        config.sample_period = Duration::from_millis(ms);
    }
    if let Some(server) = server {
        config.authority_url = server;
    }
    if let Some(url) = classifier_url {
        config.classifier_url = url;
    }
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let name = name.unwrap_or_else(default_identity);

    println!("Joining room '{room}' as '{name}'");
    println!("  Authority: {}", config.authority_url);
    println!("  Classifier: {}", config.classifier_url);
    println!("  Transport: {transport}");
    println!(
        "  Window: {} labels, confirm after {}ms, sample every {}ms",
        config.window_capacity,
        config.confirm_after.as_millis(),
        config.sample_period.as_millis()
    );

    // Classifier client
    let classifier = match BlockingClassifier::new(ClassifierConfig::new(&config.classifier_url)) {
        Ok(classifier) => {
            match classifier.test_connection() {
                Ok(true) => println!("  Classifier connection: OK"),
                Ok(false) => eprintln!("Warning: Classifier health check failed"),
                Err(e) => eprintln!("Warning: Could not reach classifier: {e}"),
            }
            classifier
        }
        Err(e) => {
            eprintln!("Error creating classifier client: {e}");
            std::process::exit(1);
        }
    };

    // Frame source
    let frames: Box<dyn FrameSource> = match frame {
        Some(path) => {
            println!("  Frames: {}", path.display());
            Box::new(StillFrameSource::new(path))
        }
        None => {
            println!("  Frames: none configured; every tick will skip (--frame <path>)");
            Box::new(SilentFrameSource)
        }
    };

    // Presence channel
    let channel: Box<dyn PresenceChannel> = match transport {
        "stream" => {
            match HttpChannel::connect(HttpChannelConfig::new(&config.authority_url), room, &name)
            {
                Ok(channel) => Box::new(channel),
                Err(e) => {
                    eprintln!("Error connecting to presence authority: {e}");
                    std::process::exit(1);
                }
            }
        }
        "socket" => match connect_socket(&config.authority_url, room, &name) {
            Ok(channel) => channel,
            Err(e) => {
                eprintln!("Error connecting to presence authority: {e}");
                std::process::exit(1);
            }
        },
        other => {
            eprintln!("Error: Unknown transport '{other}' (expected 'stream' or 'socket')");
            std::process::exit(1);
        }
    };

    println!();
    println!("Type 'resolve' to clear your trouble flag, 'quit' or Ctrl+C to leave");
    println!();

    let handle = session::spawn(name.clone(), config.clone(), Box::new(classifier), frames, channel);
    let notices = handle.notices();

    // Set up Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc_handler(r);

    let commands = stdin_commands();

    // Main display loop
    while running.load(Ordering::SeqCst) {
        match commands.recv_timeout(Duration::from_millis(100)) {
            Ok(UiCommand::Resolve) => handle.resolve(),
            Ok(UiCommand::Quit) => break,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }

        while let Ok(notice) = notices.try_recv() {
            print_notice(&name, &notice);
        }
    }

    println!();
    println!("Leaving room...");
    let stats = handle.stats();
    handle.shutdown();

    // Keep the last session's counters next to the rest of the state
    let snapshot = stats.snapshot();
    let stats_path = config.data_path.join("last_session.json");
    match serde_json::to_string_pretty(&snapshot) {
        Ok(json) => {
            if let Err(e) = std::fs::write(&stats_path, json) {
                eprintln!("Warning: Could not write session stats: {e}");
            }
        }
        Err(e) => eprintln!("Warning: Could not serialize session stats: {e}"),
    }

    println!();
    println!("{}", stats.summary());
}

fn print_notice(own_name: &str, notice: &SessionNotice) {
    match notice {
        SessionNotice::StableChanged(label) => {
            println!("Current expression: {label}");
        }
        SessionNotice::TroubleReported => {
            println!("⚠ Your sustained distress was reported to the room (type 'resolve' to clear)");
        }
        SessionNotice::TroubleResolved => {
            println!("Your trouble flag was cleared");
        }
        SessionNotice::MemberTroubled(user) => {
            if user != own_name {
                println!("⚠ {user} is troubled!");
            }
        }
        SessionNotice::MemberResolved(user) => {
            if user != own_name {
                println!("{user} resolved their trouble");
            }
        }
        SessionNotice::RosterUpdated(members) => {
            let listing: Vec<String> = members
                .iter()
                .map(|m| {
                    if m.troubled {
                        format!("{}⚠", m.user)
                    } else {
                        m.user.clone()
                    }
                })
                .collect();
            println!("Room members: {}", listing.join(", "));
        }
        SessionNotice::ChannelDown(reason) => {
            eprintln!("Connection problem: {reason} (membership may be stale)");
        }
    }
}

#[cfg(feature = "ws")]
fn connect_socket(
    authority_url: &str,
    room: &str,
    name: &str,
) -> Result<Box<dyn PresenceChannel>, troublewatch::ChannelError> {
    let ws_url = authority_url
        .replacen("https://", "wss://", 1)
        .replacen("http://", "ws://", 1);
    troublewatch::WsChannel::connect(&ws_url, room, name)
        .map(|c| Box::new(c) as Box<dyn PresenceChannel>)
}

#[cfg(not(feature = "ws"))]
fn connect_socket(
    _authority_url: &str,
    _room: &str,
    _name: &str,
) -> Result<Box<dyn PresenceChannel>, troublewatch::ChannelError> {
    Err(troublewatch::ChannelError::Connect(
        "socket transport not compiled in (rebuild with --features ws)".to_string(),
    ))
}

#[cfg(feature = "authority")]
fn cmd_serve(port: u16) {
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error creating runtime: {e}");
            std::process::exit(1);
        }
    };

    runtime.block_on(async {
        let config = troublewatch::authority::AuthorityConfig::new(port);
        match troublewatch::authority::run(config).await {
            Ok((addr, shutdown_tx)) => {
                println!("Presence authority listening on http://{addr}");
                println!("Press Ctrl+C to stop");
                let _ = tokio::signal::ctrl_c().await;
                let _ = shutdown_tx.send(());
            }
            Err(e) => {
                eprintln!("Error starting authority: {e}");
                std::process::exit(1);
            }
        }
    });
}

#[cfg(not(feature = "authority"))]
fn cmd_serve(_port: u16) {
    eprintln!("Error: authority server not compiled in (rebuild with --features authority)");
    std::process::exit(1);
}

fn cmd_config() {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

/// Hostname-derived fallback identity.
fn default_identity() -> String {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "guest".to_string());
    format!("{}-{}", host, &uuid::Uuid::new_v4().to_string()[..4])
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");
}

/// Forward stdin lines as UI commands.
fn stdin_commands() -> Receiver<UiCommand> {
    let (tx, rx) = unbounded();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            match stdin.read_line(&mut line) {
                Ok(0) | Err(_) => return,
                Ok(_) => match line.trim() {
                    "resolve" | "r" => {
                        if tx.send(UiCommand::Resolve).is_err() {
                            return;
                        }
                    }
                    "quit" | "q" => {
                        let _ = tx.send(UiCommand::Quit);
                        return;
                    }
                    "" => {}
                    other => println!("Unknown command '{other}' (try 'resolve' or 'quit')"),
                },
            }
        }
    });
    rx
}
