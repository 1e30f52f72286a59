//! Presence Session Agent CLI
//!
//! Correlates radio decodings into ephemeral presence sessions.

use chrono::Local;
use clap::{Parser, Subcommand};
use presence_session_agent::{
    config::Config,
    decoding::RadioDecoding,
    pipeline::SessionPipeline,
    session::SessionSnapshot,
    stats::create_shared_stats_with_persistence,
    VERSION,
};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[cfg(feature = "forward")]
use presence_session_agent::{BlockingForwarder, ForwarderConfig};

#[derive(Parser)]
#[command(name = "presence-session")]
#[command(version = VERSION)]
#[command(about = "Correlates radio decodings into presence sessions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start correlating radio decodings (JSON lines on stdin)
    Start {
        /// RSSI threshold in dBm for session initiation
        #[arg(long)]
        threshold: Option<i16>,

        /// Reinitiation holdoff in milliseconds
        #[arg(long)]
        holdoff_ms: Option<u64>,

        /// Comma-separated whitelisted device ids
        #[arg(long)]
        whitelist: Option<String>,

        /// Enable per-session CSV logging
        #[arg(long)]
        log: bool,

        /// Listen for raddecs over HTTP instead of stdin (requires server feature)
        #[arg(long)]
        port: Option<u16>,

        /// Enable forwarding of emissions to a collector (requires forward feature)
        #[arg(long)]
        forward: bool,

        /// Collector host
        #[arg(long, default_value = "127.0.0.1")]
        forward_host: String,

        /// Collector port
        #[arg(long)]
        forward_port: Option<u16>,

        /// Collector bearer token
        #[arg(long)]
        forward_token: Option<String>,

        /// Forward interval in seconds
        #[arg(long, default_value = "10")]
        forward_interval: u64,
    },

    /// Replay a JSON-lines capture file through the state machine
    Replay {
        /// Capture file, one raddec per line
        file: PathBuf,

        /// Print emissions as JSON instead of summary lines
        #[arg(long)]
        json: bool,
    },

    /// Show cumulative processing status
    Status,

    /// Show configuration
    Config,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            threshold,
            holdoff_ms,
            whitelist,
            log,
            port,
            forward,
            forward_host,
            forward_port,
            forward_token,
            forward_interval,
        } => {
            cmd_start(
                threshold,
                holdoff_ms,
                whitelist,
                log,
                port,
                forward,
                &forward_host,
                forward_port,
                forward_token,
                forward_interval,
            );
        }
        Commands::Replay { file, json } => {
            cmd_replay(&file, json);
        }
        Commands::Status => {
            cmd_status();
        }
        Commands::Config => {
            cmd_config();
        }
    }
}

#[allow(unused_variables)]
#[allow(clippy::too_many_arguments)]
fn cmd_start(
    threshold: Option<i16>,
    holdoff_ms: Option<u64>,
    whitelist: Option<String>,
    log: bool,
    port: Option<u16>,
    enable_forward: bool,
    forward_host: &str,
    forward_port: Option<u16>,
    forward_token: Option<String>,
    forward_interval: u64,
) {
    println!("Presence Session Agent v{VERSION}");
    println!();

    // Load configuration and apply CLI overrides
    let mut config = Config::load().unwrap_or_default();
    if let Some(threshold) = threshold {
        config.rssi_threshold = threshold;
    }
    if let Some(holdoff) = holdoff_ms {
        config.reinitiation_holdoff_ms = holdoff;
    }
    if let Some(ref whitelist) = whitelist {
        config.whitelisted_device_ids = whitelist
            .split(',')
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
    }
    if log {
        config.session_logging_enabled = true;
    }

    if let Err(e) = config.validate() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    println!("Starting correlation...");
    println!("  RSSI threshold: {} dBm", config.rssi_threshold);
    println!(
        "  Reinitiation holdoff: {}ms",
        config.reinitiation_holdoff_ms
    );
    println!(
        "  Whitelisted ids: {}",
        if config.whitelisted_device_ids.is_empty() {
            "none".to_string()
        } else {
            config.whitelisted_device_ids.join(", ")
        }
    );
    println!(
        "  Filter: {}",
        if config.filter.is_empty() {
            "accept-all"
        } else {
            "configured"
        }
    );
    println!(
        "  Session logging: {}",
        if config.session_logging_enabled {
            "enabled"
        } else {
            "disabled"
        }
    );

    // Set up Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    // Serve raddecs over HTTP when requested
    if let Some(port) = port {
        #[cfg(feature = "server")]
        {
            run_server(port, config, running);
            return;
        }
        #[cfg(not(feature = "server"))]
        eprintln!("Warning: --port ignored (server feature not enabled at compile time)");
    }

    // Set up the forwarder
    #[cfg(feature = "forward")]
    let forwarder = if enable_forward {
        match create_forwarder(
            forward_host,
            forward_port,
            forward_token.clone(),
        ) {
            Ok(forwarder) => {
                println!(
                    "  Forwarding: enabled (interval: {}s)",
                    forward_interval
                );
                println!("  Origin ID: {}", forwarder.origin_id());

                match forwarder.test_connection() {
                    Ok(true) => println!("  Collector connection: OK"),
                    Ok(false) => eprintln!("Warning: Collector health check failed"),
                    Err(e) => eprintln!("Warning: Could not connect to collector: {e}"),
                }
                Some(forwarder)
            }
            Err(e) => {
                eprintln!("Warning: Forwarder initialization failed: {e}");
                eprintln!("Continuing without forwarding.");
                None
            }
        }
    } else {
        None
    };

    #[cfg(not(feature = "forward"))]
    if enable_forward {
        eprintln!("Warning: --forward flag ignored (forward feature not enabled at compile time)");
    }

    println!();
    println!("Reading raddecs from stdin. Press Ctrl+C to stop.");
    println!();

    // Persistent stats across runs
    let stats = create_shared_stats_with_persistence(config.data_path.join("stats.json"));

    let mut pipeline = match SessionPipeline::with_stats(&config, stats.clone()) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    #[cfg(feature = "forward")]
    let mut pending_forward: Vec<SessionSnapshot> = Vec::new();
    #[cfg(feature = "forward")]
    let mut last_forward = std::time::Instant::now();

    // Main event loop: one JSON raddec per line
    let stdin = std::io::stdin();
    let mut reader = stdin.lock();
    let mut line = String::new();

    while running.load(Ordering::SeqCst) {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("Error reading stdin: {e}");
                break;
            }
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let raddec: RadioDecoding = match serde_json::from_str(trimmed) {
            Ok(raddec) => raddec,
            Err(e) => {
                eprintln!("Warning: skipping unparseable record: {e}");
                continue;
            }
        };

        if let Some(snapshot) = pipeline.process(raddec) {
            println!("{}", describe(&snapshot));

            #[cfg(feature = "forward")]
            if forwarder.is_some() {
                pending_forward.push(snapshot);
            }
        }

        // Push pending emissions to the collector on the configured interval
        #[cfg(feature = "forward")]
        if let Some(ref forwarder) = forwarder {
            if last_forward.elapsed() >= std::time::Duration::from_secs(forward_interval)
                && !pending_forward.is_empty()
            {
                match forwarder.forward_snapshots(&pending_forward) {
                    Ok(_) => {
                        println!("[Forward] Pushed {} snapshots", pending_forward.len());
                        pending_forward.clear();
                    }
                    Err(e) => {
                        eprintln!("[Forward] Push failed: {e}");
                        // Keep snapshots for retry
                    }
                }
                last_forward = std::time::Instant::now();
            }
        }
    }

    // Final push before exit
    #[cfg(feature = "forward")]
    if let Some(ref forwarder) = forwarder {
        if !pending_forward.is_empty() {
            println!(
                "Pushing remaining {} snapshots to collector...",
                pending_forward.len()
            );
            if let Err(e) = forwarder.forward_snapshots(&pending_forward) {
                eprintln!("[Forward] Final push failed: {e}");
            }
        }
    }

    println!();
    println!("Stopping correlation...");

    // Save stats for `status`
    if let Err(e) = stats.save() {
        eprintln!("Warning: Could not save processing stats: {e}");
    }

    println!();
    println!("{}", stats.summary());
}

#[cfg(feature = "server")]
fn run_server(port: u16, config: Config, running: Arc<AtomicBool>) {
    use presence_session_agent::server::{run, ServerConfig};

    tracing_subscriber::fmt::init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error creating runtime: {e}");
            std::process::exit(1);
        }
    };

    let (addr, shutdown_tx) = match runtime.block_on(run(ServerConfig::new(port, config))) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Error starting server: {e}");
            std::process::exit(1);
        }
    };

    println!();
    println!("Listening for raddecs on http://{addr}/raddec");
    println!("Press Ctrl+C to stop.");

    while running.load(Ordering::SeqCst) {
        std::thread::sleep(std::time::Duration::from_millis(100));
    }

    println!();
    println!("Stopping server...");
    let _ = shutdown_tx.send(());
}

fn cmd_replay(file: &PathBuf, json: bool) {
    let config = Config::load().unwrap_or_default();
    if let Err(e) = config.validate() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    let content = match std::fs::read_to_string(file) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Error reading {file:?}: {e}");
            std::process::exit(1);
        }
    };

    let mut pipeline = match SessionPipeline::new(&config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    for (number, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let raddec: RadioDecoding = match serde_json::from_str(trimmed) {
            Ok(raddec) => raddec,
            Err(e) => {
                eprintln!("Warning: line {}: skipping unparseable record: {e}", number + 1);
                continue;
            }
        };

        // Replay against recorded time, so holdoffs resolve as they did live
        let now = raddec.initial_time;
        if let Some(snapshot) = pipeline.process_at(raddec, now) {
            if json {
                match serde_json::to_string(&snapshot) {
                    Ok(line) => println!("{line}"),
                    Err(e) => eprintln!("Error serializing snapshot: {e}"),
                }
            } else {
                println!("{}", describe(&snapshot));
            }
        }
    }

    println!();
    println!("{}", pipeline.stats().summary());
}

fn cmd_status() {
    let config = Config::load().unwrap_or_default();

    println!("Presence Session Agent Status");
    println!("=============================");
    println!();

    // Show config
    println!("Configuration:");
    println!("  RSSI threshold: {} dBm", config.rssi_threshold);
    println!(
        "  Reinitiation holdoff: {}ms",
        config.reinitiation_holdoff_ms
    );
    println!(
        "  Whitelisted ids: {}",
        config.whitelisted_device_ids.len()
    );
    println!(
        "  Session logging: {}",
        if config.session_logging_enabled {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!();

    // Load and show cumulative stats if available
    let stats_path = config.data_path.join("stats.json");
    if stats_path.exists() {
        if let Ok(content) = std::fs::read_to_string(&stats_path) {
            if let Ok(stats) = serde_json::from_str::<serde_json::Value>(&content) {
                println!("Cumulative Statistics:");
                if let Some(decodings) = stats.get("decodings_processed") {
                    println!("  Decodings processed: {decodings}");
                }
                if let Some(sessions) = stats.get("sessions_started") {
                    println!("  Sessions started: {sessions}");
                }
                if let Some(emissions) = stats.get("emissions") {
                    println!("  Snapshots emitted: {emissions}");
                }
                if let Some(dropped) = stats.get("records_dropped") {
                    println!("  Records dropped: {dropped}");
                }
            }
        }
    } else {
        println!("No previous session data found.");
    }
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

/// One emission as a human-readable line.
fn describe(snapshot: &SessionSnapshot) -> String {
    let nearest = snapshot
        .nearest
        .first()
        .map(|sighting| format!("{} ({} dBm)", sighting.receiver_id, sighting.rssi))
        .unwrap_or_else(|| "no receivers".to_string());

    format!(
        "[{}] session {} instance {} nearest {}",
        Local::now().format("%H:%M:%S"),
        snapshot.session_id,
        snapshot.instance_id,
        nearest
    )
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");
}

/// Create forwarder client from CLI args.
#[cfg(feature = "forward")]
fn create_forwarder(
    host: &str,
    port: Option<u16>,
    token: Option<String>,
) -> Result<BlockingForwarder, presence_session_agent::ForwarderError> {
    use presence_session_agent::ForwarderError;

    let port = port.ok_or_else(|| {
        ForwarderError::Config("--forward-port is required with --forward".to_string())
    })?;
    let token = token.ok_or_else(|| {
        ForwarderError::Config("--forward-token is required with --forward".to_string())
    })?;

    BlockingForwarder::new(ForwarderConfig::new(host, port, token))
}
