//! Motion Sensor Agent CLI
//!
//! Records and classifies device motion and orientation events.

use clap::{Parser, Subcommand};
use motion_sensor_agent::{
    config::{Config, SensorSelection},
    core::{RecordingLabels, SessionController},
    device::{generate_subject_id, DeviceTags},
    sensor::{Sample, SensorBus},
    service::collector_service,
    stats::create_shared_stats_with_persistence,
    VERSION,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "motion-sensor")]
#[command(version = VERSION)]
#[command(about = "Record and classify device motion and orientation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay captured sensor events (one JSON event per line)
    Replay {
        /// JSON Lines file of raw events
        input: PathBuf,

        /// Record the events into datasets
        #[arg(long)]
        record: bool,

        /// Classify the events
        #[arg(long)]
        classify: bool,

        /// Participant ID (random if not specified)
        #[arg(long)]
        subject: Option<String>,

        /// Activity label for recorded datasets
        #[arg(long, default_value = "unlabeled")]
        activity: String,

        /// User agent of the capturing device
        #[arg(long)]
        user_agent: Option<String>,

        /// Sensors to use (deviceorientation, devicemotion, or all)
        #[arg(long)]
        sensors: Option<String>,

        /// Upload datasets to the configured backend (requires remote feature)
        #[arg(long)]
        remote: bool,

        /// Pace events by their timestamps
        #[arg(long)]
        realtime: bool,
    },

    /// Serve the HTTP API for device pages (requires server feature)
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "8080")]
        port: u16,

        /// Upload datasets to the configured backend
        #[arg(long)]
        remote: bool,
    },

    /// Show configuration and cumulative statistics
    Status,

    /// Show configuration
    Config,

    /// Print a random participant ID
    Subject,

    /// Show the device tags derived from a user agent
    Device {
        /// User agent string
        user_agent: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            input,
            record,
            classify,
            subject,
            activity,
            user_agent,
            sensors,
            remote,
            realtime,
        } => {
            let options = ReplayOptions {
                record,
                classify,
                subject,
                activity,
                user_agent,
                sensors,
                remote,
                realtime,
            };
            block_on(cmd_replay(&input, options));
        }
        Commands::Serve { port, remote } => {
            cmd_serve(port, remote);
        }
        Commands::Status => {
            cmd_status();
        }
        Commands::Config => {
            cmd_config();
        }
        Commands::Subject => {
            println!("{}", generate_subject_id());
        }
        Commands::Device { user_agent } => {
            cmd_device(&user_agent);
        }
    }
}

/// Run a future on a single-threaded runtime.
fn block_on<F: std::future::Future>(future: F) -> F::Output {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error starting runtime: {e}");
            std::process::exit(1);
        }
    };
    runtime.block_on(future)
}

struct ReplayOptions {
    record: bool,
    classify: bool,
    subject: Option<String>,
    activity: String,
    user_agent: Option<String>,
    sensors: Option<String>,
    remote: bool,
    realtime: bool,
}

async fn cmd_replay(input: &Path, options: ReplayOptions) {
    println!("Motion Sensor Agent v{VERSION}");
    println!();

    if !options.record && !options.classify {
        eprintln!("Error: Nothing to do, pass --record and/or --classify");
        std::process::exit(1);
    }

    // Load or create configuration
    let mut config = Config::load().unwrap_or_default();
    if let Some(ref sensors) = options.sensors {
        config.sensors = SensorSelection::from_csv(sensors);
    }
    if let Err(e) = config.validate() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let events = match read_events(input) {
        Ok(events) => events,
        Err(e) => {
            eprintln!("Error reading {}: {e}", input.display());
            std::process::exit(1);
        }
    };

    let collectors = match collector_service(&config, options.remote) {
        Ok(collectors) => collectors,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let device = options
        .user_agent
        .as_deref()
        .or(config.user_agent.as_deref())
        .map(DeviceTags::from_user_agent)
        .unwrap_or_default();
    let stats = create_shared_stats_with_persistence(config.stats_path());
    let bus = SensorBus::new();
    let mut controller =
        SessionController::from_config(&config, bus.clone(), collectors, device).with_stats(Arc::clone(&stats));

    let subject = options.subject.unwrap_or_else(generate_subject_id);
    println!("Replaying {} event(s) from {}", events.len(), input.display());
    println!("  Participant: {subject}");
    println!("  Activity: {}", options.activity);
    println!(
        "  Datasets: {}",
        if !options.record {
            "disabled".to_string()
        } else if options.remote {
            config.backend_url.clone()
        } else {
            config.export_path.display().to_string()
        }
    );
    println!();

    if options.record {
        if let Err(e) = controller
            .start_recording(RecordingLabels::new(subject, options.activity))
            .await
        {
            eprintln!("Error starting recording: {e}");
            std::process::exit(1);
        }
    }
    if options.classify {
        if let Err(e) = controller.start_classifying().await {
            eprintln!("Error starting classification: {e}");
            let _ = controller.stop_recording().await;
            std::process::exit(1);
        }
    }

    // Set up Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    let mut previous: Option<f64> = None;
    let mut published = 0usize;
    for sample in events {
        if !running.load(Ordering::SeqCst) {
            println!("Interrupted.");
            break;
        }
        if options.realtime {
            if let Some(prev) = previous {
                let gap = (sample.timestamp - prev).max(0.0);
                tokio::time::sleep(Duration::from_secs_f64(gap / 1000.0)).await;
            }
            previous = Some(sample.timestamp);
        }
        bus.publish(sample);
        published += 1;
    }

    // Give the prediction timer one full period over the replayed data
    if options.classify && running.load(Ordering::SeqCst) {
        tokio::time::sleep(config.prediction_interval + Duration::from_millis(50)).await;
    }

    println!("Published {published} event(s)");
    println!();
    println!("Status:");
    println!("{}", controller.status().get());

    if let Err(e) = controller.shutdown().await {
        eprintln!("Error: {e}");
    }

    if let Err(e) = stats.save() {
        eprintln!("Warning: Could not save session stats: {e}");
    }

    println!();
    println!("{}", stats.summary());
}

/// Read one raw event per non-empty line.
fn read_events(path: &Path) -> Result<Vec<Sample>, String> {
    let content = std::fs::read_to_string(path).map_err(|e| e.to_string())?;

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            let event: serde_json::Value =
                serde_json::from_str(line).map_err(|e| format!("line {}: {e}", i + 1))?;
            Sample::from_event(event).map_err(|e| format!("line {}: {e}", i + 1))
        })
        .collect()
}

#[cfg(feature = "server")]
fn cmd_serve(port: u16, remote: bool) {
    use motion_sensor_agent::server::{run, ServerConfig};

    let config = Config::load().unwrap_or_default();
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    block_on(async move {
        let (addr, shutdown_tx, server_task) = match run(ServerConfig::new(port, config, remote)).await {
            Ok(server) => server,
            Err(e) => {
                eprintln!("Error starting server: {e}");
                std::process::exit(1);
            }
        };

        println!("Motion Sensor Agent v{VERSION}");
        println!("Listening on http://{addr}");
        println!("Press Ctrl+C to stop");

        if let Err(e) = tokio::signal::ctrl_c().await {
            eprintln!("Error waiting for Ctrl+C: {e}");
        }
        println!();
        println!("Stopping server...");
        let _ = shutdown_tx.send(());

        if let Err(e) = server_task.await {
            eprintln!("Error stopping server: {e}");
        }
    });
}

#[cfg(not(feature = "server"))]
fn cmd_serve(_port: u16, _remote: bool) {
    eprintln!("Error: serve requires the server feature (build with --features server)");
    std::process::exit(1);
}

fn cmd_status() {
    let config = Config::load().unwrap_or_default();

    println!("Motion Sensor Agent Status");
    println!("==========================");
    println!();

    println!("Configuration:");
    println!(
        "  Orientation: {}",
        if config.sensors.orientation {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!(
        "  Motion: {}",
        if config.sensors.motion {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!("  Backend: {}", config.backend_url);
    println!(
        "  Prediction interval: {}ms",
        config.prediction_interval.as_millis()
    );
    if config.models.is_empty() {
        println!("  Models: none");
    } else {
        for (sensor, path) in &config.models {
            println!("  Model for {sensor}: {path:?}");
        }
    }
    println!();

    // Load and show cumulative stats if available
    let stats_path = config.stats_path();
    if stats_path.exists() {
        if let Ok(content) = std::fs::read_to_string(&stats_path) {
            if let Ok(stats) = serde_json::from_str::<serde_json::Value>(&content) {
                println!("Cumulative Statistics:");
                for key in [
                    "samples_routed",
                    "fields_forwarded",
                    "fields_dropped",
                    "predictions",
                    "datasets_completed",
                ] {
                    if let Some(value) = stats.get(key) {
                        println!("  {}: {value}", key.replace('_', " "));
                    }
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

fn cmd_device(user_agent: &str) {
    let tags = DeviceTags::from_user_agent(user_agent);
    println!("Mobile: {}", tags.mobile.as_deref().unwrap_or("-"));
    println!("Browser: {}", tags.browser.as_deref().unwrap_or("-"));
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    if let Err(e) = ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Warning: Could not set Ctrl+C handler: {e}");
    }
}
