use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use squobert_presence::api::ApiServer;
use squobert_presence::config::{SourceConfig, file};
use squobert_presence::source::ScriptedSource;
use squobert_presence::{Config, PresenceEvent, PresenceTracker, TrackerConfig};

/// Squobert presence - debounced face-presence tracking service
#[derive(Parser)]
#[command(name = "squobert-presence", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the tracker and serve the status API (default)
    Serve {
        /// Address to bind, overriding HOST and the config file
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on, overriding PORT and the config file
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run the tracker and print events until interrupted
    Watch,
    /// Replay face counts through the tracker and print the events
    Simulate {
        /// Face count per tick; `x` marks a failed tick (e.g. 0 1 1 1 1 1 0)
        #[arg(required = true)]
        counts: Vec<String>,
        /// Seconds between ticks
        #[arg(long)]
        interval: Option<f64>,
        /// Seconds of sustained faces before a session starts
        #[arg(long)]
        present_delay: Option<f64>,
        /// Seconds of sustained absence before a session ends
        #[arg(long)]
        absent_delay: Option<f64>,
    },
    /// Show the resolved configuration
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,squobert_presence=info",
        1 => "info,squobert_presence=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load()?;

    match cli.command.unwrap_or(Command::Serve {
        host: None,
        port: None,
    }) {
        Command::Serve { host, port } => serve(config, host, port).await,
        Command::Watch => watch(config).await,
        Command::Simulate {
            counts,
            interval,
            present_delay,
            absent_delay,
        } => {
            let tracker = TrackerConfig::from_secs_f64(
                interval.unwrap_or_else(|| config.tracker.poll_interval.as_secs_f64()),
                present_delay.unwrap_or_else(|| config.tracker.present_delay.as_secs_f64()),
                absent_delay.unwrap_or_else(|| config.tracker.absent_delay.as_secs_f64()),
            )?;
            simulate(&counts.join(" "), tracker).await
        }
        Command::Config => {
            show_config(&config);
            Ok(())
        }
    }
}

async fn serve(config: Config, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let source = config.build_source()?;
    let tracker = Arc::new(PresenceTracker::new(source, config.tracker));

    // Fail fast when the detector is unreachable
    tracker.start().await?;

    let host = host.unwrap_or(config.server.host);
    let port = port.unwrap_or(config.server.port);

    let server = ApiServer::new(Arc::clone(&tracker), host, port);
    let result = server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("received shutdown signal");
        })
        .await;

    tracker.stop().await;
    result?;

    tracing::info!("presence service stopped");
    Ok(())
}

async fn watch(config: Config) -> anyhow::Result<()> {
    let source = config.build_source()?;
    let tracker = PresenceTracker::new(source, config.tracker);
    let mut events = tracker.subscribe();

    tracker.start().await?;
    println!("Watching for faces (Ctrl-C to stop)...");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "dropped presence events");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    tracker.stop().await;
    Ok(())
}

async fn simulate(script: &str, config: TrackerConfig) -> anyhow::Result<()> {
    let source: ScriptedSource = script.parse()?;
    let ticks = u32::try_from(source.len()).unwrap_or(u32::MAX);

    let tracker = PresenceTracker::new(source, config);
    let mut events = tracker.subscribe();

    tracker.start().await?;

    // Long enough for every scripted tick, short of the first exhausted one
    let run_for = config.poll_interval.saturating_mul(ticks) - config.poll_interval / 2;
    let deadline = tokio::time::sleep(run_for);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            () = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
        }
    }

    tracker.stop().await;

    let status = tracker.status();
    println!(
        "Finished: present={} face_count={}",
        status.present, status.face_count
    );
    Ok(())
}

fn print_event(event: &PresenceEvent) {
    let at = chrono::Local::now().format("%H:%M:%S%.3f");
    match event {
        PresenceEvent::SessionStart => println!("[{at}] session start"),
        PresenceEvent::SessionEnd => println!("[{at}] session end"),
        PresenceEvent::PresenceChanged { face_count } => {
            println!("[{at}] faces: {face_count}");
        }
    }
}

fn show_config(config: &Config) {
    match file::config_file_path() {
        Some(path) if path.exists() => println!("Config file: {}", path.display()),
        Some(path) => println!("Config file: {} (not found)", path.display()),
        None => println!("Config file: (no config directory)"),
    }

    println!();
    println!("Tracker:");
    println!("  poll interval: {:?}", config.tracker.poll_interval);
    println!("  present delay: {:?}", config.tracker.present_delay);
    println!("  absent delay:  {:?}", config.tracker.absent_delay);

    println!();
    println!("Server:");
    println!("  {}:{}", config.server.host, config.server.port);

    println!();
    match &config.source {
        Some(SourceConfig::Command { program, args }) => {
            println!("Source: command `{program} {}`", args.join(" "));
        }
        Some(SourceConfig::Http { url }) => println!("Source: http {url}"),
        Some(SourceConfig::Scripted { script, looping }) => {
            println!("Source: scripted [{script}] (looping: {looping})");
        }
        None => println!("Source: not configured"),
    }
}
