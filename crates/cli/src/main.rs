//! duocall demo runner
//!
//! Runs a caller and a callee against the in-process loopback transport and
//! prints everything a front end would render. Ctrl-C runs the unload
//! teardown on both sides before exiting.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use duocall_client_core::{
    CallClient, CallEvent, CallState, ClientBuilder, ClientConfig, LoopbackHub, MemoryRoleStore,
    NoticeLevel, Role,
};

#[derive(Parser, Debug)]
#[command(name = "duocall", version, about = "Two-party call lifecycle demo")]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "DUOCALL_CONFIG")]
    config: Option<PathBuf>,

    /// Override the caller's well-known endpoint id
    #[arg(long)]
    caller_endpoint: Option<String>,

    /// Seconds before the callee presses "join"
    #[arg(long, default_value = "3")]
    callee_delay: u64,

    /// Run the caller alone and let the countdown expire
    #[arg(long)]
    no_callee: bool,

    /// Seconds to stay connected before the caller hangs up
    #[arg(short, long, default_value = "10")]
    duration: u64,

    /// Override the countdown length in seconds
    #[arg(long)]
    countdown: Option<u32>,

    /// Log filter used when RUST_LOG is not set
    #[arg(short, long, default_value = "duocall=info,duocall_client_core=info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,
}

fn init_logging(args: &Args) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if args.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&Path>) -> Result<ClientConfig> {
    let Some(path) = path else {
        return Ok(ClientConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
}

async fn start_client(hub: &LoopbackHub, config: &ClientConfig, user: &str) -> Result<CallClient> {
    let client = ClientBuilder::new()
        .config(config.clone())
        .transport_provider(Arc::new(hub.transport()))
        .role_store(Arc::new(MemoryRoleStore::with_user(user)))
        .build()
        .await
        .with_context(|| format!("building client for {user}"))?;
    Ok(client)
}

fn render(label: &str, event: &CallEvent) -> Option<String> {
    let line = match event {
        CallEvent::Welcome { user, role } => format!("Welcome, {user} ({role})"),
        CallEvent::Status { text } => text.clone(),
        CallEvent::Notice { level, message } => {
            let tag = match level {
                NoticeLevel::Info => "info",
                NoticeLevel::Warning => "warning",
                NoticeLevel::Fatal => "FATAL",
            };
            format!("[{tag}] {message}")
        }
        CallEvent::Countdown { display: Some(d) } => format!("time left {d}"),
        CallEvent::Countdown { display: None } => "countdown hidden".to_string(),
        CallEvent::RemoteStreamBound { stream, .. } => format!("playing remote stream {}", stream.id),
        CallEvent::NavigateToEntry => "back to entry screen".to_string(),
        CallEvent::StateChanged { previous, current, .. } => format!("{previous:?} -> {current:?}"),
        CallEvent::Controls(_) | CallEvent::LocalMediaReady => return None,
    };
    Some(format!("{label:>6} | {line}"))
}

fn print_events(label: &'static str, mut events: broadcast::Receiver<CallEvent>) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(line) = render(label, &event) {
                        println!("{line}");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => warn!(skipped = n, "Event printer lagged"),
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

async fn run(args: &Args, caller: &CallClient, callee: &CallClient) -> Result<()> {
    caller.initialize().await?;
    callee.initialize().await?;
    caller.start_call().await?;

    if !args.no_callee {
        tokio::time::sleep(Duration::from_secs(args.callee_delay)).await;
        callee.join_call().await?;
    }

    let connected = tokio::select! {
        r = caller.wait_for_state(CallState::Connected) => r.map(|_| true),
        r = caller.wait_for_state(CallState::Expired) => r.map(|_| false),
    }?;
    if !connected {
        info!("Nobody joined, caller expired");
        return Ok(());
    }

    info!(seconds = args.duration, "Call connected");
    tokio::time::sleep(Duration::from_secs(args.duration)).await;
    caller.end_call().await?;
    callee.wait_for_state(CallState::Ended).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    let mut config = load_config(args.config.as_deref())?;
    if let Some(endpoint) = &args.caller_endpoint {
        config = config.with_caller_endpoint(endpoint.clone());
    }
    if let Some(secs) = args.countdown {
        let grace = config.countdown.grace_secs.min(u64::from(secs.saturating_sub(1)));
        config = config.with_countdown(secs, grace);
    }
    config.validate()?;

    info!(
        version = duocall_client_core::VERSION,
        caller = %config.roles.caller,
        callee = %config.roles.callee,
        "Starting duocall demo"
    );

    let hub = LoopbackHub::new();
    let caller = start_client(&hub, &config, &config.roles.caller).await?;
    let callee = start_client(&hub, &config, &config.roles.callee).await?;
    print_events(label(Role::Caller), caller.subscribe_events());
    print_events(label(Role::Callee), callee.subscribe_events());

    let outcome = tokio::select! {
        r = run(&args, &caller, &callee) => r,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, running unload teardown");
            Ok(())
        }
    };

    // Unload hook: both sides tear down before the process exits
    let _ = caller.shutdown().await;
    let _ = callee.shutdown().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    outcome
}

fn label(role: Role) -> &'static str {
    match role {
        Role::Caller => "caller",
        Role::Callee => "callee",
    }
}
