// rtcsignal: signaling inspection CLI
//
// Runs an in-process offer/answer exchange between two simulated peers,
// decodes wire envelopes, and manages the session configuration.

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use rtcsignal_core::signaling::{Inbound, SignalingMessage};
use rtcsignal_core::{
    ChannelDelegate, OutboundSignal, PeerConnectionManager, PeerConnectionState, Role,
    SimulatedEngineFactory, WireMessage,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

#[derive(Parser)]
#[command(name = "rtcsignal")]
#[command(about = "JSEP signaling orchestration toolkit", long_about = None)]
#[command(version)]
struct Cli {
    /// Use this config file instead of the platform default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Negotiate between two simulated peers and print every message
    Demo {
        /// Override the configured candidates per gathering round
        #[arg(short, long)]
        candidates: Option<usize>,
    },
    /// Decode and validate a JSON signaling envelope
    Decode { json: String },
    /// Configure settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the whole configuration as JSON
    Show,
    /// Write the default configuration
    Init {
        #[arg(long)]
        force: bool,
    },
    Set { key: String, value: String },
    Get { key: String },
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    rtcsignal_core::init_logging(if cli.verbose { "debug" } else { "warn" });

    let config_path = match cli.config {
        Some(path) => path,
        None => config::Config::config_file()?,
    };

    match cli.command {
        Commands::Demo { candidates } => cmd_demo(&config_path, candidates).await,
        Commands::Decode { json } => cmd_decode(&json),
        Commands::Config { action } => cmd_config(&config_path, action),
    }
}

async fn cmd_demo(config_path: &Path, candidates: Option<usize>) -> Result<()> {
    let config = config::Config::load_from(config_path)?;
    let per_round = candidates.unwrap_or(config.demo.candidates_per_round);
    let factory = SimulatedEngineFactory::new(per_round);

    let mut alice_config = config.session.clone();
    alice_config.role = Role::Initiator;
    let mut bob_config = config.session.clone();
    bob_config.role = Role::Responder;

    let (alice_delegate, alice_out) = ChannelDelegate::new();
    let (bob_delegate, bob_out) = ChannelDelegate::new();
    let alice = Arc::new(
        PeerConnectionManager::new(&factory, alice_config, Arc::new(alice_delegate))
            .context("Failed to create alice")?,
    );
    let bob = Arc::new(
        PeerConnectionManager::new(&factory, bob_config, Arc::new(bob_delegate))
            .context("Failed to create bob")?,
    );

    println!("{}", "Signaling demo".bold());
    println!("  alice {} ({})", alice.id().dimmed(), alice.role());
    println!("  bob   {} ({})", bob.id().dimmed(), bob.role());
    println!();

    let alice_events = alice.spawn_event_loop();
    let bob_events = bob.spawn_event_loop();
    let to_bob = tokio::spawn(forward("alice", "bob", alice_out, Arc::clone(&bob)));
    let to_alice = tokio::spawn(forward("bob", "alice", bob_out, Arc::clone(&alice)));

    alice.create_offer().await.context("Offer failed")?;

    let timeout = Duration::from_secs(config.demo.connect_timeout_secs);
    let connected = tokio::time::timeout(timeout, wait_connected(&alice, &bob)).await;

    println!();
    for (name, peer) in [("alice", &alice), ("bob", &bob)] {
        let snap = peer.snapshot();
        println!(
            "  {:<6} signaling={} gathering={} connection={}",
            name.bright_cyan(),
            snap.signaling_state,
            snap.gathering_state,
            snap.connection_state
        );
    }

    alice.close()?;
    bob.close()?;
    for handle in [to_bob, to_alice].into_iter().chain(alice_events).chain(bob_events) {
        handle.abort();
    }

    match connected {
        Ok(()) => {
            println!();
            println!("{} Peers connected", "✓".green());
            Ok(())
        }
        Err(_) => anyhow::bail!("Peers did not connect within {:?}", timeout),
    }
}

/// Carry one peer's outbound signals to the other as JSON envelopes
async fn forward(
    from: &'static str,
    to: &'static str,
    mut outbound: UnboundedReceiver<OutboundSignal>,
    peer: Arc<PeerConnectionManager>,
) {
    while let Some(signal) = outbound.recv().await {
        let wire = match WireMessage::from_outbound(&signal, Some(from.into()), Some(to.into())) {
            Some(Ok(wire)) => wire,
            Some(Err(e)) => {
                eprintln!("{} {} cannot send {}: {}", "✗".red(), from, signal, e);
                continue;
            }
            None => {
                eprintln!("{} {} reported {}", "✗".red(), from, signal);
                continue;
            }
        };
        let json = match wire.encode() {
            Ok(json) => json,
            Err(e) => {
                eprintln!("{} {}", "✗".red(), e);
                continue;
            }
        };
        println!("  {} → {}  {}", from, to, json.dimmed());
        if let Err(e) = peer.dispatch_json(&json).await {
            eprintln!("{} {} rejected message: {}", "✗".red(), to, e);
        }
    }
}

async fn wait_connected(a: &PeerConnectionManager, b: &PeerConnectionManager) {
    let connected = |p: &PeerConnectionManager| {
        p.snapshot().connection_state == PeerConnectionState::Connected
    };
    while !(connected(a) && connected(b)) {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn cmd_decode(json: &str) -> Result<()> {
    let wire = WireMessage::decode(json).context("Not a signaling envelope")?;
    println!("{} {}", "from:".bold(), wire.from_peer().unwrap_or("-"));
    println!("{} {}", "to:".bold(), wire.to_peer().unwrap_or("-"));

    let message = SignalingMessage::try_from(wire).context("Incomplete envelope")?;
    println!("{} {}", "kind:".bold(), message.kind());

    match message.into_inbound()? {
        Inbound::Description(d) => {
            println!("{} {} ({} bytes of SDP)", "valid:".bold(), d.kind(), d.sdp().len());
        }
        Inbound::Candidate(c) => println!("{} {}", "valid:".bold(), c),
    }
    Ok(())
}

fn cmd_config(path: &Path, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = config::Config::load_from(path)?;
            println!("{}", path.display().to_string().dimmed());
            println!("{}", serde_json::to_string_pretty(&config)?);
        }

        ConfigAction::Init { force } => {
            if path.exists() && !force {
                anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
            }
            config::Config::default().save_to(path)?;
            println!("{} Wrote {}", "✓".green(), path.display());
        }

        ConfigAction::Set { key, value } => {
            let mut config = config::Config::load_from(path)?;
            config.set(&key, &value)?;
            config.save_to(path)?;
            println!("{} Set {} = {}", "✓".green(), key.bright_cyan(), value);
        }

        ConfigAction::Get { key } => {
            let config = config::Config::load_from(path)?;
            if let Some(value) = config.get(&key) {
                println!("{} = {}", key.bright_cyan(), value);
            } else {
                anyhow::bail!("Unknown config key: {}", key);
            }
        }

        ConfigAction::List => {
            let config = config::Config::load_from(path)?;
            println!("{}", "Configuration".bold());
            println!();
            for (key, value) in config.list() {
                println!("  {:<26} {}", key.bright_cyan(), value);
            }
        }
    }

    Ok(())
}
