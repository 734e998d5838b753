//! Relay Chat Example
//!
//! Several chat members, each running on its own task with its own emitter,
//! talk through one in-process relay channel. Every member:
//!
//! - greets the room once it has joined
//! - answers a ping addressed to it with a pong
//! - leaves when the host closes the room
//!
//! The host waits for each pong with `next` and a timeout, then closes the
//! room with a cancellation token that removes every member's handlers.
//!
//! ```text
//!          relay channel "lobby"
//!   host ──┬── member 1 (task)
//!          ├── member 2 (task)
//!          └── member 3 (task)
//! ```
//!
//! # Usage
//!
//! ```bash
//! cargo run --package relay-chat -- --members 3 --channel lobby
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use herald::prelude::*;
use herald::runtime::config::ConfigLoader;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Line {
    from: String,
    text: String,
}

#[derive(Debug, Clone, Events)]
pub enum ChatEvent {
    Joined(String),
    Said(Line),
    Ping(String),
    Pong(String),
    Closed,
}

#[derive(Debug, Parser)]
#[command(about = "Simulate a chat room over a Herald relay channel")]
struct Args {
    /// Relay channel to talk on. Overrides `relay.channel` from the config.
    #[arg(long)]
    channel: Option<String>,

    /// Number of simulated members.
    #[arg(long, default_value_t = 3)]
    members: usize,

    /// How long to wait for each pong, in milliseconds.
    #[arg(long, default_value_t = 2000)]
    timeout_ms: u64,

    /// Configuration file to load instead of searching for `herald.toml`.
    #[arg(long)]
    config: Option<PathBuf>,
}

// ============================================================================
// Members
// ============================================================================

/// Runs one member until the room closes.
async fn member(name: String, channel: String, room_open: CancellationToken) -> Result<()> {
    let options = EmitterOptions::new().relay_channel(&channel);
    let emitter = herald::create_emitter::<ChatEvent>(options)
        .with_context(|| format!("{name} could not join {channel}"))?;
    let handlers = emitter.with_signal(&room_open);

    let me = name.clone();
    handlers.on::<chat_event::Said>(move |line| {
        if line.from != me {
            info!(member = %me, from = %line.from, "heard: {}", line.text);
        }
    });

    let me = name.clone();
    let replier = emitter.clone();
    handlers.on::<chat_event::Ping>(move |target| {
        if *target == me
            && let Err(err) = replier.emit::<chat_event::Pong>(me.clone())
        {
            warn!(member = %me, %err, "Failed to answer ping");
        }
    });

    let me = name.clone();
    handlers.once::<chat_event::Closed>(move |_| info!(member = %me, "room closed"));

    emitter.emit::<chat_event::Joined>(name.clone())?;
    emitter.emit::<chat_event::Said>(Line {
        from: name.clone(),
        text: format!("hello from {name}"),
    })?;

    room_open.cancelled().await;
    info!(member = %name, "left the room");
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.file(path);
    }
    let config = herald::runtime::init(loader)?;
    let channel = args
        .channel
        .or(config.relay.channel)
        .filter(|channel| !channel.is_empty())
        .unwrap_or_else(|| "lobby".to_string());

    let host =
        herald::create_emitter::<ChatEvent>(EmitterOptions::new().relay_channel(&channel))?;
    host.on_any(|event: &ChatEvent| match event {
        ChatEvent::Joined(name) => info!(%name, "joined"),
        ChatEvent::Said(line) => info!(from = %line.from, "{}", line.text),
        _ => {}
    });

    let names: Vec<String> = (1..=args.members).map(|i| format!("member-{i}")).collect();

    // Register before spawning so no greeting is missed.
    let (joined_tx, mut joined_rx) = mpsc::unbounded_channel();
    let arrivals = host.on::<chat_event::Joined>(move |name| {
        let _ = joined_tx.send(name.clone());
    });

    let room_open = CancellationToken::new();
    let mut tasks = Vec::new();
    for name in &names {
        tasks.push(tokio::spawn(member(
            name.clone(),
            channel.clone(),
            room_open.clone(),
        )));
    }

    for _ in &names {
        joined_rx
            .recv()
            .await
            .context("stopped listening for arrivals")?;
    }
    arrivals.cancel();
    info!(members = names.len(), %channel, "everyone is here");

    let timeout = Duration::from_millis(args.timeout_ms);
    for name in &names {
        let pong = host.next::<chat_event::Pong>(NextOptions::new().timeout(timeout));
        host.emit::<chat_event::Ping>(name.clone())?;
        match pong.await {
            Ok(from) => info!(%from, "pong"),
            Err(err) if err.is_timeout() => warn!(%err, "no pong"),
            Err(err) => return Err(err.into()),
        }
    }

    host.emit::<chat_event::Closed>(())?;
    // Give the close message a moment to travel before the handlers go away.
    tokio::time::sleep(Duration::from_millis(50)).await;
    room_open.cancel();

    for task in tasks {
        task.await??;
    }
    Ok(())
}
