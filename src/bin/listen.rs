//! Listen-in demo application
//!
//! Connects to a call monitoring endpoint, plays the live audio and renders
//! the amplitude signal as a terminal bar. `t` + Enter hands the call off to
//! the configured phone number; Ctrl+C stops listening.

use std::io::Write;
use std::time::Duration;

use anyhow::Result;
use tokio::io::AsyncBufReadExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use call_relay::config::RelayConfig;
use call_relay::session::{ListenSession, MonitorEndpoints, SessionState};
use call_relay::transfer::TransferController;

/// Render the [0, 1] amplitude signal as a single status line
fn render_level_bar(level: f32) {
    const BAR_WIDTH: usize = 40;
    let filled = (level.clamp(0.0, 1.0) * BAR_WIDTH as f32) as usize;

    let mut bar = String::with_capacity(BAR_WIDTH * 3);
    for i in 0..BAR_WIDTH {
        bar.push(if i < filled { '█' } else { '░' });
    }

    eprint!("\r\x1b[2KLevel: [{}] {:4.2}", bar, level);
    let _ = std::io::stderr().flush();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting call listen-in");

    let config = RelayConfig::load()?;

    let mut args = std::env::args().skip(1);
    let audio_url = args.next();
    let control_url = args.next();

    let Some(audio_url) = audio_url else {
        eprintln!("Usage: listen <audio-stream-url> [control-url]");
        eprintln!("The bearer token is read from RELAY_AUTH_TOKEN.");
        std::process::exit(2);
    };

    let endpoints = MonitorEndpoints::parse(Some(&audio_url), control_url.as_deref())?;
    let auth_token = std::env::var("RELAY_AUTH_TOKEN").unwrap_or_default();

    let transfer_number = config.transfer.destination_number.clone();
    let controller =
        TransferController::new(Duration::from_millis(config.transfer.request_timeout_ms));

    let session = ListenSession::start(endpoints, auth_token, config).await?;
    let mut state_rx = session.state_watch();
    let mut level_rx = session.level_watch();

    println!("Listening... press 't' + Enter to transfer, Ctrl+C to stop.");

    let mut stdin = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    let mut level_tick = tokio::time::interval(Duration::from_millis(50));
    level_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!();
                tracing::info!("Stopping at user request");
                session.stop().await;
                break;
            }
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = state_rx.borrow_and_update().clone();
                match &state {
                    SessionState::Streaming => {
                        tracing::info!("Audio stream live");
                    }
                    SessionState::Reconnecting { attempt } => {
                        tracing::warn!("Stream interrupted, reconnecting (attempt {})", attempt);
                    }
                    SessionState::Disconnected { reason } => {
                        eprintln!();
                        tracing::info!("Disconnected: {}", reason);
                        break;
                    }
                    SessionState::Transferred => {
                        eprintln!();
                        tracing::info!("Call transferred to your phone");
                        break;
                    }
                    _ => {}
                }
            }
            line = stdin.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) if line.trim() == "t" => {
                        let Some(number) = transfer_number.as_deref() else {
                            tracing::warn!(
                                "No transfer destination configured; set \
                                 transfer.destination_number in the config file"
                            );
                            continue;
                        };

                        tracing::info!("Requesting transfer...");
                        match session.transfer(&controller, number).await {
                            // The Transferred state lands via the watch
                            Ok(()) => {}
                            Err(e) => {
                                tracing::warn!("Transfer failed, still listening: {}", e);
                            }
                        }
                    }
                    Ok(Some(_)) => {}
                    Ok(None) | Err(_) => {
                        stdin_open = false;
                    }
                }
            }
            _ = level_tick.tick() => {
                render_level_bar(*level_rx.borrow_and_update());
            }
        }
    }

    let stats = session.stats();
    tracing::info!(
        "Session stats: {} frames, {} bytes, {} buffers dropped, {} diagnostics ignored",
        stats.frames_received,
        stats.bytes_received,
        stats.buffers_dropped,
        stats.texts_ignored
    );

    Ok(())
}
