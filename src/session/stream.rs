//! Persistent connection to the audio-stream endpoint
//!
//! One session owns the WebSocket to the monitoring endpoint, the playback
//! route and the rendering pipeline. The network task and the rendering task
//! are joined by an explicit bounded channel so frames stay in arrival
//! order. Recovery is a fixed-interval, bounded retry: a live call has a
//! short lifetime, so sustained outages are reported instead of ridden out.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::audio::demux::FrameDemuxer;
use crate::audio::meter::LevelMeter;
use crate::audio::output::{OutputRoute, PlaybackScheduler};
use crate::audio::resample::{PcmConverter, SingleShotConverter};
use crate::config::{RelayConfig, StreamSettings};
use crate::constants::{FRAME_DEBUG_COUNT, TEXT_DIAGNOSTIC_MAX};
use crate::error::{ConfigError, ConnectionError, Result, TransferError};
use crate::session::endpoint::{normalize_stream_url, MonitorEndpoints};
use crate::session::state::{DisconnectReason, RetryBudget, SessionState};
use crate::transfer::TransferController;

/// Lifetime counters for one session
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    pub frames_received: u64,
    pub bytes_received: u64,
    pub buffers_dropped: u64,
    pub texts_ignored: u64,
}

#[derive(Default)]
struct StatsCells {
    frames_received: AtomicU64,
    bytes_received: AtomicU64,
    buffers_dropped: AtomicU64,
    texts_ignored: AtomicU64,
}

/// State shared between the session handle and its tasks
struct Shared {
    state_tx: watch::Sender<SessionState>,
    level_tx: watch::Sender<f32>,
    shutdown_tx: watch::Sender<bool>,
    scheduler: Mutex<Option<PlaybackScheduler>>,
    route: Mutex<Option<OutputRoute>>,
    stats: StatsCells,
}

impl Shared {
    /// Apply a transition unless the session already reached a terminal
    /// state; the first terminal transition wins.
    fn set_state(&self, state: SessionState) {
        self.state_tx.send_if_modified(|current| {
            if current.is_terminal() {
                false
            } else {
                *current = state;
                true
            }
        });
    }

    /// Flush the scheduler and release the playback route. Idempotent.
    fn teardown_audio(&self) {
        if let Some(mut scheduler) = self.scheduler.lock().take() {
            scheduler.stop();
        }
        self.route.lock().take();
    }
}

/// Live listen-in session against one monitoring endpoint pair
pub struct ListenSession {
    shared: Arc<Shared>,
    control_url: Option<Url>,
    driver: Mutex<Option<JoinHandle<()>>>,
    pipeline: Mutex<Option<JoinHandle<()>>>,
    state_rx: watch::Receiver<SessionState>,
    level_rx: watch::Receiver<f32>,
}

impl std::fmt::Debug for ListenSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenSession")
            .field("control_url", &self.control_url)
            .field("state", &*self.state_rx.borrow())
            .field("level", &*self.level_rx.borrow())
            .finish_non_exhaustive()
    }
}

impl ListenSession {
    /// Connect to the monitoring endpoints and start playback.
    ///
    /// Fails fast when the audio-stream URL is absent or the playback route
    /// cannot be opened; transport failures after this point go through the
    /// bounded retry path instead of surfacing here.
    pub async fn start(
        endpoints: MonitorEndpoints,
        auth_token: impl Into<String>,
        config: RelayConfig,
    ) -> Result<Self> {
        let stream_url = endpoints
            .audio_stream_url
            .as_ref()
            .ok_or(ConfigError::MissingEndpoint("audio stream URL"))?;
        let stream_url = normalize_stream_url(stream_url)?;

        // The playback route is held for the whole session
        let route = OutputRoute::acquire()?;
        let scheduler = PlaybackScheduler::start()?;
        let output_rate = scheduler.output_rate();

        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let (level_tx, level_rx) = watch::channel(0.0f32);
        let (shutdown_tx, _) = watch::channel(false);

        let shared = Arc::new(Shared {
            state_tx,
            level_tx,
            shutdown_tx,
            scheduler: Mutex::new(Some(scheduler)),
            route: Mutex::new(Some(route)),
            stats: StatsCells::default(),
        });

        let (frame_tx, frame_rx) =
            mpsc::channel::<Bytes>(config.stream.frame_queue_capacity.max(1));

        let driver = tokio::spawn(run_stream(
            shared.clone(),
            stream_url,
            auth_token.into(),
            config.stream.clone(),
            frame_tx,
        ));

        let pipeline = tokio::spawn(run_pipeline(
            shared.clone(),
            frame_rx,
            config,
            output_rate,
        ));

        Ok(Self {
            shared,
            control_url: endpoints.control_url,
            driver: Mutex::new(Some(driver)),
            pipeline: Mutex::new(Some(pipeline)),
            state_rx,
            level_rx,
        })
    }

    /// Observe lifecycle transitions
    pub fn state_watch(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Current state snapshot
    pub fn state(&self) -> SessionState {
        self.state_rx.borrow().clone()
    }

    /// Observe the [0, 1] amplitude signal for visualization
    pub fn level_watch(&self) -> watch::Receiver<f32> {
        self.level_rx.clone()
    }

    /// Lifetime counters
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            frames_received: self.shared.stats.frames_received.load(Ordering::Relaxed),
            bytes_received: self.shared.stats.bytes_received.load(Ordering::Relaxed),
            buffers_dropped: self.shared.stats.buffers_dropped.load(Ordering::Relaxed),
            texts_ignored: self.shared.stats.texts_ignored.load(Ordering::Relaxed),
        }
    }

    /// Stop listening.
    ///
    /// Idempotent and safe from any state, including concurrently with an
    /// in-flight connect, receive or reconnect backoff. A stopped session
    /// delivers no further audio and issues no further connects.
    pub async fn stop(&self) {
        self.shutdown(SessionState::Disconnected {
            reason: DisconnectReason::UserRequested,
        })
        .await;
    }

    /// Hand the live call to `destination` via the control endpoint.
    ///
    /// Listening and taking the call over are mutually exclusive: success
    /// tears the session down; failure leaves the stream playing so the
    /// caller may retry or keep listening.
    pub async fn transfer(
        &self,
        controller: &TransferController,
        destination: &str,
    ) -> std::result::Result<(), TransferError> {
        controller
            .transfer(self.control_url.as_ref(), destination)
            .await?;

        self.shutdown(SessionState::Transferred).await;
        Ok(())
    }

    async fn shutdown(&self, final_state: SessionState) {
        let _ = self.shared.shutdown_tx.send(true);
        self.shared.set_state(final_state);
        self.shared.teardown_audio();

        let driver = self.driver.lock().take();
        if let Some(handle) = driver {
            let _ = handle.await;
        }
        let pipeline = self.pipeline.lock().take();
        if let Some(handle) = pipeline {
            let _ = handle.await;
        }
    }
}

impl Drop for ListenSession {
    fn drop(&mut self) {
        // Tasks observe the shutdown signal on their own; the audio route
        // must not outlive the session handle
        let _ = self.shared.shutdown_tx.send(true);
        self.shared.teardown_audio();
    }
}

/// How one connect-and-pump round ended
enum PumpOutcome {
    /// `stop()` was observed; the final state is already set elsewhere
    Shutdown,
    /// The connection failed or closed; candidate for a retry
    Failed(ConnectionError),
}

/// Network driver: connect, pump frames, retry within the budget.
async fn run_stream(
    shared: Arc<Shared>,
    url: Url,
    auth_token: String,
    settings: StreamSettings,
    frame_tx: mpsc::Sender<Bytes>,
) {
    let mut shutdown_rx = shared.shutdown_tx.subscribe();
    let mut budget = RetryBudget::new(settings.max_retries);
    let backoff = Duration::from_millis(settings.reconnect_backoff_ms);

    shared.set_state(SessionState::Connecting);

    loop {
        if *shutdown_rx.borrow() {
            return;
        }

        let outcome =
            connect_and_pump(&shared, &url, &auth_token, &frame_tx, &mut shutdown_rx).await;

        let error = match outcome {
            PumpOutcome::Shutdown => return,
            PumpOutcome::Failed(error) => error,
        };

        match budget.claim() {
            Some(attempt) => {
                tracing::warn!(
                    "Audio stream failed ({}), reconnecting ({}/{}) in {:?}",
                    error,
                    attempt,
                    budget.max(),
                    backoff
                );
                shared.set_state(SessionState::Reconnecting { attempt });

                // Fixed, non-exponential backoff, interruptible by stop()
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = shutdown_rx.changed() => return,
                }
            }
            None => {
                tracing::error!("Audio stream lost, reconnect budget exhausted: {}", error);
                shared.set_state(SessionState::Disconnected {
                    reason: DisconnectReason::RetriesExhausted {
                        attempts: budget.max(),
                    },
                });
                shared.teardown_audio();
                return;
            }
        }
    }
}

/// One connection round: handshake, then pump messages until failure,
/// close, or shutdown.
async fn connect_and_pump(
    shared: &Shared,
    url: &Url,
    auth_token: &str,
    frame_tx: &mpsc::Sender<Bytes>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> PumpOutcome {
    // The bearer credential rides in the handshake headers, never the URL
    let mut request = match url.as_str().into_client_request() {
        Ok(request) => request,
        Err(e) => return PumpOutcome::Failed(ConnectionError::Handshake(e.to_string())),
    };
    let header = match format!("Bearer {}", auth_token).parse() {
        Ok(value) => value,
        Err(_) => {
            return PumpOutcome::Failed(ConnectionError::Handshake(
                "authorization token is not a valid header value".to_string(),
            ))
        }
    };
    request.headers_mut().insert(AUTHORIZATION, header);

    tracing::debug!("Connecting to {}", url);

    let mut ws = tokio::select! {
        _ = shutdown_rx.changed() => return PumpOutcome::Shutdown,
        connected = connect_async(request) => match connected {
            Ok((ws, _response)) => ws,
            Err(e) => return PumpOutcome::Failed(ConnectionError::Handshake(e.to_string())),
        },
    };

    tracing::info!("Connected to audio stream");
    shared.set_state(SessionState::Streaming);

    let mut debug_frames_left = FRAME_DEBUG_COUNT;

    loop {
        let message = tokio::select! {
            _ = shutdown_rx.changed() => return PumpOutcome::Shutdown,
            message = ws.next() => message,
        };

        match message {
            Some(Ok(Message::Binary(data))) => {
                shared
                    .stats
                    .frames_received
                    .fetch_add(1, Ordering::Relaxed);
                shared
                    .stats
                    .bytes_received
                    .fetch_add(data.len() as u64, Ordering::Relaxed);

                if debug_frames_left > 0 {
                    debug_frames_left -= 1;
                    let prefix: Vec<String> =
                        data.iter().take(32).map(|b| format!("{:02x}", b)).collect();
                    tracing::debug!(
                        "Audio frame: {} bytes, first bytes: {}",
                        data.len(),
                        prefix.join(" ")
                    );
                }

                // The pipeline going away means the session is tearing down
                if frame_tx.send(Bytes::from(data)).await.is_err() {
                    return PumpOutcome::Shutdown;
                }
            }
            Some(Ok(Message::Text(text))) => {
                // Diagnostic channel from the remote; never treated as audio
                shared.stats.texts_ignored.fetch_add(1, Ordering::Relaxed);
                let end = text
                    .char_indices()
                    .nth(TEXT_DIAGNOSTIC_MAX)
                    .map(|(i, _)| i)
                    .unwrap_or(text.len());
                tracing::debug!("Monitor diagnostic: {}", &text[..end]);
            }
            Some(Ok(Message::Close(_))) | None => {
                return PumpOutcome::Failed(ConnectionError::ClosedByRemote);
            }
            Some(Ok(_)) => {
                // Ping/pong are answered by the transport
            }
            Some(Err(e)) => {
                return PumpOutcome::Failed(ConnectionError::Transport(e.to_string()));
            }
        }
    }
}

/// Rendering pipeline: demux → meter → convert → schedule, strictly in
/// frame-arrival order.
async fn run_pipeline(
    shared: Arc<Shared>,
    mut frame_rx: mpsc::Receiver<Bytes>,
    config: RelayConfig,
    output_rate: u32,
) {
    let demuxer = FrameDemuxer::new(config.stream.channel);
    let meter = LevelMeter::new(config.meter.gain);
    let mut converter = SingleShotConverter::new(config.stream.source_sample_rate, output_rate);
    let mut shutdown_rx = shared.shutdown_tx.subscribe();

    loop {
        let frame = tokio::select! {
            _ = shutdown_rx.changed() => break,
            frame = frame_rx.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        let mono = demuxer.demux(&frame);
        if mono.is_empty() {
            continue;
        }

        // Side channel for visualization; it never gates playback
        let _ = shared.level_tx.send(meter.level(&mono));

        match converter.convert(&mono) {
            Ok(samples) => {
                if let Some(scheduler) = shared.scheduler.lock().as_ref() {
                    scheduler.schedule(samples);
                }
            }
            Err(e) => {
                // A missed conversion drops one buffer, not the session
                shared.stats.buffers_dropped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Dropping buffer: {}", e);
            }
        }
    }

    // Park the meter so observers do not freeze on the last level
    let _ = shared.level_tx.send(0.0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use futures_util::SinkExt;

    fn test_shared() -> Arc<Shared> {
        Arc::new(Shared {
            state_tx: watch::channel(SessionState::Idle).0,
            level_tx: watch::channel(0.0f32).0,
            shutdown_tx: watch::channel(false).0,
            scheduler: Mutex::new(None),
            route: Mutex::new(None),
            stats: StatsCells::default(),
        })
    }

    fn fast_settings(max_retries: u32) -> StreamSettings {
        StreamSettings {
            max_retries,
            reconnect_backoff_ms: 10,
            ..Default::default()
        }
    }

    #[test]
    fn test_terminal_state_is_sticky() {
        let shared = test_shared();

        shared.set_state(SessionState::Streaming);
        shared.set_state(SessionState::Disconnected {
            reason: DisconnectReason::UserRequested,
        });
        // Late transitions from racing tasks must not resurrect the session
        shared.set_state(SessionState::Streaming);
        shared.set_state(SessionState::Transferred);

        assert_eq!(
            *shared.state_tx.borrow(),
            SessionState::Disconnected {
                reason: DisconnectReason::UserRequested,
            }
        );
    }

    #[test]
    fn test_teardown_audio_is_idempotent() {
        let shared = test_shared();
        shared.teardown_audio();
        shared.teardown_audio();
    }

    #[tokio::test]
    async fn test_start_without_stream_url_is_a_configuration_error() {
        let err = ListenSession::start(
            MonitorEndpoints::default(),
            "token",
            RelayConfig::default(),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            Error::Config(ConfigError::MissingEndpoint(_))
        ));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_safe_before_connect() {
        // Needs the default output device; skip quietly where there is none
        let endpoints = MonitorEndpoints::parse(Some("ws://127.0.0.1:9/void"), None).unwrap();
        let config = RelayConfig {
            stream: fast_settings(1),
            ..Default::default()
        };
        let Ok(session) = ListenSession::start(endpoints, "token", config).await else {
            return;
        };

        session.stop().await;
        session.stop().await;

        assert_eq!(
            session.state(),
            SessionState::Disconnected {
                reason: DisconnectReason::UserRequested,
            }
        );
    }

    #[tokio::test]
    async fn test_budget_exhaustion_reaches_terminal_disconnect() {
        // Bind then drop to get a local port that refuses connections
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let url: Url = format!("ws://127.0.0.1:{}/stream", port).parse().unwrap();
        let shared = test_shared();
        let (frame_tx, _frame_rx) = mpsc::channel(8);

        run_stream(
            shared.clone(),
            url,
            "token".to_string(),
            fast_settings(3),
            frame_tx,
        )
        .await;

        // run_stream returning proves no further attempts are issued
        assert_eq!(
            *shared.state_tx.borrow(),
            SessionState::Disconnected {
                reason: DisconnectReason::RetriesExhausted { attempts: 3 },
            }
        );
    }

    #[tokio::test]
    async fn test_recovery_within_budget_resumes_streaming() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // Two connections dropped before the handshake, then a real
        // WebSocket server that streams one binary frame
        let server = tokio::spawn(async move {
            for _ in 0..2 {
                let (socket, _) = listener.accept().await.unwrap();
                drop(socket);
            }

            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
            ws.send(Message::Binary(vec![1, 0, 2, 0])).await.unwrap();
            // Hold the connection open until the client shuts down
            tokio::time::sleep(Duration::from_secs(2)).await;
        });

        let url: Url = format!("ws://127.0.0.1:{}/stream", port).parse().unwrap();
        let shared = test_shared();
        let mut state_rx = shared.state_tx.subscribe();
        let (frame_tx, mut frame_rx) = mpsc::channel(8);

        let driver = tokio::spawn(run_stream(
            shared.clone(),
            url,
            "token".to_string(),
            fast_settings(3),
            frame_tx,
        ));

        // Both failed attempts must surface as Reconnecting before the
        // third connect succeeds; nothing resets the attempt counter
        let mut seen_second_attempt = false;
        loop {
            tokio::time::timeout(Duration::from_secs(5), state_rx.changed())
                .await
                .expect("state machine stalled")
                .unwrap();

            let state = state_rx.borrow_and_update().clone();
            match state {
                SessionState::Reconnecting { attempt } if attempt == 2 => {
                    seen_second_attempt = true;
                }
                SessionState::Streaming => break,
                _ => {}
            }
        }
        assert!(seen_second_attempt);

        // The frame sent by the server arrives in order on the channel
        let frame = tokio::time::timeout(Duration::from_secs(5), frame_rx.recv())
            .await
            .expect("no frame delivered")
            .unwrap();
        assert_eq!(&frame[..], &[1u8, 0, 2, 0][..]);

        let _ = shared.shutdown_tx.send(true);
        let _ = driver.await;
        server.abort();
    }
}
