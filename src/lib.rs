//! # Call Relay
//!
//! Real-time call audio relay and playback engine: stream raw audio from a
//! remote call-monitoring endpoint, reconstruct an intelligible mono signal,
//! resample it to the local output device and play it gaplessly, with bounded
//! reconnection on transient failures and an out-of-band hand-off of the live
//! call to a real phone number.
//!
//! ## Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────┐
//!                        │    Monitoring Endpoint    │
//!                        │  (WebSocket audio stream) │
//!                        └────────────┬─────────────┘
//!                                     │ binary frames (s16le stereo @ 16 kHz)
//!                                     ▼
//!  ┌──────────────────────────────────────────────────────────────────────┐
//!  │                     Stream Session (session::stream)                  │
//!  │    connect → authenticate → pump frames → bounded retry on failure   │
//!  └────────────┬─────────────────────────────────────────────────────────┘
//!               │ mpsc frame channel (arrival order preserved)
//!               ▼
//!  ┌─────────────────────┐     level      ┌─────────────────────────────┐
//!  │    Frame Demuxer    ├───────────────▶│  Level Meter (audio::meter)  │
//!  │   (audio::demux)    │  MonoBuffer    │  rms → [0,1] watch channel   │
//!  └──────────┬──────────┘                └─────────────────────────────┘
//!             │ MonoBuffer @ 16 kHz
//!             ▼
//!  ┌─────────────────────┐                ┌─────────────────────────────┐
//!  │      Resampler      │ PlaybackBuffer │      Playback Scheduler      │
//!  │  (audio::resample)  ├───────────────▶│       (audio::output)        │
//!  └─────────────────────┘  @ device rate │  FIFO queue → cpal stream    │
//!                                         └─────────────────────────────┘
//!
//!  ┌──────────────────────────────────────────────────────────────────────┐
//!  │  Transfer Controller (transfer): one-shot POST to the control URL,   │
//!  │  hands the live call to a phone number and tears the session down    │
//!  └──────────────────────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod protocol;
pub mod session;
pub mod transfer;

pub use error::{Error, Result};
pub use session::{ListenSession, MonitorEndpoints, SessionState};

/// Application-wide constants
pub mod constants {
    /// Sample rate of the monitoring stream
    pub const SOURCE_SAMPLE_RATE: u32 = 16_000;

    /// Channels interleaved in the monitoring stream
    pub const SOURCE_CHANNELS: u16 = 2;

    /// Maximum automatic reconnect attempts per session
    pub const MAX_RECONNECT_ATTEMPTS: u32 = 3;

    /// Fixed delay between reconnect attempts
    pub const RECONNECT_BACKOFF_MS: u64 = 2_000;

    /// Visual gain applied to the RMS loudness estimate
    pub const METER_GAIN: f32 = 4.0;

    /// Capacity of the network → rendering frame channel
    pub const FRAME_CHANNEL_CAPACITY: usize = 256;

    /// Binary frames to hex-dump at debug level after each connect
    pub const FRAME_DEBUG_COUNT: u64 = 5;

    /// Longest diagnostic text message logged before truncation
    pub const TEXT_DIAGNOSTIC_MAX: usize = 500;
}
