//! Monitoring endpoint pair and stream-URL normalization

use url::Url;

use crate::error::ConfigError;

/// Endpoint pair handed to the engine by the call-session collaborator.
///
/// Either URL may be absent; the pair is immutable for the lifetime of one
/// listen-in session and never mutated by this subsystem.
#[derive(Debug, Clone, Default)]
pub struct MonitorEndpoints {
    /// Persistent audio stream (WebSocket once normalized)
    pub audio_stream_url: Option<Url>,

    /// One-shot control endpoint for the call hand-off
    pub control_url: Option<Url>,
}

impl MonitorEndpoints {
    pub fn new(audio_stream_url: Option<Url>, control_url: Option<Url>) -> Self {
        Self {
            audio_stream_url,
            control_url,
        }
    }

    /// Parse from string form; empty strings count as absent
    pub fn parse(
        audio_stream_url: Option<&str>,
        control_url: Option<&str>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            audio_stream_url: parse_optional(audio_stream_url)?,
            control_url: parse_optional(control_url)?,
        })
    }
}

fn parse_optional(value: Option<&str>) -> Result<Option<Url>, ConfigError> {
    match value {
        Some(s) if !s.is_empty() => Url::parse(s)
            .map(Some)
            .map_err(|_| ConfigError::InvalidUrl(s.to_string())),
        _ => Ok(None),
    }
}

/// Rewrite a REST-style monitoring URL to its streaming-transport scheme.
///
/// The remote issues `http(s)` URLs for what is actually a WebSocket
/// channel: `http → ws`, `https → wss`. URLs already carrying a streaming
/// scheme pass through unchanged.
pub fn normalize_stream_url(url: &Url) -> Result<Url, ConfigError> {
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        "ws" | "wss" => return Ok(url.clone()),
        other => {
            return Err(ConfigError::InvalidUrl(format!(
                "unsupported scheme '{}' in {}",
                other, url
            )))
        }
    };

    let mut normalized = url.clone();
    normalized
        .set_scheme(scheme)
        .map_err(|_| ConfigError::InvalidUrl(url.to_string()))?;
    Ok(normalized)
}
