//! Call hand-off via the control endpoint
//!
//! Orthogonal to the audio path: a single out-of-band POST asks the remote
//! to transfer the live call to a real phone number. Success and listening
//! are mutually exclusive; the session wires its own teardown on a 2xx.

use url::Url;

use crate::error::TransferError;
use crate::protocol::ControlCommand;

/// One-shot transfer commands against a control URL
pub struct TransferController {
    http: reqwest::Client,
}

impl TransferController {
    /// Build a controller with the given request timeout
    pub fn new(timeout: std::time::Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { http }
    }

    /// Ask the remote to hand the live call to `destination`.
    ///
    /// Fails with `NotAvailable` before any network activity when the call
    /// has no control URL. The destination is normalized to E.164 first;
    /// any 2xx status counts as success.
    pub async fn transfer(
        &self,
        control_url: Option<&Url>,
        destination: &str,
    ) -> Result<(), TransferError> {
        let url = control_url.ok_or(TransferError::NotAvailable)?;

        let number = to_e164(destination);
        let command = ControlCommand::transfer_to(number);

        tracing::info!("Requesting call transfer via {}", url);

        let response = self
            .http
            .post(url.clone())
            .json(&command)
            .send()
            .await
            .map_err(|e| TransferError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("Transfer rejected with status {}", status);
            return Err(TransferError::Rejected {
                status: status.as_u16(),
            });
        }

        tracing::info!("Call transferred to the requested number");
        Ok(())
    }
}

impl Default for TransferController {
    fn default() -> Self {
        Self::new(std::time::Duration::from_millis(
            crate::config::TransferSettings::default().request_timeout_ms,
        ))
    }
}

/// Normalize a user-entered phone number to E.164.
///
/// Strips everything but digits, then: an explicit leading "+" keeps all
/// digits; exactly 10 digits get the US/Canada "+1"; 11 digits starting
/// with "1" already carry the country code; anything else gets a bare "+"
/// as a last resort.
pub fn to_e164(input: &str) -> String {
    let digits: String = input.chars().filter(|c| c.is_ascii_digit()).collect();

    if input.starts_with('+') {
        return format!("+{}", digits);
    }

    if digits.len() == 10 {
        return format!("+1{}", digits);
    }

    if digits.len() == 11 && digits.starts_with('1') {
        return format!("+{}", digits);
    }

    format!("+{}", digits)
}
