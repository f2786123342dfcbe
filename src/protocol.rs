//! Wire formats of the monitoring endpoints
//!
//! The audio stream delivers raw PCM frames over a persistent WebSocket; the
//! control endpoint accepts one-shot JSON commands over HTTP. Both formats
//! are fixed by the remote and reproduced here verbatim.

use serde::{Deserialize, Serialize};

/// Bytes per sample of the stream's linear PCM encoding (s16le)
pub const BYTES_PER_SAMPLE: usize = 2;

/// A binary frame carries two interleaved channels: `[L0, R0, L1, R1, ...]`.
/// One mono output sample therefore consumes one sample pair.
pub const BYTES_PER_SAMPLE_PAIR: usize = 2 * BYTES_PER_SAMPLE;

/// Full-scale magnitude of an s16 sample, used for float normalization
pub const SAMPLE_SCALE: f32 = 32_767.0;

/// Command accepted by the control endpoint.
///
/// Serializes to the exact shape the remote expects, e.g.
/// `{"type":"transfer","destination":{"type":"number","number":"+15551234567"}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlCommand {
    /// Hand the live call off to a real destination
    Transfer { destination: TransferDestination },
}

/// Where a transferred call should land
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransferDestination {
    /// A dialable phone number in E.164 form
    Number { number: String },
}

impl ControlCommand {
    /// Build a transfer command for an already-normalized E.164 number
    pub fn transfer_to(number: impl Into<String>) -> Self {
        ControlCommand::Transfer {
            destination: TransferDestination::Number {
                number: number.into(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_command_wire_shape() {
        let cmd = ControlCommand::transfer_to("+15551234567");
        let json = serde_json::to_value(&cmd).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "type": "transfer",
                "destination": {
                    "type": "number",
                    "number": "+15551234567",
                }
            })
        );
    }

    #[test]
    fn test_transfer_command_roundtrip() {
        let cmd = ControlCommand::transfer_to("+442012345678");
        let json = serde_json::to_string(&cmd).unwrap();
        let back: ControlCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cmd);
    }
}
