/* Domain error types for the controller.
 *
 * Only I/O-level failures and startup configuration errors are represented
 * as errors. Policy denials and enrollment rejections are expected outcomes
 * of normal operation, not exceptional ones, so `Authenticator` returns them
 * as plain `(bool, reason)` values instead. */
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("serial I/O failure on {device}: {source}")]
    SerialIo {
        device: String,
        #[source]
        source: std::io::Error,
    },

    #[error("protocol violation on {device}: {reason}")]
    ProtocolViolation { device: String, reason: String },

    #[error("configuration error: {0}")]
    ConfigError(String),
}
