use std::time::Duration;

use thiserror::Error;

use crate::cloud::CloudError;

/// Why a poll cycle did not produce a usable reading.
#[derive(Debug, Error)]
pub enum PollFailure {
    /// The cloud answered, but with `success: false`.
    #[error("API failure: code {code}: {msg}")]
    ApiFailure { code: i64, msg: String },

    /// The response carried no datapoint with the expected code.
    #[error("no {0} data in response")]
    MissingData(&'static str),

    #[error("authentication error: {0}")]
    Authentication(String),

    /// Network, HTTP or decoding fault in the client.
    #[error("transport error: {0}")]
    Transport(CloudError),

    /// The operator asked the monitor to stop.
    #[error("stopped by user")]
    Cancelled,
}

impl From<CloudError> for PollFailure {
    fn from(err: CloudError) -> Self {
        match err {
            CloudError::Authentication(msg) => PollFailure::Authentication(msg),
            other => PollFailure::Transport(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    RetryAfter(Duration),
    Stop,
}

/// Decides how the polling loop reacts to a failed cycle.
pub trait RecoveryPolicy: Send {
    fn recover(&self, failure: &PollFailure) -> Recovery;
}

/// Fixed two-tier delay with no retry ceiling.
///
/// Failures where the cloud itself answered (`ApiFailure`, `MissingData`)
/// retry after `soft`; client, network and login faults retry after `hard`.
#[derive(Debug, Clone, Copy)]
pub struct TieredDelay {
    pub soft: Duration,
    pub hard: Duration,
}

impl Default for TieredDelay {
    fn default() -> Self {
        TieredDelay {
            soft: Duration::from_secs(3),
            hard: Duration::from_secs(5),
        }
    }
}

impl RecoveryPolicy for TieredDelay {
    fn recover(&self, failure: &PollFailure) -> Recovery {
        match failure {
            PollFailure::ApiFailure { .. } | PollFailure::MissingData(_) => {
                Recovery::RetryAfter(self.soft)
            }
            PollFailure::Authentication(_) | PollFailure::Transport(_) => {
                Recovery::RetryAfter(self.hard)
            }
            PollFailure::Cancelled => Recovery::Stop,
        }
    }
}
