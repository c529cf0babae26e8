use thiserror::Error;

/// Errors surfaced by the playback controller and the menu layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlayerError {
    #[error("track {requested} is outside 1..={total}")]
    InvalidTrack { requested: u32, total: u32 },
    #[error("decoder process died (exit code {0:?})")]
    ProcessDied(Option<i32>),
    #[error("could not deliver `{command}` to the decoder: {reason}")]
    CommandDeliveryFailed { command: String, reason: String },
    #[error("decoder is not ready for commands")]
    NotReady,
    #[error("device action failed: {0}")]
    DeviceActionFailed(String),
    #[error("operation interrupted by stop")]
    Interrupted,
    #[error("failed to launch decoder: {0}")]
    Spawn(String),
    #[error("control channel setup failed: {0}")]
    ChannelSetup(String),
}

impl PlayerError {
    /// Only a broken control channel is worth tearing the process down for.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PlayerError::ChannelSetup(_))
    }
}

pub type PlayerResult<T> = Result<T, PlayerError>;
