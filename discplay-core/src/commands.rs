use std::fmt;
use std::time::Instant;

use strum::{EnumIter, IntoStaticStr};

/// Physical front-panel buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, IntoStaticStr, strum::Display)]
pub enum ButtonId {
    PlayPause,
    Previous,
    Next,
}

/// A disambiguated user intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum GestureKind {
    SingleClick,
    DoubleClick,
    LongPressStart,
}

/// Gesture emitted by the input layer; carries only the originating button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Gesture {
    pub button: ButtonId,
    pub kind: GestureKind,
}

impl Gesture {
    pub fn new(button: ButtonId, kind: GestureKind) -> Self {
        Self { button, kind }
    }

    pub fn single(button: ButtonId) -> Self {
        Self::new(button, GestureKind::SingleClick)
    }
}

impl fmt::Display for Gesture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.button, self.kind)
    }
}

/// A raw pin transition, already debounced by the poll interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEdge {
    pub button: ButtonId,
    pub pressed: bool,
    pub at: Instant,
}

impl ButtonEdge {
    pub fn press(button: ButtonId, at: Instant) -> Self {
        Self { button, pressed: true, at }
    }

    pub fn release(button: ButtonId, at: Instant) -> Self {
        Self { button, pressed: false, at }
    }
}

/// Commands written to the decoder's control channel (slave mode)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecoderCommand {
    /// Toggle pause
    Pause,
    /// Absolute seek in whole seconds
    Seek { seconds: u64 },
    /// Harmless property read used as a readiness roundtrip
    Query(String),
}

impl DecoderCommand {
    /// Line written to the channel, without the trailing newline.
    pub fn wire(&self) -> String {
        match self {
            DecoderCommand::Pause => "pause".to_string(),
            DecoderCommand::Seek { seconds } => format!("seek {} 2", seconds),
            DecoderCommand::Query(property) => format!("get_property {}", property),
        }
    }
}

impl fmt::Display for DecoderCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.wire())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_format_matches_slave_protocol() {
        assert_eq!(DecoderCommand::Pause.wire(), "pause");
        assert_eq!(DecoderCommand::Seek { seconds: 83 }.wire(), "seek 83 2");
        assert_eq!(
            DecoderCommand::Query("pause".into()).wire(),
            "get_property pause"
        );
    }

    #[test]
    fn gesture_display_names_button_and_kind() {
        let g = Gesture::new(ButtonId::PlayPause, GestureKind::DoubleClick);
        assert_eq!(g.to_string(), "PlayPause:DoubleClick");
    }
}
