pub mod clock;
pub mod commands;
pub mod config;
pub mod devices;
pub mod display;
pub mod error;
pub mod input;
pub mod markers;
pub mod menu;
pub mod player;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::PlayerConfig;
pub use error::PlayerError;
pub use menu::MenuStateMachine;
pub use player::PlaybackController;
