use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use discplay_core::PlayerConfig;

/// Settings only the front panel needs.
#[derive(Debug, Clone)]
pub struct PanelConfig {
    pub player: PlayerConfig,
    /// sysfs GPIO root, normally `/sys/class/gpio`.
    pub gpio_root: PathBuf,
    /// Block size file that reads non-zero while a disc is present.
    pub disc_size_file: PathBuf,
    pub disc_poll: Duration,
    /// Owner of the PulseAudio session that `pactl` must talk to.
    pub audio_user: String,
    /// How long `bluetoothctl` scans before listing devices.
    pub bluetooth_scan: Duration,
    pub menu_tick: Duration,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            player: PlayerConfig::default(),
            gpio_root: PathBuf::from("/sys/class/gpio"),
            disc_size_file: PathBuf::from("/sys/block/sr0/size"),
            disc_poll: Duration::from_secs(1),
            audio_user: "orangepi".to_string(),
            bluetooth_scan: Duration::from_secs(8),
            menu_tick: Duration::from_millis(250),
        }
    }
}

impl PanelConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Apply overrides from `lookup` on top of the defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let player = &mut config.player;

        if let Some(path) = lookup("DISCPLAY_FIFO") {
            player.decoder.fifo_path = path.into();
        }
        if let Some(path) = lookup("DISCPLAY_DECODER_LOG") {
            player.decoder.log_path = path.into();
        }
        if let Some(path) = lookup("DISCPLAY_CDROM") {
            player.decoder.cdrom_device = path.into();
        }
        if let Some(binary) = lookup("DISCPLAY_DECODER") {
            player.decoder.binary = binary;
        }
        if let Some(path) = lookup("DISCPLAY_TRACK_MARKER") {
            player.track_marker = path.into();
        }
        if let Some(path) = lookup("DISCPLAY_OUTPUT_MARKER") {
            player.output_marker = path.into();
        }
        if let Some(user) = lookup("DISCPLAY_USER") {
            // An empty user disables the alternate-user FIFO writer.
            if user.is_empty() {
                player.decoder.fallback_user = None;
            } else {
                player.decoder.fallback_user = Some(user.clone());
                config.audio_user = user;
            }
        }
        if let Some(pin) = parsed::<u32, _>(&lookup, "DISCPLAY_PIN_PLAY")? {
            player.input.play_pause_pin = pin;
        }
        if let Some(pin) = parsed::<u32, _>(&lookup, "DISCPLAY_PIN_PREV")? {
            player.input.previous_pin = pin;
        }
        if let Some(pin) = parsed::<u32, _>(&lookup, "DISCPLAY_PIN_NEXT")? {
            player.input.next_pin = pin;
        }
        if let Some(ms) = parsed::<u64, _>(&lookup, "DISCPLAY_MENU_TIMEOUT_MS")? {
            player.menu.timeout = Duration::from_millis(ms);
        }
        if let Some(path) = lookup("DISCPLAY_GPIO_ROOT") {
            config.gpio_root = path.into();
        }
        if let Some(path) = lookup("DISCPLAY_DISC_SIZE_FILE") {
            config.disc_size_file = path.into();
        }

        Ok(config)
    }
}

fn parsed<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| raw.trim().parse::<T>().with_context(|| format!("{}={:?}", key, raw)))
        .transpose()
}
