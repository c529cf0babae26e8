use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PlayerConfig {
    pub decoder: DecoderConfig,
    pub input: InputConfig,
    pub menu: MenuConfig,
    pub disc: DiscDefaults,
    /// Plain-text current track marker.
    pub track_marker: PathBuf,
    /// Plain-text last selected output device marker.
    pub output_marker: PathBuf,
    /// Idle display refresh period.
    pub display_refresh: Duration,
}

#[derive(Debug, Clone)]
pub struct DecoderConfig {
    pub binary: String,
    pub cdrom_device: PathBuf,
    pub cache_kb: u32,
    pub fifo_path: PathBuf,
    pub log_path: PathBuf,
    /// User whose context is used when a direct FIFO write fails.
    pub fallback_user: Option<String>,
    /// Extra environment for the decoder (PulseAudio runtime paths).
    pub env: Vec<(String, String)>,
    /// Play a short sound on a Bluetooth sink before spawning the decoder.
    pub prime_bluetooth_sink: bool,
    pub prime_sound: PathBuf,
    pub probe_interval: Duration,
    pub probe_window: Duration,
    /// Continuous uptime after which the process may be declared ready.
    pub ready_after: Duration,
    pub terminate_grace: Duration,
    pub kill_wait: Duration,
    pub command_timeout: Duration,
    /// Pause between tearing down and respawning on an output change.
    pub reload_settle: Duration,
    /// Delay before the seek that restores the position after a reload.
    pub seek_delay: Duration,
    pub supervise_interval: Duration,
    pub diagnostic_log_lines: usize,
}

#[derive(Debug, Clone)]
pub struct InputConfig {
    pub play_pause_pin: u32,
    pub previous_pin: u32,
    pub next_pin: u32,
    pub poll_interval: Duration,
    pub long_press: Duration,
    pub double_click: Duration,
    /// Bounce suppression for the previous/next buttons.
    pub refractory: Duration,
}

#[derive(Debug, Clone)]
pub struct MenuConfig {
    pub timeout: Duration,
    /// How long transient messages stay on screen.
    pub message_hold: Duration,
}

/// Fallbacks used when the disc's table of contents cannot be read.
#[derive(Debug, Clone)]
pub struct DiscDefaults {
    pub fallback_track_count: u32,
    pub placeholder_track_length: Duration,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            decoder: DecoderConfig::default(),
            input: InputConfig::default(),
            menu: MenuConfig::default(),
            disc: DiscDefaults::default(),
            track_marker: PathBuf::from("/tmp/current_track.txt"),
            output_marker: PathBuf::from("/tmp/last_audio_device.txt"),
            display_refresh: Duration::from_secs(1),
        }
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            binary: "mplayer".to_string(),
            cdrom_device: PathBuf::from("/dev/sr0"),
            cache_kb: 8192,
            fifo_path: PathBuf::from("/tmp/mplayer_control.fifo"),
            log_path: PathBuf::from("/home/orangepi/mplayer.log"),
            fallback_user: Some("orangepi".to_string()),
            env: vec![
                ("XDG_RUNTIME_DIR".to_string(), "/run/user/1000".to_string()),
                (
                    "PULSE_SERVER".to_string(),
                    "unix:/run/user/1000/pulse/native".to_string(),
                ),
            ],
            prime_bluetooth_sink: true,
            prime_sound: PathBuf::from("/usr/share/sounds/alsa/Front_Center.wav"),
            probe_interval: Duration::from_secs(1),
            probe_window: Duration::from_secs(10),
            ready_after: Duration::from_secs(3),
            terminate_grace: Duration::from_secs(3),
            kill_wait: Duration::from_secs(2),
            command_timeout: Duration::from_secs(3),
            reload_settle: Duration::from_millis(500),
            seek_delay: Duration::from_secs(2),
            supervise_interval: Duration::from_secs(1),
            diagnostic_log_lines: 10,
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            play_pause_pin: 2,
            previous_pin: 5,
            next_pin: 8,
            poll_interval: Duration::from_millis(50),
            long_press: Duration::from_secs(2),
            double_click: Duration::from_millis(400),
            refractory: Duration::from_millis(300),
        }
    }
}

impl Default for MenuConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            message_hold: Duration::from_secs(1),
        }
    }
}

impl Default for DiscDefaults {
    fn default() -> Self {
        Self {
            fallback_track_count: 8,
            placeholder_track_length: Duration::from_secs(180),
        }
    }
}
