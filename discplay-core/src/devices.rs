//! Collaborator interfaces the core drives but does not implement.
//!
//! Concrete implementations (ALSA/PulseAudio, bluetoothctl, the LCD, disc
//! detection) live in the front-panel binary.

use std::sync::{Arc, OnceLock};

use anyhow::bail;
use strum::{EnumIter, EnumString};

use crate::player::TrackTable;

/// An audio sink the decoder can be pointed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDevice {
    /// `hw=N,0`, `pulse`, or `pulse:<sink>`
    pub id: String,
    pub name: String,
    pub kind: OutputKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum OutputKind {
    #[strum(serialize = "Hardware")]
    Alsa,
    PipeWire,
    Bluetooth,
}

/// Notified synchronously when the active output device changes.
pub trait OutputChangeObserver: Send + Sync {
    fn output_changed(&self, device_id: &str);
}

pub trait AudioOutputs: Send + Sync {
    fn current_device_id(&self) -> String;

    /// Re-enumerate sinks and return the fresh list.
    fn refresh_devices(&self) -> Vec<AudioDevice>;

    /// Make `device_id` the active sink. Implementations notify the
    /// registered observer before returning.
    fn select_device(&self, device_id: &str) -> anyhow::Result<()>;

    /// Register the single change observer.
    fn subscribe(&self, observer: Arc<dyn OutputChangeObserver>) -> anyhow::Result<()>;
}

/// Register-once observer slot for `AudioOutputs` implementations.
#[derive(Default)]
pub struct OutputChangeNotifier {
    slot: OnceLock<Arc<dyn OutputChangeObserver>>,
}

impl OutputChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, observer: Arc<dyn OutputChangeObserver>) -> anyhow::Result<()> {
        if self.slot.set(observer).is_err() {
            bail!("an output change observer is already registered");
        }
        Ok(())
    }

    pub fn notify(&self, device_id: &str) {
        match self.slot.get() {
            Some(observer) => observer.output_changed(device_id),
            None => log::debug!("Output changed to {} with no observer", device_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BluetoothDevice {
    /// MAC address
    pub id: String,
    pub display_name: String,
    pub paired: bool,
    pub connected: bool,
}

impl BluetoothDevice {
    /// Name for the 16-column display, falling back to the address.
    pub fn label(&self) -> &str {
        if self.display_name.is_empty() {
            &self.id
        } else {
            &self.display_name
        }
    }

    /// Actions offered for this device given its current status.
    pub fn available_actions(&self) -> Vec<BluetoothAction> {
        if !self.paired {
            vec![BluetoothAction::Pair]
        } else if self.connected {
            vec![BluetoothAction::Disconnect, BluetoothAction::Forget]
        } else {
            vec![BluetoothAction::Connect, BluetoothAction::Forget]
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumString, strum::Display)]
#[strum(ascii_case_insensitive)]
pub enum BluetoothAction {
    Pair,
    Connect,
    Disconnect,
    Forget,
}

impl BluetoothAction {
    /// Progress label shown while the action runs.
    pub fn progress_label(&self) -> &'static str {
        match self {
            BluetoothAction::Pair => "Pairing...",
            BluetoothAction::Connect => "Connecting...",
            BluetoothAction::Disconnect => "Disconnecting",
            BluetoothAction::Forget => "Forgetting...",
        }
    }
}

pub trait BluetoothManager: Send + Sync {
    fn scan_devices(&self) -> Vec<BluetoothDevice>;
    fn perform_action(&self, device_id: &str, action: BluetoothAction) -> bool;
}

/// Two-line text display. Callers pass lines already fitted to the panel.
pub trait DisplaySink: Send + Sync {
    fn show_status(&self, line1: &str, line2: &str);
}

/// Entry points exposed to the disc insertion/removal detector.
pub trait DiscListener: Send + Sync {
    fn disc_inserted(&self);
    fn disc_removed(&self);
}

/// Reads the table of contents of the inserted disc.
pub trait TrackProbe: Send + Sync {
    fn probe(&self) -> anyhow::Result<TrackTable>;
}
