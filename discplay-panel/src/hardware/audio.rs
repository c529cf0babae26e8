use std::collections::HashMap;
use std::process::Command;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use discplay_core::devices::{AudioDevice, AudioOutputs, OutputChangeNotifier, OutputChangeObserver, OutputKind};
use discplay_core::markers::MarkerFile;

use super::run_captured;

const PACTL_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_DEVICE: &str = "hw=0,0";

pub struct SystemAudio {
    user: String,
    env: Vec<(String, String)>,
    marker: MarkerFile,
    current: Mutex<String>,
    devices: Mutex<Vec<AudioDevice>>,
    notifier: OutputChangeNotifier,
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl SystemAudio {
    /// `env` is the PulseAudio runtime environment handed to `pactl`.
    pub fn new(user: impl Into<String>, env: Vec<(String, String)>, marker: MarkerFile) -> Self {
        Self {
            user: user.into(),
            env,
            marker,
            current: Mutex::new(DEFAULT_DEVICE.to_string()),
            devices: Mutex::new(Vec::new()),
            notifier: OutputChangeNotifier::new(),
        }
    }

    /// Re-select the device saved in the marker if it is still present.
    pub fn restore_last_device(&self) {
        let Some(last) = self.marker.read() else {
            log::info!("No saved audio output to restore");
            return;
        };
        if !self.refresh_devices().iter().any(|d| d.id == last) {
            log::info!("Saved audio output {} is gone", last);
            return;
        }
        log::info!("Restoring audio output {}", last);
        if let Err(e) = self.select_device(&last) {
            log::warn!("Could not restore {}: {:#}", last, e);
        }
    }

    fn pactl(&self, args: &[&str]) -> Result<String> {
        let mut command = Command::new("sudo");
        command
            .args(["-u", &self.user, "-E", "pactl"])
            .args(args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        let output = run_captured(&mut command, PACTL_TIMEOUT)?;
        if !output.status.success() {
            bail!(
                "pactl {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn scan_alsa(&self) -> Vec<AudioDevice> {
        match run_captured(Command::new("aplay").arg("-l"), PACTL_TIMEOUT) {
            Ok(output) if output.status.success() => parse_aplay(&String::from_utf8_lossy(&output.stdout)),
            Ok(output) => {
                log::warn!("aplay -l exited with {}", output.status);
                Vec::new()
            }
            Err(e) => {
                log::warn!("ALSA scan failed: {:#}", e);
                Vec::new()
            }
        }
    }

    fn scan_sinks(&self) -> Result<Vec<AudioDevice>> {
        self.pactl(&["info"]).context("PulseAudio not reachable")?;
        let short = self.pactl(&["list", "short", "sinks"])?;
        let descriptions = self
            .pactl(&["list", "sinks"])
            .map(|long| parse_sink_descriptions(&long))
            .unwrap_or_default();

        let mut devices: Vec<AudioDevice> = parse_short_sinks(&short)
            .into_iter()
            .map(|sink| sink_device(&sink, descriptions.get(&sink).map(String::as_str)))
            .collect();
        devices.push(AudioDevice {
            id: "pulse".to_string(),
            name: "PipeWire Default".to_string(),
            kind: OutputKind::PipeWire,
        });
        Ok(devices)
    }
}

impl AudioOutputs for SystemAudio {
    fn current_device_id(&self) -> String {
        guard(&self.current).clone()
    }

    fn refresh_devices(&self) -> Vec<AudioDevice> {
        let mut devices = self.scan_alsa();
        match self.scan_sinks() {
            Ok(sinks) => devices.extend(sinks),
            Err(e) => log::warn!("Skipping sink scan: {:#}", e),
        }
        log::info!("Found {} audio outputs", devices.len());
        for device in &devices {
            log::debug!("  {} ({}) [{}]", device.name, device.id, device.kind);
        }
        *guard(&self.devices) = devices.clone();
        devices
    }

    fn select_device(&self, device_id: &str) -> Result<()> {
        if let Some(sink) = device_id.strip_prefix("pulse:") {
            self.pactl(&["set-default-sink", sink])
                .with_context(|| format!("set default sink {}", sink))?;
        }

        let previous = std::mem::replace(&mut *guard(&self.current), device_id.to_string());
        self.marker.store(device_id);
        log::info!("Audio output changed from {} to {}", previous, device_id);
        self.notifier.notify(device_id);
        Ok(())
    }

    fn subscribe(&self, observer: Arc<dyn OutputChangeObserver>) -> Result<()> {
        self.notifier.register(observer)
    }
}

/// Hardware cards from `aplay -l`, one entry per card.
pub fn parse_aplay(output: &str) -> Vec<AudioDevice> {
    let mut devices: Vec<AudioDevice> = Vec::new();
    for line in output.lines() {
        let Some(rest) = line.trim().strip_prefix("card ") else {
            continue;
        };
        let Some((number, rest)) = rest.split_once(':') else {
            continue;
        };
        let Ok(card) = number.trim().parse::<u32>() else {
            continue;
        };
        let name = rest.split(',').next().unwrap_or_default().trim();
        let id = format!("hw={},0", card);
        if devices.iter().any(|d| d.id == id) {
            continue;
        }
        devices.push(AudioDevice {
            id,
            name: format!("{} (Hardware)", name),
            kind: OutputKind::Alsa,
        });
    }
    devices
}

/// Sink names from `pactl list short sinks` (second tab-separated column).
pub fn parse_short_sinks(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.split('\t').nth(1))
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

/// `Name:` to `Description:` pairs from `pactl list sinks`.
pub fn parse_sink_descriptions(output: &str) -> HashMap<String, String> {
    let mut descriptions = HashMap::new();
    let mut current: Option<String> = None;
    for line in output.lines().map(str::trim) {
        if let Some(name) = line.strip_prefix("Name:") {
            current = Some(name.trim().to_string());
        } else if let Some(description) = line.strip_prefix("Description:") {
            if let Some(name) = current.take() {
                descriptions.insert(name, description.trim().to_string());
            }
        }
    }
    descriptions
}

fn sink_device(sink: &str, description: Option<&str>) -> AudioDevice {
    let description = description
        .map(str::to_string)
        .unwrap_or_else(|| sink.replace('_', " "));
    let lower = sink.to_lowercase();
    let (kind, name) = if lower.contains("bluez") {
        (OutputKind::Bluetooth, format!("{} (Bluetooth)", description))
    } else if lower.contains("alsa") {
        (OutputKind::PipeWire, format!("{} (Audio)", description))
    } else {
        (OutputKind::PipeWire, description)
    };
    AudioDevice {
        id: format!("pulse:{}", sink),
        name,
        kind,
    }
}
