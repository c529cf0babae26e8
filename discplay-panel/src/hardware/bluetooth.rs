use std::collections::BTreeMap;
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use discplay_core::devices::{BluetoothAction, BluetoothDevice, BluetoothManager};

use super::{converse, run_captured};

const INFO_TIMEOUT: Duration = Duration::from_secs(5);
const ACTION_TIMEOUT: Duration = Duration::from_secs(30);
/// Time for each listing command to print before the next one is sent.
const LIST_SETTLE: Duration = Duration::from_secs(1);

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: Option<String>,
    pub paired: bool,
    pub connected: bool,
}

pub struct BluetoothCtl {
    scan_time: Duration,
}

impl BluetoothCtl {
    pub fn new(scan_time: Duration) -> Self {
        Self { scan_time }
    }

    /// Run one discovery session and return every `Device` line printed.
    fn discover(&self) -> Result<String> {
        let child = Command::new("bluetoothctl")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context("spawn bluetoothctl")?;

        let script = [
            ("scan on", self.scan_time),
            ("devices", LIST_SETTLE),
            ("paired-devices", LIST_SETTLE),
            ("scan off", Duration::ZERO),
            ("quit", Duration::ZERO),
        ];
        let output = converse(child, "bluetoothctl", &script, ACTION_TIMEOUT)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn info(&self, mac: &str) -> Option<DeviceInfo> {
        match run_captured(Command::new("bluetoothctl").args(["info", mac]), INFO_TIMEOUT) {
            Ok(output) => Some(parse_info(&String::from_utf8_lossy(&output.stdout))),
            Err(e) => {
                log::warn!("bluetoothctl info {} failed: {:#}", mac, e);
                None
            }
        }
    }

    fn run(&self, verb: &str, mac: &str) -> bool {
        log::info!("bluetoothctl {} {}", verb, mac);
        match run_captured(Command::new("bluetoothctl").args([verb, mac]), ACTION_TIMEOUT) {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let ok = output.status.success() && !stdout.contains("Failed");
                if !ok {
                    log::warn!("bluetoothctl {} {}: {}", verb, mac, stdout.trim());
                }
                ok
            }
            Err(e) => {
                log::warn!("bluetoothctl {} {} failed: {:#}", verb, mac, e);
                false
            }
        }
    }
}

impl BluetoothManager for BluetoothCtl {
    fn scan_devices(&self) -> Vec<BluetoothDevice> {
        log::info!("Scanning for Bluetooth devices for {:?}", self.scan_time);
        let listing = match self.discover() {
            Ok(listing) => listing,
            Err(e) => {
                log::error!("Bluetooth scan failed: {:#}", e);
                return Vec::new();
            }
        };

        let mut found: BTreeMap<String, BluetoothDevice> = BTreeMap::new();
        for (mac, raw_name) in parse_device_lines(&listing) {
            let info = self.info(&mac).unwrap_or_default();
            let display_name = info
                .name
                .clone()
                .or(raw_name)
                .unwrap_or_else(|| fallback_name(&mac));
            found.insert(
                mac.clone(),
                BluetoothDevice {
                    id: mac,
                    display_name,
                    paired: info.paired,
                    connected: info.connected,
                },
            );
        }

        let mut devices: Vec<BluetoothDevice> = found.into_values().collect();
        devices.sort_by(|a, b| {
            (a.display_name.to_lowercase(), &a.id).cmp(&(b.display_name.to_lowercase(), &b.id))
        });
        log::info!("Found {} Bluetooth devices", devices.len());
        devices
    }

    fn perform_action(&self, device_id: &str, action: BluetoothAction) -> bool {
        match action {
            BluetoothAction::Pair => {
                // A fresh pairing is trusted and connected right away.
                self.run("pair", device_id) && self.run("trust", device_id) && self.run("connect", device_id)
            }
            BluetoothAction::Connect => self.run("connect", device_id),
            BluetoothAction::Disconnect => self.run("disconnect", device_id),
            BluetoothAction::Forget => self.run("remove", device_id),
        }
    }
}

/// `(mac, name)` for every `Device XX:XX:XX:XX:XX:XX Name` line, with or
/// without the interactive prompt prefix.
pub fn parse_device_lines(output: &str) -> Vec<(String, Option<String>)> {
    output
        .lines()
        .filter_map(|line| {
            let rest = &line[line.find("Device ")? + "Device ".len()..];
            let (mac, name) = match rest.split_once(' ') {
                Some((mac, name)) => (mac, Some(name.trim())),
                None => (rest.trim(), None),
            };
            if !is_mac(mac) {
                return None;
            }
            let name = name
                .filter(|n| !n.is_empty() && *n != "Unknown Device" && !is_mac(&n.replace('-', ":")))
                .map(str::to_string);
            Some((mac.to_string(), name))
        })
        .collect()
}

pub fn parse_info(output: &str) -> DeviceInfo {
    let mut info = DeviceInfo::default();
    for line in output.lines().map(str::trim) {
        if let Some(name) = line.strip_prefix("Name:") {
            info.name = Some(name.trim().to_string()).filter(|n| !n.is_empty());
        } else if let Some(value) = line.strip_prefix("Paired:") {
            info.paired = value.trim() == "yes";
        } else if let Some(value) = line.strip_prefix("Connected:") {
            info.connected = value.trim() == "yes";
        }
    }
    info
}

fn is_mac(text: &str) -> bool {
    text.len() == 17
        && text
            .split(':')
            .all(|octet| octet.len() == 2 && octet.chars().all(|c| c.is_ascii_hexdigit()))
}

/// `Device-EEFF` from the last four hex digits.
fn fallback_name(mac: &str) -> String {
    let digits: String = mac.chars().filter(|c| *c != ':').collect();
    let suffix = &digits[digits.len().saturating_sub(4)..];
    format!("Device-{}", suffix.to_uppercase())
}
