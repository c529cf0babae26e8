use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use discplay_core::devices::{DiscListener, TrackProbe};
use discplay_core::display::RefreshLoop;
use discplay_core::player::{TrackTable, parse_cdparanoia};

use crate::hardware::run_captured;

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Reads the track table with `cdparanoia -Q`.
pub struct CdparanoiaProbe {
    device: PathBuf,
    placeholder: Duration,
}

impl CdparanoiaProbe {
    pub fn new(device: impl Into<PathBuf>, placeholder: Duration) -> Self {
        Self {
            device: device.into(),
            placeholder,
        }
    }
}

impl TrackProbe for CdparanoiaProbe {
    fn probe(&self) -> Result<TrackTable> {
        let mut command = Command::new("cdparanoia");
        command.arg("-Q").arg("-d").arg(&self.device);
        let output = run_captured(&mut command, PROBE_TIMEOUT)?;

        // The table goes to stderr.
        let text = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stderr),
            String::from_utf8_lossy(&output.stdout)
        );
        let table = parse_cdparanoia(&text, self.placeholder)
            .ok_or_else(|| anyhow!("no audio tracks in cdparanoia output ({})", output.status))?;
        log::info!("Disc table of contents: {} tracks", table.total());
        Ok(table)
    }
}

/// Polls the block device size; non-zero means a disc is in the drive.
pub struct DiscWatcher {
    size_file: PathBuf,
    present: bool,
    read_failed: bool,
    listener: Arc<dyn DiscListener>,
}

impl DiscWatcher {
    pub fn new(size_file: impl Into<PathBuf>, listener: Arc<dyn DiscListener>) -> Self {
        Self {
            size_file: size_file.into(),
            present: false,
            read_failed: false,
            listener,
        }
    }

    /// Check once and notify on a change. A disc already in the drive is
    /// reported on the first check.
    pub fn poll_once(&mut self) {
        let present = match read_size(&self.size_file) {
            Ok(size) => {
                self.read_failed = false;
                size > 0
            }
            Err(e) => {
                if !self.read_failed {
                    log::warn!("Cannot read {}: {}", self.size_file.display(), e);
                    self.read_failed = true;
                }
                false
            }
        };

        if present == self.present {
            return;
        }
        self.present = present;
        if present {
            self.listener.disc_inserted();
        } else {
            self.listener.disc_removed();
        }
    }

    pub fn spawn(mut self, interval: Duration) -> io::Result<RefreshLoop> {
        log::info!("Watching {} for discs", self.size_file.display());
        RefreshLoop::spawn("disc-watch", interval, move || self.poll_once())
    }
}

fn read_size(path: &Path) -> io::Result<u64> {
    let raw = fs::read_to_string(path)?;
    raw.trim()
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
