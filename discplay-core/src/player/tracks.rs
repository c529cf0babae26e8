use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::DiscDefaults;

/// Track count plus per-track lengths. Tracks without a known length
/// report the placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackTable {
    total: u32,
    lengths: BTreeMap<u32, Duration>,
    placeholder: Duration,
}

impl TrackTable {
    /// No disc.
    pub fn empty(placeholder: Duration) -> Self {
        Self {
            total: 0,
            lengths: BTreeMap::new(),
            placeholder,
        }
    }

    pub fn new(lengths: BTreeMap<u32, Duration>, placeholder: Duration) -> Self {
        Self {
            total: lengths.len() as u32,
            lengths,
            placeholder,
        }
    }

    /// Used when the table of contents cannot be read.
    pub fn fallback(defaults: &DiscDefaults) -> Self {
        Self {
            total: defaults.fallback_track_count,
            lengths: BTreeMap::new(),
            placeholder: defaults.placeholder_track_length,
        }
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn contains(&self, track: u32) -> bool {
        (1..=self.total).contains(&track)
    }

    pub fn length(&self, track: u32) -> Duration {
        self.lengths.get(&track).copied().unwrap_or(self.placeholder)
    }

    pub fn length_secs(&self, track: u32) -> u64 {
        self.length(track).as_secs()
    }
}

/// Parse the table printed by `cdparanoia -Q` (on stderr).
///
/// Matches lines shaped like `  3.    16503 [03:40.03]  ...`; lengths are
/// floored at one second. Returns `None` when no track line is found.
pub fn parse_cdparanoia(output: &str, placeholder: Duration) -> Option<TrackTable> {
    let lengths: BTreeMap<u32, Duration> = output.lines().filter_map(parse_track_line).collect();
    if lengths.is_empty() {
        None
    } else {
        Some(TrackTable::new(lengths, placeholder))
    }
}

fn parse_track_line(line: &str) -> Option<(u32, Duration)> {
    let mut fields = line.split_whitespace();

    let track: u32 = fields.next()?.strip_suffix('.')?.parse().ok()?;
    let sectors = fields.next()?;
    if !sectors.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let stamp = fields.next()?.strip_prefix('[')?;
    let (minutes, rest) = stamp.split_once(':')?;
    let (seconds, frames) = rest.split_once('.')?;
    if !frames.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    let minutes: u64 = minutes.parse().ok()?;
    let seconds: u64 = seconds.parse().ok()?;

    let total = (minutes * 60 + seconds).max(1);
    Some((track, Duration::from_secs(total)))
}
