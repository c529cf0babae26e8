use std::time::{Duration, Instant};

use super::tracks::TrackTable;

/// Decoder supervision state for the current process instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessPhase {
    /// No process.
    #[default]
    Stopped,
    /// Spawned, nothing checked yet.
    Starting,
    /// Inside the liveness probe window.
    Probing,
    /// Alive long enough and accepted the initial roundtrip.
    Ready,
    /// Exited; terminal for this instance.
    Dead(Option<i32>),
}

impl ProcessPhase {
    pub fn is_alive(&self) -> bool {
        matches!(self, ProcessPhase::Starting | ProcessPhase::Probing | ProcessPhase::Ready)
    }
}

/// Wall-clock bookkeeping for elapsed play time with pauses subtracted.
///
/// While playing, `pause_start` is always `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackTiming {
    track_start: Option<Instant>,
    pause_start: Option<Instant>,
    accumulated_pause: Duration,
}

impl PlaybackTiming {
    /// Begin counting at `now`, paused or not.
    pub fn start(now: Instant, playing: bool) -> Self {
        Self {
            track_start: Some(now),
            pause_start: if playing { None } else { Some(now) },
            accumulated_pause: Duration::ZERO,
        }
    }

    pub fn is_started(&self) -> bool {
        self.track_start.is_some()
    }

    pub fn pause(&mut self, now: Instant) {
        if self.pause_start.is_none() {
            self.pause_start = Some(now);
        }
    }

    pub fn resume(&mut self, now: Instant) {
        if let Some(paused_at) = self.pause_start.take() {
            self.accumulated_pause += now.saturating_duration_since(paused_at);
        }
    }

    /// Elapsed play time at `now`; zero before the session started.
    pub fn elapsed(&self, now: Instant) -> Duration {
        let Some(start) = self.track_start else {
            return Duration::ZERO;
        };
        let current_pause = self
            .pause_start
            .map(|paused_at| now.saturating_duration_since(paused_at))
            .unwrap_or_default();

        now.saturating_duration_since(start)
            .saturating_sub(self.accumulated_pause)
            .saturating_sub(current_pause)
    }

    /// Restart the bookkeeping so that `elapsed(now) == elapsed`.
    pub fn rebase(now: Instant, elapsed: Duration, playing: bool) -> Self {
        let start = now.checked_sub(elapsed).unwrap_or(now);
        let mut timing = Self::start(start, true);
        if !playing {
            timing.pause(now);
        }
        timing
    }
}

/// The live view of what the decoder is doing.
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    pub track: u32,
    pub playing: bool,
    pub phase: ProcessPhase,
    pub timing: PlaybackTiming,
    pub table: TrackTable,
    /// Bumped on every spawn so stale watchers can tell they lost.
    pub generation: u64,
}

impl PlaybackSession {
    pub fn new(table: TrackTable) -> Self {
        Self {
            track: 1,
            playing: false,
            phase: ProcessPhase::Stopped,
            timing: PlaybackTiming::default(),
            table,
            generation: 0,
        }
    }

    /// Drop back to no process, keeping the disc and the track number.
    pub fn reset(&mut self) {
        self.playing = false;
        self.phase = ProcessPhase::Stopped;
        self.timing = PlaybackTiming::default();
    }

    pub fn snapshot(&self, now: Instant) -> StatusSnapshot {
        let track_length_secs = self.table.length_secs(self.track);
        let elapsed_secs = self.timing.elapsed(now).as_secs().min(track_length_secs);
        StatusSnapshot {
            track: self.track,
            total_tracks: self.table.total(),
            elapsed_secs,
            track_length_secs,
            playing: self.playing,
            process_alive: self.phase.is_alive(),
            phase: self.phase,
        }
    }
}

/// Point-in-time copy of the session for display and callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub track: u32,
    pub total_tracks: u32,
    /// Clamped to the track length.
    pub elapsed_secs: u64,
    pub track_length_secs: u64,
    pub playing: bool,
    pub process_alive: bool,
    pub phase: ProcessPhase,
}
