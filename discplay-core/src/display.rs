use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::clock::CancellationToken;
use crate::player::{ProcessPhase, StatusSnapshot};

pub const LCD_COLUMNS: usize = 16;

/// Column where the play-state indicator starts on the second line.
const INDICATOR_COLUMN: usize = 14;

/// Truncate to the panel width, counting characters rather than bytes.
pub fn fit_line(text: &str) -> String {
    text.chars().take(LCD_COLUMNS).collect()
}

/// `M:SS`, e.g. `1:23`.
pub fn format_time(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

pub fn loading_lines(track: u32, total: u32) -> (String, String) {
    (
        fit_line(&format!("Loading {:02}/{:02}", track, total)),
        "Please wait...".to_string(),
    )
}

/// Idle screen for a live session.
pub fn track_lines(status: &StatusSnapshot) -> (String, String) {
    let line1 = fit_line(&format!("Track {:02}/{:02}", status.track, status.total_tracks));
    let time = format!(
        "{}/{}",
        format_time(status.elapsed_secs),
        format_time(status.track_length_secs)
    );

    let indicator = if !status.process_alive {
        "X"
    } else if status.playing {
        ">"
    } else {
        "||"
    };

    let line2 = if time.chars().count() < INDICATOR_COLUMN {
        format!("{:<width$}{}", time, indicator, width = INDICATOR_COLUMN)
    } else {
        time
    };
    (line1, fit_line(&line2))
}

/// Lines for whatever the controller is doing right now.
pub fn status_lines(status: &StatusSnapshot) -> (String, String) {
    match status.phase {
        ProcessPhase::Starting | ProcessPhase::Probing => {
            loading_lines(status.track, status.total_tracks)
        }
        ProcessPhase::Ready | ProcessPhase::Dead(_) => track_lines(status),
        ProcessPhase::Stopped => ("CD Player".to_string(), "Stopped".to_string()),
    }
}

/// Tracks whether the menu currently owns the display.
///
/// The idle status loop skips its refresh while the menu is open.
#[derive(Debug, Default)]
pub struct ScreenOwner {
    menu_active: AtomicBool,
}

impl ScreenOwner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim_for_menu(&self) {
        self.menu_active.store(true, Ordering::SeqCst);
    }

    pub fn release_menu(&self) {
        self.menu_active.store(false, Ordering::SeqCst);
    }

    pub fn menu_active(&self) -> bool {
        self.menu_active.load(Ordering::SeqCst)
    }
}

/// A named thread that runs `tick` immediately and then once per interval
/// until stopped.
pub struct RefreshLoop {
    stop: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl RefreshLoop {
    pub fn spawn<F>(name: &str, interval: Duration, mut tick: F) -> io::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let stop = CancellationToken::new();
        let token = stop.clone();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let ticker = crossbeam_channel::tick(interval);
                loop {
                    if token.is_cancelled() {
                        break;
                    }
                    tick();
                    crossbeam_channel::select! {
                        recv(token.signal()) -> _ => break,
                        recv(ticker) -> _ => {}
                    }
                }
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Cancel and wait for the current tick to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.cancel();
        if let Some(handle) = self.handle.take() {
            // A tick that stops its own loop must not join itself.
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for RefreshLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}
