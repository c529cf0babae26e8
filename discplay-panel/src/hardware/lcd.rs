use std::io::{self, Write};
use std::sync::Mutex;

use discplay_core::devices::DisplaySink;
use discplay_core::display::{LCD_COLUMNS, fit_line};

/// Writes a frame only when the text changes, the way the panel LCD is
/// driven to avoid flicker.
#[derive(Default)]
pub struct ConsoleLcd {
    last: Mutex<Option<(String, String)>>,
}

impl ConsoleLcd {
    pub fn new() -> Self {
        Self::default()
    }

    fn frame(line1: &str, line2: &str) -> String {
        format!(
            "|{:<width$}|{:<width$}|",
            line1,
            line2,
            width = LCD_COLUMNS
        )
    }
}

impl DisplaySink for ConsoleLcd {
    fn show_status(&self, line1: &str, line2: &str) {
        let lines = (fit_line(line1), fit_line(line2));
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        if last.as_ref() == Some(&lines) {
            return;
        }
        log::debug!("LCD: {:?} / {:?}", lines.0, lines.1);
        let mut out = io::stdout().lock();
        if let Err(e) = writeln!(out, "{}", Self::frame(&lines.0, &lines.1)) {
            log::warn!("LCD write failed: {}", e);
            return;
        }
        *last = Some(lines);
    }
}
