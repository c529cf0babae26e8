use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use discplay_core::commands::ButtonId;
use discplay_core::config::InputConfig;
use discplay_core::input::PinReader;
use strum::IntoEnumIterator;

fn pin_for(config: &InputConfig, button: ButtonId) -> u32 {
    match button {
        ButtonId::PlayPause => config.play_pause_pin,
        ButtonId::Previous => config.previous_pin,
        ButtonId::Next => config.next_pin,
    }
}

pub struct SysfsPins {
    values: HashMap<ButtonId, PathBuf>,
}

impl SysfsPins {
    /// Export each configured line as an input.
    pub fn open(root: &Path, config: &InputConfig) -> Result<Self> {
        let mut values = HashMap::new();
        for button in ButtonId::iter() {
            let pin = pin_for(config, button);
            let line = root.join(format!("gpio{}", pin));
            if !line.exists() {
                fs::write(root.join("export"), pin.to_string())
                    .with_context(|| format!("export gpio{} for {}", pin, button))?;
            }
            if let Err(e) = fs::write(line.join("direction"), "in") {
                log::warn!("Could not set gpio{} as input: {}", pin, e);
            }
            log::info!("{} button on gpio{}", button, pin);
            values.insert(button, line.join("value"));
        }
        Ok(Self { values })
    }
}

impl PinReader for SysfsPins {
    fn is_pressed(&mut self, button: ButtonId) -> io::Result<bool> {
        let path = self.values.get(&button).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no pin for {}", button))
        })?;
        // Active low: the button shorts the pulled-up line to ground.
        Ok(fs::read_to_string(path)?.trim() == "0")
    }
}
