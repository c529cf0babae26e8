use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use strum::IntoEnumIterator;

use crate::clock::Clock;
use crate::commands::{ButtonEdge, ButtonId};
use crate::config::InputConfig;
use crate::display::RefreshLoop;
use crate::input::InputDisambiguator;

/// Raw access to the button pins.
pub trait PinReader: Send {
    /// `true` while the button is held down.
    fn is_pressed(&mut self, button: ButtonId) -> io::Result<bool>;
}

pub struct ButtonPoller {
    reader: Box<dyn PinReader>,
    disambiguator: InputDisambiguator,
    clock: Arc<dyn Clock>,
    levels: HashMap<ButtonId, bool>,
    failing: HashMap<ButtonId, bool>,
}

impl ButtonPoller {
    pub fn new(
        reader: Box<dyn PinReader>,
        disambiguator: InputDisambiguator,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            reader,
            disambiguator,
            clock,
            levels: HashMap::new(),
            failing: HashMap::new(),
        }
    }

    /// Sample every pin once, forward edges, then run the hold check.
    pub fn poll_once(&mut self) {
        let now = self.clock.now();
        for button in ButtonId::iter() {
            let pressed = match self.reader.is_pressed(button) {
                Ok(pressed) => {
                    if self.failing.remove(&button).is_some() {
                        log::info!("Pin for {} readable again", button);
                    }
                    pressed
                }
                Err(e) => {
                    // Log once per streak; the loop keeps polling.
                    if self.failing.insert(button, true).is_none() {
                        log::warn!("Failed to read pin for {}: {}", button, e);
                    }
                    continue;
                }
            };

            let was_pressed = self.levels.insert(button, pressed).unwrap_or(false);
            if pressed != was_pressed {
                let edge = if pressed {
                    ButtonEdge::press(button, now)
                } else {
                    ButtonEdge::release(button, now)
                };
                self.disambiguator.handle_edge(edge);
            }
        }
        self.disambiguator.check_hold(now);
    }

    /// Run [`poll_once`](Self::poll_once) on a dedicated thread every
    /// `poll_interval`.
    pub fn spawn(mut self, config: &InputConfig) -> io::Result<RefreshLoop> {
        log::info!("Button polling every {:?}", config.poll_interval);
        RefreshLoop::spawn("button-poll", config.poll_interval, move || self.poll_once())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::commands::{Gesture, GestureKind};
    use crate::input::{GestureSubscriber, ManualScheduler};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays scripted levels for the play/pause pin; others stay released.
    struct ScriptedPins {
        script: Arc<Mutex<VecDeque<io::Result<bool>>>>,
    }

    impl PinReader for ScriptedPins {
        fn is_pressed(&mut self, button: ButtonId) -> io::Result<bool> {
            if button != ButtonId::PlayPause {
                return Ok(false);
            }
            self.script.lock().unwrap().pop_front().unwrap_or(Ok(false))
        }
    }

    #[test]
    fn held_pin_becomes_long_press_through_poll_ticks() {
        let (tx, rx) = crossbeam_channel::unbounded::<Gesture>();
        let subscriber: Arc<dyn GestureSubscriber> = Arc::new(tx);
        let scheduler = Arc::new(ManualScheduler::new(subscriber.clone()));
        let config = InputConfig::default();
        let clock = Arc::new(ManualClock::new());

        let script = Arc::new(Mutex::new(VecDeque::new()));
        {
            let mut s = script.lock().unwrap();
            s.push_back(Err(io::Error::other("gpio busy")));
            for _ in 0..45 {
                s.push_back(Ok(true));
            }
            s.push_back(Ok(false));
        }

        let mut poller = ButtonPoller::new(
            Box::new(ScriptedPins { script }),
            InputDisambiguator::new(&config, scheduler.clone(), subscriber),
            clock.clone(),
        );
        for _ in 0..50 {
            poller.poll_once();
            clock.advance(Duration::from_millis(50));
            scheduler.advance_to(clock.now());
        }

        let kinds: Vec<GestureKind> = rx.try_iter().map(|g| g.kind).collect();
        assert_eq!(kinds, vec![GestureKind::LongPressStart]);
    }
}
