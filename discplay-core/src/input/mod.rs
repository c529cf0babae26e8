//! Turns noisy button edges into single-click, double-click and long-press
//! gestures.
//!
//! Only the play/pause button is arbitrated. Previous and next fire a
//! single click on the press edge, with a refractory period to swallow
//! contact bounce.

pub mod poller;
pub mod timer;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;

use crate::commands::{ButtonEdge, ButtonId, Gesture, GestureKind};
use crate::config::InputConfig;

pub use poller::{ButtonPoller, PinReader};
pub use timer::{ClickScheduler, ManualScheduler, TimerScheduler};

/// Receives every gesture the input layer produces.
pub trait GestureSubscriber: Send + Sync {
    fn on_gesture(&self, gesture: Gesture);
}

impl GestureSubscriber for Sender<Gesture> {
    fn on_gesture(&self, gesture: Gesture) {
        if self.send(gesture).is_err() {
            log::warn!("Gesture {} dropped: no receiver", gesture);
        }
    }
}

/// Per-press bookkeeping for the play/pause button.
///
/// For one press/release cycle at most one of {pending single click,
/// double click, long press} wins.
#[derive(Debug, Default, Clone)]
pub struct ClickArbitration {
    pub press_start: Option<Instant>,
    pub last_click_candidate: Option<Instant>,
    pub long_press_fired: bool,
}

pub struct InputDisambiguator {
    long_press: Duration,
    double_click: Duration,
    refractory: Duration,
    scheduler: Arc<dyn ClickScheduler>,
    subscriber: Arc<dyn GestureSubscriber>,
    arbitration: ClickArbitration,
    last_fired: HashMap<ButtonId, Instant>,
}

impl InputDisambiguator {
    pub fn new(
        config: &InputConfig,
        scheduler: Arc<dyn ClickScheduler>,
        subscriber: Arc<dyn GestureSubscriber>,
    ) -> Self {
        Self {
            long_press: config.long_press,
            double_click: config.double_click,
            refractory: config.refractory,
            scheduler,
            subscriber,
            arbitration: ClickArbitration::default(),
            last_fired: HashMap::new(),
        }
    }

    pub fn arbitration(&self) -> &ClickArbitration {
        &self.arbitration
    }

    pub fn handle_edge(&mut self, edge: ButtonEdge) {
        match (edge.button, edge.pressed) {
            (ButtonId::PlayPause, true) => self.on_press(edge.at),
            (ButtonId::PlayPause, false) => self.on_release(edge.at),
            (button, true) => self.on_transport_press(button, edge.at),
            (_, false) => {}
        }
    }

    /// Called on every poll tick; fires the long press while the button is
    /// still held.
    pub fn check_hold(&mut self, now: Instant) {
        let Some(start) = self.arbitration.press_start else {
            return;
        };
        if self.arbitration.long_press_fired || now.saturating_duration_since(start) <= self.long_press {
            return;
        }

        self.arbitration.long_press_fired = true;
        self.arbitration.last_click_candidate = None;
        if self.scheduler.cancel(ButtonId::PlayPause) {
            log::debug!("Long press invalidated a pending single click");
        }
        log::info!("Long press detected");
        self.emit(Gesture::new(ButtonId::PlayPause, GestureKind::LongPressStart));
    }

    fn on_press(&mut self, at: Instant) {
        self.arbitration.press_start = Some(at);
        self.arbitration.long_press_fired = false;
    }

    fn on_release(&mut self, at: Instant) {
        let Some(start) = self.arbitration.press_start.take() else {
            return;
        };
        if self.arbitration.long_press_fired {
            log::debug!("Long press released; click swallowed");
            return;
        }
        if at.saturating_duration_since(start) >= self.long_press {
            return;
        }
        self.on_click(at);
    }

    fn on_click(&mut self, at: Instant) {
        let within_window = self
            .arbitration
            .last_click_candidate
            .is_some_and(|previous| at.saturating_duration_since(previous) < self.double_click);

        // The cancel must succeed for a double click; if the single click
        // already went out, this release starts a new candidate instead.
        if within_window && self.scheduler.cancel(ButtonId::PlayPause) {
            self.arbitration.last_click_candidate = None;
            log::info!("Double click detected");
            self.emit(Gesture::new(ButtonId::PlayPause, GestureKind::DoubleClick));
            return;
        }

        self.arbitration.last_click_candidate = Some(at);
        self.scheduler.schedule(
            ButtonId::PlayPause,
            at + self.double_click,
            Gesture::single(ButtonId::PlayPause),
        );
    }

    fn on_transport_press(&mut self, button: ButtonId, at: Instant) {
        if let Some(last) = self.last_fired.get(&button) {
            if at.saturating_duration_since(*last) < self.refractory {
                log::debug!("{} press within refractory period ignored", button);
                return;
            }
        }
        self.last_fired.insert(button, at);
        self.emit(Gesture::single(button));
    }

    fn emit(&self, gesture: Gesture) {
        log::debug!("Gesture: {}", gesture);
        self.subscriber.on_gesture(gesture);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::Receiver;

    struct Rig {
        input: InputDisambiguator,
        scheduler: Arc<ManualScheduler>,
        rx: Receiver<Gesture>,
        t0: Instant,
    }

    impl Rig {
        fn new() -> Self {
            let (tx, rx) = crossbeam_channel::unbounded();
            let subscriber: Arc<dyn GestureSubscriber> = Arc::new(tx);
            let scheduler = Arc::new(ManualScheduler::new(subscriber.clone()));
            let input = InputDisambiguator::new(&InputConfig::default(), scheduler.clone(), subscriber);
            Self {
                input,
                scheduler,
                rx,
                t0: Instant::now(),
            }
        }

        fn at(&self, ms: u64) -> Instant {
            self.t0 + Duration::from_millis(ms)
        }

        fn click(&mut self, press_ms: u64, release_ms: u64) {
            self.press(press_ms);
            self.release(release_ms);
        }

        fn press(&mut self, ms: u64) {
            let at = self.at(ms);
            self.scheduler.advance_to(at);
            self.input.handle_edge(ButtonEdge::press(ButtonId::PlayPause, at));
        }

        fn release(&mut self, ms: u64) {
            let at = self.at(ms);
            self.scheduler.advance_to(at);
            self.input.handle_edge(ButtonEdge::release(ButtonId::PlayPause, at));
        }

        fn hold_until(&mut self, from_ms: u64, to_ms: u64) {
            let mut ms = from_ms;
            while ms <= to_ms {
                let at = self.at(ms);
                self.scheduler.advance_to(at);
                self.input.check_hold(at);
                ms += 50;
            }
        }

        fn settle(&mut self, ms: u64) -> Vec<Gesture> {
            self.scheduler.advance_to(self.at(ms));
            self.rx.try_iter().collect()
        }
    }

    fn kinds(gestures: &[Gesture]) -> Vec<GestureKind> {
        gestures.iter().map(|g| g.kind).collect()
    }

    #[test]
    fn lone_click_becomes_single_after_window() {
        let mut rig = Rig::new();
        rig.click(0, 100);
        assert!(rig.rx.try_recv().is_err(), "single click is deferred");
        assert!(rig.scheduler.is_pending(ButtonId::PlayPause));

        let gestures = rig.settle(600);
        assert_eq!(kinds(&gestures), vec![GestureKind::SingleClick]);
    }

    #[test]
    fn two_clicks_inside_window_make_one_double_click() {
        let mut rig = Rig::new();
        rig.click(0, 80);
        rig.click(200, 300);

        let gestures = rig.settle(2_000);
        assert_eq!(kinds(&gestures), vec![GestureKind::DoubleClick]);
        assert!(!rig.scheduler.is_pending(ButtonId::PlayPause));
    }

    #[test]
    fn clicks_further_apart_than_window_are_two_singles() {
        let mut rig = Rig::new();
        rig.click(0, 80);
        rig.click(600, 700);

        let gestures = rig.settle(2_000);
        assert_eq!(
            kinds(&gestures),
            vec![GestureKind::SingleClick, GestureKind::SingleClick]
        );
    }

    #[test]
    fn third_quick_click_starts_a_new_candidate() {
        let mut rig = Rig::new();
        rig.click(0, 50);
        rig.click(100, 150);
        rig.click(200, 250);

        let gestures = rig.settle(2_000);
        assert_eq!(
            kinds(&gestures),
            vec![GestureKind::DoubleClick, GestureKind::SingleClick]
        );
    }

    #[test]
    fn long_press_fires_once_while_held_and_release_is_swallowed() {
        let mut rig = Rig::new();
        rig.press(0);
        rig.hold_until(0, 3_000);
        rig.release(3_100);

        let gestures = rig.settle(5_000);
        assert_eq!(kinds(&gestures), vec![GestureKind::LongPressStart]);
    }

    #[test]
    fn click_then_long_press_yields_single_then_long_press() {
        let mut rig = Rig::new();
        rig.click(0, 50);
        rig.press(150);
        rig.hold_until(150, 2_300);
        rig.release(2_350);

        // The single's window closes long before the hold crosses the threshold.
        let gestures = rig.settle(5_000);
        assert_eq!(
            kinds(&gestures),
            vec![GestureKind::SingleClick, GestureKind::LongPressStart]
        );
    }

    #[test]
    fn long_press_cancels_a_single_still_pending() {
        let mut rig = Rig::new();
        rig.click(0, 50);
        rig.press(100);
        assert!(rig.scheduler.is_pending(ButtonId::PlayPause));

        // Timer thread late: the hold check runs before the single is delivered.
        let held = rig.at(2_200);
        rig.input.check_hold(held);
        assert!(!rig.scheduler.is_pending(ButtonId::PlayPause));
        rig.release(2_300);

        let gestures = rig.settle(5_000);
        assert_eq!(kinds(&gestures), vec![GestureKind::LongPressStart]);
        assert!(rig.input.arbitration().last_click_candidate.is_none());
    }

    #[test]
    fn click_right_after_long_press_is_a_single() {
        let mut rig = Rig::new();
        rig.press(0);
        rig.hold_until(0, 2_100);
        rig.release(2_150);
        rig.click(2_300, 2_350);

        let gestures = rig.settle(5_000);
        assert_eq!(
            kinds(&gestures),
            vec![GestureKind::LongPressStart, GestureKind::SingleClick]
        );
    }

    #[test]
    fn release_past_threshold_without_tick_emits_nothing() {
        let mut rig = Rig::new();
        rig.click(0, 2_500);
        assert!(rig.settle(5_000).is_empty());
    }

    #[test]
    fn transport_buttons_fire_on_press_with_refractory() {
        let mut rig = Rig::new();
        let next = |rig: &mut Rig, ms| {
            let at = rig.at(ms);
            rig.input.handle_edge(ButtonEdge::press(ButtonId::Next, at));
            rig.input.handle_edge(ButtonEdge::release(ButtonId::Next, at + Duration::from_millis(20)));
        };
        next(&mut rig, 0);
        next(&mut rig, 100);
        next(&mut rig, 400);

        let gestures: Vec<Gesture> = rig.rx.try_iter().collect();
        assert_eq!(gestures, vec![Gesture::single(ButtonId::Next); 2]);
    }

    #[test]
    fn refractory_is_tracked_per_button() {
        let mut rig = Rig::new();
        let at = rig.at(0);
        rig.input.handle_edge(ButtonEdge::press(ButtonId::Next, at));
        rig.input.handle_edge(ButtonEdge::press(ButtonId::Previous, at + Duration::from_millis(10)));

        let gestures: Vec<Gesture> = rig.rx.try_iter().collect();
        assert_eq!(
            gestures,
            vec![Gesture::single(ButtonId::Next), Gesture::single(ButtonId::Previous)]
        );
    }
}
