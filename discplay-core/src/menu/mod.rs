pub mod render;
pub mod state;

use std::sync::Arc;

pub use render::{MenuLists, render};
pub use state::{MenuState, RootItem, SubmenuKind, Transition};

use crate::clock::Clock;
use crate::commands::{ButtonId, Gesture, GestureKind};
use crate::config::MenuConfig;
use crate::devices::{AudioOutputs, BluetoothManager, DisplaySink};
use crate::display::{ScreenOwner, fit_line};
use crate::error::{PlayerError, PlayerResult};
use crate::player::{StatusSnapshot, TrackTable};
use state::{wrap_next, wrap_prev};

/// Transport operations the menu forwards to when it is closed.
pub trait Transport: Send + Sync {
    fn toggle_play_pause(&self) -> PlayerResult<()>;
    fn next(&self) -> PlayerResult<()>;
    fn previous(&self) -> PlayerResult<()>;
    fn load_playing(&self, track: u32) -> PlayerResult<()>;
    fn status(&self) -> StatusSnapshot;
    fn track_table(&self) -> TrackTable;
}

pub struct MenuStateMachine {
    config: MenuConfig,
    clock: Arc<dyn Clock>,
    transport: Arc<dyn Transport>,
    outputs: Arc<dyn AudioOutputs>,
    bluetooth: Arc<dyn BluetoothManager>,
    display: Arc<dyn DisplaySink>,
    screen: Arc<ScreenOwner>,
    state: MenuState,
    lists: MenuLists,
}

impl MenuStateMachine {
    pub fn new(
        config: MenuConfig,
        clock: Arc<dyn Clock>,
        transport: Arc<dyn Transport>,
        outputs: Arc<dyn AudioOutputs>,
        bluetooth: Arc<dyn BluetoothManager>,
        display: Arc<dyn DisplaySink>,
        screen: Arc<ScreenOwner>,
    ) -> Self {
        let lists = MenuLists {
            tracks: transport.track_table(),
            audio: Vec::new(),
            bluetooth: Vec::new(),
        };
        Self {
            config,
            clock,
            transport,
            outputs,
            bluetooth,
            display,
            screen,
            state: MenuState::Closed,
            lists,
        }
    }

    pub fn state(&self) -> &MenuState {
        &self.state
    }

    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    pub fn handle_gesture(&mut self, gesture: Gesture) {
        self.check_timeout();
        let transition = if self.state.is_open() {
            self.navigate(gesture)
        } else {
            self.forward(gesture)
        };
        self.apply(transition);
    }

    /// Collapse the menu if its deadline has passed. Returns `true` when it
    /// just closed.
    pub fn check_timeout(&mut self) -> bool {
        match self.state.deadline() {
            Some(deadline) if self.clock.now() >= deadline => {
                log::info!("Menu timed out");
                self.close();
                true
            }
            _ => false,
        }
    }

    pub fn close(&mut self) {
        if self.state.is_open() {
            log::info!("Leaving menu");
        }
        self.state = MenuState::Closed;
        self.screen.release_menu();
    }

    pub fn render(&self) -> Option<(String, String)> {
        render(&self.state, &self.lists)
    }

    /// Redraw the current level, if open.
    pub fn refresh(&self) {
        if let Some((line1, line2)) = self.render() {
            self.display.show_status(&line1, &line2);
        }
    }

    /// Gestures while the menu is closed.
    fn forward(&mut self, gesture: Gesture) -> Transition {
        let result = match (gesture.button, gesture.kind) {
            (ButtonId::PlayPause, GestureKind::LongPressStart) => {
                return Transition::Enter(MenuState::Root {
                    selected_index: 0,
                    deadline: self.deadline(),
                });
            }
            (ButtonId::PlayPause, GestureKind::SingleClick) => self.transport.toggle_play_pause(),
            (ButtonId::Previous, GestureKind::SingleClick) => self.transport.previous(),
            (ButtonId::Next, GestureKind::SingleClick) => self.transport.next(),
            _ => Ok(()),
        };
        if let Err(e) = result {
            log::warn!("{} not applied: {}", gesture, e);
        }
        Transition::Stay
    }

    /// Gestures while the menu is open.
    fn navigate(&mut self, gesture: Gesture) -> Transition {
        match (gesture.button, gesture.kind) {
            (ButtonId::PlayPause, GestureKind::SingleClick) => self.select(),
            (ButtonId::PlayPause, GestureKind::DoubleClick) => Transition::Back,
            (ButtonId::Previous, GestureKind::SingleClick) => self.step(wrap_prev),
            (ButtonId::Next, GestureKind::SingleClick) => self.step(wrap_next),
            _ => Transition::Stay,
        }
    }

    fn current_len(&self) -> usize {
        match &self.state {
            MenuState::Closed => 0,
            MenuState::Root { .. } => RootItem::count(),
            MenuState::Submenu { kind, .. } => self.lists.len(*kind),
            MenuState::ActionMenu { actions, .. } => actions.len(),
        }
    }

    fn step(&mut self, wrap: fn(usize, usize) -> usize) -> Transition {
        let len = self.current_len();
        if len == 0 {
            return Transition::Stay;
        }
        if let Some(index) = self.state.selected_mut() {
            *index = wrap(*index, len);
        }
        Transition::Touch
    }

    fn select(&mut self) -> Transition {
        match self.state.clone() {
            MenuState::Closed => Transition::Stay,
            MenuState::Root { selected_index, .. } => match RootItem::at(selected_index) {
                Some(RootItem::ExitMenu) | None => Transition::Close,
                Some(item) => match item.submenu() {
                    Some(kind) => self.enter_submenu(kind),
                    None => Transition::Close,
                },
            },
            MenuState::Submenu {
                kind: SubmenuKind::Tracks,
                selected_index,
                ..
            } => self.play_track(selected_index as u32 + 1),
            MenuState::Submenu {
                kind: SubmenuKind::AudioOutput,
                selected_index,
                ..
            } => self.apply_output(selected_index),
            MenuState::Submenu {
                kind: SubmenuKind::Bluetooth,
                selected_index,
                ..
            } => self.open_device_actions(selected_index),
            MenuState::ActionMenu {
                device,
                actions,
                selected_index,
                ..
            } => {
                let Some(action) = actions.get(selected_index).copied() else {
                    return Transition::Close;
                };
                self.show_message(action.progress_label(), device.label());
                if self.bluetooth.perform_action(&device.id, action) {
                    log::info!("Bluetooth {} on {} succeeded", action, device.id);
                    self.show_message("Done", device.label());
                } else {
                    let err = PlayerError::DeviceActionFailed(format!("{} {}", action, device.id));
                    log::warn!("{}", err);
                    self.show_message("Failed", device.label());
                }
                Transition::Close
            }
        }
    }

    fn enter_submenu(&mut self, kind: SubmenuKind) -> Transition {
        let empty_message = match kind {
            SubmenuKind::Tracks => {
                self.lists.tracks = self.transport.track_table();
                ("No Tracks", "Insert a CD")
            }
            SubmenuKind::AudioOutput => {
                self.display.show_status("Audio Devices", "Scanning...");
                self.lists.audio = self.outputs.refresh_devices();
                ("No Audio", "Devices Found")
            }
            SubmenuKind::Bluetooth => {
                self.display.show_status("Bluetooth", "Scanning...");
                self.lists.bluetooth = self.bluetooth.scan_devices();
                ("No Bluetooth", "Devices Found")
            }
        };

        if self.lists.len(kind) == 0 {
            log::info!("{} submenu is empty", kind);
            self.show_message(empty_message.0, empty_message.1);
            return Transition::Touch;
        }

        let selected_index = match kind {
            SubmenuKind::Tracks => {
                let current = self.transport.status().track;
                if self.lists.tracks.contains(current) { current as usize - 1 } else { 0 }
            }
            _ => 0,
        };
        log::info!("Entering {} submenu", kind);
        Transition::Enter(MenuState::Submenu {
            kind,
            selected_index,
            deadline: self.deadline(),
        })
    }

    fn play_track(&mut self, track: u32) -> Transition {
        log::info!("Menu selected track {}", track);
        if let Err(e) = self.transport.load_playing(track) {
            log::warn!("Menu load of track {} failed: {}", track, e);
            self.show_message("Load Failed", &format!("Track {:02}", track));
        }
        Transition::Close
    }

    fn apply_output(&mut self, index: usize) -> Transition {
        let Some(device) = self.lists.audio.get(index).cloned() else {
            return Transition::Back;
        };
        self.show_message("Use Audio:", &device.name);
        match self.outputs.select_device(&device.id) {
            Ok(()) => {
                log::info!("Audio output set to {}", device.id);
                self.show_message("Audio Set:", &device.name);
            }
            Err(e) => {
                let err = PlayerError::DeviceActionFailed(format!("{:#}", e));
                log::warn!("Selecting {}: {}", device.id, err);
                self.show_message("Audio Failed", &device.name);
            }
        }
        Transition::Back
    }

    fn open_device_actions(&mut self, index: usize) -> Transition {
        let Some(device) = self.lists.bluetooth.get(index).cloned() else {
            return Transition::Back;
        };
        let actions = device.available_actions();
        if actions.is_empty() {
            self.show_message("No Actions", "Available");
            return Transition::Touch;
        }
        log::info!("Actions for {}: {:?}", device.id, actions);
        Transition::Enter(MenuState::ActionMenu {
            device,
            actions,
            selected_index: 0,
            deadline: self.deadline(),
        })
    }

    fn apply(&mut self, transition: Transition) {
        match transition {
            Transition::Stay => return,
            Transition::Touch => {
                let deadline = self.deadline();
                self.state.set_deadline(deadline);
            }
            Transition::Enter(next) => {
                if !self.state.is_open() {
                    log::info!("Entering menu");
                    self.screen.claim_for_menu();
                }
                self.state = next;
            }
            Transition::Back => {
                let parent = self.state.parent(self.deadline());
                if !parent.is_open() {
                    self.close();
                    return;
                }
                self.state = parent;
            }
            Transition::Close => {
                self.close();
                return;
            }
        }
        self.refresh();
    }

    fn deadline(&self) -> std::time::Instant {
        self.clock.now() + self.config.timeout
    }

    /// Show a transient message and hold it on screen.
    fn show_message(&self, line1: &str, line2: &str) {
        self.display.show_status(&fit_line(line1), &fit_line(line2));
        self.clock.sleep(self.config.message_hold);
    }
}
