use std::time::Instant;

use strum::{EnumIter, IntoEnumIterator};

use crate::devices::{BluetoothAction, BluetoothDevice};

/// Entries of the top-level menu, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, strum::Display)]
pub enum RootItem {
    Tracks,
    #[strum(serialize = "Audio Output")]
    AudioOutput,
    Bluetooth,
    #[strum(serialize = "Exit Menu")]
    ExitMenu,
}

impl RootItem {
    pub fn count() -> usize {
        Self::iter().count()
    }

    pub fn at(index: usize) -> Option<Self> {
        Self::iter().nth(index)
    }

    pub fn index(self) -> usize {
        Self::iter().position(|item| item == self).unwrap_or(0)
    }

    pub fn submenu(self) -> Option<SubmenuKind> {
        match self {
            RootItem::Tracks => Some(SubmenuKind::Tracks),
            RootItem::AudioOutput => Some(SubmenuKind::AudioOutput),
            RootItem::Bluetooth => Some(SubmenuKind::Bluetooth),
            RootItem::ExitMenu => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum SubmenuKind {
    Tracks,
    AudioOutput,
    Bluetooth,
}

impl SubmenuKind {
    /// Root entry that leads here; popping returns to it.
    pub fn root_item(self) -> RootItem {
        match self {
            SubmenuKind::Tracks => RootItem::Tracks,
            SubmenuKind::AudioOutput => RootItem::AudioOutput,
            SubmenuKind::Bluetooth => RootItem::Bluetooth,
        }
    }
}

/// Menu depth. Every open state carries the instant it times out at.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MenuState {
    #[default]
    Closed,
    Root {
        selected_index: usize,
        deadline: Instant,
    },
    Submenu {
        kind: SubmenuKind,
        selected_index: usize,
        deadline: Instant,
    },
    ActionMenu {
        device: BluetoothDevice,
        actions: Vec<BluetoothAction>,
        selected_index: usize,
        deadline: Instant,
    },
}

impl MenuState {
    pub fn is_open(&self) -> bool {
        !matches!(self, MenuState::Closed)
    }

    /// 0 when closed, 1 at root, 2 in a submenu, 3 in an action menu.
    pub fn depth(&self) -> usize {
        match self {
            MenuState::Closed => 0,
            MenuState::Root { .. } => 1,
            MenuState::Submenu { .. } => 2,
            MenuState::ActionMenu { .. } => 3,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self {
            MenuState::Closed => None,
            MenuState::Root { deadline, .. }
            | MenuState::Submenu { deadline, .. }
            | MenuState::ActionMenu { deadline, .. } => Some(*deadline),
        }
    }

    pub fn selected_index(&self) -> Option<usize> {
        match self {
            MenuState::Closed => None,
            MenuState::Root { selected_index, .. }
            | MenuState::Submenu { selected_index, .. }
            | MenuState::ActionMenu { selected_index, .. } => Some(*selected_index),
        }
    }

    pub(crate) fn set_deadline(&mut self, at: Instant) {
        match self {
            MenuState::Closed => {}
            MenuState::Root { deadline, .. }
            | MenuState::Submenu { deadline, .. }
            | MenuState::ActionMenu { deadline, .. } => *deadline = at,
        }
    }

    pub(crate) fn selected_mut(&mut self) -> Option<&mut usize> {
        match self {
            MenuState::Closed => None,
            MenuState::Root { selected_index, .. }
            | MenuState::Submenu { selected_index, .. }
            | MenuState::ActionMenu { selected_index, .. } => Some(selected_index),
        }
    }

    /// State one level up. Action menus and submenus both return to the
    /// root, highlighting the entry they came from.
    pub fn parent(&self, deadline: Instant) -> MenuState {
        match self {
            MenuState::Closed | MenuState::Root { .. } => MenuState::Closed,
            MenuState::Submenu { kind, .. } => MenuState::Root {
                selected_index: kind.root_item().index(),
                deadline,
            },
            MenuState::ActionMenu { .. } => MenuState::Root {
                selected_index: RootItem::Bluetooth.index(),
                deadline,
            },
        }
    }
}

/// Outcome of handling one gesture inside the menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Nothing changed.
    Stay,
    /// Selection moved or the current level was re-entered.
    Touch,
    /// Move to a new level.
    Enter(MenuState),
    /// Pop one level.
    Back,
    Close,
}

pub(crate) fn wrap_next(index: usize, len: usize) -> usize {
    if len == 0 { index } else { (index + 1) % len }
}

pub(crate) fn wrap_prev(index: usize, len: usize) -> usize {
    if len == 0 { index } else { (index + len - 1) % len }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn root_has_four_items_ending_with_exit() {
        assert_eq!(RootItem::count(), 4);
        assert_eq!(RootItem::at(3), Some(RootItem::ExitMenu));
        assert_eq!(RootItem::AudioOutput.to_string(), "Audio Output");
        assert_eq!(RootItem::ExitMenu.submenu(), None);
    }

    #[test]
    fn wrap_cycles_both_directions() {
        assert_eq!(wrap_next(3, 4), 0);
        assert_eq!(wrap_prev(0, 4), 3);
        assert_eq!(wrap_next(0, 0), 0);
        assert_eq!(wrap_prev(0, 0), 0);
    }

    #[test]
    fn parent_returns_to_originating_root_entry() {
        let now = Instant::now();
        let later = now + Duration::from_secs(30);
        let audio = MenuState::Submenu {
            kind: SubmenuKind::AudioOutput,
            selected_index: 2,
            deadline: now,
        };
        assert_eq!(
            audio.parent(later),
            MenuState::Root { selected_index: 1, deadline: later }
        );
        assert_eq!(
            MenuState::Root { selected_index: 0, deadline: now }.parent(later),
            MenuState::Closed
        );
    }
}
