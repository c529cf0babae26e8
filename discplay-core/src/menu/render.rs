use super::state::{MenuState, RootItem, SubmenuKind};
use crate::devices::{AudioDevice, BluetoothDevice};
use crate::display::{fit_line, format_time};
use crate::player::TrackTable;

/// Width left for a name after the two-character prefix.
const NAME_WIDTH: usize = 14;
/// Width left for a device name after `BT: `.
const HEADER_NAME_WIDTH: usize = 12;

/// Lists captured when a submenu was entered.
#[derive(Debug, Clone)]
pub struct MenuLists {
    pub tracks: TrackTable,
    pub audio: Vec<AudioDevice>,
    pub bluetooth: Vec<BluetoothDevice>,
}

impl MenuLists {
    pub fn len(&self, kind: SubmenuKind) -> usize {
        match kind {
            SubmenuKind::Tracks => self.tracks.total() as usize,
            SubmenuKind::AudioOutput => self.audio.len(),
            SubmenuKind::Bluetooth => self.bluetooth.len(),
        }
    }
}

fn truncate(text: &str, width: usize) -> String {
    text.chars().take(width).collect()
}

pub fn render(state: &MenuState, lists: &MenuLists) -> Option<(String, String)> {
    let (line1, line2) = match state {
        MenuState::Closed => return None,
        MenuState::Root { selected_index, .. } => {
            let item = RootItem::at(*selected_index)?;
            ("MENU".to_string(), format!("> {}", item))
        }
        MenuState::Submenu { kind, selected_index, .. } => {
            submenu_lines(*kind, *selected_index, lists)?
        }
        MenuState::ActionMenu {
            device,
            actions,
            selected_index,
            ..
        } => {
            let action = actions.get(*selected_index)?;
            (
                format!("BT: {}", truncate(device.label(), HEADER_NAME_WIDTH)),
                format!("> {} {}/{}", action, selected_index + 1, actions.len()),
            )
        }
    };
    Some((fit_line(&line1), fit_line(&line2)))
}

fn submenu_lines(kind: SubmenuKind, index: usize, lists: &MenuLists) -> Option<(String, String)> {
    let count = lists.len(kind);
    if index >= count {
        return None;
    }
    let position = format!("{}/{}", index + 1, count);

    match kind {
        SubmenuKind::Tracks => {
            let track = index as u32 + 1;
            Some((
                format!("Tracks {}", position),
                format!("> {:02} {}", track, format_time(lists.tracks.length_secs(track))),
            ))
        }
        SubmenuKind::AudioOutput => {
            let device = &lists.audio[index];
            Some((
                format!("Audio {}", position),
                format!("> {}", truncate(&device.name, NAME_WIDTH)),
            ))
        }
        SubmenuKind::Bluetooth => {
            let device = &lists.bluetooth[index];
            let marker = if device.connected { '●' } else { '○' };
            Some((
                format!("BT {}", position),
                format!("{} {}", marker, truncate(device.label(), NAME_WIDTH)),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{BluetoothAction, OutputKind};
    use std::time::{Duration, Instant};

    fn lists() -> MenuLists {
        MenuLists {
            tracks: crate::test_support::test_table(12),
            audio: vec![AudioDevice {
                id: "hw=0,0".into(),
                name: "Built-in Audio Analog Stereo".into(),
                kind: OutputKind::Alsa,
            }],
            bluetooth: vec![BluetoothDevice {
                id: "AA:BB:CC:DD:EE:FF".into(),
                display_name: "Living Room Speaker".into(),
                paired: true,
                connected: true,
            }],
        }
    }

    #[test]
    fn renders_each_depth() {
        let deadline = Instant::now() + Duration::from_secs(30);
        let lists = lists();

        let root = MenuState::Root { selected_index: 1, deadline };
        assert_eq!(render(&root, &lists), Some(("MENU".into(), "> Audio Output".into())));

        let tracks = MenuState::Submenu { kind: SubmenuKind::Tracks, selected_index: 8, deadline };
        assert_eq!(render(&tracks, &lists), Some(("Tracks 9/12".into(), "> 09 3:20".into())));

        let audio = MenuState::Submenu { kind: SubmenuKind::AudioOutput, selected_index: 0, deadline };
        assert_eq!(render(&audio, &lists), Some(("Audio 1/1".into(), "> Built-in Audio".into())));

        let bt = MenuState::Submenu { kind: SubmenuKind::Bluetooth, selected_index: 0, deadline };
        assert_eq!(render(&bt, &lists), Some(("BT 1/1".into(), "● Living Room Sp".into())));

        let action = MenuState::ActionMenu {
            device: lists.bluetooth[0].clone(),
            actions: vec![BluetoothAction::Disconnect, BluetoothAction::Forget],
            selected_index: 1,
            deadline,
        };
        assert_eq!(render(&action, &lists), Some(("BT: Living Room ".into(), "> Forget 2/2".into())));
    }

    #[test]
    fn closed_or_stale_index_renders_nothing() {
        let deadline = Instant::now();
        let lists = lists();
        assert_eq!(render(&MenuState::Closed, &lists), None);
        let stale = MenuState::Submenu { kind: SubmenuKind::AudioOutput, selected_index: 5, deadline };
        assert_eq!(render(&stale, &lists), None);
    }
}
