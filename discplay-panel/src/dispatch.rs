use std::io;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;
use discplay_core::MenuStateMachine;
use discplay_core::clock::CancellationToken;
use discplay_core::commands::Gesture;

/// Shared menu; every gesture, timeout check and redraw takes this lock.
pub type SharedMenu = Arc<Mutex<MenuStateMachine>>;

pub fn with_menu<R>(menu: &SharedMenu, f: impl FnOnce(&mut MenuStateMachine) -> R) -> R {
    let mut guard = menu.lock().unwrap_or_else(|e| e.into_inner());
    f(&mut guard)
}

pub struct GestureDispatcher {
    stop: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl GestureDispatcher {
    pub fn spawn(gestures: Receiver<Gesture>, menu: SharedMenu) -> io::Result<Self> {
        let stop = CancellationToken::new();
        let token = stop.clone();
        let handle = thread::Builder::new()
            .name("gesture-dispatch".to_string())
            .spawn(move || {
                loop {
                    let gesture = crossbeam_channel::select! {
                        recv(token.signal()) -> _ => break,
                        recv(gestures) -> msg => match msg {
                            Ok(gesture) => gesture,
                            Err(_) => break,
                        },
                    };
                    log::debug!("Dispatching {}", gesture);
                    with_menu(&menu, |menu| menu.handle_gesture(gesture));
                }
                log::debug!("Gesture dispatcher exiting");
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    pub fn stop(mut self) {
        self.stop.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
