//! Decoder supervision and transport control.
//!
//! One controller owns the decoder process, the control channel and the
//! session timing. Operations are serialized; readers (the display loop,
//! the menu) only ever see [`StatusSnapshot`] copies.

pub mod channel;
pub mod process;
pub mod session;
pub mod supervisor;
pub mod tracks;

use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

pub use channel::{CommandWriter, ControlChannel, DirectWriter, FifoChannel, UserContextWriter};
pub use process::{DecoderLauncher, DecoderProcess, LaunchRequest, MplayerLauncher, ProcessStatus};
pub use session::{PlaybackSession, PlaybackTiming, ProcessPhase, StatusSnapshot};
pub use supervisor::{DiagnosticReport, Diagnostics, SharedProcess, Watcher};
pub use tracks::{TrackTable, parse_cdparanoia};

use crate::clock::{CancellationToken, Clock, SystemClock, lock};
use crate::commands::DecoderCommand;
use crate::config::PlayerConfig;
use crate::devices::{AudioOutputs, DiscListener, DisplaySink, OutputChangeObserver, TrackProbe};
use crate::display::{RefreshLoop, ScreenOwner, status_lines};
use crate::error::{PlayerError, PlayerResult};
use crate::markers::MarkerFile;
use crate::menu::Transport;

/// Whether a load leaves the track paused or playing once ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadMode {
    Paused,
    Playing,
}

impl LoadMode {
    /// Command used to prove the decoder reads its channel.
    fn roundtrip(self) -> DecoderCommand {
        match self {
            LoadMode::Paused => DecoderCommand::Pause,
            LoadMode::Playing => DecoderCommand::Query("pause".to_string()),
        }
    }

    fn is_playing(self) -> bool {
        self == LoadMode::Playing
    }
}

impl fmt::Display for LoadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadMode::Paused => f.write_str("paused"),
            LoadMode::Playing => f.write_str("playing"),
        }
    }
}

/// Resources only touched while an operation holds the lock.
struct Engine {
    channel: Box<dyn ControlChannel>,
    process: Option<SharedProcess>,
    watcher: Option<Watcher>,
    status_loop: Option<RefreshLoop>,
}

struct Shared {
    config: PlayerConfig,
    clock: Arc<dyn Clock>,
    launcher: Box<dyn DecoderLauncher>,
    outputs: Arc<dyn AudioOutputs>,
    display: Arc<dyn DisplaySink>,
    screen: Arc<ScreenOwner>,
    track_probe: Option<Arc<dyn TrackProbe>>,
    diagnostics: Diagnostics,
    track_marker: MarkerFile,
    engine: Mutex<Engine>,
    session: Mutex<PlaybackSession>,
    /// Token of the newest session; cancelled by `stop` without waiting
    /// for the engine lock so an in-flight probe can bail out.
    live: Mutex<CancellationToken>,
}

impl Shared {
    fn snapshot(&self) -> StatusSnapshot {
        lock(&self.session).snapshot(self.clock.now())
    }

    /// Called from the watcher when the process vanished after readiness.
    fn mark_dead(&self, generation: u64, code: Option<i32>) {
        {
            let mut session = lock(&self.session);
            // A newer load already replaced this process.
            if session.generation != generation {
                return;
            }
            if session.playing {
                session.timing.pause(self.clock.now());
            }
            session.playing = false;
            session.phase = ProcessPhase::Dead(code);
        }
        log::error!("Decoder for the current track died (code {:?})", code);
        self.diagnostics.capture();
    }

    fn refresh_display(&self) {
        if self.screen.menu_active() {
            return;
        }
        let (line1, line2) = status_lines(&self.snapshot());
        self.display.show_status(&line1, &line2);
    }
}

pub struct PlaybackControllerBuilder {
    config: PlayerConfig,
    outputs: Arc<dyn AudioOutputs>,
    display: Arc<dyn DisplaySink>,
    clock: Arc<dyn Clock>,
    launcher: Option<Box<dyn DecoderLauncher>>,
    channel: Option<Box<dyn ControlChannel>>,
    screen: Arc<ScreenOwner>,
    track_probe: Option<Arc<dyn TrackProbe>>,
}

impl PlaybackControllerBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn launcher(mut self, launcher: Box<dyn DecoderLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    pub fn channel(mut self, channel: Box<dyn ControlChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn screen(mut self, screen: Arc<ScreenOwner>) -> Self {
        self.screen = screen;
        self
    }

    pub fn track_probe(mut self, probe: Arc<dyn TrackProbe>) -> Self {
        self.track_probe = Some(probe);
        self
    }

    /// Create the control channel and assemble the controller. A channel
    /// that cannot be created is fatal.
    pub fn build(self) -> PlayerResult<PlaybackController> {
        let mut channel = self
            .channel
            .unwrap_or_else(|| Box::new(FifoChannel::new(&self.config.decoder)));
        channel.recreate()?;
        log::info!("Control channel ready: {}", channel.describe());

        let launcher = self
            .launcher
            .unwrap_or_else(|| Box::new(MplayerLauncher::new(self.config.decoder.clone())));
        let placeholder = self.config.disc.placeholder_track_length;

        let shared = Shared {
            diagnostics: Diagnostics::new(&self.config.decoder, self.outputs.clone()),
            track_marker: MarkerFile::new(self.config.track_marker.clone()),
            clock: self.clock,
            launcher,
            outputs: self.outputs,
            display: self.display,
            screen: self.screen,
            track_probe: self.track_probe,
            engine: Mutex::new(Engine {
                channel,
                process: None,
                watcher: None,
                status_loop: None,
            }),
            session: Mutex::new(PlaybackSession::new(TrackTable::empty(placeholder))),
            live: Mutex::new(CancellationToken::new()),
            config: self.config,
        };
        Ok(PlaybackController {
            shared: Arc::new(shared),
        })
    }
}

/// Cheap to clone; every clone drives the same decoder.
#[derive(Clone)]
pub struct PlaybackController {
    shared: Arc<Shared>,
}

impl PlaybackController {
    pub fn builder(
        config: PlayerConfig,
        outputs: Arc<dyn AudioOutputs>,
        display: Arc<dyn DisplaySink>,
    ) -> PlaybackControllerBuilder {
        PlaybackControllerBuilder {
            config,
            outputs,
            display,
            clock: Arc::new(SystemClock),
            launcher: None,
            channel: None,
            screen: Arc::new(ScreenOwner::new()),
            track_probe: None,
        }
    }

    pub fn screen(&self) -> Arc<ScreenOwner> {
        self.shared.screen.clone()
    }

    pub fn load_paused(&self, track: u32) -> PlayerResult<()> {
        self.load(track, LoadMode::Paused)
    }

    pub fn load_playing(&self, track: u32) -> PlayerResult<()> {
        self.load(track, LoadMode::Playing)
    }

    fn load(&self, track: u32, mode: LoadMode) -> PlayerResult<()> {
        let mut engine = lock(&self.shared.engine);
        self.validate(track)?;
        self.teardown(&mut engine);

        let token = CancellationToken::new();
        *lock(&self.shared.live) = token.clone();

        if let Err(e) = engine.channel.recreate() {
            log::error!("Cannot recreate control channel: {}", e);
            return Err(e);
        }

        let generation = {
            let mut session = lock(&self.shared.session);
            session.reset();
            session.track = track;
            session.phase = ProcessPhase::Starting;
            session.generation += 1;
            session.generation
        };
        self.shared.track_marker.store(track);

        let request = LaunchRequest {
            track,
            device_id: self.shared.outputs.current_device_id(),
        };
        log::info!("Loading track {} {} on {}", track, mode, request.device_id);

        let process: SharedProcess = match self.shared.launcher.launch(&request) {
            Ok(process) => Arc::new(Mutex::new(process)),
            Err(e) => {
                log::error!("Failed to launch decoder for track {}: {:#}", track, e);
                lock(&self.shared.session).reset();
                return Err(PlayerError::Spawn(format!("{:#}", e)));
            }
        };
        engine.process = Some(process.clone());
        engine.status_loop = self.spawn_status_loop();
        lock(&self.shared.session).phase = ProcessPhase::Probing;

        let decoder = &self.shared.config.decoder;
        let result = supervisor::probe_liveness(&process, self.shared.clock.as_ref(), decoder, &token)
            .and_then(|_| engine.channel.send(&mode.roundtrip()));

        match result {
            Ok(()) => {
                {
                    let mut session = lock(&self.shared.session);
                    session.phase = ProcessPhase::Ready;
                    session.playing = mode.is_playing();
                    session.timing = PlaybackTiming::start(self.shared.clock.now(), mode.is_playing());
                }
                engine.watcher = self.spawn_watcher(process, generation, token);
                log::info!("Track {} ready ({})", track, mode);
                Ok(())
            }
            Err(PlayerError::ProcessDied(code)) => {
                engine.process = None;
                {
                    let mut session = lock(&self.shared.session);
                    session.playing = false;
                    session.phase = ProcessPhase::Dead(code);
                }
                self.shared.diagnostics.capture();
                Err(PlayerError::ProcessDied(code))
            }
            Err(e) => {
                log::warn!("Load of track {} abandoned: {}", track, e);
                self.teardown(&mut engine);
                Err(e)
            }
        }
    }

    fn validate(&self, track: u32) -> PlayerResult<()> {
        let session = lock(&self.shared.session);
        if session.table.is_empty() {
            log::warn!("Track {} requested with no disc loaded", track);
        }
        if !session.table.contains(track) {
            return Err(PlayerError::InvalidTrack {
                requested: track,
                total: session.table.total(),
            });
        }
        Ok(())
    }

    pub fn toggle_play_pause(&self) -> PlayerResult<()> {
        let mut engine = lock(&self.shared.engine);
        let playing = {
            let session = lock(&self.shared.session);
            if session.phase != ProcessPhase::Ready {
                log::warn!("Play/pause ignored: decoder is {:?}", session.phase);
                return Err(PlayerError::NotReady);
            }
            session.playing
        };

        engine.channel.send(&DecoderCommand::Pause)?;

        let now = self.shared.clock.now();
        let mut session = lock(&self.shared.session);
        if playing {
            session.timing.pause(now);
            log::info!("Paused");
        } else {
            session.timing.resume(now);
            log::info!("Playing");
        }
        session.playing = !playing;
        Ok(())
    }

    pub fn next(&self) -> PlayerResult<()> {
        let (track, total) = self.position();
        if track >= total {
            log::debug!("Next ignored at last track {}", track);
            return Ok(());
        }
        self.load_playing(track + 1)
    }

    pub fn previous(&self) -> PlayerResult<()> {
        let (track, _) = self.position();
        if track <= 1 {
            log::debug!("Previous ignored at first track");
            return Ok(());
        }
        self.load_playing(track - 1)
    }

    fn position(&self) -> (u32, u32) {
        let session = lock(&self.shared.session);
        (session.track, session.table.total())
    }

    /// Tear down the session. Safe to call at any time, any number of times.
    pub fn stop(&self) {
        lock(&self.shared.live).cancel();
        let mut engine = lock(&self.shared.engine);
        self.teardown(&mut engine);
    }

    /// Watcher, display loop, then the process itself.
    fn teardown(&self, engine: &mut Engine) {
        lock(&self.shared.live).cancel();
        if let Some(watcher) = engine.watcher.take() {
            watcher.stop();
        }
        if let Some(status_loop) = engine.status_loop.take() {
            status_loop.stop();
        }
        if let Some(process) = engine.process.take() {
            let mut process = lock(&process);
            let decoder = &self.shared.config.decoder;
            match process::terminate_with_grace(
                &mut **process,
                self.shared.clock.as_ref(),
                decoder.terminate_grace,
                decoder.kill_wait,
            ) {
                Ok(code) => log::info!("Decoder stopped (code {:?})", code),
                Err(e) => log::error!("Failed to stop decoder: {:#}", e),
            }
        }
        lock(&self.shared.session).reset();
    }

    /// Move a live session onto a newly selected output device.
    pub fn reload_for_output_change(&self) -> PlayerResult<()> {
        let status = self.status_snapshot();
        if !status.process_alive {
            log::debug!("Output changed with no live session");
            return Ok(());
        }
        let mode = if status.playing { LoadMode::Playing } else { LoadMode::Paused };
        log::info!(
            "Output changed; reloading track {} {} at {}s",
            status.track,
            mode,
            status.elapsed_secs
        );

        self.stop();
        self.shared.clock.sleep(self.shared.config.decoder.reload_settle);

        match self.load(status.track, mode) {
            Ok(()) => {
                if status.elapsed_secs > 0 {
                    self.restore_position(status.elapsed_secs);
                }
                Ok(())
            }
            Err(e) => {
                log::error!("Reload of track {} failed: {}; loading paused", status.track, e);
                self.load_paused(status.track)
            }
        }
    }

    /// Best-effort seek back to where the previous session was.
    fn restore_position(&self, elapsed_secs: u64) {
        let token = lock(&self.shared.live).clone();
        let generation = lock(&self.shared.session).generation;
        if self.shared.clock.wait(self.shared.config.decoder.seek_delay, &token) {
            return;
        }

        // Engine before session, same order as every other operation.
        let mut engine = lock(&self.shared.engine);
        let playing = {
            let session = lock(&self.shared.session);
            if session.generation != generation || session.phase != ProcessPhase::Ready {
                return;
            }
            session.playing
        };

        match engine.channel.send(&DecoderCommand::Seek { seconds: elapsed_secs }) {
            Ok(()) => {
                let now = self.shared.clock.now();
                lock(&self.shared.session).timing =
                    PlaybackTiming::rebase(now, Duration::from_secs(elapsed_secs), playing);
                log::info!("Restored position to {}s", elapsed_secs);
            }
            Err(e) => log::warn!("Seek after reload failed: {}", e),
        }
    }

    pub fn status_snapshot(&self) -> StatusSnapshot {
        self.shared.snapshot()
    }

    /// Install a new disc's table and rewind to track 1.
    pub fn set_disc(&self, table: TrackTable) {
        let mut session = lock(&self.shared.session);
        log::info!("Disc has {} tracks", table.total());
        session.table = table;
        session.track = 1;
    }

    pub fn clear_disc(&self) {
        let mut session = lock(&self.shared.session);
        session.table = TrackTable::empty(self.shared.config.disc.placeholder_track_length);
        session.track = 1;
    }

    pub fn track_table(&self) -> TrackTable {
        lock(&self.shared.session).table.clone()
    }

    pub fn shutdown(&self) {
        log::info!("Shutting down playback");
        self.stop();
        self.shared.display.show_status("CD Player", "Stopped");
    }

    fn read_track_table(&self) -> TrackTable {
        let fallback = || TrackTable::fallback(&self.shared.config.disc);
        let Some(probe) = &self.shared.track_probe else {
            return fallback();
        };
        match probe.probe() {
            Ok(table) if !table.is_empty() => table,
            Ok(_) => {
                log::warn!("Disc reports no audio tracks, using defaults");
                fallback()
            }
            Err(e) => {
                log::warn!("Track detection failed: {:#}, using defaults", e);
                fallback()
            }
        }
    }

    fn spawn_status_loop(&self) -> Option<RefreshLoop> {
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        let spawned = RefreshLoop::spawn("status-display", self.shared.config.display_refresh, move || {
            if let Some(shared) = shared.upgrade() {
                shared.refresh_display();
            }
        });
        match spawned {
            Ok(status_loop) => Some(status_loop),
            Err(e) => {
                log::error!("Failed to start status display loop: {}", e);
                None
            }
        }
    }

    fn spawn_watcher(
        &self,
        process: SharedProcess,
        generation: u64,
        token: CancellationToken,
    ) -> Option<Watcher> {
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        let spawned = Watcher::spawn(
            process,
            self.shared.config.decoder.supervise_interval,
            token,
            move |code| {
                if let Some(shared) = shared.upgrade() {
                    shared.mark_dead(generation, code);
                }
            },
        );
        match spawned {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                log::error!("Failed to start decoder watcher: {}", e);
                None
            }
        }
    }
}

impl DiscListener for PlaybackController {
    fn disc_inserted(&self) {
        log::info!("Disc inserted");
        self.stop();
        self.shared.display.show_status("CD Detected", "Reading...");

        let table = self.read_track_table();
        self.set_disc(table);
        self.shared.track_marker.store(1);

        match self.load_paused(1) {
            Ok(()) => self.shared.display.show_status("CD Ready", "Press Play"),
            Err(e) => {
                log::error!("Could not load disc: {}", e);
                self.shared.display.show_status("CD Error", "Try Again");
            }
        }
    }

    fn disc_removed(&self) {
        log::info!("Disc removed");
        self.stop();
        self.clear_disc();
        self.shared.refresh_display();
    }
}

impl OutputChangeObserver for PlaybackController {
    fn output_changed(&self, device_id: &str) {
        log::info!("Audio output is now {}", device_id);
        if let Err(e) = self.reload_for_output_change() {
            log::error!("Could not move playback to {}: {}", device_id, e);
        }
    }
}

impl Transport for PlaybackController {
    fn toggle_play_pause(&self) -> PlayerResult<()> {
        PlaybackController::toggle_play_pause(self)
    }

    fn next(&self) -> PlayerResult<()> {
        PlaybackController::next(self)
    }

    fn previous(&self) -> PlayerResult<()> {
        PlaybackController::previous(self)
    }

    fn load_playing(&self, track: u32) -> PlayerResult<()> {
        PlaybackController::load_playing(self, track)
    }

    fn status(&self) -> StatusSnapshot {
        self.status_snapshot()
    }

    fn track_table(&self) -> TrackTable {
        PlaybackController::track_table(self)
    }
}
