use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::bail;
use tempfile::TempDir;

use crate::clock::{Clock, ManualClock, lock};
use crate::commands::DecoderCommand;
use crate::config::{MenuConfig, PlayerConfig};
use crate::devices::{
    AudioDevice, AudioOutputs, BluetoothAction, BluetoothDevice, BluetoothManager, DisplaySink,
    OutputChangeNotifier, OutputChangeObserver, OutputKind, TrackProbe,
};
use crate::display::ScreenOwner;
use crate::error::{PlayerError, PlayerResult};
use crate::markers::MarkerFile;
use crate::menu::{MenuStateMachine, Transport};
use crate::player::{
    ControlChannel, DecoderLauncher, DecoderProcess, LaunchRequest, PlaybackController, ProcessPhase,
    ProcessStatus, StatusSnapshot, TrackTable,
};

/// `n` tracks of 3:20 each.
pub fn test_table(n: u32) -> TrackTable {
    let lengths: BTreeMap<u32, Duration> = (1..=n).map(|t| (t, Duration::from_secs(200))).collect();
    TrackTable::new(lengths, Duration::from_secs(180))
}

/// Fast loops, no sink priming, every path inside `dir`.
pub fn test_config(dir: &TempDir) -> PlayerConfig {
    let mut config = PlayerConfig::default();
    config.track_marker = dir.path().join("current_track.txt");
    config.output_marker = dir.path().join("last_audio_device.txt");
    config.display_refresh = Duration::from_millis(10);
    config.decoder.fifo_path = dir.path().join("control.fifo");
    config.decoder.log_path = dir.path().join("decoder.log");
    config.decoder.cdrom_device = dir.path().join("sr0");
    config.decoder.fallback_user = None;
    config.decoder.prime_bluetooth_sink = false;
    config.decoder.supervise_interval = Duration::from_millis(5);
    config
}

#[derive(Debug, Default)]
struct ProcessState {
    exit: Option<Option<i32>>,
    terminated: bool,
    exit_at: Option<(Instant, Option<i32>)>,
}

/// Test-side view of a [`FakeProcess`].
#[derive(Clone)]
pub struct ProcessHandle(Arc<Mutex<ProcessState>>);

impl ProcessHandle {
    pub fn was_terminated(&self) -> bool {
        lock(&self.0).terminated
    }

    /// Make the process exit as if it crashed.
    pub fn die_now(&self, code: Option<i32>) {
        lock(&self.0).exit = Some(code);
    }
}

pub struct FakeProcess {
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<ProcessState>>,
}

impl FakeProcess {
    pub fn running(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Arc::default(),
        }
    }

    /// Exits by itself once `after` has passed on `clock`.
    pub fn exiting_after(clock: Arc<dyn Clock>, after: Duration, code: Option<i32>) -> Self {
        let process = Self::running(clock);
        lock(&process.state).exit_at = Some((process.clock.now() + after, code));
        process
    }

    pub fn handle(&self) -> ProcessHandle {
        ProcessHandle(self.state.clone())
    }
}

impl DecoderProcess for FakeProcess {
    fn id(&self) -> u32 {
        4242
    }

    fn status(&mut self) -> ProcessStatus {
        let mut state = lock(&self.state);
        if state.exit.is_none() {
            if let Some((at, code)) = state.exit_at {
                if self.clock.now() >= at {
                    state.exit = Some(code);
                }
            }
        }
        match state.exit {
            Some(code) => ProcessStatus::Exited(code),
            None => ProcessStatus::Running,
        }
    }

    fn terminate(&mut self) -> io::Result<()> {
        let mut state = lock(&self.state);
        state.terminated = true;
        state.exit.get_or_insert(None);
        Ok(())
    }

    fn kill(&mut self) -> io::Result<()> {
        lock(&self.state).exit.get_or_insert(None);
        Ok(())
    }
}

/// How the next launched process behaves.
#[derive(Debug, Clone, Copy)]
pub enum Scripted {
    Run,
    ExitAfter(Duration, Option<i32>),
    FailSpawn,
}

#[derive(Default)]
struct LauncherState {
    script: VecDeque<Scripted>,
    requests: Vec<LaunchRequest>,
    processes: Vec<ProcessHandle>,
}

#[derive(Clone)]
pub struct FakeLauncher {
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<LauncherState>>,
}

impl FakeLauncher {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Arc::default(),
        }
    }

    /// Queue behaviour for the next launch; unscripted launches run.
    pub fn script(&self, behaviour: Scripted) {
        lock(&self.state).script.push_back(behaviour);
    }

    pub fn requests(&self) -> Vec<LaunchRequest> {
        lock(&self.state).requests.clone()
    }

    pub fn process(&self, index: usize) -> ProcessHandle {
        lock(&self.state).processes[index].clone()
    }
}

impl DecoderLauncher for FakeLauncher {
    fn launch(&self, request: &LaunchRequest) -> anyhow::Result<Box<dyn DecoderProcess>> {
        let mut state = lock(&self.state);
        state.requests.push(request.clone());
        let process = match state.script.pop_front().unwrap_or(Scripted::Run) {
            Scripted::Run => FakeProcess::running(self.clock.clone()),
            Scripted::ExitAfter(after, code) => FakeProcess::exiting_after(self.clock.clone(), after, code),
            Scripted::FailSpawn => bail!("no such binary"),
        };
        state.processes.push(process.handle());
        Ok(Box::new(process))
    }
}

#[derive(Default)]
struct ChannelState {
    commands: Vec<DecoderCommand>,
    recreated: usize,
    failing: bool,
    broken: bool,
}

/// Control channel that records what was sent.
#[derive(Clone, Default)]
pub struct RecordingChannel(Arc<Mutex<ChannelState>>);

impl RecordingChannel {
    pub fn commands(&self) -> Vec<DecoderCommand> {
        lock(&self.0).commands.clone()
    }

    pub fn recreated(&self) -> usize {
        lock(&self.0).recreated
    }

    pub fn set_failing(&self, failing: bool) {
        lock(&self.0).failing = failing;
    }
}

impl ControlChannel for RecordingChannel {
    fn recreate(&mut self) -> PlayerResult<()> {
        let mut state = lock(&self.0);
        if state.broken {
            return Err(PlayerError::ChannelSetup("mkfifo: permission denied".to_string()));
        }
        state.recreated += 1;
        Ok(())
    }

    fn send(&mut self, command: &DecoderCommand) -> PlayerResult<()> {
        let mut state = lock(&self.0);
        if state.failing {
            return Err(PlayerError::CommandDeliveryFailed {
                command: command.wire(),
                reason: "no reader".to_string(),
            });
        }
        state.commands.push(command.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        "recording channel".to_string()
    }
}

pub struct FakeOutputs {
    current: Mutex<String>,
    devices: Mutex<Vec<AudioDevice>>,
    selections: Mutex<Vec<String>>,
    fail: Mutex<bool>,
    notifier: OutputChangeNotifier,
}

impl FakeOutputs {
    pub fn new(current: &str) -> Self {
        Self {
            current: Mutex::new(current.to_string()),
            devices: Mutex::new(Vec::new()),
            selections: Mutex::new(Vec::new()),
            fail: Mutex::new(false),
            notifier: OutputChangeNotifier::new(),
        }
    }

    pub fn set_current(&self, device_id: &str) {
        *lock(&self.current) = device_id.to_string();
    }

    pub fn set_devices(&self, devices: &[(&str, &str)]) {
        *lock(&self.devices) = devices
            .iter()
            .map(|(id, name)| AudioDevice {
                id: id.to_string(),
                name: name.to_string(),
                kind: OutputKind::Alsa,
            })
            .collect();
    }

    pub fn fail_selection(&self, fail: bool) {
        *lock(&self.fail) = fail;
    }

    pub fn selections(&self) -> Vec<String> {
        lock(&self.selections).clone()
    }
}

impl AudioOutputs for FakeOutputs {
    fn current_device_id(&self) -> String {
        lock(&self.current).clone()
    }

    fn refresh_devices(&self) -> Vec<AudioDevice> {
        lock(&self.devices).clone()
    }

    fn select_device(&self, device_id: &str) -> anyhow::Result<()> {
        lock(&self.selections).push(device_id.to_string());
        if *lock(&self.fail) {
            bail!("sink {} rejected", device_id);
        }
        self.set_current(device_id);
        self.notifier.notify(device_id);
        Ok(())
    }

    fn subscribe(&self, observer: Arc<dyn OutputChangeObserver>) -> anyhow::Result<()> {
        self.notifier.register(observer)
    }
}

pub struct FakeBluetooth {
    devices: Mutex<Vec<BluetoothDevice>>,
    result: Mutex<bool>,
    performed: Mutex<Vec<(String, BluetoothAction)>>,
}

impl FakeBluetooth {
    pub fn new() -> Self {
        Self {
            devices: Mutex::new(Vec::new()),
            result: Mutex::new(true),
            performed: Mutex::new(Vec::new()),
        }
    }

    pub fn set_devices(&self, devices: Vec<BluetoothDevice>) {
        *lock(&self.devices) = devices;
    }

    pub fn set_result(&self, succeed: bool) {
        *lock(&self.result) = succeed;
    }

    pub fn performed(&self) -> Vec<(String, BluetoothAction)> {
        lock(&self.performed).clone()
    }
}

impl BluetoothManager for FakeBluetooth {
    fn scan_devices(&self) -> Vec<BluetoothDevice> {
        lock(&self.devices).clone()
    }

    fn perform_action(&self, device_id: &str, action: BluetoothAction) -> bool {
        lock(&self.performed).push((device_id.to_string(), action));
        *lock(&self.result)
    }
}

/// Remembers every pair of lines shown.
#[derive(Default)]
pub struct RecordingDisplay {
    shown: Mutex<Vec<(String, String)>>,
}

impl RecordingDisplay {
    pub fn last(&self) -> Option<(String, String)> {
        lock(&self.shown).last().cloned()
    }

    pub fn saw(&self, line1: &str, line2: &str) -> bool {
        lock(&self.shown).iter().any(|(a, b)| a == line1 && b == line2)
    }
}

impl DisplaySink for RecordingDisplay {
    fn show_status(&self, line1: &str, line2: &str) {
        lock(&self.shown).push((line1.to_string(), line2.to_string()));
    }
}

pub struct FixedProbe(Option<u32>);

impl FixedProbe {
    pub fn tracks(n: u32) -> Self {
        Self(Some(n))
    }

    pub fn failing() -> Self {
        Self(None)
    }
}

impl TrackProbe for FixedProbe {
    fn probe(&self) -> anyhow::Result<TrackTable> {
        match self.0 {
            Some(n) => Ok(test_table(n)),
            None => bail!("cdparanoia: no disc"),
        }
    }
}

/// Transport that records calls instead of playing anything.
pub struct FakeTransport {
    calls: Mutex<Vec<String>>,
    track: Mutex<u32>,
    table: TrackTable,
    failure: Mutex<Option<PlayerError>>,
}

impl FakeTransport {
    pub fn new(table: TrackTable) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            track: Mutex::new(1),
            table,
            failure: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    pub fn set_track(&self, track: u32) {
        *lock(&self.track) = track;
    }

    pub fn fail_with(&self, error: PlayerError) {
        *lock(&self.failure) = Some(error);
    }

    fn record(&self, call: String) -> PlayerResult<()> {
        lock(&self.calls).push(call);
        match lock(&self.failure).clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl Transport for FakeTransport {
    fn toggle_play_pause(&self) -> PlayerResult<()> {
        self.record("toggle".to_string())
    }

    fn next(&self) -> PlayerResult<()> {
        self.record("next".to_string())
    }

    fn previous(&self) -> PlayerResult<()> {
        self.record("previous".to_string())
    }

    fn load_playing(&self, track: u32) -> PlayerResult<()> {
        self.record(format!("load_playing {}", track))
    }

    fn status(&self) -> StatusSnapshot {
        let track = *lock(&self.track);
        StatusSnapshot {
            track,
            total_tracks: self.table.total(),
            elapsed_secs: 0,
            track_length_secs: self.table.length_secs(track),
            playing: false,
            process_alive: true,
            phase: ProcessPhase::Ready,
        }
    }

    fn track_table(&self) -> TrackTable {
        self.table.clone()
    }
}

/// A controller wired to fakes, with a manual clock by default.
pub struct ControllerRig {
    pub controller: PlaybackController,
    pub clock: Arc<ManualClock>,
    pub launcher: FakeLauncher,
    pub channel: RecordingChannel,
    pub outputs: Arc<FakeOutputs>,
    pub display: Arc<RecordingDisplay>,
    config: PlayerConfig,
    _dir: TempDir,
}

impl ControllerRig {
    /// Controller with a `total`-track disc already installed.
    pub fn new(total: u32) -> Self {
        let clock = Arc::new(ManualClock::new());
        Self::assemble(clock.clone(), clock, total, None)
    }

    /// Controller with no disc; insertion reads through `probe`.
    pub fn with_probe(probe: FixedProbe) -> Self {
        let clock = Arc::new(ManualClock::new());
        Self::assemble(clock.clone(), clock, 0, Some(probe))
    }

    pub fn with_clock(clock: Arc<dyn Clock>, total: u32) -> Self {
        Self::assemble(clock, Arc::new(ManualClock::new()), total, None)
    }

    pub fn build_with_broken_channel() -> PlayerResult<PlaybackController> {
        let dir = tempfile::tempdir().map_err(|e| PlayerError::ChannelSetup(e.to_string()))?;
        let channel = RecordingChannel::default();
        lock(&channel.0).broken = true;
        PlaybackController::builder(
            test_config(&dir),
            Arc::new(FakeOutputs::new("hw=0,0")),
            Arc::new(RecordingDisplay::default()),
        )
        .clock(Arc::new(ManualClock::new()))
        .channel(Box::new(channel))
        .build()
    }

    fn assemble(clock: Arc<dyn Clock>, manual: Arc<ManualClock>, total: u32, probe: Option<FixedProbe>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let launcher = FakeLauncher::new(clock.clone());
        let channel = RecordingChannel::default();
        let outputs = Arc::new(FakeOutputs::new("hw=0,0"));
        let display = Arc::new(RecordingDisplay::default());

        let mut builder = PlaybackController::builder(config.clone(), outputs.clone(), display.clone())
            .clock(clock)
            .launcher(Box::new(launcher.clone()))
            .channel(Box::new(channel.clone()));
        if let Some(probe) = probe {
            builder = builder.track_probe(Arc::new(probe));
        }
        let controller = builder.build().unwrap();
        if total > 0 {
            controller.set_disc(test_table(total));
        }

        Self {
            controller,
            clock: manual,
            launcher,
            channel,
            outputs,
            display,
            config,
            _dir: dir,
        }
    }

    pub fn track_marker(&self) -> MarkerFile {
        MarkerFile::new(self.config.track_marker.clone())
    }
}

impl Drop for ControllerRig {
    fn drop(&mut self) {
        self.controller.stop();
    }
}

/// A menu over fake collaborators with a 30 s timeout and one analog output.
pub struct MenuRig {
    pub menu: MenuStateMachine,
    pub clock: Arc<ManualClock>,
    pub transport: Arc<FakeTransport>,
    pub outputs: Arc<FakeOutputs>,
    pub bluetooth: Arc<FakeBluetooth>,
    pub display: Arc<RecordingDisplay>,
    pub screen: Arc<ScreenOwner>,
}

impl MenuRig {
    pub fn new(total: u32) -> Self {
        let clock = Arc::new(ManualClock::new());
        let table = if total == 0 {
            TrackTable::empty(Duration::from_secs(180))
        } else {
            test_table(total)
        };
        let transport = Arc::new(FakeTransport::new(table));
        let outputs = Arc::new(FakeOutputs::new("hw=0,0"));
        outputs.set_devices(&[("hw=0,0", "Analog")]);
        let bluetooth = Arc::new(FakeBluetooth::new());
        let display = Arc::new(RecordingDisplay::default());
        let screen = Arc::new(ScreenOwner::new());
        let config = MenuConfig {
            timeout: Duration::from_secs(30),
            message_hold: Duration::from_secs(1),
        };

        let menu = MenuStateMachine::new(
            config,
            clock.clone(),
            transport.clone(),
            outputs.clone(),
            bluetooth.clone(),
            display.clone(),
            screen.clone(),
        );
        Self {
            menu,
            clock,
            transport,
            outputs,
            bluetooth,
            display,
            screen,
        }
    }

    pub fn bluetooth_device(&self, name: &str, paired: bool, connected: bool) -> BluetoothDevice {
        BluetoothDevice {
            id: "AA:BB".to_string(),
            display_name: name.to_string(),
            paired,
            connected,
        }
    }
}
