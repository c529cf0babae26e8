use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::process::{DecoderProcess, ProcessStatus};
use crate::clock::{CancellationToken, Clock, lock};
use crate::config::DecoderConfig;
use crate::devices::AudioOutputs;
use crate::error::{PlayerError, PlayerResult};

/// The decoder handle, shared by the controller and its watcher.
pub type SharedProcess = Arc<Mutex<Box<dyn DecoderProcess>>>;

/// Poll once per `probe_interval` until the process has been up for
/// `ready_after` (capped at `probe_window`).
///
/// Returns the observed uptime. Fails with `ProcessDied` if the process
/// exits first, or `Interrupted` if `token` is cancelled.
pub fn probe_liveness(
    process: &SharedProcess,
    clock: &dyn Clock,
    config: &DecoderConfig,
    token: &CancellationToken,
) -> PlayerResult<Duration> {
    let started = clock.now();
    let target = config.ready_after.min(config.probe_window);

    loop {
        if clock.wait(config.probe_interval, token) {
            log::info!("Liveness probe interrupted");
            return Err(PlayerError::Interrupted);
        }
        let uptime = clock.now().saturating_duration_since(started);

        if let ProcessStatus::Exited(code) = lock(process).status() {
            log::error!("Decoder exited after {:?} with code {:?}", uptime, code);
            return Err(PlayerError::ProcessDied(code));
        }
        if uptime >= target {
            log::info!("Decoder alive for {:?}", uptime);
            return Ok(uptime);
        }
        log::debug!("Decoder alive after {:?}", uptime);
    }
}

/// Background thread that checks the process once per interval and calls
/// `on_exit` the first time it sees it gone.
pub struct Watcher {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Watcher {
    pub fn spawn<F>(
        process: SharedProcess,
        interval: Duration,
        token: CancellationToken,
        on_exit: F,
    ) -> io::Result<Self>
    where
        F: FnOnce(Option<i32>) + Send + 'static,
    {
        let thread_token = token.clone();
        let handle = thread::Builder::new()
            .name("decoder-watch".to_string())
            .spawn(move || {
                let ticker = crossbeam_channel::tick(interval);
                loop {
                    crossbeam_channel::select! {
                        recv(thread_token.signal()) -> _ => return,
                        recv(ticker) -> _ => {}
                    }
                    if thread_token.is_cancelled() {
                        return;
                    }
                    let status = lock(&process).status();
                    if let ProcessStatus::Exited(code) = status {
                        log::warn!("Decoder exited silently with code {:?}", code);
                        on_exit(code);
                        return;
                    }
                }
            })?;

        Ok(Self {
            token,
            handle: Some(handle),
        })
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// What was captured when a decoder died.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticReport {
    pub log_tail: Vec<String>,
    /// Raw `st_mode` of the control FIFO, `None` when it is missing.
    pub fifo_mode: Option<u32>,
    pub device_present: bool,
    pub output_device: String,
}

pub struct Diagnostics {
    log_path: PathBuf,
    fifo_path: PathBuf,
    device_path: PathBuf,
    log_lines: usize,
    outputs: Arc<dyn AudioOutputs>,
}

impl Diagnostics {
    pub fn new(config: &DecoderConfig, outputs: Arc<dyn AudioOutputs>) -> Self {
        Self {
            log_path: config.log_path.clone(),
            fifo_path: config.fifo_path.clone(),
            device_path: config.cdrom_device.clone(),
            log_lines: config.diagnostic_log_lines,
            outputs,
        }
    }

    /// Gather and log everything useful about a failed decoder.
    pub fn capture(&self) -> DiagnosticReport {
        let report = DiagnosticReport {
            log_tail: self.log_tail(),
            fifo_mode: fifo_mode(&self.fifo_path),
            device_present: self.device_path.exists(),
            output_device: self.outputs.current_device_id(),
        };

        log::error!("Diagnosing decoder failure");
        if report.log_tail.is_empty() {
            log::error!("  decoder log {} empty or missing", self.log_path.display());
        }
        for line in &report.log_tail {
            log::error!("  log: {}", line);
        }
        match report.fifo_mode {
            Some(mode) => log::error!("  fifo {}: mode {:o}", self.fifo_path.display(), mode),
            None => log::error!("  fifo {}: missing", self.fifo_path.display()),
        }
        log::error!(
            "  device {}: {}",
            self.device_path.display(),
            if report.device_present { "present" } else { "missing" }
        );
        log::error!("  output device: {}", report.output_device);
        report
    }

    fn log_tail(&self) -> Vec<String> {
        let Ok(text) = fs::read_to_string(&self.log_path) else {
            return Vec::new();
        };
        let lines: Vec<&str> = text.lines().collect();
        let start = lines.len().saturating_sub(self.log_lines);
        lines[start..]
            .iter()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[cfg(unix)]
fn fifo_mode(path: &std::path::Path) -> Option<u32> {
    use std::os::unix::fs::MetadataExt;
    fs::metadata(path).ok().map(|meta| meta.mode())
}

#[cfg(not(unix))]
fn fifo_mode(path: &std::path::Path) -> Option<u32> {
    fs::metadata(path).ok().map(|_| 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::test_support::{FakeOutputs, FakeProcess};
    use crossbeam_channel::RecvTimeoutError;

    fn shared(process: FakeProcess) -> SharedProcess {
        let process: Box<dyn DecoderProcess> = Box::new(process);
        Arc::new(Mutex::new(process))
    }

    #[test]
    fn probe_declares_ready_after_three_seconds() {
        let clock = Arc::new(ManualClock::new());
        let process = shared(FakeProcess::running(clock.clone()));
        let uptime = probe_liveness(&process, clock.as_ref(), &DecoderConfig::default(), &CancellationToken::new()).unwrap();
        assert_eq!(uptime, Duration::from_secs(3));
    }

    #[test]
    fn probe_reports_early_exit_code() {
        let clock = Arc::new(ManualClock::new());
        let process = shared(FakeProcess::exiting_after(clock.clone(), Duration::from_secs(2), Some(1)));
        let err = probe_liveness(&process, clock.as_ref(), &DecoderConfig::default(), &CancellationToken::new()).unwrap_err();
        assert_eq!(err, PlayerError::ProcessDied(Some(1)));
        assert_eq!(clock.elapsed(), Duration::from_secs(2));
    }

    #[test]
    fn probe_stops_when_cancelled() {
        let clock = Arc::new(ManualClock::new());
        let process = shared(FakeProcess::running(clock.clone()));
        let token = CancellationToken::new();
        token.cancel();
        let err = probe_liveness(&process, clock.as_ref(), &DecoderConfig::default(), &token).unwrap_err();
        assert_eq!(err, PlayerError::Interrupted);
    }

    #[test]
    fn watcher_reports_silent_exit_once() {
        let clock = Arc::new(ManualClock::new());
        let fake = FakeProcess::running(clock.clone());
        let handle = fake.handle();
        let (tx, rx) = crossbeam_channel::unbounded();

        let watcher = Watcher::spawn(shared(fake), Duration::from_millis(5), CancellationToken::new(), move |code| {
            let _ = tx.send(code);
        })
        .unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_millis(30)), Err(RecvTimeoutError::Timeout));
        handle.die_now(Some(139));
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), Some(139));
        watcher.stop();
    }

    #[test]
    fn stopped_watcher_never_fires() {
        let clock = Arc::new(ManualClock::new());
        let fake = FakeProcess::running(clock.clone());
        let handle = fake.handle();
        let (tx, rx) = crossbeam_channel::unbounded();

        let watcher = Watcher::spawn(shared(fake), Duration::from_millis(5), CancellationToken::new(), move |code| {
            let _ = tx.send(code);
        })
        .unwrap();
        watcher.stop();
        handle.die_now(Some(1));
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn diagnostics_collect_log_tail_fifo_and_device() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = DecoderConfig::default();
        config.log_path = dir.path().join("decoder.log");
        config.fifo_path = dir.path().join("missing.fifo");
        config.cdrom_device = dir.path().join("sr0");

        let log: String = (1..=15).map(|i| format!("line {}\n\n", i)).collect();
        fs::write(&config.log_path, log).unwrap();
        fs::write(&config.cdrom_device, "").unwrap();

        let outputs = Arc::new(FakeOutputs::new("hw=0,0"));
        let report = Diagnostics::new(&config, outputs).capture();

        assert_eq!(report.log_tail.first().map(String::as_str), Some("line 11"));
        assert_eq!(report.log_tail.last().map(String::as_str), Some("line 15"));
        assert_eq!(report.fifo_mode, None);
        assert!(report.device_present);
        assert_eq!(report.output_device, "hw=0,0");
    }
}
