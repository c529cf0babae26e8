use std::fs::OpenOptions;
use std::io;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use anyhow::{Context, bail};

use crate::clock::{CancellationToken, Clock};
use crate::config::DecoderConfig;

/// Interval between exit checks while waiting for termination.
const EXIT_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Running,
    Exited(Option<i32>),
}

/// A spawned decoder. Owned by exactly one session.
pub trait DecoderProcess: Send {
    fn id(&self) -> u32;

    /// Non-blocking exit check.
    fn status(&mut self) -> ProcessStatus;

    /// Ask the process to exit (SIGTERM).
    fn terminate(&mut self) -> io::Result<()>;

    /// Force it (SIGKILL).
    fn kill(&mut self) -> io::Result<()>;
}

/// What to play and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub track: u32,
    /// Identifier from `AudioOutputs::current_device_id`.
    pub device_id: String,
}

pub trait DecoderLauncher: Send + Sync {
    fn launch(&self, request: &LaunchRequest) -> anyhow::Result<Box<dyn DecoderProcess>>;
}

/// Map an output device identifier to the decoder's `-ao` argument.
pub fn audio_output_arg(device_id: &str) -> String {
    if device_id == "pulse" || device_id.starts_with("pulse:") {
        "pulse".to_string()
    } else if device_id.starts_with("hw=") {
        format!("alsa:device={}", device_id)
    } else {
        "pulse".to_string()
    }
}

pub fn is_bluetooth_sink(device_id: &str) -> bool {
    device_id.contains("bluez_sink")
}

/// Full argument list for `mplayer` in slave mode reading the control FIFO.
pub fn mplayer_args(config: &DecoderConfig, request: &LaunchRequest) -> Vec<String> {
    vec![
        "-cdrom-device".to_string(),
        config.cdrom_device.display().to_string(),
        "-cache".to_string(),
        config.cache_kb.to_string(),
        "-ao".to_string(),
        audio_output_arg(&request.device_id),
        "-vo".to_string(),
        "null".to_string(),
        "-slave".to_string(),
        "-quiet".to_string(),
        "-input".to_string(),
        format!("file={}", config.fifo_path.display()),
        format!("cdda://{}", request.track),
    ]
}

pub struct MplayerLauncher {
    config: DecoderConfig,
}

impl MplayerLauncher {
    pub fn new(config: DecoderConfig) -> Self {
        Self { config }
    }

    fn environment(&self, request: &LaunchRequest) -> Vec<(String, String)> {
        let mut env = self.config.env.clone();
        // Bluetooth sinks also need PULSE_SINK on top of -ao.
        if is_bluetooth_sink(&request.device_id) {
            env.push(("PULSE_SINK".to_string(), request.device_id.clone()));
        }
        env
    }

    /// Play a short sound so a sleeping Bluetooth sink wakes up before the
    /// decoder opens it.
    fn prime_sink(&self, request: &LaunchRequest, env: &[(String, String)]) {
        let result = Command::new("paplay")
            .arg(&self.config.prime_sound)
            .arg("--device")
            .arg(&request.device_id)
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match result {
            Ok(status) if status.success() => log::debug!("Primed {}", request.device_id),
            Ok(status) => log::warn!("paplay exited with {} priming {}", status, request.device_id),
            Err(e) => log::warn!("Failed to prime {}: {}", request.device_id, e),
        }
    }
}

impl DecoderLauncher for MplayerLauncher {
    fn launch(&self, request: &LaunchRequest) -> anyhow::Result<Box<dyn DecoderProcess>> {
        let env = self.environment(request);
        if self.config.prime_bluetooth_sink && is_bluetooth_sink(&request.device_id) {
            self.prime_sink(request, &env);
        }

        let log_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.config.log_path)
            .with_context(|| format!("open decoder log {}", self.config.log_path.display()))?;
        let stderr_log = log_file.try_clone().context("clone decoder log handle")?;

        let args = mplayer_args(&self.config, request);
        log::info!("Launching {} {}", self.config.binary, args.join(" "));

        let child = Command::new(&self.config.binary)
            .args(&args)
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::from(log_file))
            .stderr(Stdio::from(stderr_log))
            .spawn()
            .with_context(|| format!("spawn {}", self.config.binary))?;

        log::info!("Decoder started with PID {}", child.id());
        Ok(Box::new(MplayerProcess { child }))
    }
}

pub struct MplayerProcess {
    child: Child,
}

impl DecoderProcess for MplayerProcess {
    fn id(&self) -> u32 {
        self.child.id()
    }

    fn status(&mut self) -> ProcessStatus {
        match self.child.try_wait() {
            Ok(Some(status)) => ProcessStatus::Exited(status.code()),
            Ok(None) => ProcessStatus::Running,
            Err(e) => {
                log::warn!("Could not poll decoder {}: {}", self.child.id(), e);
                ProcessStatus::Exited(None)
            }
        }
    }

    fn terminate(&mut self) -> io::Result<()> {
        let status = Command::new("kill")
            .arg("-TERM")
            .arg(self.child.id().to_string())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::other(format!("kill -TERM exited with {}", status)))
        }
    }

    fn kill(&mut self) -> io::Result<()> {
        self.child.kill()
    }
}

/// Graceful terminate, `grace` to exit, then force kill and wait up to
/// `kill_wait`. Returns the exit code when the process was reaped.
pub fn terminate_with_grace(
    process: &mut dyn DecoderProcess,
    clock: &dyn Clock,
    grace: Duration,
    kill_wait: Duration,
) -> anyhow::Result<Option<i32>> {
    if let ProcessStatus::Exited(code) = process.status() {
        return Ok(code);
    }

    let pid = process.id();
    if let Err(e) = process.terminate() {
        log::warn!("SIGTERM to decoder {} failed: {}", pid, e);
    }
    if let Some(code) = wait_for_exit(process, clock, grace) {
        log::info!("Decoder {} terminated gracefully", pid);
        return Ok(code);
    }

    process.kill().with_context(|| format!("kill decoder {}", pid))?;
    match wait_for_exit(process, clock, kill_wait) {
        Some(code) => {
            log::warn!("Decoder {} force killed", pid);
            Ok(code)
        }
        None => bail!("decoder {} still running after SIGKILL", pid),
    }
}

fn wait_for_exit(process: &mut dyn DecoderProcess, clock: &dyn Clock, limit: Duration) -> Option<Option<i32>> {
    let token = CancellationToken::new();
    let deadline = clock.now() + limit;
    loop {
        if let ProcessStatus::Exited(code) = process.status() {
            return Some(code);
        }
        let now = clock.now();
        if now >= deadline {
            return None;
        }
        clock.wait(EXIT_POLL.min(deadline - now), &token);
    }
}
