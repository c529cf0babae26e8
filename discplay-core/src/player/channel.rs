use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, anyhow, bail};

use crate::commands::DecoderCommand;
use crate::config::DecoderConfig;
use crate::error::{PlayerError, PlayerResult};

pub trait ControlChannel: Send {
    /// Unlink and remake the channel so no stale end survives a dead
    /// process.
    fn recreate(&mut self) -> PlayerResult<()>;

    /// Deliver one command, retrying once through the fallback path.
    fn send(&mut self, command: &DecoderCommand) -> PlayerResult<()>;

    /// Short description for diagnostics.
    fn describe(&self) -> String;
}

/// One way of getting a line into the pipe.
pub trait CommandWriter: Send + Sync {
    fn name(&self) -> String;
    fn write_line(&self, fifo: &Path, line: &str, timeout: Duration) -> anyhow::Result<()>;
}

/// Opens and writes the pipe from this process, on a helper thread so a
/// missing reader cannot block the caller past `timeout`.
#[derive(Debug, Default)]
pub struct DirectWriter;

impl CommandWriter for DirectWriter {
    fn name(&self) -> String {
        "direct".to_string()
    }

    fn write_line(&self, fifo: &Path, line: &str, timeout: Duration) -> anyhow::Result<()> {
        let (done_tx, done_rx) = crossbeam_channel::bounded::<io::Result<()>>(1);
        let path = fifo.to_path_buf();
        let payload = format!("{}\n", line);

        thread::Builder::new()
            .name("fifo-write".to_string())
            .spawn(move || {
                let result = OpenOptions::new()
                    .write(true)
                    .open(&path)
                    .and_then(|mut pipe| {
                        pipe.write_all(payload.as_bytes())?;
                        pipe.flush()
                    });
                let _ = done_tx.send(result);
            })
            .context("Failed to spawn FIFO writer thread")?;

        match done_rx.recv_timeout(timeout) {
            Ok(result) => result.with_context(|| format!("write to {}", fifo.display())),
            Err(_) => {
                release_blocked_writer(fifo);
                bail!("no reader on {} after {:?}", fifo.display(), timeout)
            }
        }
    }
}

/// A read+write open never blocks on Linux and pairs with a writer stuck
/// in `open`, letting its thread finish. Whatever it wrote is discarded.
fn release_blocked_writer(fifo: &Path) {
    if let Err(e) = OpenOptions::new().read(true).write(true).open(fifo) {
        log::debug!("Could not release blocked FIFO writer: {}", e);
    }
}

/// Writes through `sudo -u <user> sh -c 'echo ... > fifo'`.
#[derive(Debug, Clone)]
pub struct UserContextWriter {
    user: String,
}

impl UserContextWriter {
    pub fn new(user: impl Into<String>) -> Self {
        Self { user: user.into() }
    }
}

impl CommandWriter for UserContextWriter {
    fn name(&self) -> String {
        format!("sudo -u {}", self.user)
    }

    fn write_line(&self, fifo: &Path, line: &str, timeout: Duration) -> anyhow::Result<()> {
        let script = format!("echo '{}' > '{}'", line, fifo.display());
        let mut child = Command::new("sudo")
            .args(["-n", "-u", &self.user, "sh", "-c", &script])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .context("Failed to run sudo")?;

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                if status.success() {
                    return Ok(());
                }
                return Err(anyhow!("{} exited with {}", self.name(), status));
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                release_blocked_writer(fifo);
                bail!("{} timed out after {:?}", self.name(), timeout);
            }
            thread::sleep(Duration::from_millis(20));
        }
    }
}

pub struct FifoChannel {
    path: PathBuf,
    timeout: Duration,
    primary: Box<dyn CommandWriter>,
    fallback: Option<Box<dyn CommandWriter>>,
}

impl FifoChannel {
    /// Direct writes, falling back to the configured user's context.
    pub fn new(config: &DecoderConfig) -> Self {
        let fallback = config
            .fallback_user
            .as_ref()
            .map(|user| Box::new(UserContextWriter::new(user.clone())) as Box<dyn CommandWriter>);
        Self::with_writers(
            config.fifo_path.clone(),
            config.command_timeout,
            Box::new(DirectWriter),
            fallback,
        )
    }

    pub fn with_writers(
        path: PathBuf,
        timeout: Duration,
        primary: Box<dyn CommandWriter>,
        fallback: Option<Box<dyn CommandWriter>>,
    ) -> Self {
        Self {
            path,
            timeout,
            primary,
            fallback,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ControlChannel for FifoChannel {
    fn recreate(&mut self) -> PlayerResult<()> {
        make_fifo(&self.path)
            .map_err(|e| PlayerError::ChannelSetup(format!("{}: {:#}", self.path.display(), e)))?;
        log::debug!("Control FIFO recreated at {}", self.path.display());
        Ok(())
    }

    fn send(&mut self, command: &DecoderCommand) -> PlayerResult<()> {
        let line = command.wire();
        let first = match self.primary.write_line(&self.path, &line, self.timeout) {
            Ok(()) => {
                log::debug!("Command '{}' sent ({})", line, self.primary.name());
                return Ok(());
            }
            Err(e) => e,
        };
        log::warn!("Command '{}' failed via {}: {:#}", line, self.primary.name(), first);

        // Exactly one retry, never a loop.

        let Some(fallback) = &self.fallback else {
            return Err(PlayerError::CommandDeliveryFailed {
                command: line,
                reason: format!("{:#}", first),
            });
        };

        match fallback.write_line(&self.path, &line, self.timeout) {
            Ok(()) => {
                log::info!("Command '{}' sent via {}", line, fallback.name());
                Ok(())
            }
            Err(second) => {
                log::error!("Command '{}' failed via {}: {:#}", line, fallback.name(), second);
                Err(PlayerError::CommandDeliveryFailed {
                    command: line,
                    reason: format!("{:#}; {:#}", first, second),
                })
            }
        }
    }

    fn describe(&self) -> String {
        match &self.fallback {
            Some(fallback) => format!(
                "fifo {} ({}, fallback {})",
                self.path.display(),
                self.primary.name(),
                fallback.name()
            ),
            None => format!("fifo {} ({})", self.path.display(), self.primary.name()),
        }
    }
}

fn make_fifo(path: &Path) -> anyhow::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e).context("remove stale FIFO"),
    }

    let status = Command::new("mkfifo")
        .arg(path)
        .status()
        .context("Failed to run mkfifo")?;
    if !status.success() {
        bail!("mkfifo exited with {}", status);
    }

    set_fifo_mode(path)
}

#[cfg(unix)]
fn set_fifo_mode(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o666)).context("chmod FIFO")
}

#[cfg(not(unix))]
fn set_fifo_mode(_path: &Path) -> anyhow::Result<()> {
    Ok(())
}
