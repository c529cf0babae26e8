pub mod audio;
pub mod bluetooth;
pub mod gpio;
pub mod lcd;

use std::io::Write;
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};

pub use audio::SystemAudio;
pub use bluetooth::BluetoothCtl;
pub use gpio::SysfsPins;
pub use lcd::ConsoleLcd;

/// Run `command` to completion and capture its output, killing it if it
/// is still running after `timeout`.
pub fn run_captured(command: &mut Command, timeout: Duration) -> Result<Output> {
    let program = command.get_program().to_string_lossy().into_owned();
    let child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("spawn {}", program))?;
    wait_captured(child, &program, timeout)
}

/// Wait for an already spawned child with piped output.
pub fn wait_captured(child: Child, program: &str, timeout: Duration) -> Result<Output> {
    let pid = child.id();
    let (tx, rx) = crossbeam_channel::bounded(1);
    thread::Builder::new()
        .name(format!("wait-{}", program))
        .spawn(move || {
            let _ = tx.send(child.wait_with_output());
        })
        .context("spawn wait thread")?;

    match rx.recv_timeout(timeout) {
        Ok(output) => output.with_context(|| format!("wait for {}", program)),
        Err(_) => {
            log::warn!("{} (pid {}) timed out after {:?}; killing", program, pid, timeout);
            let _ = Command::new("kill").args(["-KILL", &pid.to_string()]).status();
            bail!("{} timed out after {:?}", program, timeout)
        }
    }
}

/// Feed `script` to an interactive child line by line, pausing after each
/// line for its paired delay, then collect the output.
///
/// A child whose stdin breaks mid-script is killed and reaped before the
/// error is returned.
pub fn converse(
    mut child: Child,
    program: &str,
    script: &[(&str, Duration)],
    timeout: Duration,
) -> Result<Output> {
    let fed = child
        .stdin
        .take()
        .with_context(|| format!("{} stdin", program))
        .and_then(|mut stdin| {
            for (line, pause) in script {
                writeln!(stdin, "{}", line).with_context(|| format!("write `{}` to {}", line, program))?;
                thread::sleep(*pause);
            }
            Ok(())
        });

    match fed {
        Ok(()) => wait_captured(child, program, timeout),
        Err(e) => {
            log::warn!("{} session broken: {:#}", program, e);
            let _ = child.kill();
            let _ = child.wait();
            Err(e)
        }
    }
}
