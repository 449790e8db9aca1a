//! Stimulus sources feeding the scheduler channel.
//!
//! Each source is one detached thread owning a sender: a periodic timer, a
//! synchronous signal consumer, and a stdin reader for click payloads. The
//! scheduler's signal set is blocked process-wide before any of them
//! start, so a signal delivered during a pass is held pending and observed
//! at the next WAIT instead of interrupting execution.

use std::io::{self, BufRead};
use std::sync::mpsc::Sender;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use nix::sys::signal::{sigprocmask, SigSet, SigmaskHow, Signal};
use tracing::{debug, error};

use super::Stimulus;

/// Build the signal set the scheduler waits on: every configured block
/// signal plus the shutdown signals.
pub fn refresh_sigset(signals: &[i32]) -> Result<SigSet> {
    let mut set = SigSet::empty();
    set.add(Signal::SIGINT);
    set.add(Signal::SIGTERM);

    for &number in signals {
        let signal = Signal::try_from(number)
            .map_err(|_| anyhow!("unknown signal number {number}"))?;
        set.add(signal);
    }

    Ok(set)
}

/// Block the given set process-wide. Must run before any source thread
/// starts so the mask is inherited by all of them.
pub fn block_signals(set: &SigSet) -> Result<()> {
    sigprocmask(SigmaskHow::SIG_BLOCK, Some(set), None).context("sigprocmask failed")?;
    Ok(())
}

/// Arm the periodic timer: one tick per wake period, forever.
pub fn spawn_timer(period: u64, tx: Sender<Stimulus>) {
    debug!(period, "starting timer");
    let period = Duration::from_secs(period);

    thread::spawn(move || loop {
        thread::sleep(period);
        if tx.send(Stimulus::TimerTick).is_err() {
            break;
        }
    });
}

/// Consume the blocked signal set synchronously. Shutdown signals map to
/// [`Stimulus::Shutdown`], everything else to [`Stimulus::Refresh`].
pub fn spawn_signal_listener(set: SigSet, tx: Sender<Stimulus>) {
    thread::spawn(move || loop {
        match set.wait() {
            Ok(Signal::SIGINT | Signal::SIGTERM) => {
                let _ = tx.send(Stimulus::Shutdown);
                break;
            }
            Ok(signal) => {
                debug!(signal = signal as i32, "received refresh signal");
                if tx.send(Stimulus::Refresh(signal as i32)).is_err() {
                    break;
                }
            }
            Err(err) => {
                error!(%err, "sigwait failed");
                let _ = tx.send(Stimulus::Shutdown);
                break;
            }
        }
    });
}

/// Attach the stdin click reader: one raw payload line per stimulus, the
/// bar protocol's opening `[` line skipped. No-op when stdin is a tty
/// (there is no bar on the other end). Stops silently at end of stream.
pub fn spawn_click_listener(tx: Sender<Stimulus>) {
    if unsafe { libc::isatty(libc::STDIN_FILENO) } == 1 {
        debug!("stdin is a tty, click events disabled");
        return;
    }

    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    error!(%err, "failed to read stdin");
                    break;
                }
            };

            let lead = line.trim();
            if lead.is_empty() || lead == "[" {
                continue;
            }

            if tx.send(Stimulus::Click(line)).is_err() {
                break;
            }
        }
        debug!("click stream closed");
    });
}
