//! Scheduling of block updates: interval, signal or click.
//!
//! The scheduler alternates forever between WAIT (one blocking receive on
//! the stimulus channel) and PASS (one sequential sweep over all blocks).
//! A pass never overlaps another pass or a click injection; everything
//! runs on the one receiving thread, so a click arriving mid-pass sits in
//! the channel until the next WAIT.

pub mod sources;

use std::io::Write;
use std::sync::mpsc::{self, Receiver};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::executor;
use crate::models::block::{now_unix, BlockConfig, BlockState};
use crate::models::click::ClickEvent;
use crate::protocol::{self, Emitter};

/// Wake period used when no block declares an interval.
pub const DEFAULT_WAKE_INTERVAL: u64 = 5;

/// One stimulus delivered per WAIT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stimulus {
    /// The periodic timer fired.
    TimerTick,
    /// An external refresh signal was delivered.
    Refresh(i32),
    /// A raw click payload arrived on stdin.
    Click(String),
    /// Termination was requested.
    Shutdown,
}

pub struct Scheduler<W: Write> {
    blocks: Vec<BlockState>,
    stimuli: Receiver<Stimulus>,
    emitter: Emitter<W>,
}

impl<W: Write> Scheduler<W> {
    /// Arm the stimulus sources and build the block states.
    ///
    /// The signal mask is installed before any source thread starts so
    /// every thread inherits it. Setup failures here are fatal: without a
    /// mask or a timer the scheduler cannot make progress.
    pub fn new(configs: Vec<BlockConfig>, out: W) -> Result<Self> {
        let period = wake_interval(&configs);
        let refresh_signals: Vec<i32> = configs
            .iter()
            .map(|config| config.signal)
            .filter(|&signal| signal != 0)
            .collect();

        let sigset = sources::refresh_sigset(&refresh_signals)
            .context("failed to build the scheduler signal set")?;
        sources::block_signals(&sigset).context("failed to install the scheduler signal mask")?;

        let (tx, rx) = mpsc::channel();
        sources::spawn_timer(period, tx.clone());
        sources::spawn_signal_listener(sigset, tx.clone());
        sources::spawn_click_listener(tx);

        info!(period, blocks = configs.len(), "scheduler armed");

        Ok(Self {
            blocks: configs.into_iter().map(BlockState::new).collect(),
            stimuli: rx,
            emitter: Emitter::new(out),
        })
    }

    /// Run forever: pass, emit, wait; until shutdown is requested.
    pub fn run(&mut self) -> Result<()> {
        self.emitter
            .write_header()
            .context("failed to write the protocol header")?;

        let mut signal = 0;
        loop {
            run_pass(&mut self.blocks, signal);
            self.emitter
                .write_status_line(&self.blocks)
                .context("failed to write the status line")?;

            signal = 0;
            match self.stimuli.recv() {
                Ok(Stimulus::TimerTick) => debug!("timer tick"),
                Ok(Stimulus::Refresh(number)) => {
                    debug!(signal = number, "refresh signal");
                    signal = number;
                }
                Ok(Stimulus::Click(payload)) => self.handle_click(&payload),
                Ok(Stimulus::Shutdown) => {
                    info!("shutdown requested");
                    break;
                }
                // Every source is gone; nothing can ever wake us again.
                Err(_) => break,
            }
        }

        info!("quit scheduling");
        Ok(())
    }

    fn handle_click(&mut self, payload: &str) {
        match protocol::parse_click(payload) {
            Some(event) => route_click(&mut self.blocks, event),
            None => debug!("ignoring malformed click payload"),
        }
    }
}

/// One sweep over all blocks, in configured order. Each due block is reset
/// to its configured presets (preserving its pending click), re-executed
/// synchronously, and its click consumed. One block finishes fully before
/// the next is considered, so a slow child delays the rest of the pass;
/// that is documented behavior, not patched with concurrency.
pub fn run_pass(blocks: &mut [BlockState], signal: i32) {
    let now = now_unix();

    for block in blocks.iter_mut() {
        if block.is_static() {
            debug!(name = %block.config.name, "no command, skipping");
            continue;
        }

        if !need_update(block, signal, now) {
            continue;
        }

        let click = block.pending_click.take();
        block.reset_display();
        block.pending_click = click;

        executor::spawn(block);
        executor::collect(block);

        block.pending_click = None;
    }
}

/// Decide whether a block must refresh this pass. Pure; evaluated against
/// the block's own state only.
pub fn need_update(block: &BlockState, signal: i32, now: u64) -> bool {
    let first_time = block.last_update == 0;
    let outdated = block.config.interval != 0 && now >= block.last_update + block.config.interval;
    let signaled = block.config.signal != 0 && block.config.signal == signal;
    let clicked = block.pending_click.is_some();

    debug!(
        name = %block.config.name,
        first_time,
        outdated,
        signaled,
        clicked,
        "trigger check"
    );

    first_time || outdated || signaled || clicked
}

/// Stash a click on the first block whose identity matches exactly. A
/// payload with neither name nor instance, or with no matching block, is a
/// silent no-op.
pub fn route_click(blocks: &mut [BlockState], event: ClickEvent) {
    if event.name.is_empty() && event.instance.is_empty() {
        return;
    }

    let target = blocks
        .iter_mut()
        .find(|block| block.config.name == event.name && block.config.instance == event.instance);

    if let Some(block) = target {
        debug!(name = %event.name, instance = %event.instance, "clicked");
        block.pending_click = Some(event.click);
    }
}

/// Shared wake period: the GCD of all nonzero block intervals, so every
/// block's deadline lands on a timer tick. Defaults when nothing declares
/// an interval.
pub fn wake_interval(configs: &[BlockConfig]) -> u64 {
    let mut period = 0;
    for config in configs {
        if config.interval != 0 {
            period = gcd(period, config.interval);
        }
    }

    if period == 0 {
        DEFAULT_WAKE_INTERVAL
    } else {
        period
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}
