//! Execution of a single block: spawn the configured command, collect its
//! output under the three-line protocol, synthesize a failure display when
//! anything goes wrong.
//!
//! Failures here never propagate. A block that cannot run is downgraded to
//! a marked-failed display state and the scheduler moves on.

use std::io::Read;
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};

use nix::sys::signal::SigSet;
use tracing::{debug, error};

use crate::models::block::{now_unix, BlockState, ALERT_COLOR};

/// Maximum bytes read from a child's stdout per execution; anything past
/// this is dropped and the pipe is closed.
pub const OUTPUT_CAPACITY: usize = 2048;

/// Exit code that marks a successful update as urgent (ASCII `!`).
pub const URGENT_EXIT: i32 = 33;

/// Output split under the line protocol: up to three newline-delimited
/// lines mapping positionally to full_text, short_text and color. `None`
/// means the corresponding field keeps its previous value.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct OutputLines {
    pub full_text: Option<String>,
    pub short_text: Option<String>,
    pub color: Option<String>,
}

/// Launch the block's command with its stdout captured.
///
/// No-op for a static block (empty command) or while a previous child is
/// still running; both are logged, not errors. Launch failure downgrades
/// the block via [`mark_failed`]. On success the child handle is recorded
/// and `last_update` is stamped.
pub fn spawn(block: &mut BlockState) {
    if block.is_static() {
        debug!(name = %block.config.name, "no command, skipping");
        return;
    }

    if block.child.is_some() {
        debug!(name = %block.config.name, "process already spawned");
        return;
    }

    let click = block.pending_click.clone().unwrap_or_default();
    let mut command = Command::new("sh");
    command
        .arg("-c")
        .arg(&block.config.command)
        .env("BLOCK_NAME", &block.config.name)
        .env("BLOCK_INSTANCE", &block.config.instance)
        .env("BLOCK_BUTTON", &click.button)
        .env("BLOCK_X", &click.x)
        .env("BLOCK_Y", &click.y)
        .stdin(Stdio::null())
        .stdout(Stdio::piped());

    // The scheduler keeps its signal set blocked process-wide; the child
    // must start with a clean mask.
    unsafe {
        command.pre_exec(|| {
            SigSet::all()
                .thread_unblock()
                .map_err(|errno| std::io::Error::from_raw_os_error(errno as i32))
        });
    }

    match command.spawn() {
        Ok(child) => {
            block.last_update = now_unix();
            debug!(
                name = %block.config.name,
                pid = child.id(),
                timestamp = block.last_update,
                "spawned child"
            );
            block.child = Some(child);
        }
        Err(err) => {
            error!(name = %block.config.name, %err, "failed to spawn");
            mark_failed(block, "failed to spawn", None);
        }
    }
}

/// Read the running child's output, reap it, and merge the result into the
/// block's display state.
///
/// Blocks until the child produces output or closes its stream. Any exit
/// status other than 0 or the urgent sentinel is a failure; the first
/// output line becomes the failure reason. On success the three-line
/// protocol is merged field by field, missing lines keeping their previous
/// values, and urgency is derived from the exit code.
pub fn collect(block: &mut BlockState) {
    let Some(mut child) = block.child.take() else {
        return;
    };

    let output = match child.stdout.take() {
        Some(stdout) => match read_bounded(stdout) {
            Ok(output) => output,
            Err(err) => {
                error!(name = %block.config.name, %err, "failed to read pipe");
                let _ = child.wait();
                return mark_failed(block, "failed to read pipe", None);
            }
        },
        None => String::new(),
    };

    let status = match child.wait() {
        Ok(status) => status,
        Err(err) => {
            error!(name = %block.config.name, %err, "failed to reap child");
            return mark_failed(block, "failed to reap child", None);
        }
    };

    let code = match status.code() {
        Some(code) => code,
        None => {
            error!(name = %block.config.name, "child killed by signal");
            return mark_failed(block, "killed by signal", None);
        }
    };

    if code != 0 && code != URGENT_EXIT {
        error!(name = %block.config.name, code, "bad exit code");
        let reason = output.lines().next().unwrap_or("").to_string();
        return mark_failed(block, &reason, Some(code));
    }

    block.urgent = code == URGENT_EXIT;

    let lines = parse_output(&output);
    if let Some(full_text) = lines.full_text {
        block.set_full_text(&full_text);
    }
    if let Some(short_text) = lines.short_text {
        block.set_short_text(&short_text);
    }
    if let Some(color) = lines.color {
        block.set_color(&color);
    }

    debug!(name = %block.config.name, "updated successfully");
}

/// Overwrite the block's display with a synthesized error state: alert
/// color, urgent flag, and a short diagnostic legible directly in the bar.
pub fn mark_failed(block: &mut BlockState, reason: &str, code: Option<i32>) {
    let short_text = match code {
        Some(code) => format!("[{}] ERROR (exit:{})", block.config.name, code),
        None => format!("[{}] ERROR", block.config.name),
    };
    let full_text = if reason.is_empty() {
        short_text.clone()
    } else {
        format!("{short_text} {reason}")
    };

    block.set_full_text(&full_text);
    block.set_short_text(&short_text);
    block.set_color(ALERT_COLOR);
    block.urgent = true;
}

/// Split raw child output under the line protocol.
///
/// Consumes left to right: each of the three slots takes the next
/// newline-delimited segment; an empty segment leaves its slot `None` but
/// still advances past the newline. Anything after the third line is
/// ignored.
pub fn parse_output(output: &str) -> OutputLines {
    let mut fields: [Option<String>; 3] = [None, None, None];
    let mut rest = output;

    for slot in fields.iter_mut() {
        if rest.is_empty() {
            break;
        }

        let (line, tail) = match rest.find('\n') {
            Some(pos) => (&rest[..pos], &rest[pos + 1..]),
            None => (rest, ""),
        };

        if !line.is_empty() {
            *slot = Some(line.to_string());
        }
        rest = tail;
    }

    let [full_text, short_text, color] = fields;
    OutputLines {
        full_text,
        short_text,
        color,
    }
}

/// Read at most `OUTPUT_CAPACITY` bytes from the stream. Dropping the
/// stream afterwards closes the pipe, so an over-talkative child gets cut
/// off at the protocol boundary instead of growing memory here.
fn read_bounded<R: Read>(mut stream: R) -> std::io::Result<String> {
    let mut buf = vec![0u8; OUTPUT_CAPACITY];
    let mut len = 0;

    while len < buf.len() {
        match stream.read(&mut buf[len..])? {
            0 => break,
            n => len += n,
        }
    }

    buf.truncate(len);
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
