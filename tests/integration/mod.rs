//! Integration tests driving real `/bin/sh` children through config
//! loading, scheduling passes and protocol emission.

use std::fs;

use serial_test::serial;
use tempfile::tempdir;

use plank::config;
use plank::models::block::BlockState;
use plank::protocol::{parse_click, Emitter};
use plank::scheduler::{route_click, run_pass};

fn states(toml: &str) -> Vec<BlockState> {
    config::parse(toml)
        .unwrap()
        .into_iter()
        .map(BlockState::new)
        .collect()
}

/// A command whose output counts its own executions: "1" after the first
/// run, "2" after the second, and so on.
fn counting_command(dir: &std::path::Path, tag: &str) -> String {
    let marker = dir.join(tag);
    format!(
        "echo x >> '{path}'; wc -l < '{path}' | tr -d ' '",
        path = marker.display()
    )
}

#[test]
fn test_load_config_from_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("blocks.toml");
    fs::write(
        &path,
        r#"
        [[block]]
        name = "cpu"
        command = "cpu.sh"
        interval = 10
        "#,
    )
    .unwrap();

    let blocks = config::load(&path).unwrap();

    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].name, "cpu");
    assert_eq!(blocks[0].interval, 10);
}

#[test]
fn test_load_config_missing_file() {
    let dir = tempdir().unwrap();
    let err = config::load(&dir.path().join("nope.toml")).unwrap_err();

    assert!(err.to_string().contains("failed to read config file"));
}

#[test]
#[serial]
fn test_first_pass_runs_every_command_block() {
    let mut blocks = states(
        r#"
        [[block]]
        name = "greeting"
        command = "printf 'hello\\nhi\\n#AABBCC\\n'"

        [[block]]
        name = "label"
        full_text = "static"
        "#,
    );

    run_pass(&mut blocks, 0);

    assert_eq!(blocks[0].full_text, "hello");
    assert_eq!(blocks[0].short_text, "hi");
    assert_eq!(blocks[0].color, "#AABBCC");
    assert!(blocks[0].last_update > 0);

    // The static block is untouched by scheduling.
    assert_eq!(blocks[1].full_text, "static");
    assert_eq!(blocks[1].last_update, 0);
}

#[test]
#[serial]
fn test_interval_zero_block_runs_once() {
    let dir = tempdir().unwrap();
    let mut blocks = states(&format!(
        r#"
        [[block]]
        name = "once"
        command = "{}"
        "#,
        counting_command(dir.path(), "once")
    ));

    run_pass(&mut blocks, 0);
    run_pass(&mut blocks, 0);
    run_pass(&mut blocks, 0);

    assert_eq!(blocks[0].full_text, "1");
}

#[test]
#[serial]
fn test_long_interval_block_is_not_rerun_early() {
    let dir = tempdir().unwrap();
    let mut blocks = states(&format!(
        r#"
        [[block]]
        name = "hourly"
        command = "{}"
        interval = 3600
        "#,
        counting_command(dir.path(), "hourly")
    ));

    run_pass(&mut blocks, 0);
    run_pass(&mut blocks, 0);

    assert_eq!(blocks[0].full_text, "1");
}

#[test]
#[serial]
fn test_signal_refresh_targets_only_the_configured_block() {
    let dir = tempdir().unwrap();
    let mut blocks = states(&format!(
        r#"
        [[block]]
        name = "usr1"
        command = "{}"
        signal = 10

        [[block]]
        name = "usr2"
        command = "{}"
        signal = 12
        "#,
        counting_command(dir.path(), "usr1"),
        counting_command(dir.path(), "usr2")
    ));

    run_pass(&mut blocks, 0);
    assert_eq!(blocks[0].full_text, "1");
    assert_eq!(blocks[1].full_text, "1");

    run_pass(&mut blocks, 10);
    assert_eq!(blocks[0].full_text, "2");
    assert_eq!(blocks[1].full_text, "1");
}

#[test]
#[serial]
fn test_click_round_trip() {
    let mut blocks = states(
        r#"
        [[block]]
        name = "vol"
        command = "printf '%s@%s,%s\\n' \"$BLOCK_BUTTON\" \"$BLOCK_X\" \"$BLOCK_Y\""

        [[block]]
        name = "cpu"
        command = "printf 'cpu\\n'"
        "#,
    );

    run_pass(&mut blocks, 0);
    assert_eq!(blocks[0].full_text, "@,");

    let event = parse_click(r#",{"name":"vol","instance":"","button":"1","x":"10","y":"5"}"#)
        .expect("payload should decode");
    route_click(&mut blocks, event);

    assert!(blocks[0].pending_click.is_some());
    assert!(blocks[1].pending_click.is_none());

    run_pass(&mut blocks, 0);

    assert_eq!(blocks[0].full_text, "1@10,5");
    assert!(blocks[0].pending_click.is_none(), "click must be consumed");
    // The unclicked block did not re-run.
    assert_eq!(blocks[1].full_text, "cpu");
}

#[test]
#[serial]
fn test_failed_block_does_not_affect_siblings() {
    let mut blocks = states(
        r#"
        [[block]]
        name = "broken"
        command = "printf 'oops\\n'; exit 2"

        [[block]]
        name = "fine"
        command = "printf 'ok\\n'"
        "#,
    );

    run_pass(&mut blocks, 0);

    assert_eq!(blocks[0].full_text, "[broken] ERROR (exit:2) oops");
    assert_eq!(blocks[0].color, "#FF0000");
    assert!(blocks[0].urgent);

    assert_eq!(blocks[1].full_text, "ok");
    assert!(!blocks[1].urgent);
}

#[test]
#[serial]
fn test_failure_display_is_replaced_on_recovery() {
    let dir = tempdir().unwrap();
    let marker = dir.path().join("flaky");
    // Fails while the marker is absent, succeeds after it appears.
    let mut blocks = states(&format!(
        r#"
        [[block]]
        name = "flaky"
        command = "test -e '{marker}' && printf 'up\\n' || exit 3"
        "#,
        marker = marker.display()
    ));

    run_pass(&mut blocks, 0);
    assert_eq!(blocks[0].full_text, "[flaky] ERROR (exit:3)");

    fs::write(&marker, "").unwrap();
    blocks[0].last_update = 0; // force the next pass to re-run it
    run_pass(&mut blocks, 0);

    assert_eq!(blocks[0].full_text, "up");
    assert_eq!(blocks[0].color, "");
    assert!(!blocks[0].urgent);
}

#[test]
#[serial]
fn test_emitted_stream_across_passes() {
    let mut blocks = states(
        r#"
        [[block]]
        name = "cpu"
        command = "printf 'ok\\n'"
        "#,
    );

    let mut out = Vec::new();
    let mut emitter = Emitter::new(&mut out);
    emitter.write_header().unwrap();

    run_pass(&mut blocks, 0);
    emitter.write_status_line(&blocks).unwrap();
    run_pass(&mut blocks, 0);
    emitter.write_status_line(&blocks).unwrap();

    let written = String::from_utf8(out).unwrap();
    let mut lines = written.lines();

    let header: serde_json::Value = serde_json::from_str(lines.next().unwrap()).unwrap();
    assert_eq!(header["version"], 1);
    assert_eq!(header["click_events"], true);
    assert_eq!(lines.next().unwrap(), "[");

    let first: serde_json::Value = serde_json::from_str(lines.next().unwrap()).unwrap();
    assert_eq!(first[0]["name"], "cpu");
    assert_eq!(first[0]["full_text"], "ok");

    let second = lines.next().unwrap();
    let second: serde_json::Value =
        serde_json::from_str(second.strip_prefix(',').unwrap()).unwrap();
    assert_eq!(second[0]["full_text"], "ok");
}
