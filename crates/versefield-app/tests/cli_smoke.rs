use std::process::Command;

use versefield_core::{FrameSnapshot, Role, StateLabel};

fn versefield() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_versefield"));
    cmd.env("RUST_LOG", "off")
        .env_remove("VERSEFIELD_RENDERER")
        .env_remove("VERSEFIELD_TICKS")
        .env_remove("VERSEFIELD_ZOOM");
    cmd
}

#[test]
fn list_names_every_builtin() {
    let output = versefield().arg("list").output().expect("failed to run versefield");
    assert!(output.status.success(), "list failed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    for entry in versefield_app::entries() {
        assert!(stdout.contains(entry.name), "missing {}", entry.name);
    }
}

#[test]
fn jsonl_run_streams_one_frame_per_tick() {
    let output = versefield()
        .args([
            "--renderer",
            "jsonl",
            "run",
            "observer-collapse",
            "--ticks",
            "40",
            "--input",
            "2:click:0,0",
        ])
        .output()
        .expect("failed to run versefield");
    assert!(output.status.success(), "run failed");

    let frames: Vec<FrameSnapshot> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("frame json"))
        .collect();
    assert_eq!(frames.len(), 40);
    assert_eq!(frames[0].tick, 1);
    let last = frames.last().expect("last frame");
    assert_eq!(last.state, StateLabel::Settled);
    assert_eq!(last.with_role(Role::Settled).count(), 40);
}

#[test]
fn unknown_vignette_fails() {
    let status = versefield()
        .args(["--renderer", "null", "run", "no-such-vignette"])
        .status()
        .expect("failed to run versefield");
    assert!(!status.success());
}

#[test]
fn tour_runs_headless() {
    let status = versefield()
        .args(["--renderer", "null", "tour", "--ticks", "10"])
        .status()
        .expect("failed to run versefield");
    assert!(status.success(), "tour failed");
}

#[test]
fn ascii_zoom_is_validated() {
    let output = versefield()
        .args(["--renderer", "ascii", "--zoom", "2", "run", "ripple-pond", "--ticks", "2"])
        .output()
        .expect("failed to run versefield");
    assert!(output.status.success(), "zoomed run failed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.matches("[ripple-pond] tick").count(), 2);

    let status = versefield()
        .args(["--renderer", "ascii", "--zoom", "0", "run", "ripple-pond"])
        .status()
        .expect("failed to run versefield");
    assert!(!status.success());
}
