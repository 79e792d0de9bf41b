use parley::{render_nodes, Style};
use parley_core::format::FormatterEngine;
use parley_core::media::MediaHints;
use std::fs;
use std::path::PathBuf;

const SAMPLE: &str =
    "## Setup\n\n1. Install **Rust**\n- run `cargo build`\n\n```\nfn main() {}\n```\nDone *now*.";

fn capture_snapshot(style: Style) -> String {
    let engine = FormatterEngine::new(MediaHints::default());
    let nodes = engine.format(SAMPLE, Some("gpt-4o"));
    render_nodes(&nodes, style).replace('\x1b', "^[")
}

fn assert_snapshot(name: &str, actual: &str) {
    let path = snapshot_path(name);
    if let Ok(expected) = fs::read_to_string(&path) {
        assert_eq!(actual, expected, "snapshot {} drifted", name);
    } else {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create snapshot dir");
        }
        fs::write(&path, actual).expect("write snapshot");
        panic!(
            "snapshot {} created at {}. Re-run tests.",
            name,
            path.display()
        );
    }
}

fn snapshot_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("render_snapshots")
        .join(format!("{name}.snapshot"))
}

#[test]
fn renders_plain_snapshot() {
    let snapshot = capture_snapshot(Style::Plain);
    assert_snapshot("plain", &snapshot);
}

#[test]
fn renders_ansi_snapshot() {
    let snapshot = capture_snapshot(Style::Ansi);
    assert_snapshot("ansi", &snapshot);
}
