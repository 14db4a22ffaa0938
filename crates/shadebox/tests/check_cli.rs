use std::fs;
use std::process::Command;

use tempfile::TempDir;

const GRADIENT: &str = "@fragment
fn main(@builtin(position) coord: vec4<f32>) -> @location(0) vec4<f32> {
    let uv = coord.xy / iResolution.xy;
    return vec4<f32>(uv, 0.5 + 0.5 * sin(iTime), 1.0);
}
";

const BROKEN: &str = "@fragment
fn main() -> @location(0) vec4<f32> {
    return vec4<f32>(missing, 0.0, 0.0, 1.0);
}
";

fn shadebox() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_shadebox"));
    command.env("RUST_LOG", "off").env_remove("SHADEBOX_MANIFEST");
    command
}

#[test]
fn check_accepts_valid_shader() {
    let dir = TempDir::new().unwrap();
    let shader = dir.path().join("gradient.wgsl");
    fs::write(&shader, GRADIENT).unwrap();

    let output = shadebox()
        .arg("check")
        .arg(&shader)
        .output()
        .expect("failed to run shadebox check");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("fragment-only"), "stdout: {stdout}");
}

#[test]
fn check_reports_errors_as_json() {
    let dir = TempDir::new().unwrap();
    let shader = dir.path().join("broken.wgsl");
    fs::write(&shader, BROKEN).unwrap();

    let output = shadebox()
        .args(["check", "--format", "json"])
        .arg(&shader)
        .output()
        .expect("failed to run shadebox check");

    assert!(!output.status.success());
    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("check prints JSON");
    assert_eq!(report["kind"], "parse-error");
    let errors = report["errors"].as_array().expect("errors array");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["line"], 3);
    assert_eq!(errors[0]["severity"], "error");
}

#[test]
fn check_fails_for_missing_file() {
    let dir = TempDir::new().unwrap();
    let status = shadebox()
        .arg("check")
        .arg(dir.path().join("absent.wgsl"))
        .status()
        .expect("failed to run shadebox check");

    assert!(!status.success());
}
