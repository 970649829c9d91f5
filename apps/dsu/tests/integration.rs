//! Integration tests for the dsu CLI

use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

fn dsu() -> Command {
    Command::new(env!("CARGO_BIN_EXE_dsu"))
}

fn write_config(dir: &Path) -> std::path::PathBuf {
    let config = dir.join("config.toml");
    std::fs::write(
        &config,
        format!(
            "[script]\nshell = \"/bin/sh\"\noutput_dir = \"{}\"\n",
            dir.join("scripts").display()
        ),
    )
    .unwrap();
    config
}

#[test]
fn test_cli_version() {
    let output = dsu()
        .arg("--version")
        .output()
        .expect("Failed to execute dsu");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("dsu"));
}

#[test]
fn test_cli_help() {
    let output = dsu().arg("--help").output().expect("Failed to execute dsu");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Dynamic system update installer"));
    assert!(stdout.contains("plan"));
    assert!(stdout.contains("script"));
    assert!(stdout.contains("install"));
}

#[test]
fn test_cli_invalid_command() {
    let output = dsu()
        .arg("invalid-command")
        .output()
        .expect("Failed to execute dsu");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unrecognized subcommand"));
}

#[test]
fn test_plan_json() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());
    let output = dsu()
        .args(["--json", "--config"])
        .arg(&config)
        .args(["plan", "/sdcard/system.img.xz", "--partition", "dsu", "--userdata", "2"])
        .output()
        .expect("Failed to execute dsu");

    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["result"], "plan");
    let operations = value["operations"].as_array().unwrap();
    let kinds: Vec<&str> = operations
        .iter()
        .map(|op| op["operation"].as_str().unwrap())
        .collect();
    assert_eq!(
        kinds,
        ["allocate-userdata", "create-partition", "stream-write", "finalize"]
    );
}

#[test]
fn test_plan_rejects_bad_partition() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());
    let output = dsu()
        .arg("--config")
        .arg(&config)
        .args(["plan", "/sdcard/system.img", "--partition", "bad name"])
        .output()
        .expect("Failed to execute dsu");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error:"));
}

#[test]
fn test_script_written_to_output() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());
    let script = dir.path().join("install.sh");
    let output = dsu()
        .args(["--color", "never", "--config"])
        .arg(&config)
        .args(["script", "/sdcard/system.img.gz", "--output"])
        .arg(&script)
        .output()
        .expect("Failed to execute dsu");

    assert!(output.status.success());
    let text = std::fs::read_to_string(&script).unwrap();
    assert!(text.starts_with("#!/bin/sh\n"));
    assert!(text.contains("gzip -dc -- /sdcard/system.img.gz | gsi_tool write-partition --name dsu"));
}

#[test]
fn test_install_with_fallback() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());
    let image = dir.path().join("system.img");
    std::fs::write(&image, vec![7u8; 4096]).unwrap();
    let image_root = dir.path().join("root");

    let output = dsu()
        .args(["--json", "--config"])
        .arg(&config)
        .arg("install")
        .arg(&image)
        .args(["--size", "4096", "--userdata", "1", "--script-fallback", "--image-root"])
        .arg(&image_root)
        .output()
        .expect("Failed to execute dsu");

    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    // privileged when run as root, otherwise the script fallback
    match value["mode"].as_str().unwrap() {
        "installed" => {
            assert_eq!(value["bytes_written"], 4096);
            assert_eq!(std::fs::read(image_root.join("dsu.img")).unwrap().len(), 4096);
        }
        "script" => {
            assert!(dir.path().join("scripts").join("install_dsu.sh").exists());
        }
        other => panic!("unexpected mode {other}"),
    }
}
