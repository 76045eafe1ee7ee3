//! Tests for the `extgate` binary.
//!
//! Every test points the binary at files inside a temporary directory, so
//! no real settings or policy are touched.

#![allow(clippy::unwrap_used)] // unwrap is acceptable in tests

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

struct Sandbox {
    dir: tempfile::TempDir,
}

impl Sandbox {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn settings(&self) -> PathBuf {
        self.dir.path().join("User").join("settings.json")
    }

    fn policy(&self) -> PathBuf {
        self.dir.path().join("policy").join("policy.json")
    }

    fn install_dir(&self) -> PathBuf {
        self.dir.path().join("install")
    }

    fn run(&self, args: &[&str]) -> Output {
        self.run_with_manager(&self.dir.path().join("no-such-tool"), args)
    }

    fn run_with_manager(&self, manager: &Path, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_extgate"))
            .arg("--settings-path")
            .arg(self.settings())
            .arg("--policy-file")
            .arg(self.policy())
            .arg("--system-install-dir")
            .arg(self.install_dir())
            .arg("--extension-manager")
            .arg(manager)
            .arg("--json")
            .args(args)
            .env_remove("RUST_LOG")
            .output()
            .unwrap()
    }
}

fn report(output: &Output) -> serde_json::Value {
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_user_add_preserves_settings() {
    let sandbox = Sandbox::new();
    std::fs::create_dir_all(sandbox.settings().parent().unwrap()).unwrap();
    std::fs::write(
        sandbox.settings(),
        "{\n  // my editor\n  \"editor.tabSize\": 2,\n}\n",
    )
    .unwrap();

    let out = sandbox.run(&["--add", "ms-python.*,redhat.java", "--disable-auto-update"]);
    let report = report(&out);
    assert_eq!(report["context"], "user");
    assert_eq!(report["allow_map"]["ms-python"], true);
    assert_eq!(report["allow_map"]["redhat.java"], true);

    let text = std::fs::read_to_string(sandbox.settings()).unwrap();
    let settings: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(settings["editor.tabSize"], 2);
    assert_eq!(settings["extensions.autoUpdate"], false);
    assert_eq!(settings["extensions.autoCheckUpdates"], true);
    assert_eq!(settings["extensions.ignoreRecommendations"], true);
}

#[test]
fn test_system_falls_back_without_install() {
    let sandbox = Sandbox::new();
    let out = sandbox.run(&["--system", "--add", "microsoft"]);
    let report = report(&out);

    assert_eq!(report["requested_context"], "system");
    assert_eq!(report["context"], "user");
    assert_eq!(report["fell_back"], true);
    assert!(sandbox.settings().exists());
    assert!(!sandbox.policy().exists());
}

#[test]
fn test_system_with_install() {
    let sandbox = Sandbox::new();
    std::fs::create_dir_all(sandbox.install_dir()).unwrap();

    let out = sandbox.run(&["--system", "--add", "microsoft", "--deny", "evil.ext"]);
    let report = report(&out);
    assert_eq!(report["context"], "system");

    let text = std::fs::read_to_string(sandbox.policy()).unwrap();
    let policy: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(
        policy["AllowedExtensions"]["value"],
        r#"{"evil.ext":false,"microsoft":true}"#
    );
}

#[test]
fn test_force_system_legacy_layout() {
    let sandbox = Sandbox::new();
    let out = sandbox.run(&[
        "--force-system",
        "--legacy-layout",
        "--add",
        "microsoft",
        "--deny",
        "evil.ext",
        "--disable-gallery",
    ]);
    let report = report(&out);
    assert_eq!(report["context"], "system");

    let text = std::fs::read_to_string(sandbox.policy()).unwrap();
    let policy: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(policy["extensions.allowed"]["value"], r#"{"microsoft":true}"#);
    assert_eq!(policy["extensions.gallery.enabled"]["value"], 0);
    assert_eq!(policy["extensions.autoUpdate"]["value"], 1);
}

#[test]
fn test_user_and_system_conflict() {
    let sandbox = Sandbox::new();
    let out = sandbox.run(&["--user", "--system"]);
    assert!(!out.status.success());
}

#[test]
fn test_dry_run_writes_nothing() {
    let sandbox = Sandbox::new();
    let out = sandbox.run(&["--add", "microsoft", "--dry-run"]);
    let report = report(&out);
    assert_eq!(report["persisted"], false);

    // Loading creates the settings file, but nothing is written into it.
    let text = std::fs::read_to_string(sandbox.settings()).unwrap();
    assert!(text.is_empty());
}

#[cfg(unix)]
#[test]
fn test_remove_unapproved_with_tool() {
    use std::os::unix::fs::PermissionsExt;

    let sandbox = Sandbox::new();
    let log = sandbox.dir.path().join("uninstalled.log");
    let tool = sandbox.dir.path().join("code");
    std::fs::write(
        &tool,
        format!(
            "#!/bin/sh\nif [ \"$1\" = \"--list-extensions\" ]; then\n  printf 'microsoft.foo\\nevil.bar\\nevil.stuck\\n'\n  exit 0\nfi\nif [ \"$2\" = \"evil.stuck\" ]; then\n  exit 1\nfi\necho \"$2\" >> '{}'\n",
            log.display()
        ),
    )
    .unwrap();
    std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

    let out = sandbox.run_with_manager(&tool, &["--add", "microsoft", "--remove-unapproved"]);
    assert_eq!(out.status.code(), Some(2));

    let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    let items = report["enforcement"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[0]["action"], "kept");
    assert_eq!(items[1]["action"], "uninstalled");
    assert_eq!(items[2]["action"], "failed");

    let removed = std::fs::read_to_string(&log).unwrap();
    assert_eq!(removed.trim(), "evil.bar");
}
