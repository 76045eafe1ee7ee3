//! Where the application keeps its settings, policy and command-line tool.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Operating system family, used to pick default locations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Windows
    Windows,
    /// macOS
    MacOs,
    /// Linux and other Unix-likes
    Linux,
}

impl Platform {
    /// The platform this binary was built for.
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }
}

/// Paths to the backing stores and the extension manager.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallLocations {
    /// The per-user settings document
    pub user_settings: PathBuf,
    /// The machine-wide installation directory; its absence disables the
    /// system context
    pub system_install_dir: PathBuf,
    /// The file backing the machine-wide policy key
    pub system_policy: PathBuf,
    /// Candidate paths of the extension manager tool, in probe order. Entries
    /// may be glob patterns.
    pub extension_manager_candidates: Vec<String>,
}

impl InstallLocations {
    /// Default locations for the current platform and environment.
    pub fn detect() -> Self {
        Self::for_platform(Platform::current(), |name| std::env::var_os(name))
    }

    /// Default locations for `platform`, reading environment variables
    /// through `var`.
    pub fn for_platform(platform: Platform, var: impl Fn(&str) -> Option<OsString>) -> Self {
        let env = |name: &str| var(name).map(PathBuf::from).unwrap_or_default();

        match platform {
            Platform::Windows => {
                let install = env("ProgramFiles").join("Microsoft VS Code");
                let local = env("LOCALAPPDATA").join("Programs");
                Self {
                    user_settings: env("APPDATA").join("Code").join("User").join("settings.json"),
                    system_policy: env("ProgramData")
                        .join("Policies")
                        .join("Microsoft")
                        .join("VSCode")
                        .join("policy.json"),
                    extension_manager_candidates: vec![
                        pattern(&install, "bin/code.cmd"),
                        pattern(&local, "Microsoft VS Code/bin/code.cmd"),
                        pattern(&local, "Microsoft VS Code*/bin/code*.cmd"),
                    ],
                    system_install_dir: install,
                }
            }
            Platform::MacOs => {
                let install = PathBuf::from("/Applications/Visual Studio Code.app");
                let home = env("HOME");
                Self {
                    user_settings: home
                        .join("Library/Application Support/Code/User/settings.json"),
                    system_policy: PathBuf::from("/Library/Application Support/Code/policy.json"),
                    extension_manager_candidates: vec![
                        pattern(&install, "Contents/Resources/app/bin/code"),
                        "/usr/local/bin/code".to_string(),
                        pattern(&home, "Applications/Visual Studio Code*.app/Contents/Resources/app/bin/code"),
                    ],
                    system_install_dir: install,
                }
            }
            Platform::Linux => {
                let install = PathBuf::from("/usr/share/code");
                let config = var("XDG_CONFIG_HOME")
                    .filter(|v| !v.is_empty())
                    .map(PathBuf::from)
                    .unwrap_or_else(|| env("HOME").join(".config"));
                Self {
                    user_settings: config.join("Code/User/settings.json"),
                    system_policy: PathBuf::from("/etc/vscode/policy.json"),
                    extension_manager_candidates: vec![
                        pattern(&install, "bin/code"),
                        "/usr/bin/code".to_string(),
                        "/snap/bin/code".to_string(),
                        "/opt/visual-studio-code*/bin/code".to_string(),
                    ],
                    system_install_dir: install,
                }
            }
        }
    }

    /// Returns true if the machine-wide installation exists.
    pub fn system_install_present(&self) -> bool {
        self.system_install_dir.is_dir()
    }
}

/// Build a glob pattern from a literal base path and a pattern suffix.
fn pattern(base: &Path, suffix: &str) -> String {
    let base = glob::Pattern::escape(&base.to_string_lossy());
    if base.is_empty() {
        suffix.to_string()
    } else {
        format!("{}/{}", base.trim_end_matches(['/', '\\']), suffix)
    }
}
