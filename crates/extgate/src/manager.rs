//! Extension manager backed by the application's command-line tool.
//!
//! The tool is run synchronously and its output read to completion. No
//! timeout is applied: if the tool hangs, the run hangs with it.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use crate::enforce::ExtensionManager;
use crate::error::ManagerError;

/// Runs the application's CLI to list and uninstall extensions.
#[derive(Clone, Debug)]
pub struct CodeCli {
    program: PathBuf,
}

impl CodeCli {
    /// Use the tool at `program`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Find the tool by probing `candidates` in order.
    ///
    /// Each candidate may be a glob pattern. The first existing file wins.
    /// Returns `None` if nothing matches.
    pub fn discover<S: AsRef<str>>(candidates: &[S]) -> Option<Self> {
        for candidate in candidates {
            let candidate = candidate.as_ref();
            let paths = match glob::glob(candidate) {
                Ok(paths) => paths,
                Err(e) => {
                    tracing::debug!(candidate = %candidate, error = %e, "invalid candidate pattern");
                    continue;
                }
            };
            if let Some(found) = paths.filter_map(Result::ok).find(|p| p.is_file()) {
                tracing::debug!(program = %found.display(), "found extension manager");
                return Some(Self::new(found));
            }
        }
        tracing::debug!(candidates = candidates.len(), "no extension manager found");
        None
    }

    /// Path of the tool.
    pub fn program(&self) -> &Path {
        &self.program
    }

    fn run(&self, args: &[&str]) -> Result<Output, ManagerError> {
        tracing::debug!(program = %self.program.display(), args = ?args, "running extension manager");
        let output = Command::new(&self.program).args(args).output()?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(ManagerError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

impl ExtensionManager for CodeCli {
    fn list_installed(&self) -> Result<Vec<String>, ManagerError> {
        let output = self.run(&["--list-extensions"])?;
        Ok(parse_listing(&String::from_utf8_lossy(&output.stdout)))
    }

    fn uninstall(&self, id: &str) -> Result<(), ManagerError> {
        self.run(&["--uninstall-extension", id, "--force"])?;
        Ok(())
    }
}

/// One identifier per non-blank line.
fn parse_listing(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
