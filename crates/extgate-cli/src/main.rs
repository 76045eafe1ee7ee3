//! Extgate CLI - apply an extension allow-list
//!
//! Usage:
//!   extgate --add ms-python --add redhat.java          Allow in the user context
//!   extgate --system --deny evil.ext --remove-unapproved
//!   extgate --list                                       Show compliance, change nothing

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use extgate::{
    CodeCli, DenyPrecedence, ExtensionManager, InstallLocations, Outcome, PolicyChanges,
    PolicyContext, PolicyRunner, RunReport, RunRequest, SystemLayout, UpdateSettings,
};

/// Extgate - extension allow-list policy for the user or the whole machine
#[derive(Parser, Debug)]
#[command(name = "extgate")]
#[command(about = "Reconcile and enforce an extension allow-list")]
struct Args {
    /// Apply to the current user's settings (default)
    #[arg(long, conflicts_with = "system")]
    user: bool,

    /// Apply to the machine-wide policy (falls back to user if not installed machine-wide)
    #[arg(long)]
    system: bool,

    /// Apply to the machine-wide policy even if no machine-wide install is found
    #[arg(long)]
    force_system: bool,

    /// Extension or publisher identifiers to allow (repeatable, comma separated)
    #[arg(long, value_delimiter = ',')]
    add: Vec<String>,

    /// Extension or publisher identifiers to deny (repeatable, comma separated)
    #[arg(long, value_delimiter = ',')]
    deny: Vec<String>,

    /// Identifiers to drop from the allow-list (repeatable, comma separated)
    #[arg(long, value_delimiter = ',')]
    remove: Vec<String>,

    /// Uninstall installed extensions that the allow-list does not permit
    #[arg(long)]
    remove_unapproved: bool,

    /// Show what would happen without uninstalling or saving
    #[arg(long)]
    dry_run: bool,

    /// List installed extensions with their verdict; implies --dry-run
    #[arg(long)]
    list: bool,

    /// Turn off automatic extension updates
    #[arg(long)]
    disable_auto_update: bool,

    /// Turn off checking for extension updates
    #[arg(long)]
    disable_auto_check_updates: bool,

    /// Turn off the extension gallery (machine-wide legacy layout only)
    #[arg(long)]
    disable_gallery: bool,

    /// Let deny entries override matching allow entries when enforcing
    #[arg(long)]
    deny_wins: bool,

    /// Use the legacy machine-wide value layout
    #[arg(long)]
    legacy_layout: bool,

    /// Override the user settings file
    #[arg(long)]
    settings_path: Option<PathBuf>,

    /// Override the machine-wide installation directory
    #[arg(long)]
    system_install_dir: Option<PathBuf>,

    /// Override the machine-wide policy file
    #[arg(long)]
    policy_file: Option<PathBuf>,

    /// Use this extension manager instead of probing well-known locations
    #[arg(long)]
    extension_manager: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn locations(&self) -> InstallLocations {
        let mut locations = InstallLocations::detect();
        if let Some(path) = &self.settings_path {
            locations.user_settings = path.clone();
        }
        if let Some(path) = &self.system_install_dir {
            locations.system_install_dir = path.clone();
        }
        if let Some(path) = &self.policy_file {
            locations.system_policy = path.clone();
        }
        locations
    }

    fn request(&self) -> RunRequest {
        RunRequest {
            context: if self.system && !self.user {
                PolicyContext::System
            } else {
                PolicyContext::User
            },
            force_system: self.force_system,
            changes: PolicyChanges::new()
                .add(self.add.iter().cloned())
                .deny(self.deny.iter().cloned())
                .remove(self.remove.iter().cloned()),
            remove_unapproved: self.remove_unapproved || self.list,
            dry_run: self.dry_run || self.list,
            update: UpdateSettings {
                auto_update: !self.disable_auto_update,
                auto_check_updates: !self.disable_auto_check_updates,
                gallery_enabled: !self.disable_gallery,
            },
            deny_precedence: if self.deny_wins {
                DenyPrecedence::DenyWins
            } else {
                DenyPrecedence::AllowWins
            },
            system_layout: if self.legacy_layout {
                SystemLayout::Legacy
            } else {
                SystemLayout::Managed
            },
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout carries only the report
    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    let locations = args.locations();
    let runner = PolicyRunner::new(args.request());

    let report = match &args.extension_manager {
        Some(program) => {
            let cli = CodeCli::new(program);
            runner.run_with(&locations, Some(&cli as &dyn ExtensionManager))
        }
        None => runner.run(&locations),
    }
    .context("failed to apply extension policy")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.has_failures() {
        io::stdout().flush().ok();
        std::process::exit(2);
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    if report.fell_back {
        println!(
            "context: {} (requested {}, not installed machine-wide)",
            report.context, report.requested_context
        );
    } else {
        println!("context: {}", report.context);
    }

    println!("allow-list ({} entries):", report.allow_map.len());
    for (id, allowed) in report.allow_map.iter() {
        println!("  {id} = {}", if allowed { "allowed" } else { "denied" });
    }

    if !report.warnings.is_empty() {
        println!("warnings:");
        for warning in &report.warnings {
            println!("  - {warning}");
        }
    }

    match &report.enforcement {
        Some(enforcement) if enforcement.performed => {
            println!("installed extensions:");
            for item in &enforcement.items {
                match &item.outcome {
                    Outcome::Kept { rule } => println!("  kept          {} ({rule})", item.id),
                    Outcome::Uninstalled { reason } => {
                        println!("  uninstalled   {} ({reason})", item.id)
                    }
                    Outcome::WouldUninstall { reason } => {
                        println!("  would remove  {} ({reason})", item.id)
                    }
                    Outcome::Failed { reason, error } => {
                        println!("  FAILED        {} ({reason}): {error}", item.id)
                    }
                }
            }
        }
        Some(_) => println!("installed extensions: extension manager not available"),
        None => {}
    }

    match (&report.persist_error, report.persisted) {
        (Some(error), _) => println!("saved: FAILED ({error})"),
        (None, true) => println!("saved: yes"),
        (None, false) => println!("saved: no (dry run)"),
    }
}
