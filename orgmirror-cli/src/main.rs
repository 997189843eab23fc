//! orgmirror CLI - Command line interface for orgmirror
//!
//! Mirrors every branch of every repository in the configured GitHub
//! organizations and prunes what disappeared upstream.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use orgmirror_core::Config;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{BackupArgs, CleanupArgs, ListArgs, StatusArgs};

/// orgmirror: Keep local mirrors of every branch in your GitHub organizations
#[derive(Parser, Debug)]
#[command(name = "orgmirror")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.config/orgmirror/config.toml)
    #[arg(short, long, global = true, env = "ORGMIRROR_CONFIG")]
    config: Option<PathBuf>,

    /// Backup root (overrides config and env)
    #[arg(long, global = true)]
    backup_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show version information
    Version,

    /// Mirror all configured organizations, then run cleanup
    #[command(visible_alias = "b")]
    Backup(BackupArgs),

    /// Delete expired abandoned branches, stale branches and repositories
    Cleanup(CleanupArgs),

    /// List repositories of the configured organizations
    #[command(visible_alias = "ls")]
    List(ListArgs),

    /// Show the authenticated user and organization selection
    Info,

    /// Show tracked repositories and branches
    Status(StatusArgs),

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = Config::load_with_overrides(cli.config.as_deref(), cli.backup_path.clone())?;

    tracing::debug!(
        backup_path = %config.backup.path.display(),
        organizations = config.organizations.len(),
        tracker = config.tracker.enabled,
        "Configuration loaded"
    );

    match cli.command {
        Some(Commands::Version) => {
            println!("orgmirror {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Backup(args)) => {
            args.execute(&config).await?;
        }
        Some(Commands::Cleanup(args)) => {
            args.execute(&config).await?;
        }
        Some(Commands::List(args)) => {
            args.execute(&config).await?;
        }
        Some(Commands::Info) => {
            commands::info::execute(&config).await?;
        }
        Some(Commands::Status(args)) => {
            args.execute(&config).await?;
        }
        Some(Commands::Config) => {
            print_config(&config, cli.config.as_deref());
        }
        None => {
            println!("orgmirror - mirror every branch of your GitHub organizations");
            println!();
            println!("Use --help for usage information");
        }
    }

    Ok(())
}

fn print_config(config: &Config, explicit: Option<&std::path::Path>) {
    let tracker = &config.tracker;

    println!("orgmirror Configuration");
    println!("=======================");
    println!();
    println!("Backup:");
    println!("  path: {}", config.backup.path.display());
    println!("  clone_via_ssh: {}", config.backup.clone_via_ssh);
    match (&config.backup.ssh_key, config.backup.ssh_key()) {
        (Some(path), Some(_)) => println!("  ssh_key: {}", path.display()),
        (Some(path), None) => println!("  ssh_key: {} (not found - using agent)", path.display()),
        (None, _) => println!("  ssh_key: (agent)"),
    }
    println!();
    println!("Organizations:");
    if config.organizations.is_empty() {
        println!("  (none)");
    }
    for (name, org) in &config.organizations {
        println!("  {}: {}", name, if org.enabled { "enabled" } else { "disabled" });
    }
    println!();
    println!("Tracker:");
    println!("  enabled: {}", tracker.enabled);
    match &tracker.database {
        Some(path) => println!("  database: {}", path.display()),
        None => println!("  database: (default)"),
    }
    println!("  delete_abandoned_branches_after: {}", tracker.delete_abandoned_branches_after);
    println!("  delete_removed_branches_after: {}", tracker.delete_removed_branches_after);
    println!("  delete_removed_repositories_after: {}", tracker.delete_removed_repositories_after);
    println!("  deletion_warning: {}", tracker.deletion_warning);
    println!();
    println!("GitHub:");
    println!("  rate_limit_max_wait: {:?}", config.github.rate_limit_max_wait);
    println!();

    let path = explicit
        .map(|p| p.to_path_buf())
        .or_else(Config::default_config_path);
    if let Some(path) = path {
        println!("Config file: {}", path.display());
        if path.exists() {
            println!("  (exists)");
        } else {
            println!("  (not found - using defaults)");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_backup_flags() {
        let cli = Cli::try_parse_from([
            "orgmirror",
            "--backup-path",
            "/srv/mirror",
            "backup",
            "--no-cleanup",
            "--json",
        ])
        .unwrap();

        assert_eq!(cli.backup_path, Some(PathBuf::from("/srv/mirror")));
        match cli.command {
            Some(Commands::Backup(args)) => {
                assert!(args.no_cleanup);
                assert!(args.json);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["orgmirror", "status", "--verbose"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Some(Commands::Status(_))));
    }
}
