//! Driveline CLI
//!
//! Signs in to a Microsoft account and reads the user's OneDrive.
//!
//! # Usage
//!
//! ```bash
//! # Sign in (opens the browser flow when no cached sign-in works)
//! driveline sign-in
//!
//! # Show who is signed in
//! driveline user-info
//!
//! # List the drive root and print readme.txt
//! driveline tree
//!
//! # Forget every cached account
//! driveline sign-out
//! ```

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt};

mod app;

use app::Provider;
use driveline_core::DriveSession;

#[derive(Parser, Debug)]
#[command(name = "driveline")]
#[command(about = "Sign in to a Microsoft account and browse its OneDrive")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sign in, silently when a cached account allows it
    SignIn {
        /// Never open the interactive flow
        #[arg(short, long)]
        silent: bool,
    },

    /// Remove every cached account
    SignOut,

    /// Show the signed-in user's name and email
    UserInfo,

    /// List the drive root and print readme.txt if present
    Tree,

    /// List the children of a folder
    List {
        /// Drive item id of the folder
        folder_id: String,

        /// List subfolders instead of files
        #[arg(short, long)]
        folders: bool,
    },

    /// Print a file's content
    Cat {
        /// Drive item id of the folder holding the file
        folder_id: String,

        /// Path of the file relative to the folder
        path: String,
    },

    /// Show configuration and cached accounts
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = app::load_config(cli.config.as_deref())?;

    init_logging(&config.log_level, cli.verbose);

    let session = app::build_session(config)?;
    match cli.command {
        Commands::SignIn { silent } => sign_in(&session, silent).await,
        Commands::SignOut => {
            session.sign_out().await;
            println!("Signed out");
            Ok(())
        }
        Commands::UserInfo => user_info(&session).await,
        Commands::Tree => tree(&session).await,
        Commands::List { folder_id, folders } => list(&session, &folder_id, folders).await,
        Commands::Cat { folder_id, path } => cat(&session, &folder_id, &path).await,
        Commands::Status => status(&session),
    }
}

/// Logs go to stderr; event messages are printed to stdout by the
/// session callback, so their tracing mirror is muted unless verbose.
fn init_logging(level: &str, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("{},driveline::events=off", level)))
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn sign_in(session: &DriveSession<Provider>, silent: bool) -> Result<()> {
    if session.sign_in(silent).await {
        println!("Logged on to Azure");
        Ok(())
    } else {
        bail!("Logon failed")
    }
}

/// Commands that read the drive reuse a cached sign-in and never prompt.
async fn require_sign_in(session: &DriveSession<Provider>) -> Result<()> {
    if !session.sign_in(true).await {
        bail!("Not signed in, run `driveline sign-in` first");
    }
    Ok(())
}

async fn user_info(session: &DriveSession<Provider>) -> Result<()> {
    require_sign_in(session).await?;
    println!("Requesting user info");
    if !session.get_user_info().await {
        bail!("Request failed");
    }

    let state = session.session();
    println!(
        "Logged on as {} ({})",
        state.user_name().unwrap_or("unknown"),
        state.user_email().unwrap_or("no email")
    );
    Ok(())
}

async fn tree(session: &DriveSession<Provider>) -> Result<()> {
    require_sign_in(session).await?;
    println!("Requesting folder info");
    if !session.describe_tree().await {
        bail!("Request failed");
    }
    println!("Request succeeded");
    Ok(())
}

async fn list(session: &DriveSession<Provider>, folder_id: &str, folders: bool) -> Result<()> {
    require_sign_in(session).await?;
    let Some(items) = session.list_children(folder_id, folders).await else {
        bail!("Request failed");
    };

    for item in &items {
        let suffix = if item.is_folder { "/" } else { "" };
        println!("{}\t{}{}", item.id, item.name, suffix);
    }
    println!("{} item(s)", items.len());
    Ok(())
}

async fn cat(session: &DriveSession<Provider>, folder_id: &str, path: &str) -> Result<()> {
    require_sign_in(session).await?;
    let Some(content) = session.get_file_content(folder_id, path).await else {
        bail!("{} was not found", path);
    };

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&content)?;
    stdout.flush()?;
    Ok(())
}

fn status(session: &DriveSession<Provider>) -> Result<()> {
    let config = session.identity().config();
    let application_id = if config.validate_application_id().is_ok() {
        config.application_id.as_str()
    } else {
        "not set"
    };
    println!("Application id: {}", application_id);
    println!("Authority:      {}", config.authority);
    println!("Scopes:         {}", config.requested_scopes().join(" "));
    println!("Graph endpoint: {}", config.graph_base_url);

    let cached = session.identity().provider().account_store().list_accounts();
    println!("Accounts in the cache: {}", cached.len());
    for account in &cached {
        match account.last_used {
            Some(last_used) => println!("  {} (last used {})", account.display_name(), last_used),
            None => println!("  {}", account.display_name()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sign_in_silent() {
        let cli = Cli::try_parse_from(["driveline", "sign-in", "--silent"]).unwrap();
        assert!(matches!(cli.command, Commands::SignIn { silent: true }));
    }

    #[test]
    fn test_parse_global_options_after_command() {
        let cli =
            Cli::try_parse_from(["driveline", "tree", "--config", "/tmp/d.toml", "-v"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/d.toml")));
        assert!(matches!(cli.command, Commands::Tree));
    }

    #[test]
    fn test_parse_list_and_cat() {
        let cli = Cli::try_parse_from(["driveline", "list", "ROOT!1", "--folders"]).unwrap();
        match cli.command {
            Commands::List { folder_id, folders } => {
                assert_eq!(folder_id, "ROOT!1");
                assert!(folders);
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let cli = Cli::try_parse_from(["driveline", "cat", "ROOT!1", "docs/readme.txt"]).unwrap();
        assert!(matches!(cli.command, Commands::Cat { .. }));
    }

    #[test]
    fn test_cat_requires_a_path() {
        assert!(Cli::try_parse_from(["driveline", "cat", "ROOT!1"]).is_err());
    }
}
