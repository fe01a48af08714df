use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use riglauncher_core::{ReleaseTag, RepositorySlug};
use riglauncher_deploy::{fetch_release_feed, http_client, DEFAULT_RETRY_CEILING};

mod companion;
mod logging;
mod orchestrator;
mod render;

use logging::LogLevel;
use orchestrator::{LauncherContext, UpdateOrchestrator};
use render::{StdinDecisions, TerminalRenderer};

#[derive(Parser, Debug)]
#[command(name = "riglauncher")]
#[command(about = "Self-updating launcher for creative pipeline toolsets", long_about = None)]
struct Cli {
    /// Display name of the project whose toolset is managed.
    #[arg(long)]
    project_name: String,
    /// Deployment repository, as owner/name or a full URL.
    #[arg(long)]
    repository: String,
    #[arg(long)]
    install_path: Option<PathBuf>,
    /// Deploy a specific release label instead of the newest one.
    #[arg(long)]
    tag: Option<String>,
    #[arg(long)]
    manifest_name: Option<String>,
    /// Companion application executable to restart before launching.
    #[arg(long)]
    companion_app: Option<String>,
    #[arg(long)]
    config_path: Option<PathBuf>,
    /// Bootstrap script the environment's runtime executes on launch.
    #[arg(long)]
    script_path: Option<PathBuf>,
    #[arg(long)]
    include_prereleases: bool,
    /// Development mode: no version resolution, no download.
    #[arg(long)]
    dev: bool,
    /// Explicit dependency manifest to install; implies --dev.
    #[arg(long)]
    requirements_path: Option<PathBuf>,
    /// Answer yes to every prompt; for non-interactive use.
    #[arg(long)]
    assume_yes: bool,
    #[arg(long, value_enum)]
    log_level: Option<LogLevel>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Update (or install) the toolset, then start it.
    Run,
    /// List the published release labels, newest first.
    Releases,
    /// Print the newest deployable release label.
    Latest,
    /// Recreate the environment and deploy from scratch.
    Reinstall,
    /// Remove the managed installation.
    Uninstall {
        /// Skip the confirmation prompt.
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.log_level)?;

    let repository = RepositorySlug::parse(&cli.repository)?;
    let context = LauncherContext {
        project_name: cli.project_name,
        repository: repository.clone(),
        install_path: cli.install_path,
        requested_tag: cli.tag,
        manifest_name: cli.manifest_name,
        companion_app: cli.companion_app,
        config_path: cli.config_path,
        script_path: cli.script_path,
        include_prereleases: cli.include_prereleases,
        dev: cli.dev || cli.requirements_path.is_some(),
        requirements_path: cli.requirements_path,
        retry_ceiling: DEFAULT_RETRY_CEILING,
    };

    let mut progress = TerminalRenderer::new();
    let mut decisions = StdinDecisions::new(cli.assume_yes);

    match cli.command {
        Commands::Run => {
            let mut orchestrator = UpdateOrchestrator::new(context)?;
            let plan = orchestrator.run(&mut progress, &mut decisions)?;
            if plan.script_path.is_some() {
                orchestrator.launch(&plan)?;
            } else {
                println!("Toolset is up to date; no launch script configured.");
            }
        }
        Commands::Releases => {
            let client = http_client()?;
            let catalog = fetch_release_feed(&client, &repository)?;
            for entry in catalog.entries() {
                let marker = if entry.prerelease { " (prerelease)" } else { "" };
                println!("{}{marker}", entry.label);
            }
        }
        Commands::Latest => {
            let client = http_client()?;
            let catalog = fetch_release_feed(&client, &repository)?;
            let latest: ReleaseTag = catalog.latest(context.include_prereleases)?;
            println!("{latest}");
        }
        Commands::Reinstall => {
            let mut orchestrator = UpdateOrchestrator::new(context)?;
            orchestrator.reinstall(&mut progress, &mut decisions)?;
        }
        Commands::Uninstall { force } => {
            let mut orchestrator = UpdateOrchestrator::new(context)?;
            orchestrator.uninstall(&mut decisions, force)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests;
