// ABOUTME: Entry point for the skiff CLI application.
// ABOUTME: Parses arguments and dispatches to appropriate command handlers.

mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use skiff::build::{Branch, BuildStrategy};
use skiff::config::{self, Manifest};
use skiff::deploy::{
    DeployError, DeploymentRequest, DeploymentStore, LogSink, MemoryStore, Orchestrator,
    TracingNotifier,
};
use skiff::error::{Error, Result};
use skiff::output::{Output, OutputMode};
use skiff::ssh::SshConnector;
use skiff::types::Commit;
use std::env;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init {
            name,
            repository,
            server,
            force,
        } => {
            let cwd = env::current_dir()?;
            config::init_config(
                &cwd,
                name.as_deref(),
                repository.as_deref(),
                server.as_deref(),
                force,
            )?;
            println!("Created {}", config::CONFIG_FILENAME);
            Ok(())
        }
        Commands::Deploy {
            commit,
            force_rebuild,
            restart_only,
            pr,
            server,
            quiet,
            json,
        } => {
            let mode = match (quiet, json) {
                (_, true) => OutputMode::Json,
                (true, _) => OutputMode::Quiet,
                _ => OutputMode::Normal,
            };
            let cwd = env::current_dir()?;
            let manifest = Manifest::discover(&cwd)?;
            let server = match server {
                Some(reference) => manifest.server(&reference)?.reference().to_string(),
                None => manifest.primary_server().reference().to_string(),
            };
            let commit = match commit {
                Some(sha) => Commit::sha(&sha).map_err(|e| Error::InvalidConfig(e.to_string()))?,
                None => Commit::Head,
            };
            let request = DeploymentRequest::new(manifest.application.uuid.clone(), server)
                .with_commit(commit)
                .with_pull_request(pr.unwrap_or(0))
                .force_rebuild(force_rebuild)
                .restart_only(restart_only);
            deploy(manifest, request, mode).await
        }
        Commands::Validate => {
            let cwd = env::current_dir()?;
            let manifest = Manifest::discover(&cwd)?;
            validate(&manifest);
            Ok(())
        }
    }
}

/// Run one request, then every deployment it queued for additional servers.
async fn deploy(manifest: Manifest, request: DeploymentRequest, mode: OutputMode) -> Result<()> {
    let mut output = Output::new(mode);
    output.start_timer();
    let output = Arc::new(output);

    output.progress(&format!(
        "Deploying {} to {}",
        manifest.application.name, request.server
    ));

    let store = Arc::new(MemoryStore::new());
    let first = request.uuid.clone();
    store.enqueue(request).await.map_err(DeployError::from)?;

    let connector = SshConnector::new(manifest.settings.run_timeout);
    let orchestrator = Orchestrator::new(
        manifest,
        store.clone(),
        Arc::new(TracingNotifier),
        Arc::new(connector),
    )
    .with_sink(output.clone() as Arc<dyn LogSink>);

    let mut next = Some(first);
    while let Some(uuid) = next {
        let report = orchestrator.run(&uuid).await?;
        for warning in report.diagnostics.warnings() {
            output.warning(&warning.message);
        }
        if !report.is_success() {
            return Err(match report.error {
                Some(err) => err.into(),
                None => Error::Unfinished {
                    deployment: uuid.to_string(),
                    status: report.status.to_string(),
                },
            });
        }
        next = report.next;
    }

    output.success("Deployment complete!");
    Ok(())
}

fn validate(manifest: &Manifest) {
    let app = &manifest.application;
    let strategy = BuildStrategy::for_application(app);
    println!("Application: {} ({})", app.name, app.uuid);
    println!("Build pack: {}", app.build_pack);
    println!("Branch: {}", Branch::select(false, 0, strategy));
    let servers: Vec<&str> = manifest.servers.iter().map(|s| s.reference()).collect();
    println!("Servers: {}", servers.join(", "));
    if let Some(build) = &manifest.build_server {
        println!("Build server: {}", build.reference());
    }
    println!("Configuration is valid.");
}
