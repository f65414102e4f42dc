// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "skiff")]
#[command(about = "Build and deploy applications to self-hosted container hosts")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new skiff.yml configuration file
    Init {
        /// Application name
        #[arg(long)]
        name: Option<String>,

        /// Git repository to build from
        #[arg(long)]
        repository: Option<String>,

        /// Destination server, e.g. deploy@10.0.0.5:22
        #[arg(long)]
        server: Option<String>,

        /// Overwrite an existing configuration file
        #[arg(short, long)]
        force: bool,
    },

    /// Build and deploy the application
    Deploy {
        /// Deploy this commit instead of the branch head
        #[arg(long)]
        commit: Option<String>,

        /// Build even when a matching image exists
        #[arg(long)]
        force_rebuild: bool,

        /// Restart from the existing image when there is one
        #[arg(long)]
        restart_only: bool,

        /// Deploy a pull-request preview
        #[arg(long)]
        pr: Option<u32>,

        /// Destination server (name or host); defaults to the primary server
        #[arg(long)]
        server: Option<String>,

        /// Only print warnings and the final result
        #[arg(short, long, conflicts_with = "json")]
        quiet: bool,

        /// Print JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Check the configuration and show what a deployment would run
    Validate,
}
