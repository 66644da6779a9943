use std::path::PathBuf;

use clap::{Parser, Subcommand};
use release_matrix::Platform;

#[derive(Parser, Debug)]
#[command(version, about = "Build and publish release binaries for every platform")]
pub struct Args {
    #[command(subcommand)]
    pub sub: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Run the matrix for a release-created event
    Run {
        /// Event payload (defaults to $GITHUB_EVENT_PATH)
        #[arg(long)]
        event: Option<PathBuf>,

        /// Only run these platforms (mac, linux, windows)
        #[arg(
            long = "platform",
            short = 'p',
            env = "RELEASE_MATRIX_PLATFORM",
            value_delimiter = ','
        )]
        platforms: Vec<Platform>,

        /// Bootstrap and build, but do not upload
        #[arg(long)]
        dry_run: bool,

        /// Path to configuration file
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Binary name (overrides the config file)
        #[arg(long)]
        binary: Option<String>,
    },
    /// Print the platform table without running anything
    Plan {
        /// Path to configuration file
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Binary name (overrides the config file)
        #[arg(long)]
        binary: Option<String>,
    },
}
