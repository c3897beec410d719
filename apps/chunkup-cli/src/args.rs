//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(version)]
#[command(about = "Upload files in chunks to an HTTP endpoint")]
pub struct Args {
    /// Settings file (default: ~/.config/chunkup/uploader.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Upload endpoint, overriding the configured one
    #[arg(short, long)]
    pub url: Option<String>,

    /// Files to upload
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}
