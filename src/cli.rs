use clap::{Parser, Subcommand};

/// VidCrush video compression service
#[derive(Debug, Parser)]
#[command(name = "vidcrush", version, about)]
pub struct Cli {
    /// Listen host (overrides HOST)
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Listen port (overrides PORT)
    #[arg(long, global = true)]
    pub port: Option<u16>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
pub enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Delete every staged upload and produced artifact, then exit
    Cleanup,
}
