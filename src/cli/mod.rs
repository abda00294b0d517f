mod pipeline;

pub use pipeline::PipelineArgs;

use clap::{Parser, Subcommand};

/// Relay Server - browser-controlled launcher for a live-stream relay pipeline
#[derive(Parser)]
#[command(name = "relay-server")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Port to listen on (overrides RELAY_PORT)
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Address to bind (overrides RELAY_BIND_ADDR)
    #[arg(long, global = true)]
    pub bind: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the server (default)
    Serve,

    /// Print the pipeline a start request would launch, without launching it
    Pipeline(PipelineArgs),
}
