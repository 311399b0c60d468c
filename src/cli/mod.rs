use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "deepfocus",
    about = "Personal productivity & focus tracker API"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the HTTP API together with the weekly report scheduler.
    Service,
    /// Send the weekly digest to every user once and exit.
    Report {
        /// Treat this day (YYYY-MM-DD) as the end of the reporting week.
        #[arg(long)]
        date: Option<String>,
    },
    Status,
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    Set { key: String, value: String },
    Get { key: String },
}
