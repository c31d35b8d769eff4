use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
    #[arg(short, long)]
    pub configuration_file: Option<String>,
    #[arg(short, long)]
    pub verbosity: Option<log::LevelFilter>,
}

#[derive(Subcommand)]
pub enum Command {
    /// registers the application and waits for user approval
    Register {
        /// the interval in seconds between authorization status checks
        pooling_interval: Option<u64>,
        /// the maximum time in seconds to wait for user approval
        budget: Option<u64>,
    },
    /// opens a session and reports its outcome
    SessionDiagnostic {
        /// show the session token
        show_token: Option<bool>,
    },
    /// fetches the call log through the generic call endpoint
    CallLog,
}
