use std::time::Duration;

use clap::Parser;
use freebox_client::core::{
    cli::{Cli, Command},
    configuration, core, logger,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    let configuration_file = cli
        .configuration_file
        .clone()
        .unwrap_or_else(|| "config.toml".to_string());

    let conf = configuration::get_configuration(configuration_file).await?;

    let _logger = logger::init(conf.log.level.as_deref(), cli.verbosity)?;

    match cli.command {
        Command::Register {
            pooling_interval,
            budget,
        } => {
            let policy = core::BackoffPolicy::new(
                Duration::from_secs(pooling_interval.unwrap_or(6)),
                Duration::from_secs(60),
                Duration::from_secs(budget.unwrap_or(600)),
            );

            core::register(&conf, &policy).await?;
        }
        Command::SessionDiagnostic { show_token } => {
            core::session_diagnostic(&conf, show_token.unwrap_or(false)).await?;
        }
        Command::CallLog => {
            core::call_log(&conf).await?;
        }
    }

    Ok(())
}
