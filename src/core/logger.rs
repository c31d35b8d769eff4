use flexi_logger::{
    filter::{self, LogLineFilter},
    FlexiLoggerError, Logger, LoggerHandle,
};

pub struct IgnoreReqwest;

impl LogLineFilter for IgnoreReqwest {
    fn write(
        &self,
        now: &mut flexi_logger::DeferredNow,
        record: &log::Record,
        log_line_writer: &dyn filter::LogLineWriter,
    ) -> std::io::Result<()> {
        let path = record.module_path().unwrap_or_default();

        if path.starts_with("reqwest") || path.starts_with("hyper") {
            return Ok(());
        }

        log_line_writer.write(now, record)
    }
}

/// Starts the logger, with the CLI verbosity taking precedence over
/// the configured level. The returned handle must stay alive for the
/// whole process.
pub fn init(
    configured_level: Option<&str>,
    verbosity: Option<log::LevelFilter>,
) -> Result<LoggerHandle, FlexiLoggerError> {
    let spec = match verbosity {
        Some(level) => level.to_string(),
        None => configured_level.unwrap_or("info").to_string(),
    };

    Logger::try_with_str(spec)?
        .filter(Box::new(IgnoreReqwest))
        .start()
}
