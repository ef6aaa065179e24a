/*
Logger setup for the ground station binaries.

Each binary calls init_logger once with a directory to write its log files
to. Library crates only log through the `log` facade and never initialize
anything themselves.
*/

use log::LevelFilter;
use log4rs::filter::threshold::ThresholdFilter;
use log4rs::{
    append::console::ConsoleAppender,
    append::file::FileAppender,
    config::{Appender, Config, Logger, Root},
    encode::pattern::PatternEncoder,
};

fn configure_logger(
    all_log_level: LevelFilter,
    filtered_log_level: LevelFilter,
    log_path: &str,
) -> Result<Config, Box<dyn std::error::Error>> {
    // Console appender
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{h({l})} {m}{n}")))
        .build();

    // File appender for all logs
    let all_log_file = format!("{}/all_logs.log", log_path);
    let all_file = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{d} - {l} - {m}{n}")))
        .build(all_log_file)?;

    // File appender for warning and error logs only
    let filtered_log_file = format!("{}/error_and_warning_logs.log", log_path);
    let filtered_file = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{d} - {l} - {m}{n}")))
        .build(filtered_log_file)?;

    let filtered_file = Appender::builder()
        .filter(Box::new(ThresholdFilter::new(filtered_log_level)))
        .build("filtered_file", Box::new(filtered_file));

    let config = Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .appender(Appender::builder().build("all_file", Box::new(all_file)))
        .appender(filtered_file)
        .logger(
            Logger::builder()
                .appender("all_file")
                .additive(false)
                .build("all_logs", all_log_level),
        )
        .logger(
            Logger::builder()
                .appender("filtered_file")
                .additive(false)
                .build("filtered_logs", filtered_log_level),
        )
        .build(
            Root::builder()
                .appender("stdout")
                .appender("all_file")
                .appender("filtered_file")
                .build(all_log_level),
        )?;
    Ok(config)
}

pub fn init_logger(log_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(log_path)?;

    let all_log_levels = LevelFilter::Trace;
    let warnings_and_error_log_levels = LevelFilter::Warn;

    let config = configure_logger(all_log_levels, warnings_and_error_log_levels, log_path)?;
    log4rs::init_config(config)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::{debug, error, info, trace, warn};
    use tempdir::TempDir;

    #[test]
    fn test_log_severities() {
        let tmp_dir = TempDir::new("gs_logs").unwrap();
        init_logger(tmp_dir.path().to_str().unwrap()).unwrap();
        error!("This is an error message");
        info!("This is an info message");
        debug!("This is a debug message");
        warn!("This is a warning message");
        trace!("This is a trace message");
        assert!(tmp_dir.path().join("all_logs.log").exists());
    }
}
