//! Session logging for the arm executables

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use colored::{ColoredString, Colorize};
use log::{self, info};
use std::thread;
use thiserror::Error;

// Internal imports
use crate::session;

// Re-exports
pub use log::LevelFilter;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors associated with initialising the logger.
#[derive(Debug, Error)]
pub enum LoggerInitError {
    #[error("Expected a log level of at least `INFO`, found `{0}`")]
    InvalidMinLogLevel(log::LevelFilter),

    #[error("Error initialising the log file: {0}")]
    LogFileInitError(std::io::Error),

    #[error("An error occured while setting up the logger: {0}")]
    FernInitError(log::SetLoggerError),
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Initialise the logger for this execution.
///
/// Records go to stdout and to the session's log file, stamped with the seconds elapsed since the
/// session epoch. Debug and trace records also name the thread that emitted them, so each joint's
/// worker (`joint_ctrl::Base`, ...) can be followed through an interleaved log. Only the console
/// copy is coloured.
///
/// # Notes
///
/// - `min_level` must be at least `log::Level::Info`, so that rotation reports are never hidden.
/// - Only the first call in a process succeeds.
pub fn logger_init(
    min_level: LevelFilter,
    session: &session::Session,
) -> Result<(), LoggerInitError> {
    if min_level < log::Level::Info {
        return Err(LoggerInitError::InvalidMinLogLevel(min_level));
    }

    let log_file =
        fern::log_file(session.log_file_path.clone()).map_err(LoggerInitError::LogFileInitError)?;

    let console = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!("{} {}", prefix_for(record, true), message))
        })
        .chain(std::io::stdout());

    let file = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!("{} {}", prefix_for(record, false), message))
        })
        .chain(log_file);

    fern::Dispatch::new()
        .level(min_level)
        // The line editor is chatty at debug
        .level_for("rustyline", LevelFilter::Info)
        .chain(console)
        .chain(file)
        .apply()
        .map_err(LoggerInitError::FernInitError)?;

    info!("Logging initialised");
    if let Some(epoch) = session::get_epoch() {
        info!("    Session epoch: {}", epoch);
    }
    info!("    Log level: {:?}", min_level);
    info!("    Log file path: {:?}", session.log_file_path);

    Ok(())
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn prefix_for(record: &log::Record, coloured: bool) -> String {
    record_prefix(
        session::get_elapsed_seconds(),
        record.level(),
        record.target(),
        thread::current().name(),
        coloured,
    )
}

/// Build the bracketed prefix of a record.
///
/// Info and above only carry the time and level, lower levels add the emitting thread and the
/// record's target.
fn record_prefix(
    elapsed_s: f64,
    level: log::Level,
    target: &str,
    thread_name: Option<&str>,
    coloured: bool,
) -> String {
    let tag = level_tag(level, coloured);

    if level > log::Level::Info {
        format!(
            "[{:10.6} {} {}] {}:",
            elapsed_s,
            tag,
            thread_name.unwrap_or("<unnamed>"),
            target
        )
    } else {
        format!("[{:10.6} {}]", elapsed_s, tag)
    }
}

/// Three letter tag for a log level.
fn level_tag(level: log::Level, coloured: bool) -> String {
    let tag = match level {
        log::Level::Trace => "TRC",
        log::Level::Debug => "DBG",
        log::Level::Info => "INF",
        log::Level::Warn => "WRN",
        log::Level::Error => "ERR",
    };

    if !coloured {
        return tag.to_string();
    }

    let tag: ColoredString = match level {
        log::Level::Trace => tag.dimmed().italic(),
        log::Level::Debug => tag.dimmed(),
        log::Level::Info => tag.normal(),
        log::Level::Warn => tag.yellow(),
        log::Level::Error => tag.red().bold(),
    };
    tag.to_string()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_info_prefix_is_short() {
        let prefix = record_prefix(1.5, log::Level::Info, "arm_lib::arm_ctrl", Some("main"), false);
        assert_eq!(prefix, "[  1.500000 INF]");

        let prefix = record_prefix(0.25, log::Level::Error, "arm_lib::arm_ctrl", None, false);
        assert_eq!(prefix, "[  0.250000 ERR]");
    }

    #[test]
    fn test_debug_prefix_names_thread() {
        let prefix = record_prefix(
            2.0,
            log::Level::Debug,
            "arm_lib::joint_ctrl::worker",
            Some("joint_ctrl::Base"),
            false,
        );
        assert_eq!(prefix, "[  2.000000 DBG joint_ctrl::Base] arm_lib::joint_ctrl::worker:");

        let prefix = record_prefix(2.0, log::Level::Trace, "arm_lib", None, false);
        assert_eq!(prefix, "[  2.000000 TRC <unnamed>] arm_lib:");
    }

    #[test]
    fn test_coloured_tag_keeps_text() {
        for level in [log::Level::Trace, log::Level::Warn, log::Level::Error].iter() {
            let plain = level_tag(*level, false);
            assert!(level_tag(*level, true).contains(&plain));
        }
    }
}
