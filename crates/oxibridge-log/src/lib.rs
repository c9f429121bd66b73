//! A small, zero-dependency logging crate for the `oxibridge` workspace.
//!
//! Messages carry the module path of the call site and are written to
//! standard error with a colored level tag. The minimum level is global and
//! atomic; records can additionally be captured per thread, which is how the
//! bridge's tests observe failures that are logged instead of returned.
//!
//! # Example
//!
//! ```
//! use oxibridge_log::{debug, error, info, warn, Level};
//!
//! oxibridge_log::set_level(Level::Debug);
//!
//! let selector = "initWithName:";
//! info!("dispatching {}", selector);
//! debug!("arguments: {:?}", vec![1, 2, 3]);
//! warn!("class list is empty");
//! error!("callback failed");
//! ```

use std::cell::RefCell;
use std::fmt::{self, Arguments};
use std::str::FromStr;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU8, Ordering};

/// Severity of a log record.
///
/// Lower numeric values are more severe; a record is emitted when its level
/// is less than or equal to the logger's current level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// Failures, including isolated callback failures.
    Error = 0,
    /// Recoverable oddities (skipped classes, dropped bridges).
    Warn = 1,
    /// Lifecycle events such as framework imports.
    Info = 2,
    /// Diagnostic detail.
    Debug = 3,
    /// Per-dispatch tracing.
    Trace = 4,
}

impl Level {
    const fn color_code(self) -> &'static str {
        match self {
            Level::Error => "\x1b[31m",
            Level::Warn => "\x1b[33m",
            Level::Info => "\x1b[32m",
            Level::Debug => "\x1b[36m",
            Level::Trace => "\x1b[35m",
        }
    }

    /// Returns the upper-case name of this level.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        }
    }

    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Level::Error,
            1 => Level::Warn,
            3 => Level::Debug,
            4 => Level::Trace,
            _ => Level::Info,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a [`Level`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseLevelError {
    input: String,
}

impl fmt::Display for ParseLevelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid log level: {}", self.input)
    }
}

impl std::error::Error for ParseLevelError {}

impl FromStr for Level {
    type Err = ParseLevelError;

    /// Parses a level name, ignoring case.
    ///
    /// ```
    /// use oxibridge_log::Level;
    ///
    /// assert_eq!("warn".parse::<Level>(), Ok(Level::Warn));
    /// assert!("loud".parse::<Level>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ERROR" => Ok(Level::Error),
            "WARN" | "WARNING" => Ok(Level::Warn),
            "INFO" => Ok(Level::Info),
            "DEBUG" => Ok(Level::Debug),
            "TRACE" => Ok(Level::Trace),
            _ => Err(ParseLevelError {
                input: s.to_string(),
            }),
        }
    }
}

/// A single emitted log message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Severity of the message.
    pub level: Level,
    /// Module path of the call site.
    pub target: String,
    /// Rendered message text.
    pub message: String,
}

/// Global level filter.
pub struct Logger {
    level: AtomicU8,
}

impl Logger {
    const fn new(level: Level) -> Self {
        Logger {
            level: AtomicU8::new(level as u8),
        }
    }

    /// Sets the minimum level that is emitted.
    pub fn set_level(&self, level: Level) {
        self.level.store(level as u8, Ordering::SeqCst);
    }

    /// Returns the current minimum level.
    pub fn level(&self) -> Level {
        Level::from_u8(self.level.load(Ordering::Relaxed))
    }

    /// Returns `true` if a record at `level` would be emitted.
    pub fn enabled(&self, level: Level) -> bool {
        level as u8 <= self.level.load(Ordering::Relaxed)
    }
}

static LOGGER: OnceLock<Logger> = OnceLock::new();

thread_local! {
    static CAPTURED: RefCell<Option<Vec<Record>>> = const { RefCell::new(None) };
}

/// Returns the global logger, initialised at `Level::Info`.
pub fn get_logger() -> &'static Logger {
    LOGGER.get_or_init(|| Logger::new(Level::Info))
}

/// Sets the minimum level of the global logger.
pub fn set_level(level: Level) {
    get_logger().set_level(level);
}

/// Sets the minimum level from its name.
///
/// # Errors
///
/// Returns [`ParseLevelError`] if `s` does not name a level; the current
/// level is left unchanged.
pub fn set_level_from_str(s: &str) -> Result<(), ParseLevelError> {
    set_level(s.parse()?);
    Ok(())
}

/// Reads the level from the environment variable `var`, if it is set.
///
/// An unset variable leaves the level unchanged.
///
/// # Errors
///
/// Returns [`ParseLevelError`] if the variable holds an unknown level name.
pub fn init_from_env(var: &str) -> Result<(), ParseLevelError> {
    match std::env::var(var) {
        Ok(value) => set_level_from_str(&value),
        Err(_) => Ok(()),
    }
}

/// Guard returned by [`capture`].
///
/// While alive, records emitted on the current thread are kept in addition
/// to being printed. Dropping the guard stops capturing.
#[must_use = "capturing stops when the guard is dropped"]
pub struct Capture {
    _private: (),
}

impl Capture {
    /// Returns the records captured so far on this thread.
    pub fn records(&self) -> Vec<Record> {
        CAPTURED.with(|slot| slot.borrow().clone().unwrap_or_default())
    }

    /// Returns `true` if any captured record at `level` contains `needle`.
    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.records()
            .iter()
            .any(|r| r.level == level && r.message.contains(needle))
    }
}

impl Drop for Capture {
    fn drop(&mut self) {
        CAPTURED.with(|slot| *slot.borrow_mut() = None);
    }
}

/// Starts capturing records emitted on the current thread.
///
/// ```
/// use oxibridge_log::{capture, error, Level};
///
/// let cap = capture();
/// error!("callback for {} failed", "greet:");
/// assert!(cap.contains(Level::Error, "greet:"));
/// ```
pub fn capture() -> Capture {
    CAPTURED.with(|slot| *slot.borrow_mut() = Some(Vec::new()));
    Capture { _private: () }
}

#[doc(hidden)]
pub fn __log_with_target(level: Level, target: &str, args: Arguments) {
    static RESET: &str = "\x1b[0m";

    if !get_logger().enabled(level) {
        return;
    }

    let message = args.to_string();
    let color = level.color_code();
    eprintln!("{color}[{level}]{RESET} {target}: {message}");

    CAPTURED.with(|slot| {
        if let Some(records) = slot.borrow_mut().as_mut() {
            records.push(Record {
                level,
                target: target.to_string(),
                message,
            });
        }
    });
}

/// Logs a message at an explicit level.
///
/// ```
/// use oxibridge_log::{log, Level};
///
/// log!(level: Level::Info, "loaded {} classes", 12);
/// ```
#[macro_export]
macro_rules! log {
    (level: $level:expr, $($arg:tt)*) => {
        {
            if $crate::get_logger().enabled($level) {
                $crate::__log_with_target(
                    $level,
                    module_path!(),
                    format_args!($($arg)*)
                );
            }
        }
    };
}

/// Logs a message at the Error level.
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Error, $($arg)*)
    };
}

/// Logs a message at the Warn level.
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Warn, $($arg)*)
    };
}

/// Logs a message at the Info level.
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Info, $($arg)*)
    };
}

/// Logs a message at the Debug level.
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Debug, $($arg)*)
    };
}

/// Logs a message at the Trace level.
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Trace, $($arg)*)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_display_round_trips_through_parse() {
        for level in [Level::Error, Level::Warn, Level::Info, Level::Debug, Level::Trace] {
            assert_eq!(level.to_string().parse(), Ok(level));
        }
        assert!(Level::Warn < Level::Trace);
    }

    #[test]
    fn test_level_parse() {
        assert_eq!("error".parse(), Ok(Level::Error));
        assert_eq!("WARNING".parse(), Ok(Level::Warn));
        assert_eq!(" Info ".parse(), Ok(Level::Info));
        assert_eq!("DEBUG".parse(), Ok(Level::Debug));
        assert_eq!("trace".parse(), Ok(Level::Trace));

        let err = "verbose".parse::<Level>().unwrap_err();
        assert_eq!(err.to_string(), "invalid log level: verbose");
    }

    #[test]
    fn test_logger_level_filtering() {
        let logger = Logger::new(Level::Info);

        assert!(logger.enabled(Level::Error));
        assert!(logger.enabled(Level::Info));
        assert!(!logger.enabled(Level::Debug));

        logger.set_level(Level::Trace);
        assert!(logger.enabled(Level::Trace));
        assert_eq!(logger.level(), Level::Trace);
    }

    #[test]
    fn test_set_level_from_str_rejects_unknown() {
        assert!(set_level_from_str("nonsense").is_err());
    }

    #[test]
    fn test_capture_collects_this_thread_only() {
        let cap = capture();
        error!("trampoline failed for {}", "greet:");

        std::thread::spawn(|| {
            error!("other thread");
        })
        .join()
        .unwrap();

        let records = cap.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, Level::Error);
        assert_eq!(records[0].message, "trampoline failed for greet:");
        assert!(records[0].target.starts_with("oxibridge_log"));
    }

    #[test]
    fn test_capture_stops_on_drop() {
        {
            let cap = capture();
            error!("inside");
            assert!(cap.contains(Level::Error, "inside"));
        }
        error!("outside");

        let cap = capture();
        assert!(cap.records().is_empty());
    }
}
