//! Error types for the `oxibridge` dispatch layer.
//!
//! [`Error`] covers configuration problems, failures reported by the native
//! runtime, and misuse of the host API. [`CallbackError`] is the failure type
//! of host method implementations; it is consumed by the trampoline and never
//! crosses back into native code.

use std::fmt;
use std::path::PathBuf;

/// Errors that can occur while bridging into a native object runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The requested framework directory does not exist.
    FrameworkNotFound {
        /// Framework name as requested.
        name: String,
        /// Path that was checked.
        path: PathBuf,
    },

    /// A configuration value could not be parsed.
    InvalidConfig {
        /// Configuration key (environment variable name).
        key: String,
        /// Offending value.
        value: String,
    },

    /// The native loader refused to open a library.
    LibraryOpenFailed {
        /// Path passed to the loader.
        path: PathBuf,
        /// Loader-provided reason.
        reason: String,
    },

    /// The runtime returned no token for a selector string.
    SelectorRegistrationFailed {
        /// The selector string.
        selector: String,
    },

    /// No class with the given name is known to the runtime.
    ClassNotFound {
        /// Class name.
        name: String,
    },

    /// The runtime could not allocate a class pair (usually a name clash).
    ClassAllocationFailed {
        /// Requested class name.
        name: String,
    },

    /// The runtime rejected a method installation.
    MethodRegistrationFailed {
        /// Selector of the method.
        selector: String,
    },

    /// The runtime could not create a dispatch queue.
    QueueCreationFailed {
        /// Queue label.
        label: String,
    },

    /// An argument has a shape the native runtime cannot pass.
    UnsupportedArgument {
        /// Zero-based position in the value list.
        index: usize,
        /// Name of the rejected shape.
        kind: &'static str,
    },

    /// More arguments than the native runtime can pass in one send.
    TooManyArguments {
        /// Number of arguments provided.
        got: usize,
        /// Maximum supported.
        max: usize,
    },

    /// The native message send reported a failure.
    DispatchFailed {
        /// Selector that was sent.
        selector: String,
        /// Runtime-provided reason.
        reason: String,
    },

    /// A keyword position of a call held something other than text.
    KeywordNotText {
        /// Token index, counting the root name as 0.
        index: usize,
    },

    /// A send that must produce an object returned something else.
    NotAnObject {
        /// Selector that was sent.
        selector: String,
    },

    /// A string conversion did not produce text.
    NotText,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::FrameworkNotFound { name, path } => {
                write!(f, "Framework {name} not found at {}", path.display())
            }
            Error::InvalidConfig { key, value } => {
                write!(f, "Invalid value for {key}: '{value}'")
            }
            Error::LibraryOpenFailed { path, reason } => {
                write!(f, "Failed to open {}: {reason}", path.display())
            }
            Error::SelectorRegistrationFailed { selector } => {
                write!(f, "Failed to register selector '{selector}'")
            }
            Error::ClassNotFound { name } => {
                write!(f, "Class {name} not found")
            }
            Error::ClassAllocationFailed { name } => {
                write!(f, "Failed to allocate class pair '{name}'")
            }
            Error::MethodRegistrationFailed { selector } => {
                write!(f, "Failed to add method '{selector}'")
            }
            Error::QueueCreationFailed { label } => {
                write!(f, "Failed to create dispatch queue '{label}'")
            }
            Error::UnsupportedArgument { index, kind } => {
                write!(f, "Unsupported argument at index {index}: {kind}")
            }
            Error::TooManyArguments { got, max } => {
                write!(f, "Too many arguments: got {got}, at most {max} supported")
            }
            Error::DispatchFailed { selector, reason } => {
                write!(f, "Dispatch of '{selector}' failed: {reason}")
            }
            Error::KeywordNotText { index } => {
                write!(f, "Keyword token at index {index} is not text")
            }
            Error::NotAnObject { selector } => {
                write!(f, "'{selector}' did not return an object")
            }
            Error::NotText => write!(f, "Value is not text"),
        }
    }
}

impl std::error::Error for Error {}

/// Result type for bridge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure reported by a host method implementation.
///
/// Trampolines log these and convert them according to the configured
/// [`CallbackPolicy`](crate::CallbackPolicy).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackError {
    message: String,
}

impl CallbackError {
    /// Creates a callback error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        CallbackError {
            message: message.into(),
        }
    }

    /// Returns the failure message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CallbackError {}

impl From<Error> for CallbackError {
    fn from(err: Error) -> Self {
        CallbackError::new(err.to_string())
    }
}

impl From<&str> for CallbackError {
    fn from(message: &str) -> Self {
        CallbackError::new(message)
    }
}

impl From<String> for CallbackError {
    fn from(message: String) -> Self {
        CallbackError::new(message)
    }
}
