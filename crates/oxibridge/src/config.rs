//! Bridge configuration.
//!
//! Every setting has a default and can be overridden from the environment:
//!
//! | Variable | Setting | Values |
//! |---|---|---|
//! | `OXIBRIDGE_FRAMEWORKS` | frameworks root | any path |
//! | `OXIBRIDGE_OPEN_MODE` | library open mode | `lazy`, `now`, `lazy-global`, `now-global` |
//! | `OXIBRIDGE_CALLBACK_POLICY` | callback failure policy | `log`, `error-code:<n>` |
//! | `OXIBRIDGE_LOG` | log level | `error`, `warn`, `info`, `debug`, `trace` |

use std::path::PathBuf;

use oxibridge_log::Level;

use crate::error::{Error, Result};
use crate::framework::{DEFAULT_FRAMEWORKS_ROOT, FrameworkLoader};
use crate::native::OpenMode;
use crate::trampoline::CallbackPolicy;

/// Environment variable overriding [`BridgeConfig::frameworks_root`].
pub const ENV_FRAMEWORKS: &str = "OXIBRIDGE_FRAMEWORKS";
/// Environment variable overriding [`BridgeConfig::open_mode`].
pub const ENV_OPEN_MODE: &str = "OXIBRIDGE_OPEN_MODE";
/// Environment variable overriding [`BridgeConfig::callback_policy`].
pub const ENV_CALLBACK_POLICY: &str = "OXIBRIDGE_CALLBACK_POLICY";
/// Environment variable overriding [`BridgeConfig::log_level`].
pub const ENV_LOG: &str = "OXIBRIDGE_LOG";

/// Settings for a [`Bridge`](crate::Bridge).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Directory frameworks are resolved against.
    pub frameworks_root: PathBuf,
    /// Mode framework binaries are opened with.
    pub open_mode: OpenMode,
    /// Outcome of failing host methods.
    pub callback_policy: CallbackPolicy,
    /// Log level applied when the bridge is created; `None` leaves the
    /// global level alone.
    pub log_level: Option<Level>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            frameworks_root: PathBuf::from(DEFAULT_FRAMEWORKS_ROOT),
            open_mode: OpenMode::default(),
            callback_policy: CallbackPolicy::default(),
            log_level: None,
        }
    }
}

impl BridgeConfig {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for the first variable holding a
    /// value that cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from `lookup`, which maps variable names to
    /// values. Unset variables keep their defaults.
    ///
    /// ```rust
    /// use oxibridge::{BridgeConfig, CallbackPolicy};
    ///
    /// let config = BridgeConfig::from_lookup(|key| match key {
    ///     "OXIBRIDGE_CALLBACK_POLICY" => Some("error-code:-1".to_string()),
    ///     _ => None,
    /// })
    /// .unwrap();
    /// assert_eq!(config.callback_policy, CallbackPolicy::ErrorCode(-1));
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for the first value that cannot be
    /// parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = BridgeConfig::default();

        if let Some(root) = lookup(ENV_FRAMEWORKS) {
            if root.trim().is_empty() {
                return Err(invalid(ENV_FRAMEWORKS, root));
            }
            config.frameworks_root = PathBuf::from(root);
        }

        if let Some(mode) = lookup(ENV_OPEN_MODE) {
            config.open_mode = OpenMode::parse(&mode).ok_or_else(|| invalid(ENV_OPEN_MODE, mode))?;
        }

        if let Some(policy) = lookup(ENV_CALLBACK_POLICY) {
            config.callback_policy = CallbackPolicy::parse(&policy)
                .ok_or_else(|| invalid(ENV_CALLBACK_POLICY, policy))?;
        }

        if let Some(level) = lookup(ENV_LOG) {
            config.log_level = Some(level.parse().map_err(|_| invalid(ENV_LOG, level))?);
        }

        Ok(config)
    }

    /// Returns a framework loader using these settings.
    #[must_use]
    pub fn loader(&self) -> FrameworkLoader {
        FrameworkLoader::new(self.frameworks_root.clone(), self.open_mode)
    }
}

fn invalid(key: &str, value: String) -> Error {
    Error::InvalidConfig {
        key: key.to_string(),
        value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.frameworks_root, PathBuf::from("/System/Library/Frameworks"));
        assert_eq!(config.open_mode, OpenMode::Lazy);
        assert_eq!(config.callback_policy, CallbackPolicy::LogAndSuppress);
        assert_eq!(config.log_level, None);
    }

    #[test]
    fn test_all_overrides() {
        let config = BridgeConfig::from_lookup(lookup_from(&[
            ("OXIBRIDGE_FRAMEWORKS", "/opt/frameworks"),
            ("OXIBRIDGE_OPEN_MODE", "now-global"),
            ("OXIBRIDGE_CALLBACK_POLICY", "error-code:13"),
            ("OXIBRIDGE_LOG", "debug"),
        ]))
        .unwrap();

        assert_eq!(config.frameworks_root, PathBuf::from("/opt/frameworks"));
        assert_eq!(config.open_mode, OpenMode::NowGlobal);
        assert_eq!(config.callback_policy, CallbackPolicy::ErrorCode(13));
        assert_eq!(config.log_level, Some(Level::Debug));
        assert_eq!(
            config.loader().resolve("Foundation"),
            PathBuf::from("/opt/frameworks/Foundation.framework/Foundation")
        );
    }

    #[test]
    fn test_malformed_policy_is_rejected() {
        let err = BridgeConfig::from_lookup(lookup_from(&[(
            "OXIBRIDGE_CALLBACK_POLICY",
            "error-code:lots",
        )]))
        .unwrap_err();
        assert_eq!(
            err,
            Error::InvalidConfig {
                key: "OXIBRIDGE_CALLBACK_POLICY".into(),
                value: "error-code:lots".into(),
            }
        );
    }

    #[test]
    fn test_malformed_mode_and_level_are_rejected() {
        assert!(matches!(
            BridgeConfig::from_lookup(lookup_from(&[("OXIBRIDGE_OPEN_MODE", "eager")])),
            Err(Error::InvalidConfig { key, .. }) if key == ENV_OPEN_MODE
        ));
        assert!(matches!(
            BridgeConfig::from_lookup(lookup_from(&[("OXIBRIDGE_LOG", "loud")])),
            Err(Error::InvalidConfig { key, .. }) if key == ENV_LOG
        ));
        assert!(matches!(
            BridgeConfig::from_lookup(lookup_from(&[("OXIBRIDGE_FRAMEWORKS", " ")])),
            Err(Error::InvalidConfig { key, .. }) if key == ENV_FRAMEWORKS
        ));
    }
}
