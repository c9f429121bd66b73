//! Native-callable adapters around host method implementations.
//!
//! A [`Trampoline`] is what the native runtime calls when it dispatches a
//! selector installed through [`ClassRef::add_method`]. It:
//!
//! 1. lifts each raw argument, wrapping eight-byte buffers as
//!    [`Value::Object`] (the reverse of the dispatcher's result rule),
//! 2. calls the host implementation,
//! 3. contains any failure, whether an `Err` outcome or a panic, logs it
//!    and answers according to its [`CallbackPolicy`].
//!
//! The native caller always sees a normal return. A failure must not unwind
//! into native frames.
//!
//! [`ClassRef::add_method`]: crate::ClassRef::add_method

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use oxibridge_log::{error, warn};

use crate::dispatch::Dispatcher;
use crate::error::CallbackError;
use crate::value::{RawValue, Value};

/// Outcome of a host method implementation.
pub type MethodResult = std::result::Result<Value, CallbackError>;

/// Signature of host method implementations.
///
/// The first argument is the receiver; the selector's arguments follow.
pub type HostMethod = dyn Fn(&[Value]) -> MethodResult;

/// What a trampoline returns to native code when its implementation fails.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum CallbackPolicy {
    /// Log the failure and return `void`.
    #[default]
    LogAndSuppress,
    /// Log the failure and return the given integer.
    ErrorCode(i64),
}

impl CallbackPolicy {
    /// Parses `log` or `error-code:<n>`.
    ///
    /// ```rust
    /// use oxibridge::CallbackPolicy;
    ///
    /// assert_eq!(CallbackPolicy::parse("log"), Some(CallbackPolicy::LogAndSuppress));
    /// assert_eq!(CallbackPolicy::parse("error-code:-1"), Some(CallbackPolicy::ErrorCode(-1)));
    /// assert_eq!(CallbackPolicy::parse("error-code:x"), None);
    /// ```
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("log") {
            return Some(CallbackPolicy::LogAndSuppress);
        }
        let code = s.strip_prefix("error-code:")?;
        code.trim().parse().ok().map(CallbackPolicy::ErrorCode)
    }

    const fn failure_value(self) -> RawValue {
        match self {
            CallbackPolicy::LogAndSuppress => RawValue::Void,
            CallbackPolicy::ErrorCode(code) => RawValue::Int(code),
        }
    }
}

/// Adapter invoked by the native runtime for an installed method.
pub struct Trampoline {
    selector: String,
    dispatcher: Weak<Dispatcher>,
    policy: CallbackPolicy,
    imp: Box<HostMethod>,
}

impl Trampoline {
    /// Wraps `imp` as the implementation of `selector`.
    ///
    /// Arguments are wrapped with `dispatcher`, which is held weakly: once
    /// every strong reference is gone the trampoline stops calling `imp`.
    pub fn new<F>(
        selector: &str,
        dispatcher: &Rc<Dispatcher>,
        policy: CallbackPolicy,
        imp: F,
    ) -> Self
    where
        F: Fn(&[Value]) -> MethodResult + 'static,
    {
        Trampoline {
            selector: selector.to_string(),
            dispatcher: Rc::downgrade(dispatcher),
            policy,
            imp: Box::new(imp),
        }
    }

    /// Returns the selector this trampoline implements.
    #[must_use]
    pub fn selector(&self) -> &str {
        &self.selector
    }

    /// Returns the failure policy.
    #[must_use]
    pub const fn policy(&self) -> CallbackPolicy {
        self.policy
    }

    /// Runs the host implementation with `raw_args` received from native
    /// code.
    ///
    /// Never panics and never fails: implementation failures are logged and
    /// mapped through the [`CallbackPolicy`].
    pub fn invoke(&self, raw_args: Vec<RawValue>) -> RawValue {
        let Some(dispatcher) = self.dispatcher.upgrade() else {
            warn!(
                "{} called after its bridge was dropped; returning void",
                self.selector
            );
            return RawValue::Void;
        };

        let args: Vec<Value> = raw_args
            .into_iter()
            .map(|raw| Value::lift(raw, &dispatcher))
            .collect();

        match panic::catch_unwind(AssertUnwindSafe(|| (self.imp)(&args))) {
            Ok(Ok(value)) => value.to_raw(),
            Ok(Err(err)) => self.fail(&err.to_string()),
            Err(payload) => self.fail(&panic_message(payload.as_ref())),
        }
    }

    fn fail(&self, reason: &str) -> RawValue {
        error!("method {} failed: {reason}", self.selector);

        #[cfg(feature = "callback_backtrace")]
        {
            let trace = backtrace::Backtrace::new();
            oxibridge_log::debug!("{} failure backtrace:\n{trace:?}", self.selector);
        }

        self.policy.failure_value()
    }
}

impl fmt::Debug for Trampoline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trampoline")
            .field("selector", &self.selector)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}
