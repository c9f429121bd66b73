//! Message dispatch through the native runtime.
//!
//! The [`Dispatcher`] is the bridge's counterpart of `objc_msgSend`: it takes
//! a receiver handle and a [`Message`], resolves the selector string to a
//! token, performs exactly one native send, and lifts the raw result.
//!
//! # Dispatch algorithm
//!
//! 1. Build the selector string and argument list (see [`Message`])
//! 2. Lower each argument, substituting handles for wrapped objects
//! 3. Resolve the selector string with `register_name`
//! 4. Call `msg_send(receiver, token, args)` once
//! 5. Lift the result: eight-byte buffers become [`Value::Object`]
//!
//! Selector tokens are not cached between sends and failed sends are never
//! retried; native failures are returned unchanged.
//!
//! # Example
//!
//! ```rust
//! use std::rc::Rc;
//! use oxibridge::native::RecordingRuntime;
//! use oxibridge::{Dispatcher, Message, RawValue, Value};
//!
//! let runtime = Rc::new(RecordingRuntime::new());
//! runtime.reply("initWith:andAge:", RawValue::Int(1));
//!
//! let dispatcher = Dispatcher::new(runtime.clone());
//! let target = runtime.instantiate(runtime.define_class("Person"));
//!
//! let result = dispatcher
//!     .dispatch_tokens(target, "initWith", ["Name".into(), "andAge".into(), 30.into()])
//!     .unwrap();
//! assert_eq!(result, Value::Int(1));
//!
//! let (_, selector, args) = runtime.sends().pop().unwrap();
//! assert_eq!(selector, "initWith:andAge:");
//! assert_eq!(args, vec![RawValue::Str("Name".into()), RawValue::Int(30)]);
//! ```

use std::rc::Rc;

use oxibridge_log::trace;

use crate::class::ClassRef;
use crate::error::{Error, Result};
use crate::handle::{Handle, SelectorToken};
use crate::message::Message;
use crate::native::NativeRuntime;
use crate::object::Id;
use crate::trampoline::CallbackPolicy;
use crate::value::{RawValue, Value};

/// Sends messages through a [`NativeRuntime`] and wraps the results.
///
/// A dispatcher is shared through `Rc`; every [`Id`] and [`ClassRef`] holds a
/// reference to the dispatcher it was created by.
pub struct Dispatcher {
    runtime: Rc<dyn NativeRuntime>,
    callback_policy: CallbackPolicy,
}

impl Dispatcher {
    /// Creates a dispatcher over `runtime` with the default callback policy.
    pub fn new(runtime: Rc<dyn NativeRuntime>) -> Rc<Self> {
        Self::with_policy(runtime, CallbackPolicy::default())
    }

    /// Creates a dispatcher whose installed methods handle failures with
    /// `callback_policy`.
    pub fn with_policy(
        runtime: Rc<dyn NativeRuntime>,
        callback_policy: CallbackPolicy,
    ) -> Rc<Self> {
        Rc::new(Dispatcher {
            runtime,
            callback_policy,
        })
    }

    /// Returns the runtime this dispatcher sends through.
    #[must_use]
    pub fn runtime(&self) -> &Rc<dyn NativeRuntime> {
        &self.runtime
    }

    /// Returns the policy applied to methods installed through
    /// [`ClassRef::add_method`].
    #[must_use]
    pub const fn callback_policy(&self) -> CallbackPolicy {
        self.callback_policy
    }

    /// Wraps an object handle. Has no side effects.
    #[must_use]
    pub fn wrap(self: &Rc<Self>, handle: Handle) -> Id {
        Id::new(handle, Rc::clone(self))
    }

    /// Wraps a class handle. Has no side effects.
    #[must_use]
    pub fn wrap_class(self: &Rc<Self>, handle: Handle) -> ClassRef {
        ClassRef::new(handle, Rc::clone(self))
    }

    /// Resolves a selector string through the runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SelectorRegistrationFailed`] if the runtime returns
    /// no token.
    pub fn selector(&self, name: &str) -> Result<SelectorToken> {
        self.runtime
            .register_name(name)
            .ok_or_else(|| Error::SelectorRegistrationFailed {
                selector: name.to_string(),
            })
    }

    /// Sends `message` to `target`.
    ///
    /// The native send happens exactly once; its result is lifted with the
    /// eight-byte handle rule.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SelectorRegistrationFailed`] if the selector cannot be
    /// resolved, or whatever error the runtime's `msg_send` reports.
    pub fn dispatch(self: &Rc<Self>, target: Handle, message: Message) -> Result<Value> {
        let (selector, args) = message.into_parts();
        let raw_args: Vec<RawValue> = args.iter().map(Value::to_raw).collect();

        trace!(
            "send {selector} to {target:?} with {} argument(s)",
            raw_args.len()
        );

        let token = self.selector(&selector)?;
        let raw = self.runtime.msg_send(target, token, &raw_args)?;

        Ok(Value::lift(raw, self))
    }

    /// Sends a message given as positional call tokens.
    ///
    /// `tokens` follow `root` and alternate value, keyword, value, ... as
    /// described in [`Message::from_tokens`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeywordNotText`] before any native call if a keyword
    /// position is not text; otherwise as [`dispatch`](Self::dispatch).
    pub fn dispatch_tokens<I>(
        self: &Rc<Self>,
        target: Handle,
        root: &str,
        tokens: I,
    ) -> Result<Value>
    where
        I: IntoIterator<Item = Value>,
    {
        let message = Message::from_tokens(root, tokens)?;
        self.dispatch(target, message)
    }
}
