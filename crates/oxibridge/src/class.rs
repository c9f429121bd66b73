//! Class wrappers.
//!
//! A [`ClassRef`] is an [`Id`] whose handle identifies a class. Besides
//! sending class messages (`alloc`, `new`, factory methods) it can derive new
//! classes and install host-implemented methods.
//!
//! # Example
//!
//! ```rust
//! use std::rc::Rc;
//! use oxibridge::native::RecordingRuntime;
//! use oxibridge::{Dispatcher, Message, Value};
//!
//! let runtime = Rc::new(RecordingRuntime::new());
//! let dispatcher = Dispatcher::new(runtime.clone());
//! let base = dispatcher.wrap_class(runtime.define_class("NSObject"));
//!
//! let greeter = base.extend("Greeter").unwrap();
//! greeter.register();
//! greeter
//!     .add_method("greet:", "v@:@", |args| {
//!         assert_eq!(args.len(), 2);
//!         Ok(Value::Void)
//!     })
//!     .unwrap();
//!
//! let obj = greeter.send(Message::new("new")).unwrap();
//! obj.as_object().unwrap().send(Message::new("greet").arg(1)).unwrap();
//! ```

use std::fmt;
use std::rc::Rc;

use oxibridge_log::debug;

use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::message::Message;
use crate::object::Id;
use crate::trampoline::{CallbackPolicy, MethodResult, Trampoline};
use crate::value::Value;

/// A wrapped native class.
#[derive(Clone, PartialEq, Eq)]
pub struct ClassRef {
    id: Id,
}

impl ClassRef {
    /// Wraps a class `handle`, binding it to `dispatcher`.
    #[must_use]
    pub fn new(handle: Handle, dispatcher: Rc<Dispatcher>) -> Self {
        ClassRef {
            id: Id::new(handle, dispatcher),
        }
    }

    /// Returns the wrapped class handle.
    #[must_use]
    pub const fn handle(&self) -> Handle {
        self.id.handle()
    }

    /// Returns this class as a plain object wrapper.
    #[must_use]
    pub const fn as_id(&self) -> &Id {
        &self.id
    }

    /// Sends a class message.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::dispatch`].
    pub fn send(&self, message: Message) -> Result<Value> {
        self.id.send(message)
    }

    /// Sends a class message given as positional call tokens.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::dispatch_tokens`].
    pub fn send_tokens<I>(&self, root: &str, tokens: I) -> Result<Value>
    where
        I: IntoIterator<Item = Value>,
    {
        self.id.send_tokens(root, tokens)
    }

    /// Derives a new class named `name` from this one.
    ///
    /// The new class has no extra instance storage and is not registered with
    /// the runtime; call [`register`](Self::register) once its methods are
    /// installed. This class is not modified.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClassAllocationFailed`] if the runtime refuses the
    /// class pair (typically because the name is taken).
    pub fn extend(&self, name: &str) -> Result<ClassRef> {
        let dispatcher = self.id.dispatcher();
        let handle = dispatcher
            .runtime()
            .allocate_class_pair(self.handle(), name, 0)
            .ok_or_else(|| Error::ClassAllocationFailed {
                name: name.to_string(),
            })?;

        debug!("allocated class pair {name} ({handle:?}) from {:?}", self.handle());
        Ok(dispatcher.wrap_class(handle))
    }

    /// Registers a class produced by [`extend`](Self::extend) so the runtime
    /// can look it up by name.
    pub fn register(&self) {
        self.id.dispatcher().runtime().register_class_pair(self.handle());
    }

    /// Installs `imp` as the implementation of selector `name`.
    ///
    /// `types` is the method's type encoding and is passed to the runtime
    /// uninterpreted. Failures of `imp` are handled according to the
    /// dispatcher's [`CallbackPolicy`]; see [`Trampoline`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::SelectorRegistrationFailed`] if `name` cannot be
    /// resolved, or [`Error::MethodRegistrationFailed`] if the runtime
    /// rejects the method.
    pub fn add_method<F>(&self, name: &str, types: &str, imp: F) -> Result<()>
    where
        F: Fn(&[Value]) -> MethodResult + 'static,
    {
        let policy = self.id.dispatcher().callback_policy();
        self.add_method_with_policy(name, types, policy, imp)
    }

    /// Like [`add_method`](Self::add_method), with an explicit failure
    /// policy for this method.
    ///
    /// # Errors
    ///
    /// See [`add_method`](Self::add_method).
    pub fn add_method_with_policy<F>(
        &self,
        name: &str,
        types: &str,
        policy: CallbackPolicy,
        imp: F,
    ) -> Result<()>
    where
        F: Fn(&[Value]) -> MethodResult + 'static,
    {
        let dispatcher = self.id.dispatcher();
        let trampoline = Trampoline::new(name, dispatcher, policy, imp);
        let selector = dispatcher.selector(name)?;

        let added = dispatcher.runtime().add_method(
            self.handle(),
            selector,
            Rc::new(trampoline),
            types,
        );
        if !added {
            return Err(Error::MethodRegistrationFailed {
                selector: name.to_string(),
            });
        }

        debug!("installed {name} ({types}) on {:?}", self.handle());
        Ok(())
    }
}

impl fmt::Debug for ClassRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ClassRef").field(&self.handle()).finish()
    }
}
