//! Object wrappers.
//!
//! An [`Id`] pairs a native [`Handle`] with the [`Dispatcher`] it was
//! produced by. Sending a message to an `Id` dispatches on its handle; there
//! is no other behavior and no side effect at construction time.
//!
//! Two `Id`s compare equal when their handles are equal, even though they are
//! separate wrapper values.

use std::fmt;
use std::rc::Rc;

use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::message::Message;
use crate::value::Value;

/// A wrapped native object.
#[derive(Clone)]
pub struct Id {
    handle: Handle,
    dispatcher: Rc<Dispatcher>,
}

impl Id {
    /// Wraps `handle`, binding it to `dispatcher`.
    #[must_use]
    pub fn new(handle: Handle, dispatcher: Rc<Dispatcher>) -> Self {
        Id { handle, dispatcher }
    }

    /// Returns the wrapped handle.
    #[must_use]
    pub const fn handle(&self) -> Handle {
        self.handle
    }

    /// Returns the dispatcher this object sends through.
    #[must_use]
    pub fn dispatcher(&self) -> &Rc<Dispatcher> {
        &self.dispatcher
    }

    /// Sends `message` to this object.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::dispatch`].
    pub fn send(&self, message: Message) -> Result<Value> {
        self.dispatcher.dispatch(self.handle, message)
    }

    /// Sends a message given as positional call tokens.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::dispatch_tokens`].
    pub fn send_tokens<I>(&self, root: &str, tokens: I) -> Result<Value>
    where
        I: IntoIterator<Item = Value>,
    {
        self.dispatcher.dispatch_tokens(self.handle, root, tokens)
    }

    /// Converts the object to its description through two sends.
    ///
    /// Sends `description` to this object, then `UTF8String` to the returned
    /// descriptor. If `description` does not return an object, that value is
    /// returned without the second send.
    ///
    /// # Errors
    ///
    /// Propagates dispatch errors of either send.
    pub fn description(&self) -> Result<Value> {
        let descriptor = self.send(Message::new("description"))?;
        match descriptor.as_object() {
            Some(descriptor) => descriptor.send(Message::new("UTF8String")),
            None => Ok(descriptor),
        }
    }

    /// Returns the object's description as Rust text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotText`] if the description is not a string, or any
    /// dispatch error of [`description`](Self::description).
    pub fn to_text(&self) -> Result<String> {
        match self.description()? {
            Value::Str(text) => Ok(text),
            _ => Err(Error::NotText),
        }
    }
}

impl PartialEq for Id {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl Eq for Id {}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Id").field(&self.handle).finish()
    }
}
