//! Selector construction from call-site tokens.
//!
//! A call is written as a root method name followed by alternating value
//! arguments and keyword fragments:
//!
//! ```text
//! root, value, keyword, value, keyword, value, ...
//! ```
//!
//! Every value appends a `:` to the selector and is collected as an
//! argument; every keyword fragment is concatenated as-is. So
//! `["initWith", "Name", "andAge", 30]` becomes selector `initWith:andAge:`
//! with arguments `["Name", 30]`.
//!
//! # Example
//!
//! ```rust
//! use oxibridge::{Message, Value};
//!
//! let msg = Message::new("initWith").arg("Name").keyword("andAge").arg(30);
//! assert_eq!(msg.selector(), "initWith:andAge:");
//! assert_eq!(msg.args(), &[Value::from("Name"), Value::Int(30)]);
//!
//! let same = Message::from_tokens("initWith", ["Name".into(), "andAge".into(), 30.into()]).unwrap();
//! assert_eq!(same, msg);
//! ```

use crate::error::{Error, Result};
use crate::value::Value;

/// A selector string under construction plus its collected arguments.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    selector: String,
    args: Vec<Value>,
    /// Number of tokens after the root name.
    trailing: usize,
}

impl Message {
    /// Starts a message with the root method name.
    pub fn new(root: impl Into<String>) -> Self {
        Message {
            selector: root.into(),
            args: Vec::new(),
            trailing: 0,
        }
    }

    /// Appends a value argument and its `:`.
    #[must_use]
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.selector.push(':');
        self.args.push(value.into());
        self.trailing += 1;
        self
    }

    /// Appends a keyword fragment without a colon.
    #[must_use]
    pub fn keyword(mut self, fragment: &str) -> Self {
        self.selector.push_str(fragment);
        self.trailing += 1;
        self
    }

    /// Builds a message from positional tokens following `root`.
    ///
    /// Tokens at odd positions (1, 3, 5, ...) are values; tokens at even
    /// positions are keyword fragments and must be [`Value::Str`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeywordNotText`] if a keyword position holds a
    /// non-text value. The index counts the root name as 0.
    pub fn from_tokens<I>(root: &str, tokens: I) -> Result<Self>
    where
        I: IntoIterator<Item = Value>,
    {
        let mut message = Message::new(root);

        for (offset, token) in tokens.into_iter().enumerate() {
            let index = offset + 1;
            if index % 2 == 1 {
                message = message.arg(token);
            } else {
                match token {
                    Value::Str(fragment) => message = message.keyword(&fragment),
                    _ => return Err(Error::KeywordNotText { index }),
                }
            }
        }

        Ok(message)
    }

    /// Returns the selector string built so far.
    #[must_use]
    pub fn selector(&self) -> &str {
        &self.selector
    }

    /// Returns the collected value arguments in call order.
    #[must_use]
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Returns the number of value arguments.
    #[must_use]
    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    /// Returns `true` when the call ends on a value (an odd number of
    /// trailing tokens) or has no trailing tokens at all.
    ///
    /// A message ending on a keyword fragment is still sent as built; the
    /// native runtime decides whether the selector exists.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.trailing == 0 || self.trailing % 2 == 1
    }

    /// Splits the message into its selector and arguments.
    #[must_use]
    pub fn into_parts(self) -> (String, Vec<Value>) {
        (self.selector, self.args)
    }
}
