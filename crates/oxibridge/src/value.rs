//! Values exchanged with the native runtime.
//!
//! [`RawValue`] is the only shape that crosses the [`NativeRuntime`] boundary.
//! [`Value`] is what host code sees: the same scalar shapes plus the tagged
//! wrapper variants [`Value::Object`] and [`Value::Class`].
//!
//! # Handle heuristic
//!
//! The runtime does not tag its results. Any `RawValue::Bytes` of exactly
//! eight bytes is therefore treated as an object handle and lifted to
//! `Value::Object`. An eight-byte scalar returned as bytes is
//! indistinguishable from a handle and will be misclassified; runtimes that
//! know a result is a scalar should return `Int`/`Float` instead.
//!
//! [`NativeRuntime`]: crate::native::NativeRuntime

use std::rc::Rc;

use crate::class::ClassRef;
use crate::dispatch::Dispatcher;
use crate::handle::{HANDLE_LEN, Handle};
use crate::object::Id;

/// A value as seen by the native runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    /// No value (`void`).
    Void,
    /// Boolean.
    Bool(bool),
    /// Integer of any native width.
    Int(i64),
    /// Floating point.
    Float(f64),
    /// UTF-8 text.
    Str(String),
    /// Binary buffer; eight-byte buffers are object handles.
    Bytes(Vec<u8>),
}

impl RawValue {
    /// Returns a short name of this value's shape.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            RawValue::Void => "void",
            RawValue::Bool(_) => "bool",
            RawValue::Int(_) => "int",
            RawValue::Float(_) => "float",
            RawValue::Str(_) => "string",
            RawValue::Bytes(_) => "bytes",
        }
    }

    /// Returns the handle if this is an eight-byte buffer.
    #[must_use]
    pub fn as_handle(&self) -> Option<Handle> {
        match self {
            RawValue::Bytes(bytes) if bytes.len() == HANDLE_LEN => {
                Handle::from_slice(bytes)
            }
            _ => None,
        }
    }
}

impl From<Handle> for RawValue {
    fn from(handle: Handle) -> Self {
        RawValue::Bytes(handle.as_bytes().to_vec())
    }
}

/// A value as seen by host code.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// No value (`void`).
    Void,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Floating point.
    Float(f64),
    /// UTF-8 text.
    Str(String),
    /// Binary buffer of any length other than a wrapped handle.
    Bytes(Vec<u8>),
    /// Wrapped object handle.
    Object(Id),
    /// Wrapped class handle.
    Class(ClassRef),
}

impl Value {
    /// Returns `true` if this value wraps an object or class handle.
    #[must_use]
    pub const fn is_handle_wrapper(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Class(_))
    }

    /// Returns the wrapped handle, if any.
    #[must_use]
    pub fn handle(&self) -> Option<Handle> {
        match self {
            Value::Object(id) => Some(id.handle()),
            Value::Class(class) => Some(class.handle()),
            _ => None,
        }
    }

    /// Returns the wrapped object.
    #[must_use]
    pub fn as_object(&self) -> Option<&Id> {
        match self {
            Value::Object(id) => Some(id),
            Value::Class(class) => Some(class.as_id()),
            _ => None,
        }
    }

    /// Returns the text, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer, if this is one.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Lowers this value for the native boundary, substituting handles for
    /// wrappers.
    #[must_use]
    pub fn to_raw(&self) -> RawValue {
        match self {
            Value::Void => RawValue::Void,
            Value::Bool(b) => RawValue::Bool(*b),
            Value::Int(i) => RawValue::Int(*i),
            Value::Float(x) => RawValue::Float(*x),
            Value::Str(s) => RawValue::Str(s.clone()),
            Value::Bytes(bytes) => RawValue::Bytes(bytes.clone()),
            Value::Object(id) => id.handle().into(),
            Value::Class(class) => class.handle().into(),
        }
    }

    /// Lifts a native value, wrapping eight-byte buffers as objects bound to
    /// `dispatcher`.
    pub(crate) fn lift(raw: RawValue, dispatcher: &Rc<Dispatcher>) -> Value {
        match raw {
            RawValue::Void => Value::Void,
            RawValue::Bool(b) => Value::Bool(b),
            RawValue::Int(i) => Value::Int(i),
            RawValue::Float(x) => Value::Float(x),
            RawValue::Str(s) => Value::Str(s),
            RawValue::Bytes(bytes) => match Handle::from_slice(&bytes) {
                Some(handle) => Value::Object(Id::new(handle, Rc::clone(dispatcher))),
                None => Value::Bytes(bytes),
            },
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Bytes(bytes)
    }
}

impl From<Id> for Value {
    fn from(id: Id) -> Self {
        Value::Object(id)
    }
}

impl From<&Id> for Value {
    fn from(id: &Id) -> Self {
        Value::Object(id.clone())
    }
}

impl From<ClassRef> for Value {
    fn from(class: ClassRef) -> Self {
        Value::Class(class)
    }
}

impl From<&ClassRef> for Value {
    fn from(class: &ClassRef) -> Self {
        Value::Class(class.clone())
    }
}
