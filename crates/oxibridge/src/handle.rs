//! Opaque native object handles.
//!
//! A [`Handle`] is exactly eight bytes that identify a native object or class.
//! The bridge assumes nothing else about it: two handles are the same object
//! when their bytes are equal, and the referenced object's lifetime belongs to
//! the native runtime.

use std::fmt;

/// Byte length of a [`Handle`].
pub const HANDLE_LEN: usize = 8;

/// Fixed-size identifier of a native object or class.
///
/// # Example
///
/// ```rust
/// use oxibridge::Handle;
///
/// let h = Handle::from_word(0x1000);
/// assert_eq!(Handle::from_slice(h.as_bytes()), Some(h));
/// assert_eq!(Handle::from_slice(&[0u8; 4]), None);
/// ```
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle([u8; HANDLE_LEN]);

impl Handle {
    /// The all-zero handle (`nil`).
    pub const NIL: Handle = Handle([0; HANDLE_LEN]);

    /// Creates a handle from its raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; HANDLE_LEN]) -> Self {
        Handle(bytes)
    }

    /// Creates a handle from a byte slice, if it is exactly eight bytes long.
    #[must_use]
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; HANDLE_LEN]>::try_from(bytes).ok().map(Handle)
    }

    /// Creates a handle from a native word (pointer value) in native byte
    /// order.
    #[must_use]
    pub const fn from_word(word: u64) -> Self {
        Handle(word.to_ne_bytes())
    }

    /// Returns the handle as a native word.
    #[must_use]
    pub const fn as_word(&self) -> u64 {
        u64::from_ne_bytes(self.0)
    }

    /// Returns the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; HANDLE_LEN] {
        &self.0
    }

    /// Returns `true` for the all-zero handle.
    #[must_use]
    pub const fn is_nil(&self) -> bool {
        self.as_word() == 0
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({:#x})", self.as_word())
    }
}

impl From<[u8; HANDLE_LEN]> for Handle {
    fn from(bytes: [u8; HANDLE_LEN]) -> Self {
        Handle(bytes)
    }
}

/// Token for a registered selector, as returned by the native runtime.
///
/// Only meaningful to the runtime that produced it.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct SelectorToken(u64);

impl SelectorToken {
    /// Wraps a runtime-provided selector word.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        SelectorToken(raw)
    }

    /// Returns the runtime-provided word.
    #[must_use]
    pub const fn raw(&self) -> u64 {
        self.0
    }
}

/// Token for a library opened by the native loader.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct LibraryHandle(u64);

impl LibraryHandle {
    /// Wraps a loader-provided library word.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        LibraryHandle(raw)
    }

    /// Returns the loader-provided word.
    #[must_use]
    pub const fn raw(&self) -> u64 {
        self.0
    }
}
