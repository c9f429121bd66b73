//! The native runtime collaborator.
//!
//! [`NativeRuntime`] is the complete set of primitives the bridge needs from
//! an Objective-C style runtime: open a library, enumerate and resolve
//! classes, allocate class pairs, register selectors, install methods, and
//! the one generic message send. Everything above this trait is runtime
//! agnostic.
//!
//! Two implementations ship with the crate:
//!
//! - [`RecordingRuntime`]: an in-process runtime that records every call and
//!   routes sends to installed trampolines. Used by tests and benchmarks.
//! - `SystemRuntime` (macOS only): binds `libobjc` and `libdispatch`.
//!
//! [`encoding`] parses the runtime's method type encodings.

use std::path::Path;
use std::rc::Rc;

use crate::error::Result;
use crate::handle::{Handle, LibraryHandle, SelectorToken};
use crate::trampoline::Trampoline;
use crate::value::RawValue;

pub mod encoding;
pub mod recording;
#[cfg(target_os = "macos")]
pub mod system;

pub use recording::{NativeCall, RecordingRuntime};
#[cfg(target_os = "macos")]
pub use system::SystemRuntime;

/// How a library is opened by the native loader.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum OpenMode {
    /// Resolve symbols on first use, keep them local (`RTLD_LAZY`).
    #[default]
    Lazy,
    /// Resolve all symbols at load time (`RTLD_NOW`).
    Now,
    /// `RTLD_LAZY | RTLD_GLOBAL`.
    LazyGlobal,
    /// `RTLD_NOW | RTLD_GLOBAL`.
    NowGlobal,
}

impl OpenMode {
    /// Parses `lazy`, `now`, `lazy-global` or `now-global`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lazy" => Some(OpenMode::Lazy),
            "now" => Some(OpenMode::Now),
            "lazy-global" => Some(OpenMode::LazyGlobal),
            "now-global" => Some(OpenMode::NowGlobal),
            _ => None,
        }
    }

    /// Returns `true` if symbols are made available to later loads.
    #[must_use]
    pub const fn is_global(self) -> bool {
        matches!(self, OpenMode::LazyGlobal | OpenMode::NowGlobal)
    }

    /// Returns `true` if symbols are resolved at load time.
    #[must_use]
    pub const fn is_eager(self) -> bool {
        matches!(self, OpenMode::Now | OpenMode::NowGlobal)
    }
}

/// Primitive operations of an Objective-C style object runtime.
///
/// Implementations are used from a single thread. Failures of `msg_send`
/// are reported as `Err` when the runtime can detect them; a runtime whose
/// native send aborts the process simply never returns.
pub trait NativeRuntime {
    /// Loads the library at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LibraryOpenFailed`](crate::Error::LibraryOpenFailed)
    /// if the loader refuses the library.
    fn open(&self, path: &Path, mode: OpenMode) -> Result<LibraryHandle>;

    /// Returns the names of all classes currently known to the runtime,
    /// process-wide.
    fn class_list(&self) -> Vec<String>;

    /// Resolves a class by name.
    fn get_class(&self, name: &str) -> Option<Handle>;

    /// Creates a new, unregistered class descriptor deriving from
    /// `superclass`.
    fn allocate_class_pair(
        &self,
        superclass: Handle,
        name: &str,
        extra_bytes: usize,
    ) -> Option<Handle>;

    /// Registers a class pair created by
    /// [`allocate_class_pair`](NativeRuntime::allocate_class_pair).
    fn register_class_pair(&self, class: Handle);

    /// Installs `imp` as the implementation of `selector` on `class`.
    ///
    /// Returns `false` if the runtime refused the method (for example because
    /// the class already implements it).
    fn add_method(
        &self,
        class: Handle,
        selector: SelectorToken,
        imp: Rc<Trampoline>,
        types: &str,
    ) -> bool;

    /// Interns a selector string.
    fn register_name(&self, name: &str) -> Option<SelectorToken>;

    /// Sends `selector` to `receiver` with `args`.
    ///
    /// # Errors
    ///
    /// Runtime specific; see the implementation.
    fn msg_send(
        &self,
        receiver: Handle,
        selector: SelectorToken,
        args: &[RawValue],
    ) -> Result<RawValue>;

    /// Creates a dispatch queue with the given label and attribute word.
    fn queue_create(&self, label: &str, attr: i64) -> Option<Handle>;
}
