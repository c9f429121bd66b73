//! Framework import.
//!
//! A framework named `X` lives at `<root>/X.framework` and its binary at
//! `<root>/X.framework/X`. Loading opens the binary, then enumerates the
//! runtime's class list and wraps every class that resolves.
//!
//! The class list is process-wide: a [`ClassTable`] returned by one import
//! includes classes contributed by everything loaded before it. Callers that
//! want a single view of several imports can [`merge`](ClassTable::merge)
//! their tables.

use std::collections::hash_map;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use fxhash::FxHashMap;
use oxibridge_log::{debug, info, warn};

use crate::class::ClassRef;
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::handle::LibraryHandle;
use crate::native::OpenMode;

/// Default directory searched for frameworks.
pub const DEFAULT_FRAMEWORKS_ROOT: &str = "/System/Library/Frameworks";

/// Class name to wrapper mapping produced by a framework import.
#[derive(Clone, Debug, Default)]
pub struct ClassTable {
    classes: FxHashMap<String, ClassRef>,
}

impl ClassTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the class named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ClassRef> {
        self.classes.get(name)
    }

    /// Returns `true` if the table has a class named `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// Inserts a class, returning the entry it replaced.
    pub fn insert(&mut self, name: impl Into<String>, class: ClassRef) -> Option<ClassRef> {
        self.classes.insert(name.into(), class)
    }

    /// Moves every entry of `other` into this table. Entries of `other`
    /// replace existing entries with the same name.
    pub fn merge(&mut self, other: ClassTable) {
        self.classes.extend(other.classes);
    }

    /// Number of classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Returns `true` if the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Iterates over `(name, class)` pairs in no particular order.
    pub fn iter(&self) -> hash_map::Iter<'_, String, ClassRef> {
        self.classes.iter()
    }

    /// Returns the class names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.classes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl<'a> IntoIterator for &'a ClassTable {
    type Item = (&'a String, &'a ClassRef);
    type IntoIter = hash_map::Iter<'a, String, ClassRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.classes.iter()
    }
}

/// Result of importing a framework.
#[derive(Debug)]
pub struct Framework {
    name: String,
    library: LibraryHandle,
    classes: ClassTable,
}

impl Framework {
    /// Framework name as requested.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handle of the opened binary.
    #[must_use]
    pub const fn library(&self) -> LibraryHandle {
        self.library
    }

    /// Classes visible after the import.
    #[must_use]
    pub const fn classes(&self) -> &ClassTable {
        &self.classes
    }

    /// Shorthand for `self.classes().get(name)`.
    #[must_use]
    pub fn class(&self, name: &str) -> Option<&ClassRef> {
        self.classes.get(name)
    }

    /// Consumes the framework, returning its class table.
    #[must_use]
    pub fn into_classes(self) -> ClassTable {
        self.classes
    }
}

/// Resolves and loads frameworks from a root directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameworkLoader {
    frameworks_root: PathBuf,
    open_mode: OpenMode,
}

impl Default for FrameworkLoader {
    fn default() -> Self {
        FrameworkLoader::new(DEFAULT_FRAMEWORKS_ROOT, OpenMode::default())
    }
}

impl FrameworkLoader {
    /// Creates a loader for frameworks under `frameworks_root`.
    #[must_use]
    pub fn new(frameworks_root: impl Into<PathBuf>, open_mode: OpenMode) -> Self {
        FrameworkLoader {
            frameworks_root: frameworks_root.into(),
            open_mode,
        }
    }

    /// Directory frameworks are resolved against.
    #[must_use]
    pub fn frameworks_root(&self) -> &Path {
        &self.frameworks_root
    }

    /// Mode binaries are opened with.
    #[must_use]
    pub const fn open_mode(&self) -> OpenMode {
        self.open_mode
    }

    /// Returns `<root>/<name>.framework`.
    #[must_use]
    pub fn bundle_path(&self, name: &str) -> PathBuf {
        self.frameworks_root.join(format!("{name}.framework"))
    }

    /// Returns `<root>/<name>.framework/<name>`.
    #[must_use]
    pub fn resolve(&self, name: &str) -> PathBuf {
        self.bundle_path(name).join(name)
    }

    /// Opens framework `name` and wraps every class the runtime then knows.
    ///
    /// Class names that no longer resolve through `get_class` are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameworkNotFound`] without touching the runtime if
    /// the bundle directory does not exist, or
    /// [`Error::LibraryOpenFailed`] if the runtime cannot open the binary.
    pub fn load(&self, dispatcher: &Rc<Dispatcher>, name: &str) -> Result<Framework> {
        let bundle = self.bundle_path(name);
        if !bundle.exists() {
            return Err(Error::FrameworkNotFound {
                name: name.to_string(),
                path: bundle,
            });
        }

        let binary = bundle.join(name);
        let runtime = dispatcher.runtime();
        let library = runtime.open(&binary, self.open_mode)?;
        debug!("opened {} as {library:?}", binary.display());

        let mut classes = ClassTable::new();
        for class_name in runtime.class_list() {
            match runtime.get_class(&class_name) {
                Some(handle) => {
                    classes.insert(class_name, dispatcher.wrap_class(handle));
                }
                None => warn!("class {class_name} is listed but does not resolve; skipping"),
            }
        }

        info!("imported {name}: {} classes visible", classes.len());
        Ok(Framework {
            name: name.to_string(),
            library,
            classes,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::handle::Handle;
    use crate::native::{NativeCall, RecordingRuntime};

    fn scratch_root(tag: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!(
            "oxibridge-framework-{tag}-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&root);
        fs::create_dir_all(&root).unwrap();
        root
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let loader = FrameworkLoader::new("/Frameworks", OpenMode::Lazy);
        assert_eq!(
            loader.resolve("AppKit"),
            PathBuf::from("/Frameworks/AppKit.framework/AppKit")
        );
        assert_eq!(
            loader.bundle_path("AppKit"),
            PathBuf::from("/Frameworks/AppKit.framework")
        );
    }

    #[test]
    fn test_default_root() {
        let loader = FrameworkLoader::default();
        assert_eq!(loader.frameworks_root(), Path::new(DEFAULT_FRAMEWORKS_ROOT));
        assert_eq!(loader.open_mode(), OpenMode::Lazy);
    }

    #[test]
    fn test_missing_bundle_makes_no_native_call() {
        let runtime = Rc::new(RecordingRuntime::new());
        let dispatcher = Dispatcher::new(runtime.clone());
        let root = scratch_root("missing");
        let loader = FrameworkLoader::new(&root, OpenMode::Lazy);

        let err = loader.load(&dispatcher, "Nope").unwrap_err();
        assert_eq!(
            err,
            Error::FrameworkNotFound {
                name: "Nope".into(),
                path: root.join("Nope.framework"),
            }
        );
        assert!(runtime.calls().is_empty());
    }

    #[test]
    fn test_load_wraps_global_class_list() {
        let runtime = Rc::new(RecordingRuntime::new());
        let existing = runtime.define_class("NSObject");
        let dispatcher = Dispatcher::new(runtime.clone());

        let root = scratch_root("load");
        fs::create_dir_all(root.join("Kit.framework")).unwrap();
        let loader = FrameworkLoader::new(&root, OpenMode::Now);
        runtime.define_library(loader.resolve("Kit"), &["KitView"]);

        let framework = loader.load(&dispatcher, "Kit").unwrap();
        assert_eq!(framework.name(), "Kit");
        assert_eq!(framework.classes().names(), vec!["KitView", "NSObject"]);
        assert_eq!(framework.class("NSObject").unwrap().handle(), existing);

        assert_eq!(
            runtime.calls()[0],
            NativeCall::Open {
                path: root.join("Kit.framework/Kit"),
                mode: OpenMode::Now,
            }
        );
        assert_eq!(runtime.calls()[1], NativeCall::ClassList);
    }

    #[test]
    fn test_open_failure_propagates() {
        let runtime = Rc::new(RecordingRuntime::new());
        let dispatcher = Dispatcher::new(runtime.clone());

        let root = scratch_root("broken");
        fs::create_dir_all(root.join("Broken.framework")).unwrap();
        let loader = FrameworkLoader::new(&root, OpenMode::Lazy);
        runtime.fail_open(loader.resolve("Broken"), "not a mach-o file");

        let err = loader.load(&dispatcher, "Broken").unwrap_err();
        assert!(matches!(err, Error::LibraryOpenFailed { .. }));
        assert!(!runtime.calls().contains(&NativeCall::ClassList));
    }

    #[test]
    fn test_merge_overwrites_by_name() {
        let runtime = Rc::new(RecordingRuntime::new());
        let dispatcher = Dispatcher::new(runtime);

        let mut first = ClassTable::new();
        first.insert("A", dispatcher.wrap_class(Handle::from_word(1)));
        first.insert("B", dispatcher.wrap_class(Handle::from_word(2)));

        let mut second = ClassTable::new();
        second.insert("B", dispatcher.wrap_class(Handle::from_word(3)));

        first.merge(second);
        assert_eq!(first.len(), 2);
        assert_eq!(first.get("A").unwrap().handle(), Handle::from_word(1));
        assert_eq!(first.get("B").unwrap().handle(), Handle::from_word(3));
    }
}
