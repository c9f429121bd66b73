//! Framework import tests
//!
//! Run with: `cargo test --test framework_test`

mod common;

use std::path::Path;
use std::rc::Rc;

use common::{bridge_with_config, fake_framework, scratch_dir};
use oxibridge::native::{NativeCall, NativeRuntime, OpenMode, RecordingRuntime};
use oxibridge::{
    Bridge, BridgeConfig, ClassTable, Error, Handle, LibraryHandle, RawValue, Result,
    SelectorToken, Trampoline,
};
use oxibridge_log::Level;

fn config_at(root: &Path) -> BridgeConfig {
    BridgeConfig {
        frameworks_root: root.to_path_buf(),
        ..BridgeConfig::default()
    }
}

#[test]
fn test_missing_framework_opens_nothing() {
    let root = scratch_dir("missing");
    let (runtime, bridge) = bridge_with_config(config_at(&root));

    let err = bridge.import_framework("DoesNotExist").unwrap_err();

    assert!(matches!(err, Error::FrameworkNotFound { ref name, .. } if name == "DoesNotExist"));
    assert_eq!(runtime.open_count(), 0);
    assert!(runtime.calls().is_empty());
}

#[test]
fn test_import_opens_resolved_binary_lazily() {
    let root = scratch_dir("lazy");
    let binary = fake_framework(&root, "Foundation");
    let (runtime, bridge) = bridge_with_config(config_at(&root));
    runtime.define_library(&binary, &["NSArray", "NSDictionary"]);

    let framework = bridge.import_framework("Foundation").unwrap();

    assert_eq!(
        runtime.calls()[0],
        NativeCall::Open {
            path: binary,
            mode: OpenMode::Lazy,
        }
    );
    assert!(framework.class("NSArray").is_some());
    assert!(framework.class("NSDictionary").is_some());
}

#[test]
fn test_import_sees_every_loaded_class() {
    let root = scratch_dir("global");
    let binary = fake_framework(&root, "AppKit");
    let (runtime, bridge) = bridge_with_config(config_at(&root));
    runtime.define_library(&binary, &["NSView"]);

    let framework = bridge.import_framework("AppKit").unwrap();

    // NSObject and NSString were loaded before the import.
    assert_eq!(
        framework.classes().names(),
        vec!["NSObject", "NSString", "NSView"]
    );
}

#[test]
fn test_imported_class_is_usable() {
    let root = scratch_dir("usable");
    let binary = fake_framework(&root, "Kit");
    let (runtime, bridge) = bridge_with_config(config_at(&root));
    runtime.define_library(&binary, &["KitCounter"]);
    runtime.reply("count", RawValue::Int(3));

    let framework = bridge.import_framework("Kit").unwrap();
    let counter = framework.class("KitCounter").unwrap();
    let count = counter.send(oxibridge::Message::new("count")).unwrap();

    assert_eq!(count.as_int(), Some(3));
    assert_eq!(runtime.class_name(counter.handle()).as_deref(), Some("KitCounter"));
}

#[test]
fn test_merged_tables_overwrite_by_name() {
    let root = scratch_dir("merge");
    let first_bin = fake_framework(&root, "First");
    let second_bin = fake_framework(&root, "Second");
    let (runtime, bridge) = bridge_with_config(config_at(&root));
    runtime.define_library(&first_bin, &["FirstOnly"]);
    runtime.define_library(&second_bin, &["SecondOnly"]);

    let mut all = ClassTable::new();
    all.merge(bridge.import_framework("First").unwrap().into_classes());
    all.merge(bridge.import_framework("Second").unwrap().into_classes());

    assert!(all.contains("FirstOnly"));
    assert!(all.contains("SecondOnly"));
    assert_eq!(all.len(), 4);
}

#[test]
fn test_open_failure_is_reported() {
    let root = scratch_dir("broken");
    let binary = fake_framework(&root, "Broken");
    let (runtime, bridge) = bridge_with_config(config_at(&root));
    runtime.fail_open(&binary, "code signature invalid");

    let err = bridge.import_framework("Broken").unwrap_err();
    assert_eq!(
        err,
        Error::LibraryOpenFailed {
            path: binary,
            reason: "code signature invalid".into(),
        }
    );
}

/// Lists one class name that never resolves.
struct GhostRuntime {
    inner: RecordingRuntime,
}

impl NativeRuntime for GhostRuntime {
    fn open(&self, path: &Path, mode: OpenMode) -> Result<LibraryHandle> {
        self.inner.open(path, mode)
    }

    fn class_list(&self) -> Vec<String> {
        let mut names = self.inner.class_list();
        names.push("GhostClass".to_string());
        names
    }

    fn get_class(&self, name: &str) -> Option<Handle> {
        self.inner.get_class(name)
    }

    fn allocate_class_pair(
        &self,
        superclass: Handle,
        name: &str,
        extra_bytes: usize,
    ) -> Option<Handle> {
        self.inner.allocate_class_pair(superclass, name, extra_bytes)
    }

    fn register_class_pair(&self, class: Handle) {
        self.inner.register_class_pair(class);
    }

    fn add_method(
        &self,
        class: Handle,
        selector: SelectorToken,
        imp: Rc<Trampoline>,
        types: &str,
    ) -> bool {
        self.inner.add_method(class, selector, imp, types)
    }

    fn register_name(&self, name: &str) -> Option<SelectorToken> {
        self.inner.register_name(name)
    }

    fn msg_send(
        &self,
        receiver: Handle,
        selector: SelectorToken,
        args: &[RawValue],
    ) -> Result<RawValue> {
        self.inner.msg_send(receiver, selector, args)
    }

    fn queue_create(&self, label: &str, attr: i64) -> Option<Handle> {
        self.inner.queue_create(label, attr)
    }
}

#[test]
fn test_unresolvable_class_is_skipped_with_warning() {
    let root = scratch_dir("ghost");
    fake_framework(&root, "Haunted");

    let inner = RecordingRuntime::new();
    inner.define_class("NSObject");
    let bridge = Bridge::new(Rc::new(GhostRuntime { inner }), config_at(&root));

    let cap = oxibridge_log::capture();
    let framework = bridge.import_framework("Haunted").unwrap();

    assert!(framework.class("NSObject").is_some());
    assert!(framework.class("GhostClass").is_none());
    assert!(cap.contains(Level::Warn, "GhostClass"));
}
