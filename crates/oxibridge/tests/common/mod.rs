// Common fixtures for the oxibridge integration tests
//
// Every test builds its own RecordingRuntime so recorded calls never mix
// between tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use oxibridge::native::RecordingRuntime;
use oxibridge::{Bridge, BridgeConfig, ClassRef, Dispatcher, Id, Message};

static SCRATCH_ID: AtomicUsize = AtomicUsize::new(0);

/// A runtime with `NSObject` and `NSString` defined, and a bridge over it.
pub fn bridge_with_foundation() -> (Rc<RecordingRuntime>, Bridge) {
    bridge_with_config(BridgeConfig::default())
}

/// Like [`bridge_with_foundation`], with an explicit configuration.
pub fn bridge_with_config(config: BridgeConfig) -> (Rc<RecordingRuntime>, Bridge) {
    let runtime = Rc::new(RecordingRuntime::new());
    runtime.define_class("NSObject");
    runtime.define_class("NSString");
    let bridge = Bridge::new(runtime.clone(), config);
    runtime.clear_calls();
    (runtime, bridge)
}

/// A dispatcher over a fresh runtime plus a wrapped root class.
pub fn dispatcher_with_root(name: &str) -> (Rc<RecordingRuntime>, Rc<Dispatcher>, ClassRef) {
    let runtime = Rc::new(RecordingRuntime::new());
    let dispatcher = Dispatcher::new(runtime.clone());
    let root = dispatcher.wrap_class(runtime.define_class(name));
    runtime.clear_calls();
    (runtime, dispatcher, root)
}

/// Sends `new` to `class` and unwraps the resulting object.
pub fn instantiate(class: &ClassRef) -> Id {
    class
        .send(Message::new("new"))
        .expect("new should succeed")
        .as_object()
        .cloned()
        .expect("new should return an object")
}

/// Creates an empty, uniquely named directory under the system temp dir.
pub fn scratch_dir(tag: &str) -> PathBuf {
    let id = SCRATCH_ID.fetch_add(1, Ordering::SeqCst);
    let dir = std::env::temp_dir().join(format!(
        "oxibridge-{tag}-{}-{id}",
        std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("scratch dir should be creatable");
    dir
}

/// Creates `<root>/<name>.framework` so the loader finds the bundle.
pub fn fake_framework(root: &std::path::Path, name: &str) -> PathBuf {
    let bundle = root.join(format!("{name}.framework"));
    std::fs::create_dir_all(&bundle).expect("bundle dir should be creatable");
    bundle.join(name)
}
