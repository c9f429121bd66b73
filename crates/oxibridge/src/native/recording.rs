//! An in-process [`NativeRuntime`] that records every primitive call.
//!
//! `RecordingRuntime` keeps a small class table with single inheritance,
//! per-class method tables holding trampolines, and instance-to-class
//! bookkeeping. A message send resolves in this order:
//!
//! 1. an installed trampoline found by walking the receiver's class chain
//!    (the trampoline receives the receiver followed by the arguments),
//! 2. a scripted failure or reply for `(receiver, selector)`, then for
//!    `selector` alone,
//! 3. the built-in `alloc`/`new` on classes and `init`/`class`/`self` on
//!    instances,
//! 4. otherwise the send fails with
//!    [`Error::DispatchFailed`] ("unrecognized selector").
//!
//! No internal borrow is held while a trampoline runs, so host methods may
//! send messages back into the same runtime.
//!
//! # Example
//!
//! ```rust
//! use std::rc::Rc;
//! use oxibridge::native::{NativeCall, RecordingRuntime};
//! use oxibridge::{Dispatcher, Message, Value};
//!
//! let runtime = Rc::new(RecordingRuntime::new());
//! let person = runtime.define_class("Person");
//!
//! let dispatcher = Dispatcher::new(runtime.clone());
//! let class = dispatcher.wrap_class(person);
//! let obj = class.send(Message::new("alloc")).unwrap();
//! assert!(obj.is_handle_wrapper());
//!
//! assert!(matches!(
//!     runtime.calls().last(),
//!     Some(NativeCall::MsgSend { selector, .. }) if selector == "alloc"
//! ));
//! ```

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use fxhash::FxHashMap;

use super::{NativeRuntime, OpenMode};
use crate::error::{Error, Result};
use crate::handle::{Handle, LibraryHandle, SelectorToken};
use crate::trampoline::Trampoline;
use crate::value::RawValue;

/// First handle word handed out; keeps handles clear of `nil`.
const FIRST_WORD: u64 = 0x1000;

/// Distance between consecutive handle words.
const WORD_STRIDE: u64 = 0x10;

/// One recorded primitive call.
#[derive(Clone, Debug, PartialEq)]
pub enum NativeCall {
    /// `open(path, mode)`.
    Open {
        /// Library path.
        path: PathBuf,
        /// Requested mode.
        mode: OpenMode,
    },
    /// `class_list()`.
    ClassList,
    /// `get_class(name)`.
    GetClass(String),
    /// `allocate_class_pair(superclass, name, extra_bytes)`.
    AllocateClassPair {
        /// Superclass handle.
        superclass: Handle,
        /// New class name.
        name: String,
        /// Extra instance storage.
        extra_bytes: usize,
    },
    /// `register_class_pair(class)`.
    RegisterClassPair(Handle),
    /// `add_method(class, selector, imp, types)`.
    AddMethod {
        /// Target class.
        class: Handle,
        /// Selector string.
        selector: String,
        /// Type encoding, as passed.
        types: String,
    },
    /// `register_name(name)`.
    RegisterName(String),
    /// `msg_send(receiver, selector, args)`.
    MsgSend {
        /// Receiver handle.
        receiver: Handle,
        /// Selector string.
        selector: String,
        /// Arguments as received.
        args: Vec<RawValue>,
    },
    /// `queue_create(label, attr)`.
    QueueCreate {
        /// Queue label.
        label: String,
        /// Attribute word.
        attr: i64,
    },
}

struct ClassEntry {
    name: String,
    superclass: Option<Handle>,
    registered: bool,
    methods: FxHashMap<SelectorToken, Rc<Trampoline>>,
}

#[derive(Clone)]
enum Scripted {
    Reply(RawValue),
    Fail(String),
}

#[derive(Default)]
struct State {
    next_word: u64,
    classes: FxHashMap<Handle, ClassEntry>,
    /// Registered class names in registration order.
    class_order: Vec<String>,
    class_names: FxHashMap<String, Handle>,
    instances: FxHashMap<Handle, Handle>,
    selectors: FxHashMap<String, SelectorToken>,
    selector_names: FxHashMap<SelectorToken, String>,
    replies: FxHashMap<String, Scripted>,
    object_replies: FxHashMap<(Handle, String), Scripted>,
    libraries: FxHashMap<PathBuf, Vec<String>>,
    open_failures: FxHashMap<PathBuf, String>,
    opened: Vec<PathBuf>,
    calls: Vec<NativeCall>,
}

impl State {
    fn fresh_handle(&mut self) -> Handle {
        if self.next_word == 0 {
            self.next_word = FIRST_WORD;
        }
        let handle = Handle::from_word(self.next_word);
        self.next_word += WORD_STRIDE;
        handle
    }

    fn insert_class(
        &mut self,
        name: &str,
        superclass: Option<Handle>,
        registered: bool,
    ) -> Handle {
        let handle = self.fresh_handle();
        self.classes.insert(
            handle,
            ClassEntry {
                name: name.to_string(),
                superclass,
                registered,
                methods: FxHashMap::default(),
            },
        );
        if registered {
            self.publish(name, handle);
        }
        handle
    }

    fn publish(&mut self, name: &str, handle: Handle) {
        if self.class_names.insert(name.to_string(), handle).is_none() {
            self.class_order.push(name.to_string());
        }
    }

    fn name_taken(&self, name: &str) -> bool {
        self.classes.values().any(|entry| entry.name == name)
    }

    fn find_method(
        &self,
        receiver: Handle,
        selector: SelectorToken,
    ) -> Option<Rc<Trampoline>> {
        let mut class = self.instances.get(&receiver).copied();
        while let Some(current) = class {
            let entry = self.classes.get(&current)?;
            if let Some(imp) = entry.methods.get(&selector) {
                return Some(Rc::clone(imp));
            }
            class = entry.superclass;
        }
        None
    }

    fn scripted(&self, receiver: Handle, selector: &str) -> Option<Scripted> {
        self.object_replies
            .get(&(receiver, selector.to_string()))
            .or_else(|| self.replies.get(selector))
            .cloned()
    }

    fn builtin(&mut self, receiver: Handle, selector: &str) -> Option<RawValue> {
        if self.classes.contains_key(&receiver) {
            return match selector {
                "alloc" | "new" => {
                    let instance = self.fresh_handle();
                    self.instances.insert(instance, receiver);
                    Some(instance.into())
                }
                "class" | "self" => Some(receiver.into()),
                _ => None,
            };
        }

        let class = self.instances.get(&receiver).copied()?;
        match selector {
            "init" | "self" => Some(receiver.into()),
            "class" => Some(class.into()),
            _ => None,
        }
    }
}

/// In-process runtime that records every primitive call.
#[derive(Default)]
pub struct RecordingRuntime {
    state: RefCell<State>,
}

impl RecordingRuntime {
    /// Creates an empty runtime with no classes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defines and registers a root class.
    pub fn define_class(&self, name: &str) -> Handle {
        self.state.borrow_mut().insert_class(name, None, true)
    }

    /// Defines and registers a class deriving from `superclass`.
    pub fn define_subclass(&self, name: &str, superclass: Handle) -> Handle {
        self.state
            .borrow_mut()
            .insert_class(name, Some(superclass), true)
    }

    /// Makes `classes` appear in the class table once `path` is opened.
    pub fn define_library(&self, path: impl Into<PathBuf>, classes: &[&str]) {
        self.state.borrow_mut().libraries.insert(
            path.into(),
            classes.iter().map(ToString::to_string).collect(),
        );
    }

    /// Makes opening `path` fail with `reason`.
    pub fn fail_open(&self, path: impl Into<PathBuf>, reason: &str) {
        self.state
            .borrow_mut()
            .open_failures
            .insert(path.into(), reason.to_string());
    }

    /// Creates an instance of `class` without sending any message.
    pub fn instantiate(&self, class: Handle) -> Handle {
        let mut state = self.state.borrow_mut();
        let instance = state.fresh_handle();
        state.instances.insert(instance, class);
        instance
    }

    /// Scripts the reply to `selector` for every receiver.
    pub fn reply(&self, selector: &str, value: RawValue) {
        self.state
            .borrow_mut()
            .replies
            .insert(selector.to_string(), Scripted::Reply(value));
    }

    /// Scripts the reply to `selector` for one receiver.
    pub fn reply_to(&self, receiver: Handle, selector: &str, value: RawValue) {
        self.state
            .borrow_mut()
            .object_replies
            .insert((receiver, selector.to_string()), Scripted::Reply(value));
    }

    /// Makes every send of `selector` fail with `reason`.
    pub fn fail_send(&self, selector: &str, reason: &str) {
        self.state
            .borrow_mut()
            .replies
            .insert(selector.to_string(), Scripted::Fail(reason.to_string()));
    }

    /// Returns a copy of all recorded calls, oldest first.
    pub fn calls(&self) -> Vec<NativeCall> {
        self.state.borrow().calls.clone()
    }

    /// Forgets all recorded calls.
    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    /// Returns the recorded message sends as `(receiver, selector, args)`.
    pub fn sends(&self) -> Vec<(Handle, String, Vec<RawValue>)> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter_map(|call| match call {
                NativeCall::MsgSend {
                    receiver,
                    selector,
                    args,
                } => Some((*receiver, selector.clone(), args.clone())),
                _ => None,
            })
            .collect()
    }

    /// Returns the number of `open` calls recorded.
    pub fn open_count(&self) -> usize {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|call| matches!(call, NativeCall::Open { .. }))
            .count()
    }

    /// Returns the name of a class handle.
    pub fn class_name(&self, class: Handle) -> Option<String> {
        self.state
            .borrow()
            .classes
            .get(&class)
            .map(|entry| entry.name.clone())
    }

    /// Returns the superclass of a class handle.
    pub fn superclass_of(&self, class: Handle) -> Option<Handle> {
        self.state
            .borrow()
            .classes
            .get(&class)
            .and_then(|entry| entry.superclass)
    }

    /// Returns `true` if the class is visible to `get_class`.
    pub fn is_registered(&self, class: Handle) -> bool {
        self.state
            .borrow()
            .classes
            .get(&class)
            .is_some_and(|entry| entry.registered)
    }

    /// Returns the class of an instance created by this runtime.
    pub fn class_of(&self, instance: Handle) -> Option<Handle> {
        self.state.borrow().instances.get(&instance).copied()
    }

    /// Returns the trampoline installed directly on `class` for `selector`.
    pub fn method(&self, class: Handle, selector: &str) -> Option<Rc<Trampoline>> {
        let state = self.state.borrow();
        let token = state.selectors.get(selector)?;
        state.classes.get(&class)?.methods.get(token).cloned()
    }

    fn record(&self, call: NativeCall) {
        self.state.borrow_mut().calls.push(call);
    }
}

impl NativeRuntime for RecordingRuntime {
    fn open(&self, path: &Path, mode: OpenMode) -> Result<LibraryHandle> {
        self.record(NativeCall::Open {
            path: path.to_path_buf(),
            mode,
        });

        let mut state = self.state.borrow_mut();
        if let Some(reason) = state.open_failures.get(path) {
            return Err(Error::LibraryOpenFailed {
                path: path.to_path_buf(),
                reason: reason.clone(),
            });
        }

        if let Some(classes) = state.libraries.get(path).cloned() {
            for name in classes {
                if !state.class_names.contains_key(&name) {
                    state.insert_class(&name, None, true);
                }
            }
        }

        let index = match state.opened.iter().position(|p| p == path) {
            Some(index) => index,
            None => {
                state.opened.push(path.to_path_buf());
                state.opened.len() - 1
            }
        };
        Ok(LibraryHandle::new(index as u64 + 1))
    }

    fn class_list(&self) -> Vec<String> {
        self.record(NativeCall::ClassList);
        self.state.borrow().class_order.clone()
    }

    fn get_class(&self, name: &str) -> Option<Handle> {
        self.record(NativeCall::GetClass(name.to_string()));
        self.state.borrow().class_names.get(name).copied()
    }

    fn allocate_class_pair(
        &self,
        superclass: Handle,
        name: &str,
        extra_bytes: usize,
    ) -> Option<Handle> {
        self.record(NativeCall::AllocateClassPair {
            superclass,
            name: name.to_string(),
            extra_bytes,
        });

        let mut state = self.state.borrow_mut();
        if !state.classes.contains_key(&superclass) || state.name_taken(name) {
            return None;
        }
        Some(state.insert_class(name, Some(superclass), false))
    }

    fn register_class_pair(&self, class: Handle) {
        self.record(NativeCall::RegisterClassPair(class));

        let mut state = self.state.borrow_mut();
        let Some(entry) = state.classes.get_mut(&class) else {
            return;
        };
        if entry.registered {
            return;
        }
        entry.registered = true;
        let name = entry.name.clone();
        state.publish(&name, class);
    }

    fn add_method(
        &self,
        class: Handle,
        selector: SelectorToken,
        imp: Rc<Trampoline>,
        types: &str,
    ) -> bool {
        let mut state = self.state.borrow_mut();
        let selector_name = state
            .selector_names
            .get(&selector)
            .cloned()
            .unwrap_or_default();
        state.calls.push(NativeCall::AddMethod {
            class,
            selector: selector_name,
            types: types.to_string(),
        });

        let Some(entry) = state.classes.get_mut(&class) else {
            return false;
        };
        if entry.methods.contains_key(&selector) {
            return false;
        }
        entry.methods.insert(selector, imp);
        true
    }

    fn register_name(&self, name: &str) -> Option<SelectorToken> {
        self.record(NativeCall::RegisterName(name.to_string()));

        if name.is_empty() {
            return None;
        }

        let mut state = self.state.borrow_mut();
        if let Some(token) = state.selectors.get(name) {
            return Some(*token);
        }
        let token = SelectorToken::new(state.selectors.len() as u64 + 1);
        state.selectors.insert(name.to_string(), token);
        state.selector_names.insert(token, name.to_string());
        Some(token)
    }

    fn msg_send(
        &self,
        receiver: Handle,
        selector: SelectorToken,
        args: &[RawValue],
    ) -> Result<RawValue> {
        let (name, method) = {
            let mut state = self.state.borrow_mut();
            let name = state
                .selector_names
                .get(&selector)
                .cloned()
                .unwrap_or_else(|| format!("<unregistered {:#x}>", selector.raw()));
            state.calls.push(NativeCall::MsgSend {
                receiver,
                selector: name.clone(),
                args: args.to_vec(),
            });
            let method = state.find_method(receiver, selector);
            (name, method)
        };

        if let Some(trampoline) = method {
            let mut native_args = Vec::with_capacity(args.len() + 1);
            native_args.push(RawValue::from(receiver));
            native_args.extend_from_slice(args);
            return Ok(trampoline.invoke(native_args));
        }

        let mut state = self.state.borrow_mut();
        match state.scripted(receiver, &name) {
            Some(Scripted::Reply(value)) => return Ok(value),
            Some(Scripted::Fail(reason)) => {
                return Err(Error::DispatchFailed {
                    selector: name,
                    reason,
                });
            }
            None => {}
        }

        state.builtin(receiver, &name).ok_or_else(|| Error::DispatchFailed {
            reason: format!("unrecognized selector sent to {receiver:?}"),
            selector: name,
        })
    }

    fn queue_create(&self, label: &str, attr: i64) -> Option<Handle> {
        let mut state = self.state.borrow_mut();
        state.calls.push(NativeCall::QueueCreate {
            label: label.to_string(),
            attr,
        });
        Some(state.fresh_handle())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_class_is_visible() {
        let rt = RecordingRuntime::new();
        let cls = rt.define_class("NSObject");

        assert_eq!(rt.get_class("NSObject"), Some(cls));
        assert_eq!(rt.class_list(), vec!["NSObject".to_string()]);
        assert_eq!(rt.class_name(cls).as_deref(), Some("NSObject"));
    }

    #[test]
    fn test_allocate_class_pair_is_unregistered() {
        let rt = RecordingRuntime::new();
        let root = rt.define_class("NSObject");

        let child = rt.allocate_class_pair(root, "Child", 0).unwrap();
        assert!(!rt.is_registered(child));
        assert_eq!(rt.get_class("Child"), None);

        rt.register_class_pair(child);
        assert_eq!(rt.get_class("Child"), Some(child));
    }

    #[test]
    fn test_allocate_class_pair_rejects_duplicate_name() {
        let rt = RecordingRuntime::new();
        let root = rt.define_class("NSObject");

        assert!(rt.allocate_class_pair(root, "NSObject", 0).is_none());
        assert!(rt.allocate_class_pair(Handle::from_word(1), "Other", 0).is_none());
    }

    #[test]
    fn test_register_name_interns() {
        let rt = RecordingRuntime::new();
        let a = rt.register_name("init").unwrap();
        let b = rt.register_name("init").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, rt.register_name("description").unwrap());
        assert_eq!(rt.register_name(""), None);
    }

    #[test]
    fn test_builtin_alloc_init() {
        let rt = RecordingRuntime::new();
        let cls = rt.define_class("Thing");
        let alloc = rt.register_name("alloc").unwrap();
        let init = rt.register_name("init").unwrap();

        let obj = rt.msg_send(cls, alloc, &[]).unwrap().as_handle().unwrap();
        assert_eq!(rt.class_of(obj), Some(cls));

        let same = rt.msg_send(obj, init, &[]).unwrap();
        assert_eq!(same, RawValue::from(obj));
    }

    #[test]
    fn test_unrecognized_selector_fails() {
        let rt = RecordingRuntime::new();
        let cls = rt.define_class("Thing");
        let sel = rt.register_name("frobnicate").unwrap();

        let err = rt.msg_send(cls, sel, &[]).unwrap_err();
        assert!(matches!(err, Error::DispatchFailed { selector, .. } if selector == "frobnicate"));
    }

    #[test]
    fn test_object_reply_wins_over_selector_reply() {
        let rt = RecordingRuntime::new();
        let obj = Handle::from_word(0x42);
        let sel = rt.register_name("count").unwrap();

        rt.reply("count", RawValue::Int(1));
        rt.reply_to(obj, "count", RawValue::Int(2));

        assert_eq!(rt.msg_send(obj, sel, &[]).unwrap(), RawValue::Int(2));
        assert_eq!(
            rt.msg_send(Handle::from_word(0x43), sel, &[]).unwrap(),
            RawValue::Int(1)
        );
    }

    #[test]
    fn test_library_classes_appear_on_open() {
        let rt = RecordingRuntime::new();
        rt.define_library("/lib/Foo", &["FooView", "FooModel"]);

        assert!(rt.get_class("FooView").is_none());
        let lib = rt.open(Path::new("/lib/Foo"), OpenMode::Lazy).unwrap();
        assert_eq!(lib, rt.open(Path::new("/lib/Foo"), OpenMode::Lazy).unwrap());
        assert!(rt.get_class("FooView").is_some());
        assert_eq!(rt.open_count(), 2);
    }

    #[test]
    fn test_open_failure() {
        let rt = RecordingRuntime::new();
        rt.fail_open("/lib/Broken", "bad mach-o");

        let err = rt.open(Path::new("/lib/Broken"), OpenMode::Now).unwrap_err();
        assert!(matches!(err, Error::LibraryOpenFailed { reason, .. } if reason == "bad mach-o"));
    }
}
