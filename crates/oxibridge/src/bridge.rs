//! The host-facing entry point.
//!
//! A [`Bridge`] owns the shared [`Dispatcher`] and a [`FrameworkLoader`]
//! built from its [`BridgeConfig`]. Everything the host does starts here:
//! importing frameworks, looking up classes, constructing strings, wrapping
//! handles it obtained elsewhere, and creating dispatch queues.
//!
//! # Example
//!
//! ```rust
//! use std::rc::Rc;
//! use oxibridge::native::RecordingRuntime;
//! use oxibridge::{Bridge, BridgeConfig, Message, RawValue};
//!
//! let runtime = Rc::new(RecordingRuntime::new());
//! runtime.define_class("NSString");
//! runtime.reply("stringWithUTF8String:", RawValue::Bytes(vec![0x10, 0, 0, 0, 0, 0, 0, 0]));
//! runtime.reply("length", RawValue::Int(5));
//!
//! let bridge = Bridge::new(runtime, BridgeConfig::default());
//! let hello = bridge.construct("hello").unwrap();
//! let len = hello.send(Message::new("length")).unwrap();
//! assert_eq!(len.as_int(), Some(5));
//! ```

use std::rc::Rc;

use oxibridge_log::{debug, set_level};

use crate::class::ClassRef;
use crate::config::BridgeConfig;
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::framework::{Framework, FrameworkLoader};
use crate::handle::Handle;
use crate::message::Message;
use crate::native::NativeRuntime;
use crate::object::Id;
use crate::value::Value;

const STRING_CLASS: &str = "NSString";
const STRING_FACTORY: &str = "stringWithUTF8String";

/// Attribute word of a serial dispatch queue.
const SERIAL_QUEUE: i64 = 0;

/// Entry point into a native object runtime.
pub struct Bridge {
    dispatcher: Rc<Dispatcher>,
    loader: FrameworkLoader,
    config: BridgeConfig,
}

impl Bridge {
    /// Creates a bridge over `runtime`.
    ///
    /// If `config.log_level` is set it becomes the global log level.
    pub fn new(runtime: Rc<dyn NativeRuntime>, config: BridgeConfig) -> Self {
        if let Some(level) = config.log_level {
            set_level(level);
        }

        let dispatcher = Dispatcher::with_policy(runtime, config.callback_policy);
        let loader = config.loader();
        debug!(
            "bridge ready: frameworks under {}, {:?} opens, {:?} callbacks",
            loader.frameworks_root().display(),
            config.open_mode,
            config.callback_policy
        );

        Bridge {
            dispatcher,
            loader,
            config,
        }
    }

    /// Creates a bridge over the process's Objective-C runtime, configured
    /// from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if an environment variable holds an
    /// unparseable value.
    #[cfg(target_os = "macos")]
    pub fn system() -> Result<Self> {
        let config = BridgeConfig::from_env()?;
        Ok(Bridge::new(Rc::new(crate::native::SystemRuntime::new()), config))
    }

    /// The configuration this bridge was created with.
    #[must_use]
    pub const fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// The shared dispatcher.
    #[must_use]
    pub const fn dispatcher(&self) -> &Rc<Dispatcher> {
        &self.dispatcher
    }

    /// The framework loader.
    #[must_use]
    pub const fn loader(&self) -> &FrameworkLoader {
        &self.loader
    }

    /// Creates a native string from `literal`.
    ///
    /// Sends `stringWithUTF8String:` to `NSString`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClassNotFound`] if `NSString` is not loaded,
    /// [`Error::NotAnObject`] if the reply is not an object, or any dispatch
    /// error.
    pub fn construct(&self, literal: &str) -> Result<Id> {
        let class = self.class(STRING_CLASS)?;
        let reply = class.send(Message::new(STRING_FACTORY).arg(literal))?;
        match reply {
            Value::Object(id) => Ok(id),
            Value::Class(class) => Ok(class.as_id().clone()),
            _ => Err(Error::NotAnObject {
                selector: format!("{STRING_FACTORY}:"),
            }),
        }
    }

    /// Imports the framework `name`.
    ///
    /// # Errors
    ///
    /// See [`FrameworkLoader::load`].
    pub fn import_framework(&self, name: &str) -> Result<Framework> {
        self.loader.load(&self.dispatcher, name)
    }

    /// Looks up a class by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClassNotFound`] if the runtime does not know `name`.
    pub fn class(&self, name: &str) -> Result<ClassRef> {
        self.dispatcher
            .runtime()
            .get_class(name)
            .map(|handle| self.dispatcher.wrap_class(handle))
            .ok_or_else(|| Error::ClassNotFound {
                name: name.to_string(),
            })
    }

    /// Wraps an object handle obtained outside the bridge.
    #[must_use]
    pub fn wrap(&self, handle: Handle) -> Id {
        self.dispatcher.wrap(handle)
    }

    /// Wraps a class handle obtained outside the bridge.
    #[must_use]
    pub fn wrap_class(&self, handle: Handle) -> ClassRef {
        self.dispatcher.wrap_class(handle)
    }

    /// Creates a serial dispatch queue labelled `label`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueueCreationFailed`] if the runtime returns no
    /// queue.
    pub fn queue_create(&self, label: &str) -> Result<Id> {
        self.dispatcher
            .runtime()
            .queue_create(label, SERIAL_QUEUE)
            .filter(|queue| !queue.is_nil())
            .map(|queue| self.dispatcher.wrap(queue))
            .ok_or_else(|| Error::QueueCreationFailed {
                label: label.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::{NativeCall, RecordingRuntime};
    use crate::trampoline::CallbackPolicy;
    use crate::value::RawValue;

    fn bridge() -> (Rc<RecordingRuntime>, Bridge) {
        let runtime = Rc::new(RecordingRuntime::new());
        let bridge = Bridge::new(runtime.clone(), BridgeConfig::default());
        (runtime, bridge)
    }

    #[test]
    fn test_construct_sends_factory() {
        let (runtime, bridge) = bridge();
        let string_class = runtime.define_class("NSString");
        let string = Handle::from_word(0xabc);
        runtime.reply("stringWithUTF8String:", string.into());

        let id = bridge.construct("hi").unwrap();
        assert_eq!(id.handle(), string);
        assert_eq!(
            runtime.sends(),
            vec![(
                string_class,
                "stringWithUTF8String:".to_string(),
                vec![RawValue::Str("hi".into())]
            )]
        );
    }

    #[test]
    fn test_construct_without_string_class() {
        let (_runtime, bridge) = bridge();
        assert_eq!(
            bridge.construct("hi").unwrap_err(),
            Error::ClassNotFound {
                name: "NSString".into()
            }
        );
    }

    #[test]
    fn test_construct_rejects_non_object_reply() {
        let (runtime, bridge) = bridge();
        runtime.define_class("NSString");
        runtime.reply("stringWithUTF8String:", RawValue::Int(0));

        assert_eq!(
            bridge.construct("hi").unwrap_err(),
            Error::NotAnObject {
                selector: "stringWithUTF8String:".into()
            }
        );
    }

    #[test]
    fn test_class_lookup() {
        let (runtime, bridge) = bridge();
        let cls = runtime.define_class("NSArray");

        assert_eq!(bridge.class("NSArray").unwrap().handle(), cls);
        assert!(matches!(
            bridge.class("NSMissing"),
            Err(Error::ClassNotFound { name }) if name == "NSMissing"
        ));
    }

    #[test]
    fn test_queue_create_is_serial() {
        let (runtime, bridge) = bridge();
        let queue = bridge.queue_create("com.example.work").unwrap();

        assert!(!queue.handle().is_nil());
        assert_eq!(
            runtime.calls(),
            vec![NativeCall::QueueCreate {
                label: "com.example.work".into(),
                attr: 0,
            }]
        );
    }

    #[test]
    fn test_policy_comes_from_config() {
        let runtime = Rc::new(RecordingRuntime::new());
        let config = BridgeConfig {
            callback_policy: CallbackPolicy::ErrorCode(-2),
            ..BridgeConfig::default()
        };
        let bridge = Bridge::new(runtime, config);
        assert_eq!(
            bridge.dispatcher().callback_policy(),
            CallbackPolicy::ErrorCode(-2)
        );
    }
}
