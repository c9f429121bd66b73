//! `oxibridge`: dynamic message dispatch into Objective-C style runtimes
//!
//! `oxibridge` lets a Rust host talk to a runtime of classes and selectors
//! without static bindings. It provides:
//!
//! - **Selector construction** from positional call tokens
//!   (`"initWith", name, "andAge", 30` becomes `initWith:andAge:`)
//! - **Late-bound dispatch** through a single generic send, with eight-byte
//!   results wrapped as callable objects
//! - **Class extension** with methods implemented by Rust closures, whose
//!   failures never unwind into native code
//! - **Framework import** that opens a bundle binary and wraps the classes
//!   the runtime then knows
//!
//! # Architecture
//!
//! - **Host layer**: [`Bridge`], [`Id`], [`ClassRef`], [`Message`], [`Value`]
//! - **Dispatch layer**: [`Dispatcher`], [`Trampoline`], [`FrameworkLoader`]
//! - **Native layer**: the [`native::NativeRuntime`] trait, with an
//!   in-process [`native::RecordingRuntime`] and, on macOS, a
//!   `native::SystemRuntime` over `libobjc`
//!
//! Wrappers share their dispatcher through `Rc` and are therefore confined
//! to one thread.
//!
//! # Example
//!
//! ```rust
//! use std::rc::Rc;
//! use oxibridge::native::RecordingRuntime;
//! use oxibridge::{Bridge, BridgeConfig, Message, Value};
//!
//! let runtime = Rc::new(RecordingRuntime::new());
//! runtime.define_class("NSObject");
//!
//! let bridge = Bridge::new(runtime, BridgeConfig::default());
//! let greeter = bridge.class("NSObject").unwrap().extend("Greeter").unwrap();
//! greeter
//!     .add_method("greet:", "@@:@", |args| Ok(args[1].clone()))
//!     .unwrap();
//! greeter.register();
//!
//! let obj = greeter.send(Message::new("new")).unwrap();
//! let echoed = obj
//!     .as_object()
//!     .unwrap()
//!     .send_tokens("greet", [Value::from("hi")])
//!     .unwrap();
//! assert_eq!(echoed, Value::from("hi"));
//! ```

pub mod bridge;
pub mod class;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod framework;
pub mod handle;
pub mod message;
pub mod native;
pub mod object;
pub mod trampoline;
pub mod value;

// Re-export commonly used types
pub use bridge::Bridge;
pub use class::ClassRef;
pub use config::BridgeConfig;
pub use dispatch::Dispatcher;
pub use error::{CallbackError, Error, Result};
pub use framework::{ClassTable, Framework, FrameworkLoader};
pub use handle::{Handle, LibraryHandle, SelectorToken};
pub use message::Message;
pub use native::OpenMode;
pub use object::Id;
pub use trampoline::{CallbackPolicy, MethodResult, Trampoline};
pub use value::{RawValue, Value};
