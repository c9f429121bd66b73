//! The process's Objective-C runtime (macOS).
//!
//! [`SystemRuntime`] implements [`NativeRuntime`] over `libobjc` and
//! `libdispatch`, with libraries opened through `libloading`.
//!
//! # Calling convention
//!
//! `objc_msgSend` is called through typed function pointers with up to
//! [`MAX_ARGS`] word-sized arguments. Integers, booleans, eight-byte handles
//! and strings (as NUL-terminated copies kept alive for the call) are
//! accepted; floating point and other buffers are rejected before the send.
//! The return type is read from the receiver's method encoding: `void`,
//! integers, `float`/`double`, C strings and object-like words are
//! supported, struct returns are not.
//!
//! # Installed methods
//!
//! Methods added through [`add_method`](NativeRuntime::add_method) are
//! backed by one `extern "C"` entry point per arity. The entry point looks up
//! the trampoline for `(class, selector)` in a thread-local table, walking
//! superclasses, so a callback delivered on another thread finds nothing and
//! returns zero. Only signatures whose arguments and return value travel in
//! general purpose registers can be installed.

use std::cell::RefCell;
use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::mem;
use std::path::Path;
use std::rc::Rc;

use fxhash::FxHashMap;
use libloading::os::unix::{Library, RTLD_GLOBAL, RTLD_LAZY, RTLD_LOCAL, RTLD_NOW};
use oxibridge_log::{debug, warn};

use super::encoding::{Signature, TypeCode, return_type};
use super::{NativeRuntime, OpenMode};
use crate::error::{Error, Result};
use crate::handle::{Handle, LibraryHandle, SelectorToken};
use crate::trampoline::Trampoline;
use crate::value::RawValue;

/// Maximum number of arguments of a send or an installed method.
pub const MAX_ARGS: usize = 6;

type ObjcId = *mut c_void;
type ObjcClass = *mut c_void;
type Sel = *const c_void;
type Method = *const c_void;

// SAFETY: declarations match the Objective-C Runtime Reference. Every
// function is called with pointers obtained from the runtime itself or with
// NUL-terminated strings owned for the duration of the call.
#[link(name = "objc")]
unsafe extern "C" {
    fn objc_getClassList(buffer: *mut ObjcClass, count: c_int) -> c_int;
    fn objc_getClass(name: *const c_char) -> ObjcClass;
    fn objc_allocateClassPair(
        superclass: ObjcClass,
        name: *const c_char,
        extra_bytes: usize,
    ) -> ObjcClass;
    fn objc_registerClassPair(cls: ObjcClass);
    fn class_getName(cls: ObjcClass) -> *const c_char;
    fn class_getSuperclass(cls: ObjcClass) -> ObjcClass;
    fn class_getInstanceMethod(cls: ObjcClass, name: Sel) -> Method;
    fn class_respondsToSelector(cls: ObjcClass, name: Sel) -> i8;
    fn class_addMethod(cls: ObjcClass, name: Sel, imp: *const c_void, types: *const c_char)
    -> i8;
    fn method_getTypeEncoding(method: Method) -> *const c_char;
    fn object_getClass(obj: ObjcId) -> ObjcClass;
    fn sel_registerName(name: *const c_char) -> Sel;
    fn sel_getName(sel: Sel) -> *const c_char;
    fn objc_msgSend();
}

// SAFETY: libdispatch is part of libSystem, which every macOS process links.
unsafe extern "C" {
    fn dispatch_queue_create(label: *const c_char, attr: *mut c_void) -> *mut c_void;
}

/// Binds `objc_msgSend` to a concrete signature and calls it with one word
/// per argument.
macro_rules! typed_send {
    ($name:ident -> $ret:ty) => {
        /// # Safety
        ///
        /// `receiver` must be `nil` or a live object, `sel` a registered
        /// selector whose implementation takes `words.len()` word arguments
        /// and returns a value of the given type.
        unsafe fn $name(receiver: ObjcId, sel: Sel, words: &[usize]) -> $ret {
            let send = objc_msgSend as unsafe extern "C" fn();
            // SAFETY: objc_msgSend jumps to the method implementation with
            // the registers untouched, so it takes the implementation's
            // signature; the caller guarantees that signature.
            unsafe {
                match *words {
                    [] => mem::transmute::<unsafe extern "C" fn(), unsafe extern "C" fn(ObjcId, Sel) -> $ret>(send)(receiver, sel),
                    [a] => mem::transmute::<unsafe extern "C" fn(), unsafe extern "C" fn(ObjcId, Sel, usize) -> $ret>(send)(receiver, sel, a),
                    [a, b] => mem::transmute::<unsafe extern "C" fn(), unsafe extern "C" fn(ObjcId, Sel, usize, usize) -> $ret>(send)(receiver, sel, a, b),
                    [a, b, c] => mem::transmute::<unsafe extern "C" fn(), unsafe extern "C" fn(ObjcId, Sel, usize, usize, usize) -> $ret>(send)(receiver, sel, a, b, c),
                    [a, b, c, d] => mem::transmute::<unsafe extern "C" fn(), unsafe extern "C" fn(ObjcId, Sel, usize, usize, usize, usize) -> $ret>(send)(receiver, sel, a, b, c, d),
                    [a, b, c, d, e] => mem::transmute::<unsafe extern "C" fn(), unsafe extern "C" fn(ObjcId, Sel, usize, usize, usize, usize, usize) -> $ret>(send)(receiver, sel, a, b, c, d, e),
                    [a, b, c, d, e, f] => mem::transmute::<unsafe extern "C" fn(), unsafe extern "C" fn(ObjcId, Sel, usize, usize, usize, usize, usize, usize) -> $ret>(send)(receiver, sel, a, b, c, d, e, f),
                    _ => unreachable!("argument count is checked against MAX_ARGS"),
                }
            }
        }
    };
}

typed_send!(send_word -> usize);
typed_send!(send_f64 -> f64);
typed_send!(send_f32 -> f32);

/// Defines the `extern "C"` entry point for installed methods of one arity.
macro_rules! installed_imp {
    ($name:ident $(, $arg:ident)*) => {
        extern "C" fn $name(this: ObjcId, cmd: Sel $(, $arg: usize)*) -> usize {
            call_installed(this, cmd, &[$($arg),*])
        }
    };
}

installed_imp!(imp0);
installed_imp!(imp1, a0);
installed_imp!(imp2, a0, a1);
installed_imp!(imp3, a0, a1, a2);
installed_imp!(imp4, a0, a1, a2, a3);
installed_imp!(imp5, a0, a1, a2, a3, a4);
installed_imp!(imp6, a0, a1, a2, a3, a4, a5);

fn imp_for_arity(arity: usize) -> Option<*const c_void> {
    let imp = match arity {
        0 => imp0 as *const c_void,
        1 => imp1 as *const c_void,
        2 => imp2 as *const c_void,
        3 => imp3 as *const c_void,
        4 => imp4 as *const c_void,
        5 => imp5 as *const c_void,
        6 => imp6 as *const c_void,
        _ => return None,
    };
    Some(imp)
}

#[derive(Clone)]
struct Installed {
    trampoline: Rc<Trampoline>,
    signature: Signature,
}

thread_local! {
    static INSTALLED: RefCell<FxHashMap<(usize, usize), Installed>> =
        RefCell::new(FxHashMap::default());
}

fn find_installed(this: ObjcId, cmd: Sel) -> Option<Installed> {
    INSTALLED
        .try_with(|table| {
            let table = table.try_borrow().ok()?;
            // SAFETY: `this` is the receiver the runtime dispatched to.
            let mut class = unsafe { object_getClass(this) };
            while !class.is_null() {
                if let Some(installed) = table.get(&(class as usize, cmd as usize)) {
                    return Some(installed.clone());
                }
                // SAFETY: `class` is a non-null class pointer from the runtime.
                class = unsafe { class_getSuperclass(class) };
            }
            None
        })
        .ok()
        .flatten()
}

fn call_installed(this: ObjcId, cmd: Sel, words: &[usize]) -> usize {
    let Some(installed) = find_installed(this, cmd) else {
        return 0;
    };

    let mut args = Vec::with_capacity(words.len() + 1);
    args.push(RawValue::from(Handle::from_word(this as u64)));
    for (code, &word) in installed.signature.args().iter().zip(words) {
        args.push(lift_word(*code, word));
    }

    let result = installed.trampoline.invoke(args);
    lower_return(installed.trampoline.selector(), installed.signature.ret(), &result)
}

fn lift_word(code: TypeCode, word: usize) -> RawValue {
    if code == TypeCode::CString {
        return read_c_string(word as *const c_char);
    }
    code.decode_word(word as u64).unwrap_or(RawValue::Void)
}

fn lower_return(selector: &str, code: TypeCode, value: &RawValue) -> usize {
    if code == TypeCode::Void {
        return 0;
    }
    match value {
        RawValue::Void => 0,
        RawValue::Bool(b) => usize::from(*b),
        RawValue::Int(i) => *i as usize,
        RawValue::Bytes(bytes) => match Handle::from_slice(bytes) {
            Some(handle) => handle.as_word() as usize,
            None => {
                warn!("{selector} returned a {}-byte buffer; returning 0", bytes.len());
                0
            }
        },
        other => {
            warn!("{selector} returned a {} value; returning 0", other.kind());
            0
        }
    }
}

fn read_c_string(ptr: *const c_char) -> RawValue {
    if ptr.is_null() {
        return RawValue::Void;
    }
    // SAFETY: the runtime passed or returned a NUL-terminated C string.
    let text = unsafe { CStr::from_ptr(ptr) };
    RawValue::Str(text.to_string_lossy().into_owned())
}

fn selector_name(sel: Sel) -> String {
    // SAFETY: `sel` was produced by sel_registerName.
    let name = unsafe { sel_getName(sel) };
    match read_c_string(name) {
        RawValue::Str(name) => name,
        _ => String::new(),
    }
}

const fn as_ptr(handle: Handle) -> *mut c_void {
    handle.as_word() as usize as *mut c_void
}

const fn open_flags(mode: OpenMode) -> c_int {
    let binding = if mode.is_eager() { RTLD_NOW } else { RTLD_LAZY };
    let scope = if mode.is_global() { RTLD_GLOBAL } else { RTLD_LOCAL };
    binding | scope
}

/// [`NativeRuntime`] backed by the process's Objective-C runtime.
///
/// Libraries opened through the runtime stay loaded until it is dropped.
#[derive(Default)]
pub struct SystemRuntime {
    libraries: RefCell<Vec<Library>>,
}

impl SystemRuntime {
    /// Creates a runtime bound to the process's `libobjc`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn method_return_type(object: ObjcId, sel: Sel) -> Option<TypeCode> {
        if object.is_null() {
            return None;
        }
        // SAFETY: non-null receiver and registered selector.
        let encoding = unsafe {
            let method = class_getInstanceMethod(object_getClass(object), sel);
            if method.is_null() {
                return None;
            }
            method_getTypeEncoding(method)
        };
        match read_c_string(encoding) {
            RawValue::Str(encoding) => return_type(&encoding),
            _ => None,
        }
    }

    fn responds_to(object: ObjcId, sel: Sel) -> bool {
        // SAFETY: non-null receiver; `respondsToSelector:` takes a SEL and
        // returns BOOL, which is read from the low byte.
        unsafe {
            let class = object_getClass(object);
            if class_respondsToSelector(class, sel) != 0 {
                return true;
            }
            let probe = sel_registerName(c"respondsToSelector:".as_ptr());
            class_respondsToSelector(class, probe) != 0
                && send_word(object, probe, &[sel as usize]) & 0xff != 0
        }
    }
}

fn lower_arg(index: usize, arg: &RawValue, strings: &mut Vec<CString>) -> Result<usize> {
    let word = match arg {
        RawValue::Bool(b) => usize::from(*b),
        RawValue::Int(i) => *i as usize,
        RawValue::Bytes(bytes) => match Handle::from_slice(bytes) {
            Some(handle) => handle.as_word() as usize,
            None => {
                return Err(Error::UnsupportedArgument {
                    index,
                    kind: "bytes",
                });
            }
        },
        RawValue::Str(text) => {
            let text = CString::new(text.as_str()).map_err(|_| Error::UnsupportedArgument {
                index,
                kind: "string with interior NUL",
            })?;
            let ptr = text.as_ptr() as usize;
            strings.push(text);
            ptr
        }
        RawValue::Void | RawValue::Float(_) => {
            return Err(Error::UnsupportedArgument {
                index,
                kind: arg.kind(),
            });
        }
    };
    Ok(word)
}

impl NativeRuntime for SystemRuntime {
    fn open(&self, path: &Path, mode: OpenMode) -> Result<LibraryHandle> {
        // SAFETY: loading a framework runs its initializers, which is the
        // point of importing it.
        let library = unsafe { Library::open(Some(path.as_os_str()), open_flags(mode)) }
            .map_err(|err| Error::LibraryOpenFailed {
                path: path.to_path_buf(),
                reason: err.to_string(),
            })?;

        let mut libraries = self.libraries.borrow_mut();
        libraries.push(library);
        debug!("dlopen {} ({mode:?})", path.display());
        Ok(LibraryHandle::new(libraries.len() as u64))
    }

    fn class_list(&self) -> Vec<String> {
        // SAFETY: a null buffer with count 0 only queries the total.
        let total = unsafe { objc_getClassList(std::ptr::null_mut(), 0) };
        let Ok(capacity) = usize::try_from(total) else {
            return Vec::new();
        };

        let mut classes: Vec<ObjcClass> = vec![std::ptr::null_mut(); capacity];
        // SAFETY: `classes` has room for `total` entries.
        let filled = unsafe { objc_getClassList(classes.as_mut_ptr(), total) };
        let filled = usize::try_from(filled).unwrap_or(0).min(capacity);

        classes[..filled]
            .iter()
            .filter_map(|&class| {
                // SAFETY: entries are class pointers written by the runtime.
                match read_c_string(unsafe { class_getName(class) }) {
                    RawValue::Str(name) => Some(name),
                    _ => None,
                }
            })
            .collect()
    }

    fn get_class(&self, name: &str) -> Option<Handle> {
        let name = CString::new(name).ok()?;
        // SAFETY: NUL-terminated name.
        let class = unsafe { objc_getClass(name.as_ptr()) };
        (!class.is_null()).then(|| Handle::from_word(class as u64))
    }

    fn allocate_class_pair(
        &self,
        superclass: Handle,
        name: &str,
        extra_bytes: usize,
    ) -> Option<Handle> {
        let name = CString::new(name).ok()?;
        // SAFETY: `superclass` is a class handle; name is NUL-terminated.
        let class =
            unsafe { objc_allocateClassPair(as_ptr(superclass), name.as_ptr(), extra_bytes) };
        (!class.is_null()).then(|| Handle::from_word(class as u64))
    }

    fn register_class_pair(&self, class: Handle) {
        // SAFETY: `class` came from objc_allocateClassPair.
        unsafe { objc_registerClassPair(as_ptr(class)) };
    }

    fn add_method(
        &self,
        class: Handle,
        selector: SelectorToken,
        imp: Rc<Trampoline>,
        types: &str,
    ) -> bool {
        let Some(signature) = Signature::parse(types) else {
            warn!("cannot install {}: malformed type encoding {types:?}", imp.selector());
            return false;
        };
        if !signature.is_word_callable() {
            warn!(
                "cannot install {}: {types:?} needs non-word arguments or return",
                imp.selector()
            );
            return false;
        }

        let sel = selector.raw() as usize as Sel;
        let arity = selector_name(sel).matches(':').count();
        if arity != signature.args().len() {
            warn!(
                "cannot install {}: selector takes {arity} argument(s), {types:?} declares {}",
                imp.selector(),
                signature.args().len()
            );
            return false;
        }
        let Some(entry) = imp_for_arity(arity) else {
            warn!("cannot install {}: more than {MAX_ARGS} arguments", imp.selector());
            return false;
        };
        let Ok(types_c) = CString::new(types) else {
            return false;
        };

        let class_ptr = as_ptr(class);
        // SAFETY: class and selector come from the runtime; `entry` has the
        // C signature `(id, SEL, word...) -> word` matching `types`.
        let added = unsafe { class_addMethod(class_ptr, sel, entry, types_c.as_ptr()) } != 0;
        if added {
            INSTALLED.with(|table| {
                table.borrow_mut().insert(
                    (class_ptr as usize, sel as usize),
                    Installed {
                        trampoline: imp,
                        signature,
                    },
                );
            });
        }
        added
    }

    fn register_name(&self, name: &str) -> Option<SelectorToken> {
        if name.is_empty() {
            return None;
        }
        let name = CString::new(name).ok()?;
        // SAFETY: NUL-terminated name.
        let sel = unsafe { sel_registerName(name.as_ptr()) };
        (!sel.is_null()).then(|| SelectorToken::new(sel as u64))
    }

    fn msg_send(
        &self,
        receiver: Handle,
        selector: SelectorToken,
        args: &[RawValue],
    ) -> Result<RawValue> {
        if args.len() > MAX_ARGS {
            return Err(Error::TooManyArguments {
                got: args.len(),
                max: MAX_ARGS,
            });
        }

        let sel = selector.raw() as usize as Sel;
        let mut strings = Vec::new();
        let words = args
            .iter()
            .enumerate()
            .map(|(index, arg)| lower_arg(index, arg, &mut strings))
            .collect::<Result<Vec<usize>>>()?;

        let object = as_ptr(receiver);
        let ret = Self::method_return_type(object, sel);
        if ret.is_none() && !object.is_null() && !Self::responds_to(object, sel) {
            return Err(Error::DispatchFailed {
                selector: selector_name(sel),
                reason: format!("unrecognized selector sent to {receiver:?}"),
            });
        }

        // SAFETY: argument count is bounded by MAX_ARGS, every word is an
        // integer, a live handle, or a pointer into `strings`, and the
        // return type matches the method encoding when one exists.
        let value = unsafe {
            match ret.unwrap_or(TypeCode::Object) {
                TypeCode::Void => {
                    send_word(object, sel, &words);
                    RawValue::Void
                }
                TypeCode::Double => RawValue::Float(send_f64(object, sel, &words)),
                TypeCode::Float => RawValue::Float(f64::from(send_f32(object, sel, &words))),
                TypeCode::CString => read_c_string(send_word(object, sel, &words) as *const c_char),
                TypeCode::Aggregate => {
                    return Err(Error::DispatchFailed {
                        selector: selector_name(sel),
                        reason: "struct, union and array returns are not supported".to_string(),
                    });
                }
                code => code
                    .decode_word(send_word(object, sel, &words) as u64)
                    .unwrap_or(RawValue::Void),
            }
        };

        drop(strings);
        Ok(value)
    }

    fn queue_create(&self, label: &str, attr: i64) -> Option<Handle> {
        let label = CString::new(label).ok()?;
        // SAFETY: `attr` is 0 (serial) or a dispatch_queue_attr_t word.
        let queue = unsafe { dispatch_queue_create(label.as_ptr(), attr as usize as *mut c_void) };
        (!queue.is_null()).then(|| Handle::from_word(queue as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Dispatcher;
    use crate::message::Message;
    use crate::value::Value;

    fn runtime() -> Rc<SystemRuntime> {
        Rc::new(SystemRuntime::new())
    }

    #[test]
    fn test_nsobject_is_loaded() {
        let rt = runtime();
        assert!(rt.get_class("NSObject").is_some());
        assert!(rt.class_list().iter().any(|name| name == "NSObject"));
        assert!(rt.get_class("OxibridgeNoSuchClass").is_none());
    }

    #[test]
    fn test_alloc_init_description() {
        let rt = runtime();
        let dispatcher = Dispatcher::new(rt.clone());
        let class = dispatcher.wrap_class(rt.get_class("NSObject").unwrap());

        let obj = class.send(Message::new("new")).unwrap();
        let obj = obj.as_object().unwrap();
        let text = obj.to_text().unwrap();
        assert!(text.starts_with("<NSObject"));
    }

    #[test]
    fn test_unrecognized_selector_is_reported() {
        let rt = runtime();
        let dispatcher = Dispatcher::new(rt.clone());
        let class = dispatcher.wrap_class(rt.get_class("NSObject").unwrap());

        let err = class.send(Message::new("oxibridgeFrobnicate")).unwrap_err();
        assert!(matches!(err, Error::DispatchFailed { .. }));
    }

    #[test]
    fn test_float_argument_is_rejected() {
        let rt = runtime();
        let sel = rt.register_name("setValue:").unwrap();
        let class = rt.get_class("NSObject").unwrap();
        let err = rt.msg_send(class, sel, &[RawValue::Float(1.0)]).unwrap_err();
        assert_eq!(
            err,
            Error::UnsupportedArgument {
                index: 0,
                kind: "float"
            }
        );
    }

    #[test]
    fn test_installed_method_round_trip() {
        let rt = runtime();
        let dispatcher = Dispatcher::new(rt.clone());
        let base = dispatcher.wrap_class(rt.get_class("NSObject").unwrap());

        let class = base.extend("OxibridgeSystemAdder").unwrap();
        class
            .add_method("add:to:", "q@:qq", |args| {
                let a = args[1].as_int().unwrap_or(0);
                let b = args[2].as_int().unwrap_or(0);
                Ok(Value::Int(a + b))
            })
            .unwrap();
        class.register();

        let obj = class.send(Message::new("new")).unwrap();
        let sum = obj
            .as_object()
            .unwrap()
            .send(Message::new("add").arg(2).keyword("to").arg(40))
            .unwrap();
        assert_eq!(sum, Value::Int(42));
    }

    #[test]
    fn test_queue_create() {
        let rt = runtime();
        assert!(rt.queue_create("com.example.oxibridge", 0).is_some());
    }
}
