//! Objective-C method type encodings.
//!
//! The runtime describes a method's signature as a string such as
//! `"v24@0:8@16"`: the return type, then `self`, then `_cmd`, then one entry
//! per argument, each optionally followed by a stack offset. This module
//! reduces such strings to a sequence of [`TypeCode`]s, which is all the
//! system runtime needs to move values through general purpose registers.
//!
//! # Encoding Format
//!
//! | Code | Type |
//! |---|---|
//! | `v` | void |
//! | `B` | C99 `bool` |
//! | `c` `s` `i` `l` `q` | signed integers (8, 16, 32, 32, 64 bits) |
//! | `C` `S` `I` `L` `Q` | unsigned integers |
//! | `f` `d` | float, double |
//! | `*` | C string |
//! | `@` `#` `:` | object, class, selector |
//! | `^type` `?` | pointer, unknown (function pointer) |
//! | `{...}` `(...)` `[...]` `bN` | struct, union, array, bitfield |
//!
//! Type qualifiers (`r n N o O R V A`) are skipped.
//!
//! `c` is decoded as an 8-bit integer, so `BOOL` on x86-64 (where it is
//! `signed char`) surfaces as `Int(0)` or `Int(1)`.

use crate::handle::Handle;
use crate::value::RawValue;

/// Type of one value in a method signature.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TypeCode {
    /// `v`
    Void,
    /// `B`
    Bool,
    /// Integer of the given width in bits.
    Int {
        /// Width in bits.
        bits: u8,
        /// Whether the value is sign-extended.
        signed: bool,
    },
    /// `f`
    Float,
    /// `d`
    Double,
    /// `*`
    CString,
    /// `@`, including blocks (`@?`).
    Object,
    /// `#`
    Class,
    /// `:`
    Selector,
    /// `^type` or `?`
    Pointer,
    /// Struct, union, array or bitfield.
    Aggregate,
}

impl TypeCode {
    /// Returns `true` if values of this type travel in a general purpose
    /// register.
    #[must_use]
    pub const fn is_word(self) -> bool {
        !matches!(
            self,
            TypeCode::Void | TypeCode::Float | TypeCode::Double | TypeCode::Aggregate
        )
    }

    /// Decodes a register word of this type.
    ///
    /// Object-like types become eight-byte buffers. Returns `None` for types
    /// that are not passed as words and for C strings, which must be read
    /// from memory by the caller.
    #[must_use]
    pub fn decode_word(self, word: u64) -> Option<RawValue> {
        let value = match self {
            TypeCode::Bool => RawValue::Bool(word & 0xff != 0),
            TypeCode::Int { bits, signed } => RawValue::Int(truncate(word, bits, signed)),
            TypeCode::Object | TypeCode::Class | TypeCode::Selector | TypeCode::Pointer => {
                RawValue::from(Handle::from_word(word))
            }
            TypeCode::Void
            | TypeCode::Float
            | TypeCode::Double
            | TypeCode::CString
            | TypeCode::Aggregate => return None,
        };
        Some(value)
    }
}

fn truncate(word: u64, bits: u8, signed: bool) -> i64 {
    if bits >= 64 {
        return word as i64;
    }
    let shift = 64 - u32::from(bits);
    if signed {
        ((word << shift) as i64) >> shift
    } else {
        ((word << shift) >> shift) as i64
    }
}

/// A parsed method signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    ret: TypeCode,
    args: Vec<TypeCode>,
}

impl Signature {
    /// Parses a full method encoding.
    ///
    /// Returns `None` unless the encoding is well formed and declares `self`
    /// as an object and `_cmd` as a selector.
    ///
    /// ```rust
    /// use oxibridge::native::encoding::{Signature, TypeCode};
    ///
    /// let sig = Signature::parse("v24@0:8@16").unwrap();
    /// assert_eq!(sig.ret(), TypeCode::Void);
    /// assert_eq!(sig.args(), &[TypeCode::Object]);
    ///
    /// assert!(Signature::parse("v@").is_none());
    /// ```
    #[must_use]
    pub fn parse(encoding: &str) -> Option<Self> {
        let codes = parse_types(encoding)?;
        match codes.as_slice() {
            [ret, TypeCode::Object, TypeCode::Selector, args @ ..] => Some(Signature {
                ret: *ret,
                args: args.to_vec(),
            }),
            _ => None,
        }
    }

    /// Return type.
    #[must_use]
    pub const fn ret(&self) -> TypeCode {
        self.ret
    }

    /// Argument types, excluding `self` and `_cmd`.
    #[must_use]
    pub fn args(&self) -> &[TypeCode] {
        &self.args
    }

    /// Returns `true` if every argument is a word and the return type is
    /// either void or a word other than a C string.
    #[must_use]
    pub fn is_word_callable(&self) -> bool {
        let ret_ok = matches!(self.ret, TypeCode::Void)
            || (self.ret.is_word() && self.ret != TypeCode::CString);
        ret_ok && self.args.iter().all(|code| code.is_word())
    }
}

/// Returns the type of the first entry of `encoding` (the return type of a
/// method encoding).
#[must_use]
pub fn return_type(encoding: &str) -> Option<TypeCode> {
    let mut parser = Parser::new(encoding);
    parser.next_type()
}

/// Splits `encoding` into its type codes, skipping qualifiers and offsets.
///
/// Returns `None` on an unknown code or unbalanced brackets.
#[must_use]
pub fn parse_types(encoding: &str) -> Option<Vec<TypeCode>> {
    let mut parser = Parser::new(encoding);
    let mut codes = Vec::new();
    while !parser.at_end() {
        codes.push(parser.next_type()?);
    }
    if codes.is_empty() { None } else { Some(codes) }
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    const fn new(encoding: &'a str) -> Self {
        Parser {
            bytes: encoding.as_bytes(),
            pos: 0,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }

    fn skip_digits(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_digit() || b == b'-') {
            self.pos += 1;
        }
    }

    fn next_type(&mut self) -> Option<TypeCode> {
        while matches!(
            self.peek(),
            Some(b'r' | b'n' | b'N' | b'o' | b'O' | b'R' | b'V' | b'A')
        ) {
            self.pos += 1;
        }

        let code = self.bare_type()?;
        self.skip_digits();
        Some(code)
    }

    fn bare_type(&mut self) -> Option<TypeCode> {
        let code = match self.bump()? {
            b'v' => TypeCode::Void,
            b'B' => TypeCode::Bool,
            b'c' => TypeCode::Int { bits: 8, signed: true },
            b's' => TypeCode::Int { bits: 16, signed: true },
            b'i' | b'l' => TypeCode::Int { bits: 32, signed: true },
            b'q' => TypeCode::Int { bits: 64, signed: true },
            b'C' => TypeCode::Int { bits: 8, signed: false },
            b'S' => TypeCode::Int { bits: 16, signed: false },
            b'I' | b'L' => TypeCode::Int { bits: 32, signed: false },
            b'Q' => TypeCode::Int { bits: 64, signed: false },
            b'f' => TypeCode::Float,
            b'd' => TypeCode::Double,
            b'*' => TypeCode::CString,
            b'#' => TypeCode::Class,
            b':' => TypeCode::Selector,
            b'?' => TypeCode::Pointer,
            b'@' => {
                self.object_suffix()?;
                TypeCode::Object
            }
            b'^' => {
                self.bare_type()?;
                TypeCode::Pointer
            }
            b'{' => {
                self.skip_group(b'{', b'}')?;
                TypeCode::Aggregate
            }
            b'(' => {
                self.skip_group(b'(', b')')?;
                TypeCode::Aggregate
            }
            b'[' => {
                self.skip_group(b'[', b']')?;
                TypeCode::Aggregate
            }
            b'b' => {
                self.skip_digits();
                TypeCode::Aggregate
            }
            _ => return None,
        };
        Some(code)
    }

    /// Skips `?` (block) or `"ClassName"` after `@`.
    fn object_suffix(&mut self) -> Option<()> {
        match self.peek() {
            Some(b'?') => {
                self.pos += 1;
            }
            Some(b'"') => {
                self.pos += 1;
                while self.bump()? != b'"' {}
            }
            _ => {}
        }
        Some(())
    }

    /// Skips to the bracket closing one already consumed.
    fn skip_group(&mut self, open: u8, close: u8) -> Option<()> {
        let mut depth = 1usize;
        while depth > 0 {
            let byte = self.bump()?;
            if byte == open {
                depth += 1;
            } else if byte == close {
                depth -= 1;
            }
        }
        Some(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_signatures() {
        let sig = Signature::parse("v@:").unwrap();
        assert_eq!(sig.ret(), TypeCode::Void);
        assert!(sig.args().is_empty());

        let sig = Signature::parse("q@:i@").unwrap();
        assert_eq!(sig.ret(), TypeCode::Int { bits: 64, signed: true });
        assert_eq!(
            sig.args(),
            &[TypeCode::Int { bits: 32, signed: true }, TypeCode::Object]
        );
    }

    #[test]
    fn test_offsets_and_qualifiers_are_skipped() {
        let sig = Signature::parse("r*16@0:8").unwrap();
        assert_eq!(sig.ret(), TypeCode::CString);

        let codes = parse_types("@\"NSString\"24@0:8Vv16").unwrap();
        assert_eq!(
            codes,
            vec![
                TypeCode::Object,
                TypeCode::Object,
                TypeCode::Selector,
                TypeCode::Void
            ]
        );
    }

    #[test]
    fn test_aggregates_and_pointers() {
        let codes = parse_types("{CGRect={CGPoint=dd}{CGSize=dd}}^{__CFString=}@?").unwrap();
        assert_eq!(
            codes,
            vec![TypeCode::Aggregate, TypeCode::Pointer, TypeCode::Object]
        );
        assert_eq!(return_type("{_NSRange=QQ}16@0:8"), Some(TypeCode::Aggregate));
    }

    #[test]
    fn test_malformed_encodings() {
        assert!(parse_types("").is_none());
        assert!(parse_types("x@:").is_none());
        assert!(parse_types("{unterminated").is_none());
        assert!(Signature::parse("v:@").is_none());
    }

    #[test]
    fn test_word_callable() {
        assert!(Signature::parse("v@:@q").unwrap().is_word_callable());
        assert!(Signature::parse("@@:").unwrap().is_word_callable());
        assert!(!Signature::parse("v@:d").unwrap().is_word_callable());
        assert!(!Signature::parse("*@:").unwrap().is_word_callable());
        assert!(!Signature::parse("{CGPoint=dd}@:").unwrap().is_word_callable());
    }

    #[test]
    fn test_decode_word() {
        let signed_char = TypeCode::Int { bits: 8, signed: true };
        assert_eq!(signed_char.decode_word(0xff), Some(RawValue::Int(-1)));

        let unsigned_int = TypeCode::Int { bits: 32, signed: false };
        assert_eq!(
            unsigned_int.decode_word(0xdead_beef_ffff_ffff),
            Some(RawValue::Int(0xffff_ffff))
        );

        assert_eq!(TypeCode::Bool.decode_word(0x100), Some(RawValue::Bool(false)));
        assert_eq!(
            TypeCode::Object.decode_word(0x1234),
            Some(RawValue::from(Handle::from_word(0x1234)))
        );
        assert_eq!(TypeCode::Double.decode_word(1), None);
        assert_eq!(TypeCode::CString.decode_word(1), None);
    }
}
