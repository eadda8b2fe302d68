//! Types of values in the IL.
//!
//! Types follow the usual shape of a compiler IR: sized integers, floating
//! point values, pointers, vectors, arrays, named structs and functions.
//! Pointers are always 64 bits wide.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The width of a pointer, in bits.
pub const POINTER_BITS: usize = 64;

/// The type of an IL value.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Type {
    Void,
    Int(usize),
    Float(usize),
    Pointer(Box<Type>),
    Vector(Box<Type>, usize),
    Array(Box<Type>, usize),
    /// A named struct, whose body is held in the module's `StructTable`.
    Struct(String),
    Function(Box<FunctionType>),
}

impl Type {
    pub fn int(bits: usize) -> Type {
        Type::Int(bits)
    }

    pub fn pointer(pointee: Type) -> Type {
        Type::Pointer(Box::new(pointee))
    }

    pub fn vector(element: Type, lanes: usize) -> Type {
        Type::Vector(Box::new(element), lanes)
    }

    pub fn array(element: Type, length: usize) -> Type {
        Type::Array(Box::new(element), length)
    }

    pub fn structure<S: Into<String>>(name: S) -> Type {
        Type::Struct(name.into())
    }

    pub fn function(function_type: FunctionType) -> Type {
        Type::Function(Box::new(function_type))
    }

    /// `i8*`, the type of untyped memory.
    pub fn i8_pointer() -> Type {
        Type::pointer(Type::Int(8))
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Type::Int(_))
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer(_))
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, Type::Vector(_, _))
    }

    pub fn is_struct(&self) -> bool {
        matches!(self, Type::Struct(_))
    }

    /// Arrays and structs are aggregates.
    pub fn is_aggregate(&self) -> bool {
        matches!(self, Type::Array(_, _) | Type::Struct(_))
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Type::Function(_))
    }

    /// Returns true if this is a pointer to a function.
    pub fn is_function_pointer(&self) -> bool {
        self.pointee().map(|p| p.is_function()).unwrap_or(false)
    }

    /// The type this type points to, if this is a pointer.
    pub fn pointee(&self) -> Option<&Type> {
        match *self {
            Type::Pointer(ref pointee) => Some(pointee),
            _ => None,
        }
    }

    /// The element type of a vector.
    pub fn vector_element(&self) -> Option<&Type> {
        match *self {
            Type::Vector(ref element, _) => Some(element),
            _ => None,
        }
    }

    /// The number of lanes of a vector.
    pub fn lanes(&self) -> Option<usize> {
        match *self {
            Type::Vector(_, lanes) => Some(lanes),
            _ => None,
        }
    }

    /// The type of a single lane. For non-vector types, this type.
    pub fn scalar_type(&self) -> &Type {
        self.vector_element().unwrap_or(self)
    }

    pub fn is_int_or_int_vector(&self) -> bool {
        self.scalar_type().is_integer()
    }

    pub fn is_ptr_or_ptr_vector(&self) -> bool {
        self.scalar_type().is_pointer()
    }

    /// Returns true for types a register holds: integers, floats, pointers
    /// and vectors of those.
    pub fn is_first_class(&self) -> bool {
        match *self {
            Type::Int(_) | Type::Float(_) | Type::Pointer(_) => true,
            Type::Vector(ref element, _) => element.is_first_class() && !element.is_vector(),
            _ => false,
        }
    }

    /// The width of values of this type held in registers, if this is a
    /// first class type.
    pub fn primitive_bits(&self) -> Option<usize> {
        match *self {
            Type::Int(bits) | Type::Float(bits) => Some(bits),
            Type::Pointer(_) => Some(POINTER_BITS),
            Type::Vector(ref element, lanes) => element.primitive_bits().map(|bits| bits * lanes),
            _ => None,
        }
    }

    /// The integer type with the same shape as this type. Pointers become
    /// pointer-sized integers, vectors become vectors of integers.
    pub fn int_type(&self) -> Result<Type, Error> {
        Ok(match *self {
            Type::Int(bits) => Type::Int(bits),
            Type::Float(bits) => Type::Int(bits),
            Type::Pointer(_) => Type::Int(POINTER_BITS),
            Type::Vector(ref element, lanes) => Type::vector(element.int_type()?, lanes),
            _ => return Err(Error::Unsized(self.to_string())),
        })
    }

    /// Parse a type from its textual form, such as `i8*` or `[4 x i32]`.
    pub fn parse(s: &str) -> Result<Type, Error> {
        let mut parser = TypeParser::new(s);
        let ty = parser.parse_type()?;
        parser.finish()?;
        Ok(ty)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Type::Void => write!(f, "void"),
            Type::Int(bits) => write!(f, "i{}", bits),
            Type::Float(32) => write!(f, "float"),
            Type::Float(64) => write!(f, "double"),
            Type::Float(bits) => write!(f, "f{}", bits),
            Type::Pointer(ref pointee) => write!(f, "{}*", pointee),
            Type::Vector(ref element, lanes) => write!(f, "<{} x {}>", lanes, element),
            Type::Array(ref element, length) => write!(f, "[{} x {}]", length, element),
            Type::Struct(ref name) => write!(f, "%{}", name),
            Type::Function(ref function_type) => write!(f, "{}", function_type),
        }
    }
}

/// The signature of a function.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct FunctionType {
    ret: Type,
    params: Vec<Type>,
    variadic: bool,
}

impl FunctionType {
    pub fn new(ret: Type, params: Vec<Type>, variadic: bool) -> FunctionType {
        FunctionType {
            ret,
            params,
            variadic,
        }
    }

    /// Parse a function type, such as `i32 (i8*, ...)`.
    pub fn parse(s: &str) -> Result<FunctionType, Error> {
        match Type::parse(s)? {
            Type::Function(function_type) => Ok(*function_type),
            _ => Err(Error::Signature(s.to_string(), "not a function type".to_string())),
        }
    }

    pub fn ret(&self) -> &Type {
        &self.ret
    }

    pub fn params(&self) -> &[Type] {
        &self.params
    }

    pub fn param(&self, index: usize) -> Option<&Type> {
        self.params.get(index)
    }

    pub fn num_params(&self) -> usize {
        self.params.len()
    }

    pub fn variadic(&self) -> bool {
        self.variadic
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut params: Vec<String> = self.params.iter().map(|p| p.to_string()).collect();
        if self.variadic {
            params.push("...".to_string());
        }
        write!(f, "{} ({})", self.ret, params.join(", "))
    }
}

/// The body of a named struct. A struct without fields is opaque.
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct StructBody {
    fields: Option<Vec<Type>>,
    #[serde(default)]
    packed: bool,
}

impl StructBody {
    pub fn new(fields: Vec<Type>) -> StructBody {
        StructBody {
            fields: Some(fields),
            packed: false,
        }
    }

    pub fn packed(fields: Vec<Type>) -> StructBody {
        StructBody {
            fields: Some(fields),
            packed: true,
        }
    }

    pub fn opaque() -> StructBody {
        StructBody {
            fields: None,
            packed: false,
        }
    }

    pub fn fields(&self) -> Option<&[Type]> {
        self.fields.as_deref()
    }

    pub fn is_opaque(&self) -> bool {
        self.fields.is_none()
    }

    pub fn is_packed(&self) -> bool {
        self.packed
    }
}

/// Named struct bodies, by struct name.
pub type StructTable = BTreeMap<String, StructBody>;

struct TypeParser<'s> {
    source: &'s str,
    position: usize,
}

impl<'s> TypeParser<'s> {
    fn new(source: &'s str) -> TypeParser<'s> {
        TypeParser {
            source,
            position: 0,
        }
    }

    fn error<S: Into<String>>(&self, message: S) -> Error {
        Error::Signature(self.source.to_string(), message.into())
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.position += c.len_utf8();
        }
    }

    fn peek(&self) -> Option<char> {
        self.source[self.position..].chars().next()
    }

    fn eat(&mut self, c: char) -> bool {
        self.skip_whitespace();
        if self.peek() == Some(c) {
            self.position += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<(), Error> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.error(format!("expected `{}` at offset {}", c, self.position)))
        }
    }

    fn word(&mut self) -> &'s str {
        self.skip_whitespace();
        let start = self.position;
        while let Some(c) = self.peek() {
            if !(c.is_ascii_alphanumeric() || c == '_' || c == '.') {
                break;
            }
            self.position += 1;
        }
        &self.source[start..self.position]
    }

    fn number(&mut self) -> Result<usize, Error> {
        let word = self.word();
        word.parse::<usize>()
            .map_err(|_| self.error(format!("expected a number, found `{}`", word)))
    }

    fn finish(&mut self) -> Result<(), Error> {
        self.skip_whitespace();
        if self.position == self.source.len() {
            Ok(())
        } else {
            Err(self.error(format!("trailing input at offset {}", self.position)))
        }
    }

    fn parse_type(&mut self) -> Result<Type, Error> {
        let mut ty = self.parse_base()?;
        loop {
            if self.eat('*') {
                ty = Type::pointer(ty);
            } else if self.eat('(') {
                ty = self.parse_params(ty)?;
            } else {
                return Ok(ty);
            }
        }
    }

    fn parse_params(&mut self, ret: Type) -> Result<Type, Error> {
        let mut params = Vec::new();
        let mut variadic = false;
        if self.eat(')') {
            return Ok(Type::function(FunctionType::new(ret, params, false)));
        }
        loop {
            if self.eat('.') {
                self.expect('.')?;
                self.expect('.')?;
                variadic = true;
                self.expect(')')?;
                break;
            }
            params.push(self.parse_type()?);
            if self.eat(')') {
                break;
            }
            self.expect(',')?;
        }
        Ok(Type::function(FunctionType::new(ret, params, variadic)))
    }

    fn parse_base(&mut self) -> Result<Type, Error> {
        self.skip_whitespace();
        if self.eat('%') {
            let name = self.word();
            if name.is_empty() {
                return Err(self.error("expected a struct name"));
            }
            return Ok(Type::Struct(name.to_string()));
        }
        if self.eat('[') {
            let length = self.number()?;
            if self.word() != "x" {
                return Err(self.error("expected `x` in array type"));
            }
            let element = self.parse_type()?;
            self.expect(']')?;
            return Ok(Type::array(element, length));
        }
        if self.eat('<') {
            let lanes = self.number()?;
            if self.word() != "x" {
                return Err(self.error("expected `x` in vector type"));
            }
            let element = self.parse_type()?;
            self.expect('>')?;
            return Ok(Type::vector(element, lanes));
        }
        let word = self.word();
        match word {
            "void" => Ok(Type::Void),
            "float" => Ok(Type::Float(32)),
            "double" => Ok(Type::Float(64)),
            _ if word.starts_with('i') => word[1..]
                .parse::<usize>()
                .map(Type::Int)
                .map_err(|_| self.error(format!("unknown type `{}`", word))),
            _ => Err(self.error(format!("unknown type `{}`", word))),
        }
    }
}

#[test]
fn parse_simple_types() {
    assert_eq!(Type::parse("i32").unwrap(), Type::Int(32));
    assert_eq!(Type::parse("i8**").unwrap(), Type::pointer(Type::i8_pointer()));
    assert_eq!(
        Type::parse("[4 x <2 x i16>]").unwrap(),
        Type::array(Type::vector(Type::Int(16), 2), 4)
    );
    assert_eq!(
        Type::parse("%struct._IO_FILE*").unwrap(),
        Type::pointer(Type::structure("struct._IO_FILE"))
    );
    assert!(Type::parse("i32 garbage").is_err());
    assert!(Type::parse("q").is_err());
}

#[test]
fn parse_function_types() {
    let printf = FunctionType::parse("i32 (i8*, i64, ...)").unwrap();
    assert_eq!(printf.ret(), &Type::Int(32));
    assert_eq!(printf.params(), &[Type::i8_pointer(), Type::Int(64)]);
    assert!(printf.variadic());
    assert_eq!(printf.to_string(), "i32 (i8*, i64, ...)");

    let rand = FunctionType::parse("i32 ()").unwrap();
    assert_eq!(rand.num_params(), 0);

    let callback = Type::parse("void (i32)*").unwrap();
    assert!(callback.is_function_pointer());
}

#[test]
fn int_types() {
    assert_eq!(Type::i8_pointer().int_type().unwrap(), Type::Int(64));
    assert_eq!(
        Type::vector(Type::Float(32), 4).int_type().unwrap(),
        Type::vector(Type::Int(32), 4)
    );
    assert!(Type::structure("struct.s").int_type().is_err());
}
