//! The value model (spec.md §3): a tagged sum with numbers, strings, chars,
//! booleans, the empty list, pairs, interned symbols, procedures and the
//! `NonReturn` marker used by `define`/`display`/etc.

use crate::analyze::SlotCell;
use crate::env::Environment;
use crate::error::{Pos, Result, SchemeError};
use crate::symbol::Symbol;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

#[derive(Clone)]
pub enum Value {
    Number(f64),
    Str(Rc<str>),
    Char(char),
    Bool(bool),
    EmptyList,
    Pair(Rc<Pair>),
    Symbol(Symbol),
    Procedure(Procedure),
    NonReturn(Rc<str>),
}

pub struct Pair {
    pub car: Value,
    pub cdr: Value,
}

impl Value {
    pub fn bool(b: bool) -> Value {
        Value::Bool(b)
    }

    pub fn non_return(tag: impl Into<Rc<str>>) -> Value {
        Value::NonReturn(tag.into())
    }

    pub fn cons(car: Value, cdr: Value) -> Value {
        Value::Pair(Rc::new(Pair { car, cdr }))
    }

    /// Builds a right-nested chain ending in `EmptyList`, as `list` does
    /// (spec.md §6).
    pub fn list_from_vec(items: Vec<Value>) -> Value {
        let mut tail = Value::EmptyList;
        for item in items.into_iter().rev() {
            tail = Value::cons(item, tail);
        }
        tail
    }

    /// Walks a proper-list chain into a `Vec`; `None` if the chain is
    /// improper (does not terminate in `EmptyList`).
    pub fn list_to_vec(&self) -> Option<Vec<Value>> {
        let mut out = Vec::new();
        let mut cur = self.clone();
        loop {
            match cur {
                Value::EmptyList => return Some(out),
                Value::Pair(p) => {
                    out.push(p.car.clone());
                    cur = p.cdr.clone();
                }
                _ => return None,
            }
        }
    }

    /// Falsity is exactly the `Bool(false)` variant (spec.md §3); everything
    /// else, including the empty list and zero, is truthy.
    pub fn is_false(&self) -> bool {
        matches!(self, Value::Bool(false))
    }

    pub fn is_pair(&self) -> bool {
        matches!(self, Value::Pair(_))
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Value::EmptyList) || self.list_to_vec().is_some()
    }

    pub fn is_procedure(&self) -> bool {
        matches!(self, Value::Procedure(_))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Char(_) => "char",
            Value::Bool(_) => "boolean",
            Value::EmptyList => "empty-list",
            Value::Pair(_) => "pair",
            Value::Symbol(_) => "symbol",
            Value::Procedure(_) => "procedure",
            Value::NonReturn(_) => "unspecified",
        }
    }

    pub fn type_error(expected: &str, found: &Value, pos: Pos) -> SchemeError {
        SchemeError::Type {
            expected: expected.to_string(),
            found: found.type_name().to_string(),
            pos,
        }
    }

    pub fn as_number(&self, pos: Pos) -> Result<f64> {
        match self {
            Value::Number(n) => Ok(*n),
            other => Err(Value::type_error("number", other, pos)),
        }
    }

    pub fn as_pair(&self, pos: Pos) -> Result<&Rc<Pair>> {
        match self {
            Value::Pair(p) => Ok(p),
            other => Err(Value::type_error("pair", other, pos)),
        }
    }

    pub fn as_symbol(&self, pos: Pos) -> Result<Symbol> {
        match self {
            Value::Symbol(s) => Ok(*s),
            other => Err(Value::type_error("symbol", other, pos)),
        }
    }

    /// `eq?`: reference equality after interning for symbols, identity for
    /// procedures and pairs, value equality for the remaining atomic types
    /// (spec.md §3 invariant 4 — these have no separate host identity from
    /// their value in this implementation).
    pub fn eq_identity(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::EmptyList, Value::EmptyList) => true,
            (Value::Pair(a), Value::Pair(b)) => Rc::ptr_eq(a, b),
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Procedure(Procedure::Native(a)), Value::Procedure(Procedure::Native(b))) => {
                Rc::ptr_eq(a, b)
            }
            (Value::Procedure(Procedure::Compound(a)), Value::Procedure(Procedure::Compound(b))) => {
                Rc::ptr_eq(a, b)
            }
            (Value::NonReturn(a), Value::NonReturn(b)) => a == b,
            _ => false,
        }
    }

    /// `equal?`: deep structural equality over pairs, value equality
    /// elsewhere.
    pub fn eq_structural(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Pair(a), Value::Pair(b)) => {
                a.car.eq_structural(&b.car) && a.cdr.eq_structural(&b.cdr)
            }
            _ => self.eq_identity(other),
        }
    }
}

/// Arguments handed to a non-raw native after being unwrapped from `Value`
/// (spec.md §3: "arguments are first unwrapped to host-native scalars").
#[derive(Clone)]
pub enum HostScalar {
    Number(f64),
    Str(Rc<str>),
    Char(char),
    Bool(bool),
    Unit,
}

impl HostScalar {
    pub fn from_value(value: &Value, pos: Pos) -> Result<HostScalar> {
        match value {
            Value::Number(n) => Ok(HostScalar::Number(*n)),
            Value::Str(s) => Ok(HostScalar::Str(s.clone())),
            Value::Char(c) => Ok(HostScalar::Char(*c)),
            Value::Bool(b) => Ok(HostScalar::Bool(*b)),
            Value::NonReturn(_) => Ok(HostScalar::Unit),
            other => Err(Value::type_error("scalar (number/string/char/bool)", other, pos)),
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            HostScalar::Number(n) => Value::Number(n),
            HostScalar::Str(s) => Value::Str(s),
            HostScalar::Char(c) => Value::Char(c),
            HostScalar::Bool(b) => Value::Bool(b),
            HostScalar::Unit => Value::non_return("<unspecified>"),
        }
    }

    pub fn as_number(&self, pos: Pos) -> Result<f64> {
        match self {
            HostScalar::Number(n) => Ok(*n),
            other => Err(SchemeError::Type {
                expected: "number".to_string(),
                found: other.type_name().to_string(),
                pos,
            }),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            HostScalar::Number(_) => "number",
            HostScalar::Str(_) => "string",
            HostScalar::Char(_) => "char",
            HostScalar::Bool(_) => "boolean",
            HostScalar::Unit => "unspecified",
        }
    }
}

/// Two sub-variants sharing one apply contract (spec.md §3): native
/// (host-provided) and compound (interpreter-defined) procedures.
#[derive(Clone)]
pub enum Procedure {
    Native(Rc<NativeProcedure>),
    Compound(Rc<CompoundProcedure>),
}

impl Procedure {
    pub fn name(&self) -> Rc<str> {
        match self {
            Procedure::Native(n) => Rc::from(n.name),
            Procedure::Compound(c) => Rc::from(c.name.borrow().as_str()),
        }
    }
}

pub type RawNativeFn =
    fn(&[Value], &Rc<RefCell<Environment>>, Pos) -> Result<Value>;
pub type ScalarNativeFn = fn(&[HostScalar], Pos) -> Result<HostScalar>;

pub enum NativeBody {
    /// Receives the original `Value` slice unwrapped (spec.md §3 "raw"
    /// flag).
    Raw(RawNativeFn),
    /// Receives arguments pre-unwrapped to `HostScalar`.
    Scalar(ScalarNativeFn),
}

pub struct NativeProcedure {
    pub name: &'static str,
    pub min_args: Option<usize>,
    pub max_args: Option<usize>,
    /// Positional type predicates, expected-name carried for error messages
    /// (spec.md §4.4).
    pub checks: Vec<(&'static str, fn(&Value) -> bool)>,
    pub body: NativeBody,
}

impl NativeProcedure {
    pub fn check_arity(&self, got: usize, pos: Pos) -> Result<()> {
        let min_ok = self.min_args.is_none_or(|m| got >= m);
        let max_ok = self.max_args.is_none_or(|m| got <= m);
        if min_ok && max_ok {
            return Ok(());
        }
        let expected = match (self.min_args, self.max_args) {
            (Some(a), Some(b)) if a == b => format!("{a}"),
            (Some(a), Some(b)) => format!("between {a} and {b}"),
            (Some(a), None) => format!("at least {a}"),
            (None, Some(b)) => format!("at most {b}"),
            (None, None) => "any number of".to_string(),
        };
        Err(SchemeError::Arity {
            expected,
            got,
            pos,
        })
    }

    pub fn check_types(&self, args: &[Value], pos: Pos) -> Result<()> {
        for (idx, (expected, test)) in self.checks.iter().enumerate() {
            if let Some(arg) = args.get(idx) {
                if !test(arg) {
                    return Err(Value::type_error(expected, arg, pos));
                }
            }
        }
        Ok(())
    }
}

/// A closure over its defining environment (spec.md §3 invariant 5): the
/// environment captured is the one current when the *lambda expression*
/// was evaluated, not the call site's.
pub struct CompoundProcedure {
    pub name: RefCell<Rc<str>>,
    pub params: Vec<Symbol>,
    pub body: Rc<SlotCell>,
    pub env: Rc<RefCell<Environment>>,
}

impl fmt::Debug for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#<procedure:{}>", self.name())
    }
}
