//! Pretty-printing (spec.md §4.5): host-float formatting that drops a
//! trailing `.0` for integer-valued numbers, quote-tag-free strings, and
//! right-chained pairs collapsed into space-separated lists terminating in
//! `)` rather than `. ()`. Cycle detection walks the *current* path (not
//! every pair ever printed), so legitimately shared-but-acyclic structure
//! (the same pair reachable two different ways) prints fine; only a pair
//! that reappears among its own ancestors is an error.

use crate::error::{Pos, Result, SchemeError};
use crate::value::{Pair, Value};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::rc::Rc;

pub fn print_value(value: &Value) -> Result<String> {
    let mut out = String::new();
    let mut path = HashSet::new();
    write_value(value, &mut out, &mut path)?;
    Ok(out)
}

fn write_value(value: &Value, out: &mut String, path: &mut HashSet<*const Pair>) -> Result<()> {
    match value {
        Value::Number(n) => write_number(*n, out),
        Value::Str(s) => out.push_str(s),
        Value::Char(c) => {
            let _ = write!(out, "#\\{c}");
        }
        Value::Bool(b) => out.push_str(if *b { "#t" } else { "#f" }),
        Value::EmptyList => out.push_str("()"),
        Value::Symbol(s) => out.push_str(&s.name()),
        Value::Procedure(p) => {
            let _ = write!(out, "{p:?}");
        }
        Value::NonReturn(tag) => {
            let _ = write!(out, "<unspecified:{tag}>");
        }
        Value::Pair(pair) => write_pair(pair, out, path, true)?,
    }
    Ok(())
}

fn write_number(n: f64, out: &mut String) {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        let _ = write!(out, "{}", n as i64);
    } else {
        let _ = write!(out, "{n}");
    }
}

fn write_pair(
    pair: &Rc<Pair>,
    out: &mut String,
    path: &mut HashSet<*const Pair>,
    top_level: bool,
) -> Result<()> {
    let ptr = Rc::as_ptr(pair);
    if !path.insert(ptr) {
        return Err(SchemeError::CyclicPair { pos: Pos::default() });
    }
    if top_level {
        out.push('(');
    }
    write_value(&pair.car, out, path)?;
    match &pair.cdr {
        Value::EmptyList => {}
        Value::Pair(next) => {
            out.push(' ');
            write_pair(next, out, path, false)?;
        }
        other => {
            out.push_str(" . ");
            write_value(other, out, path)?;
        }
    }
    if top_level {
        out.push(')');
    }
    path.remove(&ptr);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::Symbol;

    #[test]
    fn integer_valued_numbers_drop_the_decimal() {
        assert_eq!(print_value(&Value::Number(3.0)).unwrap(), "3");
        assert_eq!(print_value(&Value::Number(3.5)).unwrap(), "3.5");
    }

    #[test]
    fn proper_list_renders_without_dots() {
        let list = Value::list_from_vec(vec![
            Value::Number(1.0),
            Value::Number(2.0),
            Value::Number(3.0),
        ]);
        assert_eq!(print_value(&list).unwrap(), "(1 2 3)");
    }

    #[test]
    fn improper_list_uses_dotted_notation() {
        let pair = Value::cons(Value::Number(1.0), Value::Number(2.0));
        assert_eq!(print_value(&pair).unwrap(), "(1 . 2)");
    }

    #[test]
    fn shared_but_acyclic_pair_prints_twice_without_erroring() {
        let shared = Value::cons(Value::Number(9.0), Value::EmptyList);
        let list = Value::list_from_vec(vec![shared.clone(), shared]);
        assert_eq!(print_value(&list).unwrap(), "((9) (9))");
    }

    #[test]
    fn symbol_prints_its_interned_name() {
        let sym = Value::Symbol(Symbol::intern("done"));
        assert_eq!(print_value(&sym).unwrap(), "done");
    }

    #[test]
    fn string_has_no_leading_quote_tag() {
        assert_eq!(print_value(&Value::Str(Rc::from("hi"))).unwrap(), "hi");
    }
}
