//! The initial environment (spec.md §6): arithmetic, comparisons, pairs,
//! type predicates and the handful of I/O/meta operations a bare interpreter
//! needs to run anything. Grounded in `original_source/sbuiltins.py`'s
//! `register_builtins`, generalized from Skimpy's `(env, token, *args)`
//! Python calling convention to this crate's `NativeProcedure`/`NativeBody`
//! split (spec.md §3): arithmetic and comparisons are non-raw (pre-unwrapped
//! to `HostScalar`, matching `sbuiltins.py`'s non-raw bindings for `+ - * /
//! = < > remainder`); everything that needs to see a `Pair`, `Symbol` or
//! `Procedure` directly — or the calling environment, for `map`/`load` — is
//! raw, matching `sbuiltins.py`'s `is_raw=True` bindings for `cons car cdr
//! map list display`. `load` is raw here even though the original marks it
//! non-raw: only raw natives in this design see the call-site environment,
//! and `load` needs it to evaluate the loaded file's forms in the caller's
//! frame rather than the top level.

use crate::env::Environment;
use crate::error::{Pos, Result, SchemeError};
use crate::eval::apply_procedure;
use crate::parser::parse_program;
use crate::symbol::Symbol;
use crate::value::{HostScalar, NativeBody, NativeProcedure, Procedure, RawNativeFn, ScalarNativeFn, Value};
use std::cell::RefCell;
use std::fs;
use std::rc::Rc;

fn scalar_native(
    name: &'static str,
    min_args: Option<usize>,
    max_args: Option<usize>,
    body: ScalarNativeFn,
) -> Value {
    Value::Procedure(Procedure::Native(Rc::new(NativeProcedure {
        name,
        min_args,
        max_args,
        checks: Vec::new(),
        body: NativeBody::Scalar(body),
    })))
}

fn raw_native(
    name: &'static str,
    min_args: Option<usize>,
    max_args: Option<usize>,
    body: RawNativeFn,
) -> Value {
    Value::Procedure(Procedure::Native(Rc::new(NativeProcedure {
        name,
        min_args,
        max_args,
        checks: Vec::new(),
        body: NativeBody::Raw(body),
    })))
}

// --- arithmetic (non-raw: `sbuiltins.py::make_accumulator`/`negator`) ------

fn add(args: &[HostScalar], pos: Pos) -> Result<HostScalar> {
    let mut sum = 0.0;
    for a in args {
        sum += a.as_number(pos)?;
    }
    Ok(HostScalar::Number(sum))
}

fn multiply(args: &[HostScalar], pos: Pos) -> Result<HostScalar> {
    let mut product = 1.0;
    for a in args {
        product *= a.as_number(pos)?;
    }
    Ok(HostScalar::Number(product))
}

fn subtract(args: &[HostScalar], pos: Pos) -> Result<HostScalar> {
    let first = args[0].as_number(pos)?;
    if args.len() == 1 {
        return Ok(HostScalar::Number(-first));
    }
    let mut result = first;
    for a in &args[1..] {
        result -= a.as_number(pos)?;
    }
    Ok(HostScalar::Number(result))
}

/// Single-argument `/` is the identity, exactly like single-argument `+`/`*`
/// (`sbuiltins.py::py_accumulate` never special-cases a lone input; only
/// `-` gets a negating special case, via `negator`).
fn divide(args: &[HostScalar], pos: Pos) -> Result<HostScalar> {
    let first = args[0].as_number(pos)?;
    if args.len() == 1 {
        return Ok(HostScalar::Number(first));
    }
    let mut result = first;
    for a in &args[1..] {
        let n = a.as_number(pos)?;
        if n == 0.0 {
            return Err(SchemeError::DivisionByZero { pos });
        }
        result /= n;
    }
    Ok(HostScalar::Number(result))
}

// --- comparisons: binary (spec.md §6; `sbuiltins.py::is_equal/is_less/is_greater`
// take exactly two arguments, not a chained accumulator) -------------------

fn num_eq(args: &[HostScalar], pos: Pos) -> Result<HostScalar> {
    Ok(HostScalar::Bool(args[0].as_number(pos)? == args[1].as_number(pos)?))
}

fn num_lt(args: &[HostScalar], pos: Pos) -> Result<HostScalar> {
    Ok(HostScalar::Bool(args[0].as_number(pos)? < args[1].as_number(pos)?))
}

fn num_gt(args: &[HostScalar], pos: Pos) -> Result<HostScalar> {
    Ok(HostScalar::Bool(args[0].as_number(pos)? > args[1].as_number(pos)?))
}

fn remainder(args: &[HostScalar], pos: Pos) -> Result<HostScalar> {
    let divisor = args[0].as_number(pos)?;
    let dividend = args[1].as_number(pos)?;
    if dividend == 0.0 {
        return Err(SchemeError::DivisionByZero { pos });
    }
    Ok(HostScalar::Number(divisor % dividend))
}

// --- pairs/lists (raw: `sbuiltins.py::make_pair/pair_left/pair_right/make_list`) --

fn cons(args: &[Value], _env: &Rc<RefCell<Environment>>, _pos: Pos) -> Result<Value> {
    Ok(Value::cons(args[0].clone(), args[1].clone()))
}

fn car(args: &[Value], _env: &Rc<RefCell<Environment>>, pos: Pos) -> Result<Value> {
    Ok(args[0].as_pair(pos)?.car.clone())
}

fn cdr(args: &[Value], _env: &Rc<RefCell<Environment>>, pos: Pos) -> Result<Value> {
    Ok(args[0].as_pair(pos)?.cdr.clone())
}

fn list(args: &[Value], _env: &Rc<RefCell<Environment>>, _pos: Pos) -> Result<Value> {
    Ok(Value::list_from_vec(args.to_vec()))
}

/// `(map proc list)`: walks `list` and calls back into `proc` for each
/// element, exactly as `sbuiltins.py::map_list` does via
/// `SkimpyProc.apply` — the reason `map` has to be raw rather than a thin
/// `HostScalar` wrapper, since it needs the actual `Procedure` value.
fn map_builtin(args: &[Value], env: &Rc<RefCell<Environment>>, pos: Pos) -> Result<Value> {
    let Value::Procedure(proc) = &args[0] else {
        return Err(Value::type_error("procedure", &args[0], pos));
    };
    let items = args[1]
        .list_to_vec()
        .ok_or_else(|| Value::type_error("list", &args[1], pos))?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        out.push(apply_procedure(proc.clone(), vec![item], env.clone(), pos)?);
    }
    Ok(Value::list_from_vec(out))
}

// --- type predicates (raw: must accept any `Value` without erroring,
// the teacher's `is_null`/`is_boolean`/`is_symbol`/`is_integer` family) ----

fn null_q(args: &[Value], _env: &Rc<RefCell<Environment>>, _pos: Pos) -> Result<Value> {
    Ok(Value::bool(matches!(args[0], Value::EmptyList)))
}

fn pair_q(args: &[Value], _env: &Rc<RefCell<Environment>>, _pos: Pos) -> Result<Value> {
    Ok(Value::bool(args[0].is_pair()))
}

fn list_q(args: &[Value], _env: &Rc<RefCell<Environment>>, _pos: Pos) -> Result<Value> {
    Ok(Value::bool(args[0].is_list()))
}

fn boolean_q(args: &[Value], _env: &Rc<RefCell<Environment>>, _pos: Pos) -> Result<Value> {
    Ok(Value::bool(matches!(args[0], Value::Bool(_))))
}

fn symbol_q(args: &[Value], _env: &Rc<RefCell<Environment>>, _pos: Pos) -> Result<Value> {
    Ok(Value::bool(matches!(args[0], Value::Symbol(_))))
}

fn number_q(args: &[Value], _env: &Rc<RefCell<Environment>>, _pos: Pos) -> Result<Value> {
    Ok(Value::bool(matches!(args[0], Value::Number(_))))
}

fn string_q(args: &[Value], _env: &Rc<RefCell<Environment>>, _pos: Pos) -> Result<Value> {
    Ok(Value::bool(matches!(args[0], Value::Str(_))))
}

fn procedure_q(args: &[Value], _env: &Rc<RefCell<Environment>>, _pos: Pos) -> Result<Value> {
    Ok(Value::bool(args[0].is_procedure()))
}

fn zero_q(args: &[Value], _env: &Rc<RefCell<Environment>>, pos: Pos) -> Result<Value> {
    Ok(Value::bool(args[0].as_number(pos)? == 0.0))
}

fn not_builtin(args: &[Value], _env: &Rc<RefCell<Environment>>, _pos: Pos) -> Result<Value> {
    Ok(Value::bool(args[0].is_false()))
}

// --- identity/equality (raw: `sdata.py`'s pair/procedure identity has no
// representation in `HostScalar`) ------------------------------------------

fn eq_q(args: &[Value], _env: &Rc<RefCell<Environment>>, _pos: Pos) -> Result<Value> {
    Ok(Value::bool(args[0].eq_identity(&args[1])))
}

fn equal_q(args: &[Value], _env: &Rc<RefCell<Environment>>, _pos: Pos) -> Result<Value> {
    Ok(Value::bool(args[0].eq_structural(&args[1])))
}

// --- I/O and meta (raw: `sbuiltins.py::display_text`/`load_file`) ---------

fn display(args: &[Value], _env: &Rc<RefCell<Environment>>, _pos: Pos) -> Result<Value> {
    use std::io::Write as _;
    let mut stdout = std::io::stdout();
    for arg in args {
        let _ = write!(stdout, "{}", crate::printer::print_value(arg)?);
    }
    Ok(Value::non_return("<unspecified>"))
}

fn newline(_args: &[Value], _env: &Rc<RefCell<Environment>>, _pos: Pos) -> Result<Value> {
    println!();
    Ok(Value::non_return("<unspecified>"))
}

/// Reads and executes a whole file in the *calling* environment, not the
/// top level, matching `sbuiltins.py::load_file`'s `sloop.execute_code(ptext,
/// env)` exactly.
fn load(args: &[Value], env: &Rc<RefCell<Environment>>, pos: Pos) -> Result<Value> {
    let Value::Str(path) = &args[0] else {
        return Err(Value::type_error("string", &args[0], pos));
    };
    let text = fs::read_to_string(path.as_ref()).map_err(|_| SchemeError::FileNotFound {
        path: path.to_string(),
        pos,
    })?;
    let forms = parse_program(&text)?;
    for form in &forms {
        crate::eval::eval_cst(form, env.clone())?;
    }
    Ok(Value::non_return("<unspecified>"))
}

/// Binds every builtin procedure plus the `#t`/`#f`/`#\newline` constants
/// into `env` (spec.md §6). `#t`/`#f`/`#\newline` are ordinary identifiers
/// to the tokenizer (see `parser.rs`'s extended-identifier character class),
/// not literal syntax, so they only work once bound here.
pub fn register_builtins(env: &Rc<RefCell<Environment>>) {
    let entries: Vec<(&str, Value)> = vec![
        ("+", scalar_native("+", Some(1), None, add)),
        ("*", scalar_native("*", Some(1), None, multiply)),
        ("-", scalar_native("-", Some(1), None, subtract)),
        ("/", scalar_native("/", Some(1), None, divide)),
        ("=", scalar_native("=", Some(2), Some(2), num_eq)),
        ("<", scalar_native("<", Some(2), Some(2), num_lt)),
        (">", scalar_native(">", Some(2), Some(2), num_gt)),
        ("remainder", scalar_native("remainder", Some(2), Some(2), remainder)),
        ("cons", raw_native("cons", Some(2), Some(2), cons)),
        ("car", raw_native("car", Some(1), Some(1), car)),
        ("cdr", raw_native("cdr", Some(1), Some(1), cdr)),
        ("list", raw_native("list", None, None, list)),
        ("map", raw_native("map", Some(2), Some(2), map_builtin)),
        ("null?", raw_native("null?", Some(1), Some(1), null_q)),
        ("pair?", raw_native("pair?", Some(1), Some(1), pair_q)),
        ("list?", raw_native("list?", Some(1), Some(1), list_q)),
        ("boolean?", raw_native("boolean?", Some(1), Some(1), boolean_q)),
        ("symbol?", raw_native("symbol?", Some(1), Some(1), symbol_q)),
        ("number?", raw_native("number?", Some(1), Some(1), number_q)),
        ("string?", raw_native("string?", Some(1), Some(1), string_q)),
        ("procedure?", raw_native("procedure?", Some(1), Some(1), procedure_q)),
        ("zero?", raw_native("zero?", Some(1), Some(1), zero_q)),
        ("not", raw_native("not", Some(1), Some(1), not_builtin)),
        ("eq?", raw_native("eq?", Some(2), Some(2), eq_q)),
        ("equal?", raw_native("equal?", Some(2), Some(2), equal_q)),
        ("display", raw_native("display", Some(1), None, display)),
        ("newline", raw_native("newline", Some(0), Some(0), newline)),
        ("load", raw_native("load", Some(1), Some(1), load)),
    ];

    let mut env_mut = env.borrow_mut();
    for (name, value) in entries {
        env_mut.bind(Symbol::intern(name), value);
    }
    env_mut.bind(Symbol::intern("#t"), Value::Bool(true));
    env_mut.bind(Symbol::intern("#f"), Value::Bool(false));
    env_mut.bind(Symbol::intern("#\\newline"), Value::Char('\n'));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::eval_cst;

    fn eval_str(src: &str, env: &Rc<RefCell<Environment>>) -> Result<Value> {
        let mut forms = parse_program(src).unwrap();
        let last = forms.pop().unwrap();
        for form in forms {
            eval_cst(&form, env.clone())?;
        }
        eval_cst(&last, env.clone())
    }

    fn fresh_env() -> Rc<RefCell<Environment>> {
        let env = Rc::new(RefCell::new(Environment::new()));
        register_builtins(&env);
        env
    }

    fn as_number(v: Value) -> f64 {
        match v {
            Value::Number(n) => n,
            _ => panic!("expected a number"),
        }
    }

    fn as_bool(v: Value) -> bool {
        match v {
            Value::Bool(b) => b,
            _ => panic!("expected a boolean"),
        }
    }

    #[test]
    fn arithmetic_is_variadic_and_left_associative() {
        let env = fresh_env();
        assert_eq!(as_number(eval_str("(+ 1 2 3)", &env).unwrap()), 6.0);
        assert_eq!(as_number(eval_str("(- 10 1 2)", &env).unwrap()), 7.0);
        assert_eq!(as_number(eval_str("(- 5)", &env).unwrap()), -5.0);
        assert_eq!(as_number(eval_str("(* 2 3 4)", &env).unwrap()), 24.0);
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let env = fresh_env();
        assert!(matches!(
            eval_str("(/ 1 0)", &env),
            Err(SchemeError::DivisionByZero { .. })
        ));
    }

    #[test]
    fn comparisons_are_strictly_binary() {
        let env = fresh_env();
        assert!(as_bool(eval_str("(< 1 2)", &env).unwrap()));
        assert!(matches!(
            eval_str("(< 1 2 3)", &env),
            Err(SchemeError::Arity { .. })
        ));
    }

    #[test]
    fn pair_operations_round_trip() {
        let env = fresh_env();
        assert_eq!(as_number(eval_str("(car (cons 1 2))", &env).unwrap()), 1.0);
        assert_eq!(as_number(eval_str("(cdr (cons 1 2))", &env).unwrap()), 2.0);
        assert!(as_bool(eval_str("(null? (list))", &env).unwrap()));
        assert!(as_bool(eval_str("(pair? (cons 1 2))", &env).unwrap()));
    }

    #[test]
    fn map_applies_a_compound_procedure_to_each_element() {
        let env = fresh_env();
        let v = eval_str("(map (lambda (x) (* x x)) (list 1 2 3))", &env).unwrap();
        let items: Vec<f64> = v.list_to_vec().unwrap().into_iter().map(as_number).collect();
        assert_eq!(items, vec![1.0, 4.0, 9.0]);
    }

    #[test]
    fn type_predicates_never_error_on_mismatched_types() {
        let env = fresh_env();
        assert!(!as_bool(eval_str("(number? 'foo)", &env).unwrap()));
        assert!(!as_bool(eval_str("(pair? 3)", &env).unwrap()));
        assert!(!as_bool(eval_str("(not 3)", &env).unwrap()));
    }

    #[test]
    fn eq_is_identity_and_equal_is_structural() {
        let env = fresh_env();
        assert!(!as_bool(eval_str("(eq? (cons 1 2) (cons 1 2))", &env).unwrap()));
        assert!(as_bool(eval_str("(equal? (cons 1 2) (cons 1 2))", &env).unwrap()));
    }
}
