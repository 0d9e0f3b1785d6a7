//! Skimpy: a small Scheme-like Lisp. The pipeline is tokenizer (`parser`) →
//! lazy analyzer (`analyze`) → trampoline evaluator (`eval`), backed by an
//! interned-symbol environment (`env`/`symbol`) and a pretty-printer
//! (`printer`). `builtins` populates a fresh top-level environment.

pub mod analyze;
pub mod builtins;
pub mod env;
pub mod error;
pub mod eval;
pub mod parser;
pub mod printer;
pub mod symbol;
pub mod value;

use env::Environment;
use error::Result;
use std::cell::RefCell;
use std::rc::Rc;
use value::Value;

/// Builds a fresh top-level environment with every builtin bound.
pub fn new_global_env() -> Rc<RefCell<Environment>> {
    let env = Rc::new(RefCell::new(Environment::new()));
    builtins::register_builtins(&env);
    env
}

/// Parses and evaluates every top-level form in `source`, returning the last
/// one's value — the library-level equivalent of `sloop.py::execute_code`
/// for a single recipient, without the shell's error printing.
pub fn eval_source(source: &str, env: &Rc<RefCell<Environment>>) -> Result<Value> {
    let forms = parser::parse_program(source)?;
    let mut last = Value::non_return("<unspecified>");
    for form in &forms {
        last = eval::eval_cst(form, env.clone())?;
    }
    Ok(last)
}
