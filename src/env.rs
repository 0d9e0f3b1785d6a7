//! The lexical environment: a frame chain of public bindings plus private,
//! interpreter-only slots (spec.md §3, §4.1).

use crate::error::{Pos, Result, SchemeError};
use crate::symbol::Symbol;
use crate::value::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// The concrete realization of the private `"_cp"` slot (spec.md §4.4, §7):
/// a record of the call that created this frame, linking back to the
/// *dynamic* caller's environment so a stack trace can be synthesized by
/// walking call records rather than lexical parents.
#[derive(Clone)]
pub struct CallRecord {
    pub proc_name: Rc<str>,
    pub call_pos: Pos,
    pub caller_env: Rc<RefCell<Environment>>,
}

impl fmt::Display for CallRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "\"{}\", called from line {} col {}",
            self.proc_name, self.call_pos.line, self.call_pos.col
        )
    }
}

pub struct Environment {
    bindings: HashMap<Symbol, Value>,
    private: HashMap<Symbol, Value>,
    call_record: Option<CallRecord>,
    parent: Option<Rc<RefCell<Environment>>>,
}

impl Environment {
    pub fn new() -> Self {
        Environment {
            bindings: HashMap::new(),
            private: HashMap::new(),
            call_record: None,
            parent: None,
        }
    }

    pub fn new_child(parent: Rc<RefCell<Environment>>) -> Self {
        Environment {
            bindings: HashMap::new(),
            private: HashMap::new(),
            call_record: None,
            parent: Some(parent),
        }
    }

    /// Unconditional write to the current frame.
    pub fn bind(&mut self, name: Symbol, value: Value) {
        self.bindings.insert(name, value);
    }

    pub fn bind_private(&mut self, name: Symbol, value: Value) {
        self.private.insert(name, value);
    }

    /// Walks frames outward; first hit wins.
    pub fn lookup(this: &Rc<RefCell<Environment>>, name: Symbol) -> Option<Value> {
        let env = this.borrow();
        if let Some(v) = env.bindings.get(&name) {
            return Some(v.clone());
        }
        match &env.parent {
            Some(parent) => Environment::lookup(parent, name),
            None => None,
        }
    }

    pub fn lookup_private(&self, name: Symbol) -> Option<Value> {
        self.private.get(&name).cloned()
    }

    pub fn set_call_record(&mut self, record: CallRecord) {
        self.call_record = Some(record);
    }

    pub fn call_record(&self) -> Option<&CallRecord> {
        self.call_record.as_ref()
    }

    /// Allocates a new frame with the given bindings and the current frame
    /// as its enclosing pointer. Arity mismatch is an error carrying the
    /// call-site position (spec.md §4.1).
    pub fn extend(
        enclosing: Rc<RefCell<Environment>>,
        params: &[Symbol],
        values: Vec<Value>,
        pos: Pos,
    ) -> Result<Rc<RefCell<Environment>>> {
        check_arity(params.len(), values.len(), pos)?;
        let mut frame = Environment::new_child(enclosing);
        for (param, value) in params.iter().zip(values) {
            frame.bind(*param, value);
        }
        Ok(Rc::new(RefCell::new(frame)))
    }

    /// Overwrites bindings in the current frame in place — used only on the
    /// tail-call path, so the enclosing pointer never changes and no new
    /// frame is allocated. After rebinding, the binding set is exactly the
    /// parameter list (invariant: no stale slots survive from the previous
    /// call).
    pub fn rebind(this: &Rc<RefCell<Environment>>, params: &[Symbol], values: Vec<Value>, pos: Pos) -> Result<()> {
        check_arity(params.len(), values.len(), pos)?;
        let mut env = this.borrow_mut();
        env.bindings.clear();
        for (param, value) in params.iter().zip(values) {
            env.bindings.insert(*param, value);
        }
        Ok(())
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::new()
    }
}

fn check_arity(expected: usize, got: usize, pos: Pos) -> Result<()> {
    if expected == got {
        Ok(())
    } else {
        Err(SchemeError::Arity {
            expected: expected.to_string(),
            got,
            pos,
        })
    }
}

/// Walks the `_cp` call-record chain starting at `env`, synthesizing the
/// stack trace lines described in spec.md §7.
pub fn stack_frames(env: &Rc<RefCell<Environment>>) -> Vec<CallRecord> {
    let mut frames = Vec::new();
    let mut cur = env.borrow().call_record().cloned();
    while let Some(record) = cur {
        cur = record.caller_env.borrow().call_record().cloned();
        frames.push(record);
    }
    frames
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_outward() {
        let root = Rc::new(RefCell::new(Environment::new()));
        root.borrow_mut().bind(Symbol::intern("x"), Value::Number(1.0));
        let child = Rc::new(RefCell::new(Environment::new_child(root.clone())));
        assert!(matches!(
            Environment::lookup(&child, Symbol::intern("x")),
            Some(Value::Number(n)) if n == 1.0
        ));
        assert!(Environment::lookup(&child, Symbol::intern("y")).is_none());
    }

    #[test]
    fn rebind_clears_stale_slots() {
        let root = Rc::new(RefCell::new(Environment::new()));
        let frame = Rc::new(RefCell::new(Environment::new_child(root)));
        let a = Symbol::intern("a");
        let b = Symbol::intern("b");
        Environment::rebind(&frame, &[a, b], vec![Value::Number(1.0), Value::Number(2.0)], Pos::default())
            .unwrap();
        Environment::rebind(&frame, &[a], vec![Value::Number(3.0)], Pos::default()).unwrap();
        assert!(Environment::lookup(&frame, b).is_none());
        assert!(matches!(Environment::lookup(&frame, a), Some(Value::Number(n)) if n == 3.0));
    }

    #[test]
    fn extend_arity_mismatch_errors() {
        let root = Rc::new(RefCell::new(Environment::new()));
        let a = Symbol::intern("a");
        let result = Environment::extend(root, &[a], vec![], Pos::default());
        assert!(result.is_err());
    }
}
