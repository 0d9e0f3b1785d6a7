//! Process-wide symbol interning (spec.md §3 invariant 4, §5 shared resources).
//!
//! Symbols are interned by lowercase name into a single global table guarded
//! by a mutex, exactly as `senv.py::lookup_symbol` does with its
//! `symbol_dict_lock`. Two symbols with the same name are always the same
//! `Symbol` value, so `eq?`-style comparison reduces to `==`.

use lazy_static::lazy_static;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Symbol(u32);

struct Interner {
    names: Vec<Arc<str>>,
    ids: HashMap<Arc<str>, Symbol>,
}

impl Interner {
    fn new() -> Self {
        Interner {
            names: Vec::new(),
            ids: HashMap::new(),
        }
    }

    fn intern(&mut self, name: &str) -> Symbol {
        if let Some(id) = self.ids.get(name) {
            return *id;
        }
        let arc: Arc<str> = Arc::from(name);
        let id = Symbol(self.names.len() as u32);
        self.names.push(arc.clone());
        self.ids.insert(arc, id);
        id
    }

    fn name(&self, sym: Symbol) -> Arc<str> {
        self.names[sym.0 as usize].clone()
    }
}

lazy_static! {
    static ref INTERNER: Mutex<Interner> = Mutex::new(Interner::new());
}

impl Symbol {
    /// Interns `name`, lowercased per spec.md §3. Readers and writers of the
    /// shared table both acquire the lock (spec.md §5).
    pub fn intern(name: &str) -> Symbol {
        let lower = name.to_lowercase();
        INTERNER.lock().unwrap().intern(&lower)
    }

    pub fn name(self) -> Arc<str> {
        INTERNER.lock().unwrap().name(self)
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_case_insensitive_and_reference_stable() {
        let a = Symbol::intern("Foo");
        let b = Symbol::intern("foo");
        let c = Symbol::intern("FOO");
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(&*a.name(), "foo");
    }

    #[test]
    fn distinct_names_intern_to_distinct_symbols() {
        let a = Symbol::intern("foo");
        let b = Symbol::intern("bar");
        assert_ne!(a, b);
    }
}
