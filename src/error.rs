use crate::env::Environment;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// A source position, carried by tokens and analyzed forms alike so errors
/// and stack traces can point back at the offending text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pos {
    pub line: usize,
    pub col: usize,
}

impl Pos {
    pub fn new(line: usize, col: usize) -> Self {
        Pos { line, col }
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {} col {}", self.line, self.col)
    }
}

/// Lexical, syntactic, semantic and runtime errors (spec.md §7), each
/// carrying the offending (line, col).
#[derive(Error, Debug, Clone)]
pub enum SchemeError {
    #[error("invalid character: {ch}")]
    LexInvalidChar { ch: char, pos: Pos },
    #[error("unmatched '('")]
    LexUnmatchedOpen { pos: Pos },
    #[error("unmatched ')'")]
    LexUnmatchedClose { pos: Pos },
    #[error("unterminated string literal")]
    LexUnterminatedString { pos: Pos },

    #[error("{reason}")]
    Syntax { reason: String, pos: Pos },

    #[error("unbound variable in this context: {name}")]
    UnboundVariable { name: String, pos: Pos },
    #[error("application: {found} is not callable")]
    NotProcedure { found: String, pos: Pos },
    #[error("expected {expected}, found {found}")]
    Type {
        expected: String,
        found: String,
        pos: Pos,
    },
    #[error("expected {expected} argument(s), got {got}")]
    Arity {
        expected: String,
        got: usize,
        pos: Pos,
    },

    #[error("division by zero")]
    DivisionByZero { pos: Pos },
    #[error("cannot print a cyclic pair structure")]
    CyclicPair { pos: Pos },
    #[error("load: could not find file {path}")]
    FileNotFound { path: String, pos: Pos },
}

impl SchemeError {
    pub fn pos(&self) -> Pos {
        match self {
            SchemeError::LexInvalidChar { pos, .. }
            | SchemeError::LexUnmatchedOpen { pos }
            | SchemeError::LexUnmatchedClose { pos }
            | SchemeError::LexUnterminatedString { pos }
            | SchemeError::Syntax { pos, .. }
            | SchemeError::UnboundVariable { pos, .. }
            | SchemeError::NotProcedure { pos, .. }
            | SchemeError::Type { pos, .. }
            | SchemeError::Arity { pos, .. }
            | SchemeError::DivisionByZero { pos }
            | SchemeError::CyclicPair { pos }
            | SchemeError::FileNotFound { pos, .. } => *pos,
        }
    }

    /// Renders the `"SkimpyError: line L col C: <reason>"` surface format,
    /// followed by one `"<proc-name>", called from line L col C` line per
    /// stack frame when `env` is given (spec.md §7).
    pub fn report(&self, env: Option<&Rc<RefCell<Environment>>>) -> String {
        let pos = self.pos();
        let mut out = format!("SkimpyError: line {} col {}: {}", pos.line, pos.col, self);
        if let Some(env) = env {
            for frame in crate::env::stack_frames(env) {
                out.push('\n');
                out.push_str(&frame.to_string());
            }
        }
        out
    }
}

pub type Result<T> = std::result::Result<T, SchemeError>;
