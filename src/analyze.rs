//! CST → tagged AST translation (spec.md §4.2), grounded in
//! `original_source/seval.py`'s `translate`/`analyze_*` functions. Analysis
//! is lazy in depth: only the immediate form is analyzed here; subforms stay
//! as CST until first evaluated, at which point the slot holding them is
//! overwritten with the analyzed form (idempotent — see `translate_slot`).

use crate::error::{Pos, Result, SchemeError};
use crate::parser::{Cst, CstList, Token};
use crate::symbol::Symbol;
use crate::value::Value;
use std::cell::RefCell;
use std::rc::Rc;

/// One lazily-translated child reference: either still the original CST node
/// or already analyzed and cached.
pub enum Slot {
    Cst(Cst),
    Analyzed(Rc<AnalyzedForm>),
}

pub type SlotCell = RefCell<Slot>;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum QualifierKind {
    Or,
    And,
}

/// The tagged AST (spec.md §3). Every variant keeps the originating position
/// for error reporting.
pub enum AnalyzedForm {
    Literal(Value),
    Variable {
        name: Symbol,
        pos: Pos,
    },
    /// `body` is shared (via `Rc::clone`) with every `CompoundProcedure`
    /// created by evaluating this lambda, so lazy-translation caching
    /// amortizes across every closure instance, not just one (spec.md §3
    /// invariant 5, `SkimpyLambda.make_eval` reusing `get_subnode(0)`).
    Lambda {
        params: Vec<Symbol>,
        body: Rc<SlotCell>,
        pos: Pos,
    },
    Define {
        name: Symbol,
        expr: SlotCell,
        pos: Pos,
    },
    If {
        cond: SlotCell,
        consequent: SlotCell,
        alternative: Option<SlotCell>,
        pos: Pos,
    },
    Sequence {
        forms: Vec<SlotCell>,
        pos: Pos,
    },
    Application {
        op: SlotCell,
        args: Vec<SlotCell>,
        pos: Pos,
    },
    Qualifier {
        kind: QualifierKind,
        forms: Vec<SlotCell>,
        pos: Pos,
    },
}

impl AnalyzedForm {
    pub fn pos(&self) -> Pos {
        match self {
            AnalyzedForm::Literal(_) => Pos::default(),
            AnalyzedForm::Variable { pos, .. }
            | AnalyzedForm::Lambda { pos, .. }
            | AnalyzedForm::Define { pos, .. }
            | AnalyzedForm::If { pos, .. }
            | AnalyzedForm::Sequence { pos, .. }
            | AnalyzedForm::Application { pos, .. }
            | AnalyzedForm::Qualifier { pos, .. } => *pos,
        }
    }
}

fn syntax_err(reason: &str, pos: Pos) -> SchemeError {
    SchemeError::Syntax {
        reason: reason.to_string(),
        pos,
    }
}

fn cst_slot(cst: &Cst) -> SlotCell {
    RefCell::new(Slot::Cst(cst.clone()))
}

/// Translates a single CST node into its analyzed form, dispatching on
/// keyword or falling back to application (spec.md §4.2).
pub fn translate(cst: &Cst) -> Result<Rc<AnalyzedForm>> {
    match cst {
        Cst::Atom(tok) => translate_atom(tok),
        Cst::List(list) => translate_list(list),
    }
}

/// Reads a slot, translating and caching in place on first access. Calling
/// this twice on the same cell returns the same `Rc` (idempotence, spec.md §3
/// invariant 2).
pub fn translate_slot(cell: &SlotCell) -> Result<Rc<AnalyzedForm>> {
    let cst = match &*cell.borrow() {
        Slot::Analyzed(form) => return Ok(form.clone()),
        Slot::Cst(cst) => cst.clone(),
    };
    let form = translate(&cst)?;
    *cell.borrow_mut() = Slot::Analyzed(form.clone());
    Ok(form)
}

/// Wraps a whole program's top-level forms as one implicit sequence — the
/// one call site that plays the role of `seval.py`'s program-root detection
/// (`get_form_factory`'s `form.parent is None` branch), now that the parser
/// represents top-level forms as a flat list rather than a single rooted
/// tree (see parser.rs).
pub fn translate_root(forms: Vec<Cst>, pos: Pos) -> Result<Rc<AnalyzedForm>> {
    if forms.is_empty() {
        return Err(syntax_err("empty program", pos));
    }
    let slots = forms.iter().map(cst_slot).collect();
    Ok(Rc::new(AnalyzedForm::Sequence { forms: slots, pos }))
}

fn translate_atom(tok: &Token) -> Result<Rc<AnalyzedForm>> {
    if tok.is_number() {
        let n: f64 = tok
            .text
            .parse()
            .map_err(|_| syntax_err(&format!("invalid number literal: {}", tok.text), tok.pos))?;
        Ok(Rc::new(AnalyzedForm::Literal(Value::Number(n))))
    } else if tok.is_string() {
        Ok(Rc::new(AnalyzedForm::Literal(Value::Str(Rc::from(
            &tok.text[1..],
        )))))
    } else {
        Ok(Rc::new(AnalyzedForm::Variable {
            name: Symbol::intern(&tok.text),
            pos: tok.pos,
        }))
    }
}

fn translate_list(list: &Rc<CstList>) -> Result<Rc<AnalyzedForm>> {
    let pos = list.pos;
    if list.children.is_empty() {
        return Err(syntax_err("unexpected empty form ()", pos));
    }

    if let Some(head) = list.children[0].as_atom() {
        if head.is_varname() {
            match &*head.text {
                "lambda" => return analyze_lambda(list, pos),
                "define" => return analyze_define(list, pos),
                "begin" => return analyze_begin(list, pos),
                "if" => return analyze_if(list, pos),
                "cond" => return analyze_cond(list, pos),
                "let" => return analyze_let(list, pos),
                "or" => return analyze_qualifier(list, pos, QualifierKind::Or),
                "and" => return analyze_qualifier(list, pos, QualifierKind::And),
                "quote" => return analyze_quote(list, pos),
                _ => {}
            }
        }
    }

    analyze_apply(list, pos)
}

/// Converts a quoted CST datum into a literal `Value` without evaluating it:
/// atoms follow the same literal/symbol rules as any other atom, and lists
/// become right-nested pair chains built recursively in the same shape.
fn literal_from_cst(cst: &Cst) -> Result<Value> {
    match cst {
        Cst::Atom(tok) => {
            if tok.is_number() {
                let n: f64 = tok.text.parse().map_err(|_| {
                    syntax_err(&format!("invalid number literal: {}", tok.text), tok.pos)
                })?;
                Ok(Value::Number(n))
            } else if tok.is_string() {
                Ok(Value::Str(Rc::from(&tok.text[1..])))
            } else {
                Ok(Value::Symbol(Symbol::intern(&tok.text)))
            }
        }
        Cst::List(list) => {
            let mut items = Vec::with_capacity(list.children.len());
            for child in &list.children {
                items.push(literal_from_cst(child)?);
            }
            Ok(Value::list_from_vec(items))
        }
    }
}

fn require_varname<'a>(cst: &'a Cst, reason: &str, pos: Pos) -> Result<&'a Token> {
    cst.as_atom()
        .filter(|t| t.is_varname())
        .ok_or_else(|| syntax_err(reason, pos))
}

/// A lambda/define procedure body: a single expression stays lazy as-is;
/// multiple expressions are eagerly wrapped in one `Sequence` (itself still
/// lazy in its own children) — matching `analyze_proc_body`.
fn analyze_proc_body(forms: &[Cst], pos: Pos) -> Result<SlotCell> {
    if forms.is_empty() {
        return Err(syntax_err("empty procedure body", pos));
    }
    if forms.len() == 1 {
        Ok(cst_slot(&forms[0]))
    } else {
        let slots = forms.iter().map(cst_slot).collect();
        Ok(RefCell::new(Slot::Analyzed(Rc::new(AnalyzedForm::Sequence {
            forms: slots,
            pos,
        }))))
    }
}

fn analyze_params(arglist: &Rc<CstList>, pos: Pos) -> Result<Vec<Symbol>> {
    let mut params = Vec::with_capacity(arglist.children.len());
    for argname in &arglist.children {
        let tok = require_varname(argname, "lambda: invalid syntax in argument list", pos)?;
        params.push(Symbol::intern(&tok.text));
    }
    Ok(params)
}

fn analyze_lambda(list: &Rc<CstList>, pos: Pos) -> Result<Rc<AnalyzedForm>> {
    let children = &list.children;
    let arglist = children
        .get(1)
        .and_then(|c| c.as_list())
        .ok_or_else(|| syntax_err("lambda: invalid syntax", pos))?;
    let params = analyze_params(arglist, pos)?;
    let body = analyze_proc_body(children.get(2..).unwrap_or(&[]), pos)?;
    Ok(Rc::new(AnalyzedForm::Lambda {
        params,
        body: Rc::new(body),
        pos,
    }))
}

fn analyze_define(list: &Rc<CstList>, pos: Pos) -> Result<Rc<AnalyzedForm>> {
    let children = &list.children;
    let target = children
        .get(1)
        .ok_or_else(|| syntax_err("define: invalid syntax", pos))?;

    match target {
        Cst::Atom(tok) => {
            if !tok.is_varname() {
                return Err(syntax_err("define: invalid syntax", pos));
            }
            let name = Symbol::intern(&tok.text);
            let expr = children
                .get(2)
                .ok_or_else(|| syntax_err("define: invalid syntax", pos))?;
            Ok(Rc::new(AnalyzedForm::Define {
                name,
                expr: cst_slot(expr),
                pos,
            }))
        }
        Cst::List(sig) => {
            let mut sig_children = sig.children.iter();
            let name_tok = sig_children
                .next()
                .map(|c| require_varname(c, "define: invalid syntax", pos))
                .transpose()?
                .ok_or_else(|| syntax_err("define: invalid syntax", pos))?;
            let name = Symbol::intern(&name_tok.text);

            let mut params = Vec::new();
            for argname in sig_children {
                let tok = require_varname(argname, "define: invalid syntax in argument list", pos)?;
                params.push(Symbol::intern(&tok.text));
            }

            let body = analyze_proc_body(children.get(2..).unwrap_or(&[]), pos)?;
            let lambda = Rc::new(AnalyzedForm::Lambda {
                params,
                body: Rc::new(body),
                pos,
            });
            Ok(Rc::new(AnalyzedForm::Define {
                name,
                expr: RefCell::new(Slot::Analyzed(lambda)),
                pos,
            }))
        }
    }
}

fn analyze_begin(list: &Rc<CstList>, pos: Pos) -> Result<Rc<AnalyzedForm>> {
    let forms = list.children.get(1..).unwrap_or(&[]);
    if forms.is_empty() {
        return Err(syntax_err("begin: empty body", pos));
    }
    let slots = forms.iter().map(cst_slot).collect();
    Ok(Rc::new(AnalyzedForm::Sequence { forms: slots, pos }))
}

fn analyze_if(list: &Rc<CstList>, pos: Pos) -> Result<Rc<AnalyzedForm>> {
    let children = &list.children;
    let cond = children.get(1).ok_or_else(|| syntax_err("ill-formed if", pos))?;
    let consequent = children
        .get(2)
        .ok_or_else(|| syntax_err("ill-formed if", pos))?;
    let alternative = children.get(3).map(cst_slot);

    Ok(Rc::new(AnalyzedForm::If {
        cond: cst_slot(cond),
        consequent: cst_slot(consequent),
        alternative,
        pos,
    }))
}

/// Reduces right-to-left into a chain of `If`s; the last clause headed by
/// the literal symbol `else` supplies the innermost alternative
/// (`seval.py::analyze_cond`).
fn analyze_cond(list: &Rc<CstList>, pos: Pos) -> Result<Rc<AnalyzedForm>> {
    let clauses = list.children.get(1..).unwrap_or(&[]);
    let last = clauses
        .last()
        .ok_or_else(|| syntax_err("cond: no clauses", pos))?;
    let last_list = last
        .as_list()
        .ok_or_else(|| syntax_err("cond: ill-formed clause", pos))?;
    let is_else = last_list
        .children
        .first()
        .and_then(|c| c.as_atom())
        .is_some_and(|t| &*t.text == "else");

    let mut alternative: Option<SlotCell> = if is_else {
        let alt_expr = last_list
            .children
            .get(1)
            .ok_or_else(|| syntax_err("cond: else clause missing body", pos))?;
        Some(cst_slot(alt_expr))
    } else {
        None
    };

    let tested = if is_else {
        &clauses[..clauses.len() - 1]
    } else {
        clauses
    };

    for clause in tested.iter().rev() {
        let clause_list = clause
            .as_list()
            .ok_or_else(|| syntax_err("cond: ill-formed clause", pos))?;
        let test = clause_list
            .children
            .first()
            .ok_or_else(|| syntax_err("cond: ill-formed clause", pos))?;
        let consequent = clause_list
            .children
            .get(1)
            .ok_or_else(|| syntax_err("cond: clause missing body", pos))?;

        let built = AnalyzedForm::If {
            cond: cst_slot(test),
            consequent: cst_slot(consequent),
            alternative,
            pos,
        };
        alternative = Some(RefCell::new(Slot::Analyzed(Rc::new(built))));
    }

    match alternative.unwrap().into_inner() {
        Slot::Analyzed(form) => Ok(form),
        Slot::Cst(cst) => translate(&cst),
    }
}

fn analyze_let(list: &Rc<CstList>, pos: Pos) -> Result<Rc<AnalyzedForm>> {
    let children = &list.children;
    let bindings = children
        .get(1)
        .and_then(|c| c.as_list())
        .ok_or_else(|| syntax_err("let: invalid syntax", pos))?;

    let mut params = Vec::with_capacity(bindings.children.len());
    let mut arg_exprs = Vec::with_capacity(bindings.children.len());
    for binding in &bindings.children {
        let binding = binding
            .as_list()
            .ok_or_else(|| syntax_err("let: invalid binding", pos))?;
        let name_tok = binding
            .children
            .first()
            .map(|c| require_varname(c, "let: invalid binding", pos))
            .transpose()?
            .ok_or_else(|| syntax_err("let: invalid binding", pos))?;
        let expr = binding
            .children
            .get(1)
            .ok_or_else(|| syntax_err("let: invalid binding", pos))?;
        params.push(Symbol::intern(&name_tok.text));
        arg_exprs.push(cst_slot(expr));
    }

    let body = analyze_proc_body(children.get(2..).unwrap_or(&[]), pos)?;
    let lambda = Rc::new(AnalyzedForm::Lambda {
        params,
        body: Rc::new(body),
        pos,
    });
    Ok(Rc::new(AnalyzedForm::Application {
        op: RefCell::new(Slot::Analyzed(lambda)),
        args: arg_exprs,
        pos,
    }))
}

fn analyze_qualifier(list: &Rc<CstList>, pos: Pos, kind: QualifierKind) -> Result<Rc<AnalyzedForm>> {
    let forms = list.children.get(1..).unwrap_or(&[]);
    if forms.is_empty() {
        let name = if kind == QualifierKind::Or { "or" } else { "and" };
        return Err(syntax_err(&format!("{name}: requires at least one subexpression"), pos));
    }
    let slots = forms.iter().map(cst_slot).collect();
    Ok(Rc::new(AnalyzedForm::Qualifier {
        kind,
        forms: slots,
        pos,
    }))
}

fn analyze_quote(list: &Rc<CstList>, pos: Pos) -> Result<Rc<AnalyzedForm>> {
    let datum = list
        .children
        .get(1)
        .ok_or_else(|| syntax_err("quote: missing datum", pos))?;
    Ok(Rc::new(AnalyzedForm::Literal(literal_from_cst(datum)?)))
}

fn analyze_apply(list: &Rc<CstList>, pos: Pos) -> Result<Rc<AnalyzedForm>> {
    let mut children = list.children.iter();
    let op = children
        .next()
        .ok_or_else(|| syntax_err("unexpected empty form ()", pos))?;
    let args = children.map(cst_slot).collect();
    Ok(Rc::new(AnalyzedForm::Application {
        op: cst_slot(op),
        args,
        pos,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;

    fn translate_one(src: &str) -> Rc<AnalyzedForm> {
        let forms = parse_program(src).unwrap();
        translate(&forms[0]).unwrap()
    }

    #[test]
    fn literal_numbers_and_strings() {
        assert!(matches!(&*translate_one("42"), AnalyzedForm::Literal(Value::Number(n)) if *n == 42.0));
        assert!(matches!(&*translate_one("\"hi\""), AnalyzedForm::Literal(Value::Str(s)) if &**s == "hi"));
    }

    #[test]
    fn quote_builds_symbol_literal() {
        let form = translate_one("'done");
        match &*form {
            AnalyzedForm::Literal(Value::Symbol(s)) => assert_eq!(&*s.name(), "done"),
            _ => panic!("expected a quoted symbol literal"),
        }
    }

    #[test]
    fn quote_empty_list_is_empty_list_literal() {
        let form = translate_one("'()");
        assert!(matches!(&*form, AnalyzedForm::Literal(Value::EmptyList)));
    }

    #[test]
    fn lambda_multi_body_wraps_in_sequence() {
        let form = translate_one("(lambda (x) 1 2 x)");
        match &*form {
            AnalyzedForm::Lambda { params, body, .. } => {
                assert_eq!(params.len(), 1);
                match &*body.borrow() {
                    Slot::Analyzed(inner) => assert!(matches!(&**inner, AnalyzedForm::Sequence { forms, .. } if forms.len() == 3)),
                    Slot::Cst(_) => panic!("multi-expr body should be eagerly wrapped"),
                }
            }
            _ => panic!("expected lambda"),
        }
    }

    #[test]
    fn translate_slot_is_idempotent() {
        let forms = parse_program("(+ 1 2)").unwrap();
        let cell = cst_slot(&forms[0]);
        let a = translate_slot(&cell).unwrap();
        let b = translate_slot(&cell).unwrap();
        assert!(Rc::ptr_eq(&a, &b));
    }

    #[test]
    fn cond_reduces_to_nested_if_ending_in_else() {
        let form = translate_one("(cond ((= 1 2) 'a) ((= 2 2) 'b) (else 'c))");
        assert!(matches!(&*form, AnalyzedForm::If { .. }));
    }

    #[test]
    fn let_desugars_to_application_of_lambda() {
        let form = translate_one("(let ((a 3) (b 4)) (+ a b))");
        match &*form {
            AnalyzedForm::Application { op, args, .. } => {
                assert_eq!(args.len(), 2);
                assert!(matches!(&*op.borrow(), Slot::Analyzed(inner) if matches!(**inner, AnalyzedForm::Lambda { .. })));
            }
            _ => panic!("expected application"),
        }
    }
}
