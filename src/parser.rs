//! Tokenizer and concrete syntax tree (CST). Treated as an external
//! collaborator by spec.md §1 ("tested separately"), but a complete crate
//! still has to ship one; this follows the character-class scan in
//! `original_source/parse.py::skimpy_prescan` and its tree builder.

use crate::error::{Pos, Result, SchemeError};
use std::rc::Rc;

/// A single token: literal text plus its (line, col) origin. Immutable
/// (spec.md §3).
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub text: Rc<str>,
    pub pos: Pos,
}

impl Token {
    fn new(text: String, pos: Pos) -> Self {
        Token {
            text: Rc::from(text),
            pos,
        }
    }

    pub fn is_number(&self) -> bool {
        self.text
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_digit())
            || (self.text.starts_with('-')
                && self.text.len() > 1
                && self.text.as_bytes()[1].is_ascii_digit())
    }

    pub fn is_string(&self) -> bool {
        self.text.starts_with('"')
    }

    pub fn is_varname(&self) -> bool {
        !self.is_number() && !self.is_string()
    }
}

/// A node in the concrete syntax tree: either a leaf token, or an ordered
/// sequence of children with its own (line, col) (spec.md §3). The parent
/// back-link from the original design is replaced with an explicit
/// `is_root` flag threaded through at the one call site that needs it
/// (program-root detection during analysis) — see SPEC_FULL.md §4.2.
#[derive(Debug, Clone)]
pub enum Cst {
    Atom(Token),
    List(Rc<CstList>),
}

#[derive(Debug)]
pub struct CstList {
    pub pos: Pos,
    pub children: Vec<Cst>,
}

impl Cst {
    pub fn pos(&self) -> Pos {
        match self {
            Cst::Atom(t) => t.pos,
            Cst::List(l) => l.pos,
        }
    }

    pub fn as_list(&self) -> Option<&Rc<CstList>> {
        match self {
            Cst::List(l) => Some(l),
            Cst::Atom(_) => None,
        }
    }

    pub fn as_atom(&self) -> Option<&Token> {
        match self {
            Cst::Atom(t) => Some(t),
            Cst::List(_) => None,
        }
    }
}

enum RawToken {
    LParen(Pos),
    RParen(Pos),
    Quote(Pos),
    Word(String, Pos),
}

/// Punctuation accepted inside identifiers. `'` is deliberately excluded: the
/// scanner's quote category always ends the current token, the same way `(`
/// and `)` do, so quote syntax works no matter where `'` appears in the text
/// (see SPEC_FULL.md §4.2 for why this departs from spec.md's character list).
/// `#` and `\` are included even though `parse.py::is_extended` omits them —
/// its scanner has no way to tokenize `#t`/`#f`/`#\newline` at all, which
/// would make those constants (SPEC_FULL.md §6) unreachable from source text.
fn is_extended(ch: char) -> bool {
    matches!(
        ch,
        '+' | '-' | '*' | '/' | '_' | '<' | '>' | '?' | '!' | '=' | '.' | '#' | '\\'
    )
}

/// Character-class finite-state scan producing a flat token stream,
/// mirroring `skimpy_prescan`'s four-state machine (whitespace, paren,
/// quote, word/string).
fn tokenize(input: &str) -> Result<Vec<RawToken>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    let mut line = 1usize;
    let mut col = 1usize;

    fn advance(ch: char, line: &mut usize, col: &mut usize) {
        if ch == '\n' {
            *line += 1;
            *col = 1;
        } else {
            *col += 1;
        }
    }

    while let Some(&ch) = chars.peek() {
        match ch {
            '(' => {
                tokens.push(RawToken::LParen(Pos::new(line, col)));
                chars.next();
                advance(ch, &mut line, &mut col);
            }
            ')' => {
                tokens.push(RawToken::RParen(Pos::new(line, col)));
                chars.next();
                advance(ch, &mut line, &mut col);
            }
            c if c.is_whitespace() => {
                chars.next();
                advance(c, &mut line, &mut col);
            }
            '"' => {
                let start = Pos::new(line, col);
                let mut text = String::from("\"");
                chars.next();
                advance('"', &mut line, &mut col);
                let mut closed = false;
                while let Some(&c) = chars.peek() {
                    chars.next();
                    advance(c, &mut line, &mut col);
                    if c == '"' {
                        closed = true;
                        break;
                    }
                    text.push(c);
                }
                if !closed {
                    return Err(SchemeError::LexUnterminatedString { pos: start });
                }
                tokens.push(RawToken::Word(text, start));
            }
            '\'' => {
                tokens.push(RawToken::Quote(Pos::new(line, col)));
                chars.next();
                advance(ch, &mut line, &mut col);
            }
            c if c.is_alphanumeric() || is_extended(c) => {
                let start = Pos::new(line, col);
                let mut text = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || is_extended(c) {
                        text.push(c);
                        chars.next();
                        advance(c, &mut line, &mut col);
                    } else {
                        break;
                    }
                }
                tokens.push(RawToken::Word(text, start));
            }
            other => {
                return Err(SchemeError::LexInvalidChar {
                    ch: other,
                    pos: Pos::new(line, col),
                });
            }
        }
    }

    Ok(tokens)
}

struct TreeBuilder {
    stack: Vec<(Pos, Vec<Cst>)>,
    done: Vec<Cst>,
}

impl TreeBuilder {
    fn new() -> Self {
        TreeBuilder {
            stack: Vec::new(),
            done: Vec::new(),
        }
    }

    fn push(&mut self, pos: Pos) {
        self.stack.push((pos, Vec::new()));
    }

    fn pop(&mut self, close_pos: Pos) -> Result<()> {
        let (pos, children) = self
            .stack
            .pop()
            .ok_or(SchemeError::LexUnmatchedClose { pos: close_pos })?;
        let node = Cst::List(Rc::new(CstList { pos, children }));
        self.append(node);
        Ok(())
    }

    fn append(&mut self, node: Cst) {
        if let Some((_, children)) = self.stack.last_mut() {
            children.push(node);
        } else {
            self.done.push(node);
        }
    }
}

/// Turns a raw quote token + the next complete form into a desugared
/// `(quote <form>)` node — a structural rewrite, not a macro expansion
/// (there is no macro system in scope).
fn build_tree(tokens: Vec<RawToken>) -> Result<Vec<Cst>> {
    let mut builder = TreeBuilder::new();
    let mut pending_quotes: Vec<Pos> = Vec::new();

    fn close_quotes(builder: &mut TreeBuilder, pending_quotes: &mut Vec<Pos>) {
        while let Some(qpos) = pending_quotes.pop() {
            let inner = match builder.stack.last_mut() {
                Some((_, children)) => children.pop(),
                None => builder.done.pop(),
            };
            let Some(inner) = inner else { continue };
            let quoted = Cst::List(Rc::new(CstList {
                pos: qpos,
                children: vec![Cst::Atom(Token::new("quote".to_string(), qpos)), inner],
            }));
            builder.append(quoted);
        }
    }

    for tok in tokens {
        match tok {
            RawToken::LParen(pos) => {
                builder.push(pos);
            }
            RawToken::RParen(pos) => {
                builder.pop(pos)?;
                close_quotes(&mut builder, &mut pending_quotes);
            }
            RawToken::Quote(pos) => {
                pending_quotes.push(pos);
            }
            RawToken::Word(text, pos) => {
                builder.append(Cst::Atom(Token::new(text, pos)));
                close_quotes(&mut builder, &mut pending_quotes);
            }
        }
    }

    if let Some((pos, _)) = builder.stack.first() {
        return Err(SchemeError::LexUnmatchedOpen { pos: *pos });
    }

    Ok(builder.done)
}

/// Parses `input` into zero or more top-level CST forms.
pub fn parse_program(input: &str) -> Result<Vec<Cst>> {
    let tokens = tokenize(input)?;
    build_tree(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flat_list() {
        let forms = parse_program("(+ 1 2)").unwrap();
        assert_eq!(forms.len(), 1);
        let list = forms[0].as_list().unwrap();
        assert_eq!(list.children.len(), 3);
        assert_eq!(&*list.children[0].as_atom().unwrap().text, "+");
    }

    #[test]
    fn tracks_line_and_col() {
        let forms = parse_program("(+ 1\n   2)").unwrap();
        let list = forms[0].as_list().unwrap();
        let two = list.children[2].as_atom().unwrap();
        assert_eq!(two.pos.line, 2);
    }

    #[test]
    fn quote_desugars_to_quote_form() {
        let forms = parse_program("'x").unwrap();
        let list = forms[0].as_list().unwrap();
        assert_eq!(&*list.children[0].as_atom().unwrap().text, "quote");
        assert_eq!(&*list.children[1].as_atom().unwrap().text, "x");
    }

    #[test]
    fn unmatched_paren_is_an_error() {
        assert!(parse_program("(+ 1 2").is_err());
        assert!(parse_program("+ 1 2)").is_err());
    }

    #[test]
    fn string_literal_keeps_quote_tag() {
        let forms = parse_program(r#""hi""#).unwrap();
        let tok = forms[0].as_atom().unwrap();
        assert_eq!(&*tok.text, "\"hi");
    }

    #[test]
    fn top_level_produces_multiple_forms() {
        let forms = parse_program("(define x 1) (+ x 1)").unwrap();
        assert_eq!(forms.len(), 2);
    }
}
