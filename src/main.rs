//! The command-line shell: a `rustyline`-backed REPL plus a `load`-style
//! file driver, mirroring `original_source/sloop.py`'s `execute_code`/
//! `run_file`/`prepare` (SPEC_FULL.md §2).

use rustyline::error::ReadlineError;
use rustyline::{DefaultEditor, Editor};
use skimpy::env::Environment;
use skimpy::error::SchemeError;
use skimpy::{eval, new_global_env, parser, printer};
use std::cell::RefCell;
use std::env as std_env;
use std::fs;
use std::process::ExitCode;
use std::rc::Rc;

fn report_error(err: &SchemeError, env: &Rc<RefCell<Environment>>) {
    eprintln!("{}", err.report(Some(env)));
}

/// Parses and evaluates every top-level form in `text`, printing each
/// result with the `">> "` prefix `sloop.py::receive_to_print` uses. A
/// per-form error is reported but does not stop evaluation of the forms
/// that follow, matching `sloop.py::execute_code`'s
/// `except Exception as e: recipient(e)` around each subnode.
fn execute_code(text: &str, env: &Rc<RefCell<Environment>>) {
    let forms = match parser::parse_program(text) {
        Ok(forms) => forms,
        Err(e) => {
            report_error(&e, env);
            return;
        }
    };
    for form in &forms {
        match eval::eval_cst(form, env.clone()) {
            Ok(value) => match printer::print_value(&value) {
                Ok(text) => println!(">> {text}"),
                Err(e) => report_error(&e, env),
            },
            Err(e) => report_error(&e, env),
        }
    }
}

fn run_file(path: &str, env: &Rc<RefCell<Environment>>) -> ExitCode {
    let text = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(_) => {
            eprintln!("SkimpyError: could not find file {path}");
            return ExitCode::FAILURE;
        }
    };
    execute_code(&text, env);
    ExitCode::SUCCESS
}

fn repl(env: &Rc<RefCell<Environment>>) -> ExitCode {
    println!("Skimpy — press Ctrl+D to exit");
    let mut rl = DefaultEditor::new().expect("failed to start line editor");
    let mut buffer = String::new();

    loop {
        let prompt = if buffer.is_empty() { "skimpy> " } else { "  ...> " };
        match rl.readline(prompt) {
            Ok(line) => {
                if line.trim().is_empty() && buffer.is_empty() {
                    continue;
                }
                if !buffer.is_empty() {
                    buffer.push('\n');
                }
                buffer.push_str(&line);

                match parser::parse_program(&buffer) {
                    Ok(_) => {
                        let _ = rl.add_history_entry(buffer.as_str());
                        execute_code(&buffer, env);
                        buffer.clear();
                    }
                    Err(SchemeError::LexUnmatchedOpen { .. }) => {
                        // Still inside an open form; keep reading lines.
                    }
                    Err(e) => {
                        let _ = rl.add_history_entry(buffer.as_str());
                        report_error(&e, env);
                        buffer.clear();
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                buffer.clear();
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("readline error: {err}");
                break;
            }
        }
    }
    ExitCode::SUCCESS
}

fn main() -> ExitCode {
    let env = new_global_env();
    let args: Vec<String> = std_env::args().collect();
    if args.len() >= 2 {
        run_file(&args[1], &env)
    } else {
        repl(&env)
    }
}
