//! tern driver: source text in, x86-64 assembly out.
//!
//! Reads the program from stdin (or from a file given as an argument),
//! writes assembly to stdout, and reports the first error on stderr with a
//! non-zero exit status. `-d` dumps the token vector and the AST to stderr.

use std::fs;
use std::io::Read;
use std::process::ExitCode;

use owo_colors::OwoColorize;
use tern_lexer::Scanner;
use tern_parser::Parser;
use tern_syntax::error::{Error, Result};

// One pass over the whole pipeline; the error itself knows which stage
// rejected the program.
fn compile(src: &str, debug: bool) -> Result<String> {
    let tokens = Scanner::new(src).scan()?;
    if debug {
        eprintln!("{:#?}", tokens);
    }
    let prog = Parser::new(tokens).parse_program()?;
    if debug {
        eprintln!("{:#?}", prog);
    }
    let meta = tern_sema::analyze(&prog)?;
    tern_codegen::generate(&prog, &meta)
}

// Renders a diagnostic: the originating stage as the prefix, then the
// offending source line in a numbered gutter with a caret under the column.
fn report(source: &str, err: &Error) {
    eprintln!("{}: {}", err.stage.red().bold(), err.msg);
    let Some(pos) = err.at else { return };
    match source.lines().nth(pos.line - 1) {
        Some(text) => {
            let gutter = format!("{:>4}", pos.line);
            let caret = format!("{}^", " ".repeat(pos.col.saturating_sub(1)));
            eprintln!("{} | {}", gutter.bright_black(), text);
            eprintln!("{} | {}", " ".repeat(gutter.len()), caret.red().bold());
        }
        None => eprintln!("  --> {}", pos),
    }
}

fn usage() -> ! {
    eprintln!("usage: tern [-d] [file]");
    eprintln!("  reads source from stdin when no file is given");
    std::process::exit(2)
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut debug = false;
    let mut path: Option<&str> = None;
    for arg in &args {
        match arg.as_str() {
            "-d" => debug = true,
            "-h" | "--help" => usage(),
            s if s.starts_with('-') => usage(),
            s => {
                if path.is_some() {
                    usage();
                }
                path = Some(s);
            }
        }
    }

    let src = match path {
        Some(path) => match fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("{}: Failed to read {}: {}", "error".red().bold(), path, e);
                return ExitCode::FAILURE;
            }
        },
        None => {
            let mut buf = String::new();
            if let Err(e) = std::io::stdin().read_to_string(&mut buf) {
                eprintln!("{}: Failed to read stdin: {}", "error".red().bold(), e);
                return ExitCode::FAILURE;
            }
            buf
        }
    };

    match compile(&src, debug) {
        Ok(asm) => {
            print!("{}", asm);
            ExitCode::SUCCESS
        }
        Err(e) => {
            report(&src, &e);
            ExitCode::FAILURE
        }
    }
}
