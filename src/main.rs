use std::fs;
use std::io::{BufRead, Write, stdin, stdout};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use clap::Subcommand;
use lox_expr::{Interpreter, Reporter, ReversePolish};
use miette::IntoDiagnostic;
use miette::WrapErr;

#[derive(Parser, Debug)]
#[command(version, about = "Scan, parse and evaluate Lox expressions")]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print every token of the file.
    Tokenize { filename: PathBuf },
    /// Print the parenthesized syntax tree.
    Parse { filename: PathBuf },
    /// Print the syntax tree in reverse polish notation.
    Rpn { filename: PathBuf },
    /// Evaluate the expression in the file and print its value.
    Evaluate { filename: PathBuf },
    /// Evaluate expressions read line by line from stdin.
    Repl,
}

const LEX_ERROR: u8 = 65;
const PARSE_ERROR: u8 = 66;
const RUNTIME_ERROR: u8 = 70;

fn main() -> miette::Result<ExitCode> {
    let args = Args::parse();

    let filename = match &args.command {
        Commands::Tokenize { filename }
        | Commands::Parse { filename }
        | Commands::Rpn { filename }
        | Commands::Evaluate { filename } => filename.clone(),
        Commands::Repl => return repl(),
    };

    let file_contents = fs::read_to_string(&filename)
        .into_diagnostic()
        .wrap_err_with(|| format!("reading `{}` failed", filename.display()))?;
    let mut reporter = Reporter::new(filename.to_str(), &file_contents);

    let tokens = lox_expr::scan(&file_contents, &mut reporter);
    if let Commands::Tokenize { .. } = args.command {
        for token in &tokens {
            println!("{token}");
        }
        return Ok(finish(&mut reporter));
    }
    if reporter.had_error() {
        return Ok(finish(&mut reporter));
    }

    let Some(expr) = lox_expr::parse(tokens, &mut reporter) else {
        return Ok(finish(&mut reporter));
    };

    match args.command {
        Commands::Parse { .. } => println!("{expr}"),
        Commands::Rpn { .. } => println!("{}", ReversePolish(&expr)),
        Commands::Evaluate { .. } => {
            Interpreter::new(stdout().lock()).interpret(&expr, &mut reporter)?;
        }
        Commands::Tokenize { .. } | Commands::Repl => unreachable!("handled above"),
    }
    Ok(finish(&mut reporter))
}

fn repl() -> miette::Result<ExitCode> {
    let mut reporter = Reporter::new(Some("<repl>"), "");
    let mut interpreter = Interpreter::new(stdout());
    let mut line = String::new();
    loop {
        write!(stdout(), "> ").into_diagnostic()?;
        stdout().flush().into_diagnostic()?;

        line.clear();
        let read = stdin()
            .lock()
            .read_line(&mut line)
            .into_diagnostic()
            .wrap_err("reading stdin failed")?;
        if read == 0 {
            return Ok(ExitCode::SUCCESS);
        }

        reporter.reset(&line);
        let tokens = lox_expr::scan(&line, &mut reporter);
        if !reporter.had_error() {
            if let Some(expr) = lox_expr::parse(tokens, &mut reporter) {
                interpreter.interpret(&expr, &mut reporter)?;
            }
        }
        // Errors end the line, never the session.
        finish(&mut reporter);
    }
}

/// Prints everything reported and picks the exit status for it.
fn finish(reporter: &mut Reporter) -> ExitCode {
    for reported in reporter.drain() {
        eprintln!("{}", reported.headline);
        eprintln!("{:?}", reported.report);
    }

    if reporter.had_lex_error() {
        ExitCode::from(LEX_ERROR)
    } else if reporter.had_parse_error() {
        ExitCode::from(PARSE_ERROR)
    } else if reporter.had_runtime_error() {
        ExitCode::from(RUNTIME_ERROR)
    } else {
        ExitCode::SUCCESS
    }
}
