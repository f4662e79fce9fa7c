use std::borrow::Cow;
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use clap::Parser as _;
use rustyline::error::ReadlineError;
use rustyline::highlight::{CmdKind, Highlighter};
use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::{Cmd, Completer, Context, Editor, EventHandler, KeyCode, KeyEvent, Modifiers};
use rustyline::{Helper, Highlighter, Hinter, Validator};
use tracing_subscriber::EnvFilter;

use lispify::{EvalConfig, Environment, Interpreter, InterpreterConfig, SpecialForm, TokenKind, Value, tokenize};

const PROMPT: &str = "lispify> ";

/// Interactive shell for the lispify Lisp dialect
#[derive(clap::Parser, Debug)]
#[command(name = "lispify-repl", version)]
struct Args {
    /// Use vi key bindings instead of emacs ones
    #[arg(long, default_value_t = false)]
    vi: bool,
    /// File the line history is loaded from and saved to
    #[arg(long, default_value = "lispify_history.txt")]
    history: PathBuf,
    /// Neither load nor save line history
    #[arg(long, default_value_t = false)]
    no_history: bool,
    /// Reject text after the last form instead of ignoring it
    #[arg(long, default_value_t = false)]
    strict: bool,
    /// Maximum number of nested procedure calls
    #[arg(long, default_value_t = EvalConfig::default().max_depth)]
    max_call_depth: usize,
}

struct LispifyCompleter {
    env: Rc<RefCell<Environment>>,
}

impl LispifyCompleter {
    fn new(env: Rc<RefCell<Environment>>) -> Self {
        LispifyCompleter { env }
    }
}

impl rustyline::completion::Completer for LispifyCompleter {
    type Candidate = String;
    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        let prefix = match tokenize(&line[..pos]) {
            Ok(tokens) => match tokens.last().map(|t| t.kind.clone()) {
                Some(TokenKind::Symbol(prefix)) if line[..pos].ends_with(prefix.as_str()) => prefix,
                _ => return Ok((pos, vec![])),
            },
            Err(_) => return Ok((pos, vec![])),
        };
        let mut candidates: Vec<String> = self
            .env
            .borrow()
            .get_identifiers()
            .into_iter()
            .chain(SpecialForm::ALL.iter().map(|form| form.keyword().to_string()))
            .filter_map(|id| id.strip_prefix(prefix.as_str()).map(str::to_string))
            .filter(|rest| !rest.is_empty())
            .collect();
        candidates.sort();
        Ok((pos, candidates))
    }
}

#[derive(Completer, Helper, Highlighter, Hinter, Validator)]
struct InputHelper {
    #[rustyline(Validator)]
    validator: ParenValidator,
    #[rustyline(Highlighter)]
    highlighter: ParenHighlighter,
    #[rustyline(Completer)]
    completer: LispifyCompleter,
}

// Keeps reading lines while a paren is still open. Extra closing parens are
// left for the parser, which treats them as trailing text.
struct ParenValidator;

impl Validator for ParenValidator {
    fn validate(&self, ctx: &mut ValidationContext) -> rustyline::Result<ValidationResult> {
        let mut depth: usize = 0;
        for c in ctx.input().chars() {
            match c {
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                _ => {}
            }
        }
        if depth > 0 {
            Ok(ValidationResult::Incomplete)
        } else {
            Ok(ValidationResult::Valid(None))
        }
    }
}

struct ParenHighlighter;

impl Highlighter for ParenHighlighter {
    fn highlight<'l>(&self, line: &'l str, pos: usize) -> Cow<'l, str> {
        // Byte offsets of each paren's partner; unmatched closers stay None
        let mut partner: Vec<Option<usize>> = vec![None; line.len()];
        let mut unmatched = Vec::new();
        let mut open = Vec::new();
        for (i, c) in line.char_indices() {
            match c {
                '(' => open.push(i),
                ')' => match open.pop() {
                    Some(start) => {
                        partner[start] = Some(i);
                        partner[i] = Some(start);
                    }
                    None => unmatched.push(i),
                },
                _ => {}
            }
        }

        // The pair touching the cursor is shown in bold blue
        let active = pos
            .checked_sub(1)
            .filter(|&before| line.as_bytes().get(before) == Some(&b')'))
            .and_then(|close| partner[close].map(|start| (start, close)));

        let mut highlighted = String::with_capacity(line.len());
        for (i, c) in line.char_indices() {
            match active {
                Some((start, close)) if i == start || i == close => {
                    highlighted.push_str(&format!("\x1b[1;34m{}\x1b[0m", c));
                    continue;
                }
                _ => {}
            }
            if unmatched.contains(&i) {
                highlighted.push_str(&format!("\x1b[31m{}\x1b[0m", c)); // Red for unmatched closing parens
            } else {
                highlighted.push(c);
            }
        }
        Cow::Owned(highlighted)
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _kind: CmdKind) -> bool {
        true
    }
}

fn print_commands() {
    println!("\t.about      what this is");
    println!("\t.commands   this list (also .help)");
    println!("\t.functions  the interpreter entry points");
    println!("\t.exit       quit (also exit or Ctrl-D)");
    println!("\tanything else is interpreted as a program");
}

fn print_limits(config: &InterpreterConfig) {
    println!(
        "\tnesting up to {} parens, {} nested calls, {} nested expressions{}\n",
        config.parser.max_depth,
        config.eval.max_depth,
        config.eval.max_nesting,
        if config.parser.reject_trailing_input {
            ", trailing text rejected"
        } else {
            ""
        }
    );
}

fn print_value(value: &Value) {
    match value {
        Value::Unspecified => println!("No Output"),
        value => println!("{}", value),
    }
}

fn main() -> rustyline::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    println!("Lispify REPL v{}", env!("CARGO_PKG_VERSION"));
    println!("Type '.commands' for help, '.exit' or press Ctrl-D to quit.");

    let config = InterpreterConfig::default()
        .strict(args.strict)
        .max_call_depth(args.max_call_depth);
    let interpreter = Interpreter::with_config(config);

    let h = InputHelper {
        highlighter: ParenHighlighter,
        validator: ParenValidator,
        completer: LispifyCompleter::new(interpreter.global_env()),
    };
    let editor_config = rustyline::config::Config::builder()
        .edit_mode(if args.vi {
            rustyline::EditMode::Vi
        } else {
            rustyline::EditMode::Emacs
        })
        .auto_add_history(false)
        .build();
    let mut rl = Editor::with_config(editor_config)?;
    rl.set_helper(Some(h));
    rl.bind_sequence(
        KeyEvent(KeyCode::Char('s'), Modifiers::CTRL),
        EventHandler::Simple(Cmd::Newline),
    );
    if !args.no_history && rl.load_history(&args.history).is_err() {
        println!("No previous history.");
    }

    loop {
        match rl.readline(PROMPT) {
            Ok(line) => {
                let trimmed_input = line.trim();
                if trimmed_input.is_empty() {
                    continue;
                }
                rl.add_history_entry(trimmed_input)?;

                match trimmed_input {
                    ".exit" | "exit" => break,
                    ".about" => {
                        println!(
                            "\n\tLisp (Scheme dialect) interpreter: a recursive-descent parser and a tree-walking evaluator."
                        );
                        print_limits(interpreter.config());
                        continue;
                    }
                    ".commands" | ".help" => {
                        print_commands();
                        continue;
                    }
                    ".functions" => {
                        println!("\tparse(text) -> forms\n\tevaluate(form, env) -> value");
                        continue;
                    }
                    _ => {}
                }

                match interpreter.interpret(trimmed_input) {
                    Ok(value) => print_value(&value),
                    Err(err) => {
                        if err.pretty_print(trimmed_input).is_err() {
                            eprintln!("Error: {}", err);
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl-C
                println!("Interrupted. Type '.exit' or Ctrl-D to quit.");
            }
            Err(ReadlineError::Eof) => {
                // Ctrl-D
                break;
            }
            Err(err) => {
                eprintln!("Readline Error: {:?}", err);
                break;
            }
        }
    }
    println!("Exiting from lispify!");
    if args.no_history {
        Ok(())
    } else {
        rl.save_history(&args.history)
    }
}
