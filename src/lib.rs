// Declare modules publicly so they are part of the library interface
pub mod config;
pub mod environment;
pub mod evaluator;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod pretty_print;
pub mod primitives;
pub mod source;
pub mod types;

pub use config::{EvalConfig, InterpreterConfig, ParserConfig};
pub use environment::{EnvError, Environment};
pub use evaluator::{EvalError, EvalResult, Evaluator, evaluate};
pub use interpreter::{Error, Interpreter, interpret};
pub use lexer::{LexerError, Token, TokenKind, tokenize};
pub use parser::{ParseError, Parser, Program, parse, parse_with_config};
pub use source::Span;
pub use types::{Node, Procedure, Sexpr, SpecialForm, Value};
