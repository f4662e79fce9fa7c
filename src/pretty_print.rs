use crate::{EnvError, EvalError, ParseError, Span};
use ariadne::{Config, IndexType, Label, Report, ReportKind, Source};
use std::ops::Range;

const SOURCE_ID: &str = "REPL";

type SourceSpan = (&'static str, Range<usize>);

// Spans are byte offsets into the input, ariadne counts chars unless told otherwise.
fn report_config() -> Config {
    Config::default().with_index_type(IndexType::Byte)
}

fn build_report(
    range: Range<usize>,
    message: String,
    label: String,
    config: Config,
) -> Report<'static, SourceSpan> {
    Report::build(ReportKind::Error, (SOURCE_ID, range.clone()))
        .with_config(config)
        .with_message(message)
        .with_label(Label::new((SOURCE_ID, range)).with_message(label))
        .finish()
}

fn eprint_report(
    range: Range<usize>,
    message: String,
    label: String,
    input: &str,
) -> std::io::Result<()> {
    build_report(range, message, label, report_config()).eprint((SOURCE_ID, Source::from(input)))
}

// Spans of synthesized nodes can be empty or out of bounds; keep them inside the input.
fn clamp(span: Span, input: &str) -> Range<usize> {
    let end = span.end.min(input.len());
    span.start.min(end)..end
}

impl EvalError {
    pub fn pretty_print(&self, input: &str) -> std::io::Result<()> {
        let (message, label) = self.describe();
        eprint_report(clamp(self.span(), input), message, label, input)
    }

    fn describe(&self) -> (String, String) {
        match self {
            EvalError::Env(EnvError::UnboundVariable(symbol, _)) => (
                format!("Unbound symbol `{}`", symbol),
                "This symbol is not defined in the current scope".to_string(),
            ),
            EvalError::NotAProcedure { found, .. } => (
                format!("Not a procedure: a {}", found),
                "This expression cannot be called as a procedure".to_string(),
            ),
            EvalError::ArityMismatch {
                expected, found, ..
            } => (
                "Wrong number of arguments".to_string(),
                format!("The procedure takes {} but was given {}", expected, found),
            ),
            EvalError::InvalidArguments(message, _) => {
                ("Invalid arguments:".to_string(), message.clone())
            }
            EvalError::TypeMismatch {
                expected, found, ..
            } => (
                "Type mismatch".to_string(),
                format!("Expected {}, found {}", expected, found),
            ),
            EvalError::DivisionByZero(_) => (
                "Division by zero".to_string(),
                "The divisor evaluated to 0".to_string(),
            ),
            EvalError::NotASymbol(found, _) => (
                format!("Not a symbol: {}", found),
                "Expected a symbol here".to_string(),
            ),
            EvalError::InvalidSpecialForm(message, _) => (
                format!("Invalid special form: {}", message),
                "This special form is malformed or incomplete".to_string(),
            ),
            EvalError::RecursionLimit { limit, .. } => (
                "Recursion limit reached".to_string(),
                format!("More than {} nested procedure calls", limit),
            ),
            EvalError::NestingTooDeep { limit, .. } => (
                "Expression nested too deeply".to_string(),
                format!("More than {} levels of nested expressions", limit),
            ),
        }
    }
}

impl ParseError {
    pub fn pretty_print(&self, input: &str) -> std::io::Result<()> {
        let (span, message, label) = self.describe(input);
        eprint_report(clamp(span, input), message, label, input)
    }

    fn describe(&self, input: &str) -> (Span, String, String) {
        match self {
            ParseError::UnexpectedToken { found, expected } => (
                found.span,
                format!("Unexpected token: {}", found.kind),
                format!("Expected {expected}"),
            ),
            ParseError::UnexpectedEof { expected } => (
                Span::new(input.len(), input.len()),
                "Unexpected end of input".to_string(),
                format!("Expected {expected}"),
            ),
            ParseError::InvalidIdentifier { name, span } => (
                *span,
                format!("Invalid identifier: {}", name),
                "Identifiers start with a letter or '_' and contain letters, digits, '_' or '-'"
                    .to_string(),
            ),
            ParseError::ReservedKeyword { name, span } => (
                *span,
                format!("Reserved keyword: {}", name),
                "Keywords cannot be used as names".to_string(),
            ),
            ParseError::InvalidTestCondition { found, span } => (
                *span,
                format!("Invalid test condition: {}", found),
                "Expected (<op> a b) with <op> one of < > <= >= =".to_string(),
            ),
            ParseError::MisplacedForm { form, span } => (
                *span,
                format!("`{}` is not allowed here", form),
                "define only appears at the top level, lambda only inside define or another lambda"
                    .to_string(),
            ),
            ParseError::NestingTooDeep { limit, span } => (
                *span,
                "Nesting too deep".to_string(),
                format!("More than {} levels of parentheses", limit),
            ),
            ParseError::TrailingInput { span } => (
                *span,
                "Unexpected text after the last form".to_string(),
                "Remove this text or wrap it in parentheses".to_string(),
            ),
            ParseError::Lexer(lex_err) => (
                lex_err.span,
                "Lexer Error".to_string(),
                lex_err.error.to_string(),
            ),
        }
    }
}
