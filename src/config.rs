//! Tunables for parsing and evaluation.

/// How strict the parser is and how deep it may recurse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserConfig {
    /// Maximum paren nesting before parsing gives up with `NestingTooDeep`.
    pub max_depth: usize,
    /// Fail with `TrailingInput` instead of ignoring text after the last form.
    pub reject_trailing_input: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        ParserConfig {
            max_depth: 256,
            reject_trailing_input: false,
        }
    }
}

/// Evaluation recurses on the Rust stack, so both limits are sized to stay
/// well inside a 2 MiB thread stack in a debug build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalConfig {
    /// Maximum number of nested procedure applications.
    pub max_depth: usize,
    /// Maximum number of list expressions being evaluated inside one another,
    /// counted across procedure bodies.
    pub max_nesting: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        // A recursive call through `if` and one arithmetic operand costs three
        // levels of nesting, so `max_depth` calls of that shape fit in `max_nesting`.
        EvalConfig {
            max_depth: 128,
            max_nesting: 400,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InterpreterConfig {
    pub parser: ParserConfig,
    pub eval: EvalConfig,
}

impl InterpreterConfig {
    pub fn strict(mut self, reject_trailing_input: bool) -> Self {
        self.parser.reject_trailing_input = reject_trailing_input;
        self
    }

    pub fn max_call_depth(mut self, max_depth: usize) -> Self {
        self.eval.max_depth = max_depth;
        self
    }
}
