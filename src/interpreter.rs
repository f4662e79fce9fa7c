use crate::config::InterpreterConfig;
use crate::environment::Environment;
use crate::evaluator::{EvalError, Evaluator};
use crate::parser::{ParseError, parse_with_config};
use crate::types::Value;
use std::cell::RefCell;
use std::rc::Rc;
use thiserror::Error;

/// Either half of `interpret` can fail.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Syntax(#[from] ParseError),
    #[error(transparent)]
    Runtime(#[from] EvalError),
}

impl Error {
    pub fn pretty_print(&self, input: &str) -> std::io::Result<()> {
        match self {
            Error::Syntax(err) => err.pretty_print(input),
            Error::Runtime(err) => err.pretty_print(input),
        }
    }
}

/// A session: one global environment shared by every `interpret` call.
pub struct Interpreter {
    global: Rc<RefCell<Environment>>,
    config: InterpreterConfig,
}

impl Default for Interpreter {
    fn default() -> Self {
        Interpreter::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Interpreter::with_config(InterpreterConfig::default())
    }

    pub fn with_config(config: InterpreterConfig) -> Self {
        Interpreter {
            global: Environment::new_global_populated(),
            config,
        }
    }

    pub fn global_env(&self) -> Rc<RefCell<Environment>> {
        self.global.clone()
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    /// Parses `input` and evaluates every form against the global environment,
    /// returning the value of the last one. Forms before a failing one keep their effects.
    pub fn interpret(&self, input: &str) -> Result<Value, Error> {
        let program = parse_with_config(input, &self.config.parser)?;
        let value = Evaluator::new(self.config.eval).evaluate_program(&program, &self.global)?;
        Ok(value)
    }
}

/// One-shot `interpret` in a fresh global environment.
pub fn interpret(input: &str) -> Result<Value, Error> {
    Interpreter::new().interpret(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::EnvError;
    use crate::source::Span;

    #[test]
    fn test_interpret_arithmetic() {
        assert_eq!(
            interpret("(* ( + 2 3) (/ 10 (+ 1 1)))"),
            Ok(Value::Number(25.0))
        );
    }

    #[test]
    fn test_session_keeps_definitions() {
        let interpreter = Interpreter::new();
        assert_eq!(
            interpreter.interpret("(define value 10)"),
            Ok(Value::Unspecified)
        );
        assert_eq!(interpreter.interpret("(+ value 50)"), Ok(Value::Number(60.0)));
    }

    #[test]
    fn test_fresh_interpreters_are_isolated() {
        let first = Interpreter::new();
        first
            .interpret("(define value 10)")
            .expect("define should succeed");
        let second = Interpreter::new();
        assert!(matches!(
            second.interpret("(+ value 1)"),
            Err(Error::Runtime(EvalError::Env(EnvError::UnboundVariable(_, _))))
        ));
    }

    #[test]
    fn test_errors_do_not_end_the_session() {
        let interpreter = Interpreter::new();
        assert!(matches!(
            interpreter.interpret("(* identifier$ 10 10)"),
            Err(Error::Syntax(ParseError::InvalidIdentifier { .. }))
        ));
        assert!(matches!(
            interpreter.interpret("(/ 1 0)"),
            Err(Error::Runtime(EvalError::DivisionByZero(_)))
        ));
        assert_eq!(interpreter.interpret("(+ 1 1)"), Ok(Value::Number(2.0)));
    }

    #[test]
    fn test_forms_before_a_failure_keep_their_effects() {
        let interpreter = Interpreter::new();
        assert!(interpreter.interpret("(define a 1)(+ a missing)").is_err());
        assert_eq!(interpreter.interpret("(+ a 1)"), Ok(Value::Number(2.0)));
    }

    #[test]
    fn test_strict_config_rejects_trailing_input() {
        let lenient = Interpreter::new();
        assert_eq!(lenient.interpret("(+ 1 2) junk"), Ok(Value::Number(3.0)));

        let strict = Interpreter::with_config(InterpreterConfig::default().strict(true));
        assert_eq!(
            strict.interpret("(+ 1 2) junk"),
            Err(Error::Syntax(ParseError::TrailingInput {
                span: Span::new(8, 12)
            }))
        );
    }

    #[test]
    fn test_call_depth_config() {
        let interpreter =
            Interpreter::with_config(InterpreterConfig::default().max_call_depth(10));
        assert_eq!(interpreter.config().eval.max_depth, 10);
        assert_eq!(
            interpreter.config().eval.max_nesting,
            InterpreterConfig::default().eval.max_nesting
        );
        interpreter
            .interpret("(define down (lambda (n) (if (<= n 0) 0 (down (- n 1)))))")
            .expect("define should succeed");
        assert_eq!(interpreter.interpret("(down 5)"), Ok(Value::Number(0.0)));
        assert!(matches!(
            interpreter.interpret("(down 50)"),
            Err(Error::Runtime(EvalError::RecursionLimit { limit: 10, .. }))
        ));
    }
}
