use crate::config::EvalConfig;
use crate::environment::{EnvError, Environment};
use crate::parser::Program;
use crate::source::Span;
use crate::types::{Lambda, Node, Procedure, Sexpr, SpecialForm, Value};
use std::cell::RefCell;
use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, trace};

// --- Evaluation Error ---
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error(transparent)]
    Env(#[from] EnvError), // Errors from environment lookup
    #[error("Evaluation Error: Expected a procedure, but got a {found}")]
    NotAProcedure { found: &'static str, span: Span },
    #[error("Evaluation Error: procedure expects {expected} argument(s), got {found}")]
    ArityMismatch {
        expected: usize,
        found: usize,
        span: Span,
    },
    #[error("Evaluation Error: Invalid arguments - {0}")]
    InvalidArguments(String, Span),
    #[error("Evaluation Error: Type mismatch - expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
        span: Span,
    },
    #[error("Evaluation Error: Division by zero")]
    DivisionByZero(Span),
    #[error("Evaluation Error: Expected a symbol, but got: {0}")]
    NotASymbol(String, Span),
    #[error("Evaluation Error: Invalid special form - {0}")]
    InvalidSpecialForm(String, Span),
    #[error("Evaluation Error: more than {limit} nested procedure calls")]
    RecursionLimit { limit: usize, span: Span },
    #[error("Evaluation Error: expression nested more than {limit} levels deep")]
    NestingTooDeep { limit: usize, span: Span },
}

impl EvalError {
    pub fn span(&self) -> Span {
        match self {
            EvalError::Env(EnvError::UnboundVariable(_, span))
            | EvalError::NotAProcedure { span, .. }
            | EvalError::ArityMismatch { span, .. }
            | EvalError::InvalidArguments(_, span)
            | EvalError::TypeMismatch { span, .. }
            | EvalError::DivisionByZero(span)
            | EvalError::NotASymbol(_, span)
            | EvalError::InvalidSpecialForm(_, span)
            | EvalError::RecursionLimit { span, .. }
            | EvalError::NestingTooDeep { span, .. } => *span,
        }
    }
}

// Result type alias for convenience
pub type EvalResult<T = Value> = Result<T, EvalError>;

// How far down an evaluation is: closure applications, and list expressions
// being evaluated inside one another. Both bound the Rust stack.
#[derive(Debug, Clone, Copy, Default)]
struct Depth {
    calls: usize,
    nesting: usize,
}

impl Depth {
    fn deeper(self) -> Self {
        Depth {
            nesting: self.nesting + 1,
            ..self
        }
    }

    fn call(self) -> Self {
        Depth {
            calls: self.calls + 1,
            nesting: self.nesting + 1,
        }
    }
}

/// Walks the AST, dispatching on node shape and on the special form at the head of a list.
#[derive(Debug, Clone, Copy, Default)]
pub struct Evaluator {
    config: EvalConfig,
}

impl Evaluator {
    pub fn new(config: EvalConfig) -> Self {
        Evaluator { config }
    }

    /// Evaluates a given AST Node within the specified environment.
    pub fn evaluate(&self, node: &Node, env: &Rc<RefCell<Environment>>) -> EvalResult {
        self.eval(node, env, Depth::default())
    }

    /// Evaluates each top-level form in order and returns the last value.
    pub fn evaluate_program(
        &self,
        program: &Program,
        env: &Rc<RefCell<Environment>>,
    ) -> EvalResult {
        let mut last = Value::Unspecified;
        for form in &program.forms {
            debug!(%form, "evaluating form");
            last = self.evaluate(form, env)?;
        }
        Ok(last)
    }

    /// Calls a procedure value with already evaluated arguments.
    pub fn apply(&self, procedure: &Procedure, args: Vec<Value>, span: Span) -> EvalResult {
        self.apply_at(procedure, args, span, Depth::default())
    }

    fn eval(&self, node: &Node, env: &Rc<RefCell<Environment>>, depth: Depth) -> EvalResult {
        match &node.kind {
            // 1. Numbers evaluate to themselves
            Sexpr::Number(n) => Ok(Value::Number(*n)),

            // 2. Symbols: Look up in the environment
            Sexpr::Symbol(name) => Ok(env.borrow().get(name, node.span)?),

            // 3. Lists: special forms or procedure calls
            Sexpr::List(elements) => {
                let [operator, operands @ ..] = elements.as_slice() else {
                    return Err(EvalError::InvalidSpecialForm(
                        "empty list is not an expression".to_string(),
                        node.span,
                    ));
                };
                if depth.nesting >= self.config.max_nesting {
                    return Err(EvalError::NestingTooDeep {
                        limit: self.config.max_nesting,
                        span: node.span,
                    });
                }
                match node.special_form() {
                    Some(SpecialForm::Define) => self.eval_define(operands, env, depth, node.span),
                    Some(SpecialForm::If) => self.eval_if(operands, env, depth, node.span),
                    Some(SpecialForm::Quote) => eval_quote(operands, node.span),
                    Some(SpecialForm::Lambda) => eval_lambda(operands, env, node.span),
                    None => self.eval_call(operator, operands, env, depth, node.span),
                }
            }
        }
    }

    fn eval_define(
        &self,
        operands: &[Node],
        env: &Rc<RefCell<Environment>>,
        depth: Depth,
        span: Span,
    ) -> EvalResult {
        let [name_node, value_node] = operands else {
            return Err(EvalError::InvalidSpecialForm(
                "define expects a name and a value".to_string(),
                span,
            ));
        };
        let Sexpr::Symbol(name) = &name_node.kind else {
            return Err(EvalError::NotASymbol(
                name_node.to_string(),
                name_node.span,
            ));
        };
        let value = self.eval(value_node, env, depth.deeper())?;
        env.borrow_mut().define(name.clone(), value);
        Ok(Value::Unspecified)
    }

    fn eval_if(
        &self,
        operands: &[Node],
        env: &Rc<RefCell<Environment>>,
        depth: Depth,
        span: Span,
    ) -> EvalResult {
        let [condition, consequent, alternate] = operands else {
            return Err(EvalError::InvalidSpecialForm(
                "if expects a test, a consequent and an alternate".to_string(),
                span,
            ));
        };
        // Only the chosen branch is evaluated
        let depth = depth.deeper();
        if self.eval(condition, env, depth)?.is_truthy() {
            self.eval(consequent, env, depth)
        } else {
            self.eval(alternate, env, depth)
        }
    }

    fn eval_call(
        &self,
        operator: &Node,
        operands: &[Node],
        env: &Rc<RefCell<Environment>>,
        depth: Depth,
        span: Span,
    ) -> EvalResult {
        let inner = depth.deeper();
        let procedure = match self.eval(operator, env, inner)? {
            Value::Procedure(procedure) => procedure,
            other => {
                return Err(EvalError::NotAProcedure {
                    found: other.type_name(),
                    span: operator.span,
                });
            }
        };

        // Arguments are evaluated left to right in the caller's environment
        let mut args = Vec::with_capacity(operands.len());
        for operand in operands {
            args.push(self.eval(operand, env, inner)?);
        }

        self.apply_at(&procedure, args, span, depth)
    }

    fn apply_at(
        &self,
        procedure: &Procedure,
        args: Vec<Value>,
        span: Span,
        depth: Depth,
    ) -> EvalResult {
        match procedure {
            Procedure::Primitive(func, _) => func(&args, span),
            Procedure::Lambda(lambda) => {
                if depth.calls >= self.config.max_depth {
                    return Err(EvalError::RecursionLimit {
                        limit: self.config.max_depth,
                        span,
                    });
                }
                if args.len() != lambda.params.len() {
                    return Err(EvalError::ArityMismatch {
                        expected: lambda.params.len(),
                        found: args.len(),
                        span,
                    });
                }
                trace!(params = ?lambda.params, depth = depth.calls, "applying closure");

                let frame = Environment::new_enclosed(lambda.env.clone());
                {
                    let mut frame = frame.borrow_mut();
                    for (param, arg) in lambda.params.iter().zip(args) {
                        frame.define(param.clone(), arg);
                    }
                }
                self.eval(&lambda.body, &frame, depth.call())
            }
        }
    }
}

fn eval_quote(operands: &[Node], span: Span) -> EvalResult {
    if let [datum] = operands {
        // Quote returns the operand unevaluated.
        Ok(Value::Quoted(datum.clone()))
    } else {
        Err(EvalError::InvalidSpecialForm(
            "quote expects exactly one argument".to_string(),
            span, // Use the span of the whole (quote ...) form
        ))
    }
}

fn eval_lambda(operands: &[Node], env: &Rc<RefCell<Environment>>, span: Span) -> EvalResult {
    let [params_node, body] = operands else {
        return Err(EvalError::InvalidSpecialForm(
            "lambda expects a parameter list and one body".to_string(),
            span,
        ));
    };
    let Sexpr::List(param_nodes) = &params_node.kind else {
        return Err(EvalError::InvalidSpecialForm(
            "lambda parameters must be a list".to_string(),
            params_node.span,
        ));
    };
    let params = param_nodes
        .iter()
        .map(|param| match &param.kind {
            Sexpr::Symbol(name) => Ok(name.clone()),
            _ => Err(EvalError::NotASymbol(param.to_string(), param.span)),
        })
        .collect::<EvalResult<Vec<String>>>()?;

    Ok(Value::Procedure(Procedure::Lambda(Rc::new(Lambda {
        params,
        body: body.clone(),
        env: env.clone(), // Lexical scope: the environment active right now
    }))))
}

/// Evaluates `node` in `env` with the default limits.
pub fn evaluate(node: &Node, env: &Rc<RefCell<Environment>>) -> EvalResult {
    Evaluator::default().evaluate(node, env)
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse; // Use parser to create AST nodes easily

    fn eval_in(input: &str, env: &Rc<RefCell<Environment>>, evaluator: Evaluator) -> EvalResult {
        match parse(input) {
            Ok(program) => evaluator.evaluate_program(&program, env),
            Err(e) => panic!("Parsing failed for input '{}': {}", input, e),
        }
    }

    // Helper to evaluate input string and check the resulting value
    fn assert_eval(input: &str, expected: Value, env: Option<Rc<RefCell<Environment>>>) {
        let env = env.unwrap_or_else(Environment::new_global_populated); // Use provided env or create new global one
        match eval_in(input, &env, Evaluator::default()) {
            Ok(result) => assert_eq!(result, expected, "Input: '{}'", input),
            Err(e) => panic!("Evaluation failed for input '{}': {}", input, e),
        }
    }

    // Helper to assert evaluation errors
    fn assert_eval_error(
        input: &str,
        expected_error_variant: &EvalError,
        env: Option<Rc<RefCell<Environment>>>,
    ) {
        let env = env.unwrap_or_else(Environment::new_global_populated);
        match eval_in(input, &env, Evaluator::default()) {
            Ok(result) => panic!(
                "Expected evaluation to fail for input '{}', but got: {:?}",
                input, result
            ),
            Err(e) => {
                assert_eq!(
                    std::mem::discriminant(&e),
                    std::mem::discriminant(expected_error_variant),
                    "Input: '{}', Expected error variant like {:?}, got: {:?}",
                    input,
                    expected_error_variant,
                    e
                );
            }
        }
    }

    fn sym(s: &str) -> Node {
        Node::new_symbol(s, Span::default())
    }

    fn num(n: f64) -> Node {
        Node::new_number(n, Span::default())
    }

    fn list(nodes: Vec<Node>) -> Node {
        Node::new_list(nodes, Span::default())
    }

    fn number(n: f64) -> Value {
        Value::Number(n)
    }

    #[test]
    fn test_eval_number_literal() {
        let env = Environment::new();
        assert_eq!(evaluate(&num(123.0), &env), Ok(number(123.0)));
    }

    #[test]
    fn test_eval_symbol_lookup_ok() {
        let env = Environment::new();
        env.borrow_mut().define("x".to_string(), number(100.0));
        assert_eq!(evaluate(&sym("x"), &env), Ok(number(100.0)));
    }

    #[test]
    fn test_eval_symbol_lookup_unbound() {
        let env = Environment::new(); // Empty env
        assert_eq!(
            evaluate(&sym("y"), &env),
            Err(EvalError::Env(EnvError::UnboundVariable(
                "y".to_string(),
                Span::default()
            )))
        );
        assert_eval_error(
            "(+ undefined-thing 1)",
            &EvalError::Env(EnvError::UnboundVariable(String::new(), Span::default())),
            None,
        );
    }

    #[test]
    fn test_eval_arithmetic() {
        assert_eval("(* 2 3)", number(6.0), None);
        assert_eval("(+ 1 (* 2 3))", number(7.0), None);
        assert_eval("(- 10 3)", number(7.0), None);
        assert_eval("(/ 10 4)", number(2.5), None);
        assert_eval("(* ( + 2 3) (/ 10 (+ 1 1)))", number(25.0), None);
        assert_eval("(- (- 10 3) 2)", number(5.0), None);
    }

    #[test]
    fn test_eval_pi() {
        assert_eval("(* pi 1)", number(std::f64::consts::PI), None);
    }

    #[test]
    fn test_eval_define() {
        let env = Environment::new_global_populated();
        assert_eval("(define value 10)", Value::Unspecified, Some(env.clone()));
        assert_eval("(+ value 50)", number(60.0), Some(env.clone()));
        // Redefinition overwrites in the same frame
        assert_eval("(define value 1)", Value::Unspecified, Some(env.clone()));
        assert_eval("(+ value 50)", number(51.0), Some(env));
    }

    #[test]
    fn test_eval_if() {
        assert_eval("(if (= 10 10) (* 7 6) (+ 10 (/ 10 5)))", number(42.0), None);
        assert_eval("(if (<= 100 10) (+ 10 10) (- 20 (/ 10 5)))", number(18.0), None);
        assert_eval("(if (> 2 1) 1 2)", number(1.0), None);
        assert_eval("(if (>= 1 2) 1 2)", number(2.0), None);
    }

    #[test]
    fn test_eval_if_does_not_evaluate_unused_branch() {
        // Division by zero and unbound names are errors, but only if reached
        assert_eval("(if (= 10 10) (* 7 6) (+ 10 (/ 10 0)))", number(42.0), None);
        assert_eval("(if (< 10 1) (/ 1 0) 7)", number(7.0), None);
        assert_eval("(if (< 1 10) 1 never-bound)", number(1.0), None);
        assert_eval_error(
            "(if (= 1 1) (/ 1 0) 2)",
            &EvalError::DivisionByZero(Span::default()),
            None,
        );
    }

    #[test]
    fn test_eval_if_truthiness_of_non_booleans() {
        // Only #f is false; a hand-built test that yields a number takes the consequent
        let env = Environment::new_global_populated();
        let node = list(vec![sym("if"), num(0.0), num(1.0), num(2.0)]);
        assert_eq!(evaluate(&node, &env), Ok(number(1.0)));
    }

    #[test]
    fn test_eval_quote() {
        let env = Environment::new_global_populated();
        let program = parse("(quote (+ 1 2))").expect("should parse");
        let result = evaluate(&program.forms[0], &env).expect("should evaluate");
        let Value::Quoted(datum) = result else {
            panic!("Expected a quoted datum, got {:?}", result);
        };
        let Sexpr::List(elements) = &datum.kind else {
            panic!("Expected a list");
        };
        assert_eq!(elements.len(), 3);
        assert_eq!(elements[0].kind, Sexpr::Symbol("+".to_string()));
        assert_eq!(elements[1].kind, Sexpr::Number(1.0));
        assert_eq!(elements[2].kind, Sexpr::Number(2.0));
        assert_eq!(datum.to_string(), "(+ 1 2)");

        assert_eval(
            "(quote the)",
            Value::Quoted(Node::new_symbol("the", Span::new(7, 10))),
            None,
        );
    }

    #[test]
    fn test_eval_lambda_creates_closure() {
        let env = Environment::new_global_populated();
        let node = list(vec![sym("lambda"), list(vec![sym("x")]), sym("x")]);
        match evaluate(&node, &env) {
            Ok(Value::Procedure(Procedure::Lambda(lambda))) => {
                assert_eq!(lambda.params, vec!["x".to_string()]);
                assert_eq!(lambda.body, sym("x"));
                assert!(Rc::ptr_eq(&lambda.env, &env));
            }
            other => panic!("Expected a closure, got {:?}", other),
        }
    }

    #[test]
    fn test_eval_closures() {
        let env = Environment::new_global_populated();
        assert_eval(
            "(define twice (lambda (x) (* 2 x)))",
            Value::Unspecified,
            Some(env.clone()),
        );
        assert_eval("(twice 5)", number(10.0), Some(env.clone()));
        assert_eval(
            "(define repeat (lambda (f) (lambda (x) (f (f x)))))",
            Value::Unspecified,
            Some(env.clone()),
        );
        assert_eval("((repeat twice) 10)", number(40.0), Some(env.clone()));
        assert_eval("((repeat (repeat twice)) 10)", number(160.0), Some(env));
    }

    #[test]
    fn test_eval_recursion() {
        let env = Environment::new_global_populated();
        assert_eval(
            "(define fact (lambda (n) (if (<= n 1) 1 (* n (fact (- n 1))))))",
            Value::Unspecified,
            Some(env.clone()),
        );
        assert_eval("(fact 10)", number(3628800.0), Some(env.clone()));
        assert_eval(
            "(define fib (lambda (n) (if (< n 2) 1 (+ (fib (- n 1)) (fib (- n 2))))))",
            Value::Unspecified,
            Some(env.clone()),
        );
        assert_eval("(fib 10)", number(89.0), Some(env));
    }

    #[test]
    fn test_parameters_shadow_and_do_not_leak() {
        let env = Environment::new_global_populated();
        assert_eval("(define x 1)", Value::Unspecified, Some(env.clone()));
        assert_eval(
            "(define shadow (lambda (x) (* x 100)))",
            Value::Unspecified,
            Some(env.clone()),
        );
        assert_eval("(shadow 5)", number(500.0), Some(env.clone()));
        assert_eval("(+ x 0)", number(1.0), Some(env));
    }

    #[test]
    fn test_closure_sees_later_global_definitions() {
        let env = Environment::new_global_populated();
        assert_eval(
            "(define later (lambda (a) (+ a offset)))(define offset 5)(later 1)",
            number(6.0),
            Some(env),
        );
    }

    #[test]
    fn test_eval_arity_mismatch() {
        let env = Environment::new_global_populated();
        assert_eval(
            "(define twice (lambda (x) (* 2 x)))",
            Value::Unspecified,
            Some(env.clone()),
        );
        assert_eq!(
            eval_in("(twice 1 2)", &env, Evaluator::default()),
            Err(EvalError::ArityMismatch {
                expected: 1,
                found: 2,
                span: Span::new(0, 11),
            })
        );
        assert_eval_error(
            "(twice)",
            &EvalError::ArityMismatch {
                expected: 0,
                found: 0,
                span: Span::default(),
            },
            Some(env),
        );
    }

    #[test]
    fn test_eval_primitive_arity_and_types() {
        let env = Environment::new_global_populated();
        // The parser never builds these, so construct them by hand
        for node in [
            list(vec![sym("+"), num(1.0), num(2.0), num(3.0)]),
            list(vec![sym("<"), num(1.0)]),
        ] {
            assert!(matches!(
                evaluate(&node, &env),
                Err(EvalError::InvalidArguments(_, _))
            ));
        }
        assert_eval(
            "(define twice (lambda (x) (* 2 x)))",
            Value::Unspecified,
            Some(env.clone()),
        );
        assert_eval_error(
            "(+ twice 1)",
            &EvalError::TypeMismatch {
                expected: "number",
                found: "",
                span: Span::default(),
            },
            Some(env),
        );
    }

    #[test]
    fn test_eval_not_procedure_error() {
        let env = Environment::new_global_populated();
        assert_eval("(define value 10)", Value::Unspecified, Some(env.clone()));
        assert_eq!(
            eval_in("(value 1)", &env, Evaluator::default()),
            Err(EvalError::NotAProcedure {
                found: "number",
                span: Span::new(1, 6),
            })
        );
    }

    #[test]
    fn test_eval_malformed_special_forms() {
        let env = Environment::new_global_populated();
        let malformed = [
            list(vec![sym("define"), sym("x")]),
            list(vec![sym("if"), num(1.0), num(2.0)]),
            list(vec![sym("quote")]),
            list(vec![sym("lambda"), sym("x"), sym("x")]),
            list(vec![]),
        ];
        for node in malformed {
            assert!(
                matches!(
                    evaluate(&node, &env),
                    Err(EvalError::InvalidSpecialForm(_, _))
                ),
                "{} should be rejected",
                node
            );
        }
        let numeric_param = list(vec![sym("lambda"), list(vec![num(1.0)]), num(1.0)]);
        assert!(matches!(
            evaluate(&numeric_param, &env),
            Err(EvalError::NotASymbol(_, _))
        ));
    }

    #[test]
    fn test_recursion_limit() {
        let env = Environment::new_global_populated();
        let evaluator = Evaluator::new(EvalConfig {
            max_depth: 32,
            ..EvalConfig::default()
        });
        eval_in("(define spin (lambda (n) (spin n)))", &env, evaluator)
            .expect("define should succeed");
        assert!(matches!(
            eval_in("(spin 1)", &env, evaluator),
            Err(EvalError::RecursionLimit { limit: 32, .. })
        ));
        // Shallow recursion under the limit still works
        eval_in(
            "(define fact (lambda (n) (if (<= n 1) 1 (* n (fact (- n 1))))))",
            &env,
            evaluator,
        )
        .expect("define should succeed");
        assert_eq!(eval_in("(fact 5)", &env, evaluator), Ok(number(120.0)));
    }

    #[test]
    fn test_default_limits_stop_runaway_recursion() {
        let env = Environment::new_global_populated();
        let evaluator = Evaluator::default();
        let limit = evaluator.config.max_depth;
        eval_in(
            "(define count (lambda (n) (if (<= n 0) 0 (+ 1 (count (- n 1))))))",
            &env,
            evaluator,
        )
        .expect("define should succeed");

        let deepest = format!("(count {})", limit - 1);
        assert_eq!(eval_in(&deepest, &env, evaluator), Ok(number((limit - 1) as f64)));
        assert!(matches!(
            eval_in("(count 100000)", &env, evaluator),
            Err(EvalError::RecursionLimit { limit: l, .. }) if l == limit
        ));
    }

    #[test]
    fn test_nesting_limit_on_hand_built_tree() {
        // (+ 1 (+ 1 ... 0)) far deeper than the parser would ever produce
        let env = Environment::new_global_populated();
        let mut node = num(0.0);
        for _ in 0..1_000 {
            node = list(vec![sym("+"), num(1.0), node]);
        }
        let limit = EvalConfig::default().max_nesting;
        assert!(matches!(
            evaluate(&node, &env),
            Err(EvalError::NestingTooDeep { limit: l, .. }) if l == limit
        ));

        let mut shallow = num(0.0);
        for _ in 0..100 {
            shallow = list(vec![sym("+"), num(1.0), shallow]);
        }
        assert_eq!(evaluate(&shallow, &env), Ok(number(100.0)));
    }

    #[test]
    fn test_apply_directly() {
        let env = Environment::new_global_populated();
        let Ok(Value::Procedure(add)) = env.borrow().get("+", Span::default()) else {
            panic!("+ should be a procedure");
        };
        let evaluator = Evaluator::default();
        assert_eq!(
            evaluator.apply(&add, vec![number(1.0), number(2.0)], Span::default()),
            Ok(number(3.0))
        );
    }

    #[test]
    fn test_error_span() {
        let env = Environment::new_global_populated();
        let err = eval_in("(/ 1 0)", &env, Evaluator::default()).unwrap_err();
        assert_eq!(err.span(), Span::new(0, 7));
    }
}
