use crate::environment::Environment;
use crate::evaluator::EvalResult;
use crate::source::Span;
use std::cell::RefCell;
use std::fmt; // For custom display formatting
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: Sexpr, // The actual S-expression data
    pub span: Span,  // The source span it covers
}

impl Node {
    pub fn new(kind: Sexpr, span: Span) -> Self {
        Node { kind, span }
    }

    pub fn new_number(n: f64, span: Span) -> Self {
        Node::new(Sexpr::Number(n), span)
    }

    pub fn new_symbol(s: impl Into<String>, span: Span) -> Self {
        Node::new(Sexpr::Symbol(s.into()), span)
    }

    pub fn new_list(elements: Vec<Node>, span: Span) -> Self {
        Node::new(Sexpr::List(elements), span)
    }

    /// The special form this node introduces, if it is a keyword-headed list.
    pub fn special_form(&self) -> Option<SpecialForm> {
        match &self.kind {
            Sexpr::List(elements) => match elements.first().map(|head| &head.kind) {
                Some(Sexpr::Symbol(name)) => SpecialForm::from_keyword(name),
                _ => None,
            },
            _ => None,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Delegate to Sexpr's Display implementation
        write!(f, "{}", self.kind)
    }
}

/// The AST: numbers, symbols and lists of further nodes.
#[derive(Debug, Clone, PartialEq)]
pub enum Sexpr {
    Number(f64),     // Every numeric literal is an f64
    Symbol(String),  // e.g., +, circle-area, define
    List(Vec<Node>), // e.g., (+ 1 2), (define x 10)
}

impl Sexpr {
    pub fn type_name(&self) -> &'static str {
        match self {
            Sexpr::Number(_) => "number",
            Sexpr::Symbol(_) => "symbol",
            Sexpr::List(_) => "list",
        }
    }
}

impl fmt::Display for Sexpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sexpr::Symbol(s) => write!(f, "{}", s),
            Sexpr::Number(n) => write!(f, "{}", n),
            Sexpr::List(list) => {
                write!(f, "(")?;
                let mut first = true;
                for expr in list {
                    if !first {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", expr)?;
                    first = false;
                }
                write!(f, ")")
            }
        }
    }
}

/// Reserved keywords that introduce a special form at the head of a list.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SpecialForm {
    Define,
    If,
    Quote,
    Lambda,
}

impl SpecialForm {
    pub const ALL: [SpecialForm; 4] = [
        SpecialForm::Define,
        SpecialForm::If,
        SpecialForm::Quote,
        SpecialForm::Lambda,
    ];

    /// Keywords match in any letter case: `define`, `DEFINE` and `Define` are one keyword.
    pub fn from_keyword(name: &str) -> Option<SpecialForm> {
        SpecialForm::ALL
            .into_iter()
            .find(|form| form.keyword().eq_ignore_ascii_case(name))
    }

    /// Canonical (lower case) spelling, as written into parsed trees.
    pub fn keyword(self) -> &'static str {
        match self {
            SpecialForm::Define => "define",
            SpecialForm::If => "if",
            SpecialForm::Quote => "quote",
            SpecialForm::Lambda => "lambda",
        }
    }
}

impl fmt::Display for SpecialForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.keyword())
    }
}

/// A runtime value produced by evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Boolean(bool),
    Quoted(Node), // Result of (quote datum), kept structurally as-is
    Procedure(Procedure),
    Unspecified, // What define produces
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Boolean(_) => "boolean",
            Value::Quoted(node) => node.kind.type_name(),
            Value::Procedure(_) => "procedure",
            Value::Unspecified => "unspecified",
        }
    }

    /// Only `#f` is false.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Boolean(false))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::Boolean(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            Value::Quoted(node) => write!(f, "{}", node),
            Value::Procedure(procedure) => write!(f, "{}", procedure),
            Value::Unspecified => Ok(()),
        }
    }
}

pub type PrimitiveFunc = fn(&[Value], Span) -> EvalResult<Value>;

/// A closure: parameter names and a body, plus the environment it was created in.
pub struct Lambda {
    pub params: Vec<String>,
    pub body: Node,
    pub env: Rc<RefCell<Environment>>,
}

#[derive(Clone)] // Need Clone for Value::Procedure
pub enum Procedure {
    Primitive(PrimitiveFunc, &'static str), // The function pointer and its name (for display/debug)
    Lambda(Rc<Lambda>),
}

impl fmt::Debug for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Procedure::Primitive(_, name) => write!(f, "Primitive({})", name),
            // The captured environment may contain this very closure
            Procedure::Lambda(lambda) => {
                write!(f, "Lambda(({}) {})", lambda.params.join(" "), lambda.body)
            }
        }
    }
}

impl fmt::Display for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Procedure::Primitive(_, name) => write!(f, "#<primitive:{}>", name),
            Procedure::Lambda(lambda) => write!(f, "#<procedure ({})>", lambda.params.join(" ")),
        }
    }
}

// Function pointers are compared by name, closures by identity.
impl PartialEq for Procedure {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Procedure::Primitive(_, n1), Procedure::Primitive(_, n2)) => n1 == n2,
            (Procedure::Lambda(l1), Procedure::Lambda(l2)) => Rc::ptr_eq(l1, l2),
            _ => false,
        }
    }
}
