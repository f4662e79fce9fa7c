use crate::primitives;
use crate::source::Span;
use crate::types::{PrimitiveFunc, Procedure, Value};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use thiserror::Error;

const PRIMITIVES: &[(&str, PrimitiveFunc)] = &[
    ("+", primitives::prim_add),
    ("-", primitives::prim_sub),
    ("*", primitives::prim_mul),
    ("/", primitives::prim_div),
    ("=", primitives::prim_equals),
    ("<", primitives::prim_less_than),
    ("<=", primitives::prim_less_than_or_equals),
    (">", primitives::prim_greater_than),
    (">=", primitives::prim_greater_than_or_equals),
];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EnvError {
    #[error("Unbound variable: '{0}'")]
    UnboundVariable(String, Span), // name, and where it was referenced
}

/// One frame of bindings plus a link to the frame it was created in.
#[derive(Debug, Default)]
pub struct Environment {
    // Shared so closures can keep their defining frame alive; only ever read through.
    outer: Option<Rc<RefCell<Environment>>>,
    bindings: HashMap<String, Value>,
}

impl Environment {
    /// An empty frame with no outer link.
    pub fn new() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Environment::default()))
    }

    /// The global environment: binary arithmetic and comparison primitives, plus `pi`.
    pub fn new_global_populated() -> Rc<RefCell<Environment>> {
        let global = Environment::new();
        {
            let mut env = global.borrow_mut();
            for &(name, func) in PRIMITIVES {
                env.add_primitive(name, func);
            }
            env.define("pi".to_string(), Value::Number(std::f64::consts::PI));
        }
        global
    }

    /// A fresh frame whose lookups fall through to `outer_env`.
    pub fn new_enclosed(outer_env: Rc<RefCell<Environment>>) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Environment {
            outer: Some(outer_env),
            bindings: HashMap::new(),
        }))
    }

    /// Binds `name` in this frame only, replacing any earlier binding here.
    pub fn define(&mut self, name: String, value: Value) {
        self.bindings.insert(name, value);
    }

    /// Innermost binding of `name`, searching outward frame by frame.
    /// `lookup_span` is where the name was referenced and ends up in the error.
    pub fn get(&self, name: &str, lookup_span: Span) -> Result<Value, EnvError> {
        if let Some(value) = self.bindings.get(name) {
            return Ok(value.clone());
        }

        let mut current = self.outer.clone();
        while let Some(env_ptr) = current {
            let env = env_ptr.borrow();
            if let Some(value) = env.bindings.get(name) {
                return Ok(value.clone());
            }
            current = env.outer.clone();
        }
        Err(EnvError::UnboundVariable(name.to_string(), lookup_span))
    }

    fn add_primitive(&mut self, name: &'static str, func: PrimitiveFunc) {
        self.define(
            name.to_string(),
            Value::Procedure(Procedure::Primitive(func, name)),
        );
    }

    /// Every name visible from this frame, used for REPL completion.
    pub fn get_identifiers(&self) -> HashSet<String> {
        let mut identifiers: HashSet<String> = self.bindings.keys().cloned().collect();
        let mut current = self.outer.clone();
        while let Some(env_ptr) = current {
            let env = env_ptr.borrow();
            identifiers.extend(env.bindings.keys().cloned());
            current = env.outer.clone();
        }
        identifiers
    }
}
