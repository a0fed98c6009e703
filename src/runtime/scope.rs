//! Lexical scope chain.
//!
//! Scopes are reference counted so closures can keep their defining scope
//! alive after the block that created it has finished. The root scope falls
//! back to the global table for names no scope declares.
//!
//! A closure stored in a scope it captures (every `local function`) keeps
//! that scope alive through a reference cycle. Every scope therefore
//! registers with its root, and [`ScopeRef::teardown`] empties them all
//! when the owning interpreter goes away.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use tracing::trace;

use super::error::RuntimeError;
use super::value::{TableRef, Value};

/// A named binding with its attributes.
#[derive(Debug, Clone)]
pub struct Variable {
    pub value: Value,
    pub constant: bool,
    pub to_be_closed: bool,
}

impl Variable {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            constant: false,
            to_be_closed: false,
        }
    }

    pub fn constant(value: Value) -> Self {
        Self {
            value,
            constant: true,
            to_be_closed: false,
        }
    }

    /// To-be-closed variables are also read-only.
    pub fn to_be_closed(value: Value) -> Self {
        Self {
            value,
            constant: true,
            to_be_closed: true,
        }
    }
}

/// How a name resolves from some scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// Declared in the running function.
    Local,
    /// Declared in an enclosing function.
    Upvalue,
    Global,
}

/// Weak handles to every scope under one root.
#[derive(Default)]
struct Registry {
    scopes: RefCell<Vec<Weak<RefCell<Scope>>>>,
}

impl Registry {
    fn track(&self, scope: &Rc<RefCell<Scope>>) {
        let mut scopes = self.scopes.borrow_mut();
        if scopes.len() == scopes.capacity() {
            scopes.retain(|w| w.strong_count() > 0);
            let live = scopes.len();
            scopes.reserve(live.max(16));
        }
        scopes.push(Rc::downgrade(scope));
    }
}

pub struct Scope {
    bindings: HashMap<String, Variable>,
    parent: Option<ScopeRef>,
    /// Only set on the root scope.
    globals: Option<TableRef>,
    /// Only set on the scope of a vararg function invocation.
    varargs: Option<Rc<[Value]>>,
    /// Set on the scope a function invocation binds its parameters in.
    function: bool,
    registry: Rc<Registry>,
}

/// Shared handle to a scope. Cloning the handle shares the scope.
#[derive(Clone)]
pub struct ScopeRef(Rc<RefCell<Scope>>);

impl ScopeRef {
    /// A root scope backed by `globals`.
    pub fn root(globals: TableRef) -> Self {
        Self::create(Scope {
            bindings: HashMap::new(),
            parent: None,
            globals: Some(globals),
            varargs: None,
            function: true,
            registry: Rc::new(Registry::default()),
        })
    }

    fn create(scope: Scope) -> Self {
        let registry = scope.registry.clone();
        let scope = Rc::new(RefCell::new(scope));
        registry.track(&scope);
        ScopeRef(scope)
    }

    fn child(&self, function: bool, varargs: Option<Rc<[Value]>>) -> ScopeRef {
        let registry = self.0.borrow().registry.clone();
        Self::create(Scope {
            bindings: HashMap::new(),
            parent: Some(self.clone()),
            globals: None,
            varargs,
            function,
            registry,
        })
    }

    /// A new child scope of `self`.
    pub fn push(&self) -> ScopeRef {
        self.child(false, None)
    }

    /// The scope of a function invocation, carrying its varargs when the
    /// function has them.
    pub fn push_function(&self, varargs: Option<Vec<Value>>) -> ScopeRef {
        trace!(
            varargs = varargs.as_ref().map_or(0, Vec::len),
            "function scope"
        );
        self.child(true, varargs.map(Rc::from))
    }

    /// Empty every scope created under this scope's root. Closures that
    /// outlive the teardown can no longer resolve their upvalues.
    pub fn teardown(&self) {
        let registry = self.0.borrow().registry.clone();
        let live: Vec<_> = registry
            .scopes
            .borrow_mut()
            .drain(..)
            .filter_map(|w| w.upgrade())
            .collect();
        let mut released = Vec::with_capacity(live.len());
        for scope in &live {
            let mut scope = scope.borrow_mut();
            released.push((
                std::mem::take(&mut scope.bindings),
                scope.varargs.take(),
                scope.parent.take(),
            ));
        }
        trace!(scopes = live.len(), "scope teardown");
        drop(released);
    }

    /// Resolve `name` through the chain, then the global table. Unknown
    /// globals are nil; only a chain with no global table at its root can
    /// fail.
    pub fn get(&self, name: &str) -> Result<Value, RuntimeError> {
        let mut current = self.clone();
        loop {
            let next = {
                let scope = current.0.borrow();
                if let Some(var) = scope.bindings.get(name) {
                    return Ok(var.value.clone());
                }
                if let Some(globals) = &scope.globals {
                    return Ok(globals.borrow().get_str(name));
                }
                match &scope.parent {
                    Some(parent) => parent.clone(),
                    None => {
                        return Err(RuntimeError::Name(format!(
                            "name '{}' is not declared",
                            name
                        )))
                    }
                }
            };
            current = next;
        }
    }

    /// Introduce or shadow `name` in this scope only.
    pub fn put_local(&self, name: &str, variable: Variable) {
        self.0.borrow_mut().bindings.insert(name.to_string(), variable);
    }

    /// Assign to the nearest binding of `name`, or to the global table when
    /// no scope declares it.
    pub fn put_nonlocal(&self, name: &str, value: Value) -> Result<(), RuntimeError> {
        let mut current = self.clone();
        loop {
            let next = {
                let mut scope = current.0.borrow_mut();
                if let Some(var) = scope.bindings.get_mut(name) {
                    if var.constant {
                        return Err(RuntimeError::Const(format!(
                            "attempt to assign to const variable '{}'",
                            name
                        )));
                    }
                    var.value = value;
                    return Ok(());
                }
                if let Some(globals) = &scope.globals {
                    globals.borrow_mut().set_str(name, value);
                    return Ok(());
                }
                match &scope.parent {
                    Some(parent) => parent.clone(),
                    None => {
                        return Err(RuntimeError::Name(format!(
                            "name '{}' is not declared",
                            name
                        )))
                    }
                }
            };
            current = next;
        }
    }

    /// Where `name` resolves from here: a binding of the running function,
    /// one of an enclosing function, or the global table.
    pub fn binding(&self, name: &str) -> Binding {
        let mut current = self.clone();
        let mut crossed = false;
        loop {
            let next = {
                let scope = current.0.borrow();
                if scope.bindings.contains_key(name) {
                    return if crossed { Binding::Upvalue } else { Binding::Local };
                }
                crossed |= scope.function;
                match &scope.parent {
                    Some(parent) => parent.clone(),
                    None => return Binding::Global,
                }
            };
            current = next;
        }
    }

    /// The varargs of the nearest enclosing vararg invocation.
    pub fn varargs(&self) -> Rc<[Value]> {
        let mut current = self.clone();
        loop {
            let next = {
                let scope = current.0.borrow();
                if let Some(varargs) = &scope.varargs {
                    return varargs.clone();
                }
                match &scope.parent {
                    Some(parent) => parent.clone(),
                    None => return Rc::from(Vec::new()),
                }
            };
            current = next;
        }
    }
}
