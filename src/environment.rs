use std::{cell::RefCell, rc::Rc};

use indexmap::IndexMap;

use crate::value::Value;

pub type EnvironmentRef = Rc<RefCell<Environment>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    /// Activation of a function, arrow or method call.
    Function,
    /// Scope of a `catch` clause. Owns only its error binding; new names
    /// are created in the enclosing scope.
    Catch,
}

/// One scope of variable bindings, chained to its parent.
#[derive(Debug)]
pub struct Environment {
    parent: Option<EnvironmentRef>,
    bindings: IndexMap<String, Value>,
    kind: ScopeKind,
}

impl Environment {
    pub fn new() -> EnvironmentRef {
        Rc::new(RefCell::new(Self {
            parent: None,
            bindings: IndexMap::new(),
            kind: ScopeKind::Global,
        }))
    }

    pub fn with_parent(parent: EnvironmentRef, kind: ScopeKind) -> EnvironmentRef {
        Rc::new(RefCell::new(Self {
            parent: Some(parent),
            bindings: IndexMap::new(),
            kind,
        }))
    }

    /// Binds `name` in this scope, shadowing any ancestor binding.
    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    pub fn get_local(&self, name: &str) -> Option<Value> {
        self.bindings.get(name).cloned()
    }

    pub fn get(env: &EnvironmentRef, name: &str) -> Option<Value> {
        let mut scope = Rc::clone(env);
        loop {
            if let Some(value) = scope.borrow().bindings.get(name) {
                return Some(value.clone());
            }
            let parent = scope.borrow().parent.clone();
            scope = parent?;
        }
    }

    /// Assignment: updates the nearest scope that already owns `name`, or
    /// creates it in `env` when no ancestor does.
    pub fn set(env: &EnvironmentRef, name: &str, value: Value) {
        let mut scope = Rc::clone(env);
        loop {
            if let Some(slot) = scope.borrow_mut().bindings.get_mut(name) {
                *slot = value;
                return;
            }
            let parent = scope.borrow().parent.clone();
            match parent {
                Some(parent) => scope = parent,
                None => break,
            }
        }

        Self::declare(env, name, value);
    }

    /// Binds `name` in the nearest scope that is not a catch scope.
    pub fn declare(env: &EnvironmentRef, name: &str, value: Value) {
        let mut target = Rc::clone(env);
        loop {
            let parent = {
                let current = target.borrow();
                match current.kind {
                    ScopeKind::Catch => current.parent.clone(),
                    _ => None,
                }
            };
            match parent {
                Some(parent) => target = parent,
                None => break,
            }
        }
        target.borrow_mut().define(name, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_updates_owning_ancestor() {
        let global = Environment::new();
        global.borrow_mut().define("x", Value::Number(1.0));
        let child = Environment::with_parent(Rc::clone(&global), ScopeKind::Function);
        Environment::set(&child, "x", Value::Number(2.0));
        assert_eq!(global.borrow().get_local("x"), Some(Value::Number(2.0)));
        assert!(child.borrow().get_local("x").is_none());
    }

    #[test]
    fn catch_scope_delegates_new_names() {
        let global = Environment::new();
        let catch = Environment::with_parent(Rc::clone(&global), ScopeKind::Catch);
        catch.borrow_mut().define("e", Value::Null);
        Environment::set(&catch, "result", Value::Bool(true));
        assert_eq!(global.borrow().get_local("result"), Some(Value::Bool(true)));
        assert!(Environment::get(&global, "e").is_none());
    }
}
