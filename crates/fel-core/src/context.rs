//! Variable storage used at evaluation time
//!
//! A [`Context`] maps names to [`Var`] cells. Two representations are provided:
//! [`MapContext`] for dynamic variable sets and [`ArrayContext`] for layouts that
//! are known ahead of time and addressed by slot. [`ContextChain`] layers local
//! variables over a parent context.
//!
//! Assigning to a name that is already bound swaps the value inside the existing
//! `Var` rather than replacing the cell, so handles captured by optimizers and
//! compiled artifacts always observe the current value.

use fel_types::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// A named, mutable value cell
pub struct Var {
    name: String,
    value: RwLock<Value>,
}

impl Var {
    /// Create a new cell
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self { name: name.into(), value: RwLock::new(value.into()) }
    }

    /// Create a new cell ready to be shared
    pub fn shared(name: impl Into<String>, value: impl Into<Value>) -> Arc<Self> {
        Arc::new(Self::new(name, value))
    }

    /// Variable name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current value
    pub fn get(&self) -> Value {
        // A poisoned lock still holds a complete value
        match self.value.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replace the current value, returning the previous one
    pub fn set(&self, value: impl Into<Value>) -> Value {
        let mut guard = match self.value.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *guard, value.into())
    }
}

impl fmt::Debug for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Var").field("name", &self.name).field("value", &self.get()).finish()
    }
}

/// Variable lookup used by both execution backends
pub trait Context: Send + Sync {
    /// Handle for fast repeated access, `None` when unbound
    fn get_var(&self, name: &str) -> Option<Arc<Var>>;

    /// Bind `name`, swapping the value of an existing cell in place
    fn set(&mut self, name: &str, value: Value);

    /// Current value of `name`, [`Value::Null`] when unbound
    fn get(&self, name: &str) -> Value {
        self.get_var(name).map_or(Value::Null, |var| var.get())
    }

    /// Check if `name` is bound
    fn contains(&self, name: &str) -> bool {
        self.get_var(name).is_some()
    }
}

/// Name-indexed context for dynamic variable sets
#[derive(Debug, Default)]
pub struct MapContext {
    vars: HashMap<String, Arc<Var>>,
}

impl MapContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from name/value pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut ctx = Self::new();
        for (name, value) in pairs {
            let name = name.into();
            ctx.vars.insert(name.clone(), Var::shared(name, value));
        }
        ctx
    }

    /// Bind an existing cell, replacing any previous binding of its name
    pub fn insert_var(&mut self, var: Arc<Var>) {
        self.vars.insert(var.name().to_string(), var);
    }

    /// Remove a binding
    pub fn remove(&mut self, name: &str) -> Option<Arc<Var>> {
        self.vars.remove(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl Context for MapContext {
    fn get_var(&self, name: &str) -> Option<Arc<Var>> {
        self.vars.get(name).cloned()
    }

    fn set(&mut self, name: &str, value: Value) {
        if let Some(var) = self.vars.get(name) {
            var.set(value);
        } else {
            self.vars.insert(name.to_string(), Var::shared(name, value));
        }
    }
}

/// Slot-indexed context
///
/// Names are assigned slots in binding order. When the layout is fixed with
/// [`ArrayContext::with_layout`], callers can resolve a slot once with
/// [`ArrayContext::slot`] and use [`ArrayContext::get_slot`] afterwards.
#[derive(Debug, Default)]
pub struct ArrayContext {
    index: HashMap<String, usize>,
    slots: Vec<Arc<Var>>,
}

impl ArrayContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-allocate one null slot per name, in order
    pub fn with_layout<S: AsRef<str>>(names: &[S]) -> Self {
        let mut ctx = Self::new();
        for name in names {
            ctx.push_slot(name.as_ref(), Value::Null);
        }
        ctx
    }

    /// Slot index of `name`
    pub fn slot(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Value at `slot`, `None` if out of range
    pub fn get_slot(&self, slot: usize) -> Option<Value> {
        self.slots.get(slot).map(|var| var.get())
    }

    /// Overwrite the value at `slot`; returns `false` if out of range
    pub fn set_slot(&self, slot: usize, value: impl Into<Value>) -> bool {
        match self.slots.get(slot) {
            Some(var) => {
                var.set(value);
                true
            }
            None => false,
        }
    }

    /// Cell at `slot`
    pub fn slot_var(&self, slot: usize) -> Option<&Arc<Var>> {
        self.slots.get(slot)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn push_slot(&mut self, name: &str, value: Value) -> usize {
        let slot = self.slots.len();
        self.slots.push(Var::shared(name, value));
        self.index.insert(name.to_string(), slot);
        slot
    }
}

impl Context for ArrayContext {
    fn get_var(&self, name: &str) -> Option<Arc<Var>> {
        self.slot(name).map(|slot| Arc::clone(&self.slots[slot]))
    }

    fn set(&mut self, name: &str, value: Value) {
        match self.slot(name) {
            Some(slot) => {
                self.slots[slot].set(value);
            }
            None => {
                self.push_slot(name, value);
            }
        }
    }
}

/// Local variables layered over a parent context
///
/// Reads fall back to the parent; writes always land in the local layer.
pub struct ContextChain<'a> {
    parent: &'a dyn Context,
    local: MapContext,
}

impl<'a> ContextChain<'a> {
    pub fn new(parent: &'a dyn Context) -> Self {
        Self { parent, local: MapContext::new() }
    }

    /// Local layer
    pub fn local(&self) -> &MapContext {
        &self.local
    }
}

impl Context for ContextChain<'_> {
    fn get_var(&self, name: &str) -> Option<Arc<Var>> {
        self.local.get_var(name).or_else(|| self.parent.get_var(name))
    }

    fn set(&mut self, name: &str, value: Value) {
        self.local.set(name, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbound_is_null() {
        let ctx = MapContext::new();
        assert_eq!(ctx.get("missing"), Value::Null);
        assert!(ctx.get_var("missing").is_none());
    }

    #[test]
    fn test_set_swaps_value_in_existing_var() {
        let mut ctx = MapContext::from_pairs([("x", 1)]);
        let handle = ctx.get_var("x").unwrap();

        ctx.set("x", Value::Int(2));

        assert_eq!(handle.get(), Value::Int(2));
        assert!(Arc::ptr_eq(&handle, &ctx.get_var("x").unwrap()));
    }

    #[test]
    fn test_array_layout_slots() {
        let mut ctx = ArrayContext::with_layout(&["a", "b"]);
        assert_eq!(ctx.slot("b"), Some(1));
        assert_eq!(ctx.get_slot(1), Some(Value::Null));

        assert!(ctx.set_slot(1, 5));
        assert_eq!(ctx.get("b"), Value::Int(5));
        assert!(!ctx.set_slot(9, 5));

        ctx.set("c", Value::Bool(true));
        assert_eq!(ctx.slot("c"), Some(2));
        assert_eq!(ctx.len(), 3);
    }

    #[test]
    fn test_chain_reads_parent_and_writes_locally() {
        let parent = MapContext::from_pairs([("x", 1), ("y", 2)]);
        let mut chain = ContextChain::new(&parent);

        chain.set("x", Value::Int(10));

        assert_eq!(chain.get("x"), Value::Int(10));
        assert_eq!(chain.get("y"), Value::Int(2));
        assert_eq!(parent.get("x"), Value::Int(1));
        assert_eq!(chain.local().len(), 1);
    }

    #[test]
    fn test_shared_var_across_contexts() {
        let var = Var::shared("rate", 0.5);
        let mut a = MapContext::new();
        let mut b = MapContext::new();
        a.insert_var(Arc::clone(&var));
        b.insert_var(Arc::clone(&var));

        a.set("rate", Value::Float(0.25));
        assert_eq!(b.get("rate"), Value::Float(0.25));
    }
}
