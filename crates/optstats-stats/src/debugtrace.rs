//! Step-by-step optimizer debug trace.
//!
//! A trace is a tree of named contexts. Each context holds the steps recorded
//! while it was current; leaving a context appends it as one step of its
//! parent.

use serde_json::{Map, Value};

#[derive(Debug, Default)]
pub struct DebugTrace {
    root: Vec<Value>,
    stack: Vec<(String, Vec<Value>)>,
}

impl DebugTrace {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&mut self, name: &str) {
        self.stack.push((name.to_owned(), Vec::new()));
    }

    /// Close the current context. Unbalanced calls are ignored.
    pub fn leave(&mut self) {
        if let Some((name, steps)) = self.stack.pop() {
            let mut node = Map::new();
            node.insert(name, Value::Array(steps));
            self.append_step(Value::Object(node));
        }
    }

    pub fn append_step(&mut self, step: Value) {
        match self.stack.last_mut() {
            Some((_, steps)) => steps.push(step),
            None => self.root.push(step),
        }
    }

    /// Record named values as one step.
    pub fn record_values(&mut self, values: impl IntoIterator<Item = (&'static str, Value)>) {
        let step: Map<String, Value> = values
            .into_iter()
            .map(|(name, value)| (name.to_owned(), value))
            .collect();
        self.append_step(Value::Object(step));
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// The finished steps. Open contexts are not included.
    #[must_use]
    pub fn to_json(&self) -> Value {
        Value::Array(self.root.clone())
    }
}
