//! The machine's extended state: a typed-but-dynamic map threaded through
//! every entry/exit/transition action and guard.
//!
//! Two keys are reserved by the engine (`exm_params`, `exm_queue`); authors
//! should not read or write them directly and should instead use
//! [`Context::put_params`]/[`Context::get_params`]/[`Context::raise_event`].

use indexmap::IndexMap;
use serde_json::Value;

/// Key under which the currently processed event's parameters live while a
/// transition search/action chain is running.
pub(crate) const EXM_PARAMS: &str = "exm_params";
/// Key under which actions append internally raised events.
pub(crate) const EXM_QUEUE: &str = "exm_queue";

/// An event dispatched to a [`crate::machine::Machine`], or raised internally
/// by an action via [`Context::raise_event`].
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A bare event name, with no parameters.
    Bare(String),
    /// An event name carrying an arbitrary JSON parameter payload.
    WithParams(String, Value),
}

impl Event {
    /// The event's name, regardless of whether it carries parameters.
    pub fn name(&self) -> &str {
        match self {
            Event::Bare(name) => name,
            Event::WithParams(name, _) => name,
        }
    }

    /// The event's parameters, if any.
    pub fn params(&self) -> Option<&Value> {
        match self {
            Event::Bare(_) => None,
            Event::WithParams(_, params) => Some(params),
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Event::Bare(name) => Value::String(name.clone()),
            Event::WithParams(name, params) => {
                Value::Array(vec![Value::String(name.clone()), params.clone()])
            }
        }
    }

    fn from_value(value: &Value) -> Option<Event> {
        match value {
            Value::String(name) => Some(Event::Bare(name.clone())),
            Value::Array(items) if items.len() == 2 => match &items[0] {
                Value::String(name) => Some(Event::WithParams(name.clone(), items[1].clone())),
                _ => None,
            },
            _ => None,
        }
    }
}

impl From<&str> for Event {
    fn from(name: &str) -> Self {
        Event::Bare(name.to_string())
    }
}

impl From<String> for Event {
    fn from(name: String) -> Self {
        Event::Bare(name)
    }
}

impl From<(&str, Value)> for Event {
    fn from((name, params): (&str, Value)) -> Self {
        Event::WithParams(name.to_string(), params)
    }
}

impl From<(String, Value)> for Event {
    fn from((name, params): (String, Value)) -> Self {
        Event::WithParams(name, params)
    }
}

/// The machine's user data, event parameters, and internal event queue.
///
/// `Serialize`/`Deserialize` are derived so a caller can snapshot a
/// machine's extended state (e.g. to persist it between runs); the engine
/// itself has no persistence layer (§6: out of scope for the core).
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Context {
    values: IndexMap<String, Value>,
}

impl Context {
    /// An empty context.
    pub fn new() -> Self {
        Self { values: IndexMap::new() }
    }

    /// Builds a context from an initial set of key/value pairs.
    pub fn from_map(values: IndexMap<String, Value>) -> Self {
        Self { values }
    }

    /// Writes `value` under `key`, overwriting any previous value.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Reads the value stored under `key`, if any.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Reads the value stored under `key`, falling back to `default`.
    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.values.get(key).cloned().unwrap_or(default)
    }

    /// Removes and returns the value stored under `key`, if any.
    pub fn delete(&mut self, key: &str) -> Option<Value> {
        self.values.shift_remove(key)
    }

    /// Writes the parameters of the event currently being processed.
    pub fn put_params(&mut self, params: Value) {
        self.put(EXM_PARAMS, params);
    }

    /// Reads the parameters of the event currently being processed.
    pub fn get_params(&self) -> Option<&Value> {
        self.get(EXM_PARAMS)
    }

    /// Clears the parameters of the event currently being processed.
    pub fn delete_params(&mut self) -> Option<Value> {
        self.delete(EXM_PARAMS)
    }

    /// Appends `event` to the internal event queue (FIFO), creating the queue
    /// if it does not already exist.
    pub fn raise_event(&mut self, event: impl Into<Event>) {
        let event = event.into();
        match self.values.get_mut(EXM_QUEUE) {
            Some(Value::Array(items)) => items.push(event.to_value()),
            _ => {
                self.values
                    .insert(EXM_QUEUE.to_string(), Value::Array(vec![event.to_value()]));
            }
        }
    }

    /// Removes the internal event queue from the context entirely, returning
    /// its contents in FIFO order. Used by the interpreter between
    /// microsteps; not part of the author-facing surface.
    pub(crate) fn take_queue(&mut self) -> Vec<Event> {
        match self.values.shift_remove(EXM_QUEUE) {
            Some(Value::Array(items)) => items.iter().filter_map(Event::from_value).collect(),
            _ => Vec::new(),
        }
    }

    /// `true` if the reserved engine keys are absent (should hold between
    /// dispatches; see invariant 4).
    pub(crate) fn is_clean(&self) -> bool {
        !self.values.contains_key(EXM_PARAMS) && !self.values.contains_key(EXM_QUEUE)
    }
}
