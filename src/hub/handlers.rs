//! Dispatch table mapping invocation targets to handler closures.
//!
//! Handlers run on the connection's reader task in arrival order and must
//! not block; hand long work off to a spawned task.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::utils::HubError;

type Callback = Arc<dyn Fn(&str, &[Value]) -> Result<(), HubError> + Send + Sync>;

#[derive(Clone, Default)]
pub struct HandlerTable {
    handlers: Arc<RwLock<HashMap<String, Vec<Callback>>>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler taking exactly one argument deserialized as `T`.
    pub fn on<T, F>(&self, target: &str, handler: F)
    where
        T: DeserializeOwned,
        F: Fn(T) + Send + Sync + 'static,
    {
        self.insert(
            target,
            Arc::new(move |target: &str, args: &[Value]| {
                if args.len() != 1 {
                    return Err(HubError::ArgumentCount {
                        target: target.to_string(),
                        expected: 1,
                        actual: args.len(),
                    });
                }
                let value = T::deserialize(&args[0])?;
                handler(value);
                Ok(())
            }),
        );
    }

    /// Registers a handler that receives the raw argument list.
    pub fn on_raw<F>(&self, target: &str, handler: F)
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        self.insert(
            target,
            Arc::new(move |_: &str, args: &[Value]| {
                handler(args);
                Ok(())
            }),
        );
    }

    pub fn remove(&self, target: &str) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(target);
    }

    pub fn contains(&self, target: &str) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(target)
    }

    /// Runs every handler for `target` and returns how many ran. The first
    /// handler error is returned after the remaining handlers have run.
    pub fn dispatch(&self, target: &str, args: &[Value]) -> Result<usize, HubError> {
        // clone out so handlers may register or remove handlers themselves
        let callbacks = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(target)
            .cloned()
            .ok_or_else(|| HubError::NoHandler(target.to_string()))?;

        let mut first_error = None;
        for callback in &callbacks {
            if let Err(e) = callback(target, args) {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(callbacks.len()),
        }
    }

    fn insert(&self, target: &str, callback: Callback) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(target.to_string())
            .or_default()
            .push(callback);
    }
}

impl std::fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("HandlerTable")
            .field("targets", &handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
