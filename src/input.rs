use std::{cell::RefCell, collections::HashMap};

use crate::value::Value;

// Boundary to whatever owns the reactive inputs. Captures only ever read through it.
pub trait InputSource {
    fn read(&self, name: &str) -> Option<Value>;
}

// Inputs held in a map that the host updates between evaluations.
#[derive(Default)]
pub struct MapInputs {
    values: RefCell<HashMap<String, Value>>,
}

impl MapInputs {
    pub fn new() -> MapInputs {
        MapInputs::default()
    }

    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.values.borrow_mut().insert(name.into(), value);
    }

    pub fn remove(&self, name: &str) -> Option<Value> {
        self.values.borrow_mut().remove(name)
    }
}

impl InputSource for MapInputs {
    fn read(&self, name: &str) -> Option<Value> {
        self.values.borrow().get(name).cloned()
    }
}
