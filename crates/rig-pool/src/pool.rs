//! Shared pool of pending test units.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::unit::TestUnit;

/// Concurrency-safe collection of pending work units.
///
/// `poll` is the only removal path and is atomic with respect to other
/// pollers: no unit is ever returned to two callers. Order across
/// workers is unspecified.
#[derive(Clone)]
pub struct WorkPool {
    units: Arc<Mutex<VecDeque<Box<dyn TestUnit>>>>,
}

impl WorkPool {
    pub fn new(units: Vec<Box<dyn TestUnit>>) -> Self {
        Self {
            units: Arc::new(Mutex::new(units.into())),
        }
    }

    /// Remove and return an arbitrary pending unit, or `None` when the
    /// pool is empty.
    pub fn poll(&self) -> Option<Box<dyn TestUnit>> {
        self.units.lock().unwrap().pop_front()
    }

    pub fn len(&self) -> usize {
        self.units.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.lock().unwrap().is_empty()
    }
}
