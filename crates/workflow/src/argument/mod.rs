//! Shared, typed argument cells
//!
//! An [`Argument`] is a named value behind its own lock. Instances hold
//! arguments as `Arc<Argument>`, so a child workflow entered from a parent
//! reads and writes the very same cell as the parent.

mod collection;
mod value;

pub use collection::Arguments;
pub use value::{ArgumentEnum, FromValue, Value};

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;

/// A named, thread-safe value cell
pub struct Argument {
    name: String,
    value: Mutex<Value>,
    inheritable: bool,
}

impl Argument {
    /// Create a shared argument that children inherit
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            value: Mutex::new(value.into()),
            inheritable: true,
        })
    }

    /// Create a shared argument holding `Null`
    pub fn empty(name: impl Into<String>) -> Arc<Self> {
        Self::new(name, Value::Null)
    }

    /// Create an argument that stays with the instance it is given to
    pub fn non_inheritable(name: impl Into<String>, value: impl Into<Value>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            value: Mutex::new(value.into()),
            inheritable: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_inheritable(&self) -> bool {
        self.inheritable
    }

    /// Snapshot of the stored value
    pub fn value(&self) -> Value {
        self.value.lock().clone()
    }

    /// Read the value converted to `T`
    pub fn get<T: FromValue>(&self) -> Result<T> {
        T::from_value(&self.value.lock())
    }

    /// Read an enum stored by name or ordinal
    pub fn get_enum<E: ArgumentEnum>(&self) -> Result<E> {
        self.value.lock().to_enum()
    }

    pub fn set(&self, value: impl Into<Value>) {
        *self.value.lock() = value.into();
    }

    pub fn set_enum<E: ArgumentEnum>(&self, value: E) {
        self.set(value.to_value());
    }

    /// Run `f` with exclusive access to the value
    ///
    /// Use this for compound read-modify-write sequences; `get` and `set`
    /// take the same lock.
    pub fn with_lock<R>(&self, f: impl FnOnce(&mut Value) -> R) -> R {
        f(&mut self.value.lock())
    }

    /// Typed read-modify-write under the lock, returning the new value
    pub fn update<T, F>(&self, f: F) -> Result<T>
    where
        T: FromValue + Into<Value> + Clone,
        F: FnOnce(T) -> T,
    {
        let mut guard = self.value.lock();
        let next = f(T::from_value(&guard)?);
        *guard = next.clone().into();
        Ok(next)
    }
}

impl fmt::Debug for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Argument")
            .field("name", &self.name)
            .field("value", &*self.value.lock())
            .field("inheritable", &self.inheritable)
            .finish()
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value.lock())
    }
}
