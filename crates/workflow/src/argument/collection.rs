//! Name-unique argument sets

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{Argument, FromValue, Value};
use crate::error::Result;

/// An ordered set of shared arguments with unique names
///
/// Inserting an argument whose name already exists replaces the earlier
/// entry. Cloning the set clones the `Arc`s, never the cells.
#[derive(Debug, Clone, Default)]
pub struct Arguments {
    items: Vec<Arc<Argument>>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Argument>> {
        self.items.iter().find(|a| a.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Read a value by name; a missing argument reads like `Null`
    pub fn value<T: FromValue>(&self, name: &str) -> Result<T> {
        match self.get(name) {
            Some(arg) => arg.get(),
            None => T::from_value(&Value::Null),
        }
    }

    /// Insert, replacing any argument with the same name
    pub fn insert(&mut self, argument: Arc<Argument>) -> Option<Arc<Argument>> {
        match self.items.iter_mut().find(|a| a.name() == argument.name()) {
            Some(slot) => Some(std::mem::replace(slot, argument)),
            None => {
                self.items.push(argument);
                None
            }
        }
    }

    /// Insert only when no argument with that name exists
    ///
    /// Returns the argument stored under the name afterwards.
    pub fn insert_if_absent(&mut self, argument: Arc<Argument>) -> Arc<Argument> {
        if let Some(existing) = self.get(argument.name()) {
            return existing.clone();
        }
        self.items.push(argument.clone());
        argument
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<Argument>> {
        let index = self.items.iter().position(|a| a.name() == name)?;
        Some(self.items.remove(index))
    }

    /// Arguments a child instance receives
    pub fn inheritable(&self) -> Arguments {
        self.items
            .iter()
            .filter(|a| a.is_inheritable())
            .cloned()
            .collect()
    }

    /// Union with `extras`; extras replace entries of the same name
    pub fn union(&self, extras: impl IntoIterator<Item = Arc<Argument>>) -> Arguments {
        let mut merged = self.clone();
        merged.extend(extras);
        merged
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|a| a.name())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Arc<Argument>> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Snapshot of every value by name
    pub fn to_map(&self) -> BTreeMap<String, Value> {
        self.items
            .iter()
            .map(|a| (a.name().to_string(), a.value()))
            .collect()
    }

    pub fn into_vec(self) -> Vec<Arc<Argument>> {
        self.items
    }
}

impl Extend<Arc<Argument>> for Arguments {
    fn extend<I: IntoIterator<Item = Arc<Argument>>>(&mut self, iter: I) {
        for argument in iter {
            self.insert(argument);
        }
    }
}

impl FromIterator<Arc<Argument>> for Arguments {
    fn from_iter<I: IntoIterator<Item = Arc<Argument>>>(iter: I) -> Self {
        let mut arguments = Arguments::new();
        arguments.extend(iter);
        arguments
    }
}

impl From<Vec<Arc<Argument>>> for Arguments {
    fn from(items: Vec<Arc<Argument>>) -> Self {
        items.into_iter().collect()
    }
}

impl IntoIterator for Arguments {
    type Item = Arc<Argument>;
    type IntoIter = std::vec::IntoIter<Arc<Argument>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Arguments {
    type Item = &'a Arc<Argument>;
    type IntoIter = std::slice::Iter<'a, Arc<Argument>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_replaces_by_name() {
        let mut args = Arguments::new();
        assert!(args.insert(Argument::new("a", 1)).is_none());
        let replaced = args.insert(Argument::new("a", 2));
        assert_eq!(replaced.unwrap().get::<i64>().unwrap(), 1);
        assert_eq!(args.len(), 1);
        assert_eq!(args.value::<i64>("a").unwrap(), 2);
    }

    #[test]
    fn test_insert_if_absent_keeps_existing() {
        let mut args = Arguments::new();
        let first = Argument::new("a", 1);
        args.insert(first.clone());
        let kept = args.insert_if_absent(Argument::new("a", 2));
        assert!(Arc::ptr_eq(&kept, &first));
    }

    #[test]
    fn test_union_shares_cells() {
        let shared = Argument::new("Counter", 0);
        let parent: Arguments = vec![shared.clone(), Argument::non_inheritable("Local", 1)].into();
        let child = parent.inheritable().union([Argument::new("Extra", true)]);

        assert_eq!(child.names().collect::<Vec<_>>(), vec!["Counter", "Extra"]);
        child.get("Counter").unwrap().set(5);
        assert_eq!(shared.get::<i64>().unwrap(), 5);
    }

    #[test]
    fn test_missing_value_reads_default() {
        let args = Arguments::new();
        assert_eq!(args.value::<Option<String>>("Message").unwrap(), None);
        assert_eq!(args.value::<i32>("Count").unwrap(), 0);
    }
}
