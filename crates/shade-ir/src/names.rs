//! Human-readable names for module entities.
//!
//! A [`NameMap`] is an injective, bidirectional map between entities and
//! names: once a name is taken, a colliding request is retried with a
//! numeric suffix (`x`, `x_1`, `x_2`, …) until a free name is found. The
//! retry loop is bounded so a pathological input cannot spin forever.

use std::collections::HashMap;

use crate::arena::Handle;
use crate::func::{Function, LocalVariable};
use crate::global::GlobalVariable;
use crate::value::Value;

/// Maximum suffix retries before a name request is treated as an
/// invariant violation.
pub const MAX_NAME_RETRIES: u32 = 1024;

/// Identifies a nameable entity within one module.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum NameKey {
    Function(Handle<Function>),
    Global(Handle<GlobalVariable>),
    Local(Handle<Function>, Handle<LocalVariable>),
    Value(Handle<Function>, Handle<Value>),
}

/// The injective Symbol↔Value naming table of a module.
#[derive(Clone, Debug, Default)]
pub struct NameMap {
    assigned: HashMap<NameKey, String>,
    taken: HashMap<String, NameKey>,
}

impl NameMap {
    /// Creates an empty name map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `requested` to `key`, disambiguating collisions with a
    /// numeric suffix. Returns the name actually assigned. Re-binding an
    /// already-named key returns its existing name unchanged.
    ///
    /// # Panics
    ///
    /// Panics if [`MAX_NAME_RETRIES`] suffixes are all taken; that many
    /// live collisions on one stem is a broken invariant, not user input.
    pub fn set_name(&mut self, key: NameKey, requested: &str) -> &str {
        if self.assigned.contains_key(&key) {
            return &self.assigned[&key];
        }
        let mut candidate = requested.to_string();
        let mut retry = 0u32;
        while self.taken.contains_key(&candidate) {
            retry += 1;
            if retry > MAX_NAME_RETRIES {
                panic!("exceeded {MAX_NAME_RETRIES} rename retries for '{requested}'");
            }
            candidate = format!("{requested}_{retry}");
        }
        self.taken.insert(candidate.clone(), key);
        self.assigned.insert(key, candidate);
        &self.assigned[&key]
    }

    /// The name bound to `key`, if any.
    pub fn name_of(&self, key: NameKey) -> Option<&str> {
        self.assigned.get(&key).map(String::as_str)
    }

    /// The key a name is bound to, if any.
    pub fn key_of(&self, name: &str) -> Option<NameKey> {
        self.taken.get(name).copied()
    }

    /// Returns `true` if `name` is already bound.
    pub fn is_taken(&self, name: &str) -> bool {
        self.taken.contains_key(name)
    }

    /// Iterates over `(key, name)` bindings in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (NameKey, &str)> {
        self.assigned.iter().map(|(&k, n)| (k, n.as_str()))
    }

    /// Removes the binding for `key`, freeing its name.
    pub fn remove(&mut self, key: NameKey) -> Option<String> {
        let name = self.assigned.remove(&key)?;
        self.taken.remove(&name);
        Some(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use crate::func::Function;

    fn keys() -> (NameKey, NameKey, NameKey) {
        let mut functions: Arena<Function> = Arena::new();
        let f = functions.append(Function::new("f"));
        let g = functions.append(Function::new("g"));
        let h = functions.append(Function::new("h"));
        (NameKey::Function(f), NameKey::Function(g), NameKey::Function(h))
    }

    #[test]
    fn collision_suffix_sequence() {
        let (a, b, c) = keys();
        let mut names = NameMap::new();
        assert_eq!(names.set_name(a, "x"), "x");
        assert_eq!(names.set_name(b, "x"), "x_1");
        assert_eq!(names.set_name(c, "x"), "x_2");
    }

    #[test]
    fn rebinding_is_stable() {
        let (a, _, _) = keys();
        let mut names = NameMap::new();
        assert_eq!(names.set_name(a, "first"), "first");
        assert_eq!(names.set_name(a, "second"), "first");
    }

    #[test]
    fn bidirectional_lookup() {
        let (a, b, _) = keys();
        let mut names = NameMap::new();
        names.set_name(a, "x");
        names.set_name(b, "x");
        assert_eq!(names.name_of(a), Some("x"));
        assert_eq!(names.name_of(b), Some("x_1"));
        assert_eq!(names.key_of("x"), Some(a));
        assert_eq!(names.key_of("x_1"), Some(b));
        assert_eq!(names.key_of("x_2"), None);
        assert!(names.is_taken("x"));
        assert!(!names.is_taken("y"));
    }

    #[test]
    fn remove_frees_the_name() {
        let (a, b, _) = keys();
        let mut names = NameMap::new();
        names.set_name(a, "x");
        assert_eq!(names.remove(a), Some("x".to_string()));
        assert_eq!(names.set_name(b, "x"), "x");
    }

    #[test]
    fn suffix_skips_taken_names() {
        let (a, b, c) = keys();
        let mut names = NameMap::new();
        names.set_name(a, "x_1");
        names.set_name(b, "x");
        // "x_1" is taken by a literal request, so the collision lands on x_2.
        assert_eq!(names.set_name(c, "x"), "x_2");
    }
}
