use std::sync::atomic::{AtomicBool, Ordering};

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{RenderError, ScopeError};
use crate::value::Value;

/// One of the four attribute lifetimes, searched in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Page,
    Request,
    Session,
    Application,
}

impl Scope {
    pub const SEARCH_ORDER: [Scope; 4] = [
        Scope::Page,
        Scope::Request,
        Scope::Session,
        Scope::Application,
    ];

    /// Maps the numeric scope identifiers `1..=4`.
    pub fn from_id(id: i32) -> Result<Self, RenderError> {
        match id {
            1 => Ok(Scope::Page),
            2 => Ok(Scope::Request),
            3 => Ok(Scope::Session),
            4 => Ok(Scope::Application),
            other => Err(RenderError::argument(format!("unknown scope identifier {other}"))),
        }
    }

    pub fn id(self) -> i32 {
        match self {
            Scope::Page => 1,
            Scope::Request => 2,
            Scope::Session => 3,
            Scope::Application => 4,
        }
    }

    pub fn parse(name: &str) -> Result<Self, RenderError> {
        match name {
            "page" => Ok(Scope::Page),
            "request" => Ok(Scope::Request),
            "session" => Ok(Scope::Session),
            "application" => Ok(Scope::Application),
            other => Err(RenderError::argument(format!("unknown scope `{other}`"))),
        }
    }
}

/// Shared name/value table behind the request, session and application scopes.
pub trait AttributeStore: Send + Sync {
    fn get(&self, name: &str) -> Result<Option<Value>, ScopeError>;
    fn set(&self, name: &str, value: Value) -> Result<(), ScopeError>;
    fn remove(&self, name: &str) -> Result<(), ScopeError>;
    fn names(&self) -> Result<Vec<String>, ScopeError>;

    /// Returns the bound value, inserting one built by `create` when absent.
    /// The flag reports whether this call inserted the value.
    fn get_or_insert(
        &self,
        name: &str,
        create: &mut dyn FnMut() -> Result<Value, RenderError>,
    ) -> Result<(Value, bool), RenderError>;
}

#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<IndexMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl AttributeStore for MemoryStore {
    fn get(&self, name: &str) -> Result<Option<Value>, ScopeError> {
        Ok(self.entries.read().get(name).cloned())
    }

    fn set(&self, name: &str, value: Value) -> Result<(), ScopeError> {
        let mut entries = self.entries.write();
        if value.is_null() {
            entries.shift_remove(name);
        } else {
            entries.insert(name.to_string(), value);
        }
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), ScopeError> {
        self.entries.write().shift_remove(name);
        Ok(())
    }

    fn names(&self) -> Result<Vec<String>, ScopeError> {
        Ok(self.entries.read().keys().cloned().collect())
    }

    fn get_or_insert(
        &self,
        name: &str,
        create: &mut dyn FnMut() -> Result<Value, RenderError>,
    ) -> Result<(Value, bool), RenderError> {
        if let Some(existing) = self.entries.read().get(name) {
            return Ok((existing.clone(), false));
        }
        // No lock is held while `create` runs; it may use this store.
        let value = create()?;
        match self.entries.write().entry(name.to_string()) {
            indexmap::map::Entry::Occupied(entry) => Ok((entry.get().clone(), false)),
            indexmap::map::Entry::Vacant(entry) => Ok((entry.insert(value).clone(), true)),
        }
    }
}

/// Session scope. Once invalidated every access fails with
/// [`ScopeError::Invalidated`].
pub struct Session {
    id: String,
    store: MemoryStore,
    valid: AtomicBool,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            store: MemoryStore::new(),
            valid: AtomicBool::new(true),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    fn check(&self) -> Result<(), ScopeError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(ScopeError::Invalidated)
        }
    }
}

impl AttributeStore for Session {
    fn get(&self, name: &str) -> Result<Option<Value>, ScopeError> {
        self.check()?;
        self.store.get(name)
    }

    fn set(&self, name: &str, value: Value) -> Result<(), ScopeError> {
        self.check()?;
        self.store.set(name, value)
    }

    fn remove(&self, name: &str) -> Result<(), ScopeError> {
        self.check()?;
        self.store.remove(name)
    }

    fn names(&self) -> Result<Vec<String>, ScopeError> {
        self.check()?;
        self.store.names()
    }

    fn get_or_insert(
        &self,
        name: &str,
        create: &mut dyn FnMut() -> Result<Value, RenderError>,
    ) -> Result<(Value, bool), RenderError> {
        self.check()?;
        self.store.get_or_insert(name, create)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_set_removes_entry() {
        let store = MemoryStore::new();
        store.set("a", Value::Int(1)).unwrap();
        store.set("a", Value::Null).unwrap();
        assert_eq!(store.get("a").unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn factories_may_use_the_store_they_fill() {
        let store = MemoryStore::new();
        store.set("seed", Value::Int(40)).unwrap();
        let mut create = || -> Result<Value, RenderError> {
            let Some(Value::Int(seed)) = store.get("seed")? else {
                return Err(RenderError::state("no seed"));
            };
            store.set("created", Value::Bool(true))?;
            Ok(Value::Int(seed + 2))
        };
        let (value, inserted) = store.get_or_insert("answer", &mut create).unwrap();
        assert_eq!(value, Value::Int(42));
        assert!(inserted);
        assert_eq!(store.get("created").unwrap(), Some(Value::Bool(true)));

        let (again, inserted) = store
            .get_or_insert("answer", &mut || -> Result<Value, RenderError> {
                Ok(Value::Int(0))
            })
            .unwrap();
        assert_eq!(again, Value::Int(42));
        assert!(!inserted);
    }

    #[test]
    fn a_value_bound_while_creating_wins() {
        let store = MemoryStore::new();
        let mut create = || -> Result<Value, RenderError> {
            store.set("slot", Value::from("first"))?;
            Ok(Value::from("second"))
        };
        let (value, inserted) = store.get_or_insert("slot", &mut create).unwrap();
        assert_eq!(value, Value::from("first"));
        assert!(!inserted);
    }

    #[test]
    fn invalidated_session_rejects_access() {
        let session = Session::new("s1");
        session.set("user", Value::from("ada")).unwrap();
        session.invalidate();
        assert_eq!(session.get("user"), Err(ScopeError::Invalidated));
    }

    #[test]
    fn unknown_scope_id_is_argument_error() {
        assert!(matches!(Scope::from_id(9), Err(RenderError::Argument(_))));
        assert_eq!(Scope::from_id(Scope::Session.id()).unwrap(), Scope::Session);
    }
}
