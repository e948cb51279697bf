//! Prototype objects.
//!
//! An object has a private and a public member table and an optional
//! prototype. Lookup walks the prototype chain one object at a time:
//!
//! ```text
//!   clone ──prototype──▶ point ──prototype──▶ root
//!   {private, public}    {private, public}    {public: clone}
//! ```
//!
//! Code running inside an object (its methods and its construction body)
//! looks members up with [`Access::Private`]; everybody else gets
//! [`Access::Public`]. Assignment never writes into a prototype: it finds
//! which kind of table holds the member along the chain, then writes that
//! kind of table on the receiver itself, so a clone shadows its prototype.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use super::value::{BuiltinRef, Value};

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Which member tables a lookup may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Private and public members.
    Private,
    /// Public members only.
    Public,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Table {
    Private,
    Public,
}

pub(crate) struct ObjectInner {
    id: u64,
    private: RwLock<HashMap<String, Value>>,
    public: RwLock<HashMap<String, Value>>,
    prototype: Option<Object>,
}

/// Shared handle to an object.
#[derive(Clone)]
pub struct Object(Arc<ObjectInner>);

impl Object {
    pub fn new(prototype: Option<Object>) -> Self {
        Object(Arc::new(ObjectInner {
            id: NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed),
            private: RwLock::new(HashMap::new()),
            public: RwLock::new(HashMap::new()),
            prototype,
        }))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn prototype(&self) -> Option<&Object> {
        self.0.prototype.as_ref()
    }

    pub fn ptr_eq(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn downgrade(&self) -> Weak<ObjectInner> {
        Arc::downgrade(&self.0)
    }

    pub(crate) fn upgrade(weak: &Weak<ObjectInner>) -> Option<Object> {
        weak.upgrade().map(Object)
    }

    fn table(&self, table: Table) -> &RwLock<HashMap<String, Value>> {
        match table {
            Table::Private => &self.0.private,
            Table::Public => &self.0.public,
        }
    }

    fn get(&self, table: Table, name: &str) -> Option<Value> {
        self.table(table)
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    fn contains(&self, table: Table, name: &str) -> bool {
        self.table(table)
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(name)
    }

    fn insert(&self, table: Table, name: &str, value: Value) {
        self.table(table)
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), value);
    }

    /// Resolve `name` along the prototype chain.
    pub fn lookup(&self, name: &str, access: Access) -> Option<Value> {
        let mut current = Some(self);
        while let Some(object) = current {
            if access == Access::Private {
                if let Some(value) = object.get(Table::Private, name) {
                    return Some(value);
                }
            }
            if let Some(value) = object.get(Table::Public, name) {
                return Some(value);
            }
            current = object.prototype();
        }
        None
    }

    /// Look up a member for use as a value. Methods and builtins come back
    /// bound to this object, so `$self` inside them is this object even when
    /// they were defined on a prototype.
    pub fn member(&self, name: &str, access: Access) -> Option<Value> {
        Some(match self.lookup(name, access)? {
            Value::Closure(c) if c.receiver.is_none() => {
                Value::Closure(Arc::new(c.bind(self.clone())))
            }
            Value::Builtin(b) if b.receiver.is_none() => {
                Value::Builtin(BuiltinRef::bound(b.builtin, Value::Object(self.clone())))
            }
            other => other,
        })
    }

    /// Which table kind holds `name` nearest along the chain.
    fn holder(&self, name: &str, access: Access) -> Option<Table> {
        let mut current = Some(self);
        while let Some(object) = current {
            if access == Access::Private && object.contains(Table::Private, name) {
                return Some(Table::Private);
            }
            if object.contains(Table::Public, name) {
                return Some(Table::Public);
            }
            current = object.prototype();
        }
        None
    }

    /// Update an existing member. The write lands on this object, shadowing
    /// any prototype that defined it. Returns false if no such member is
    /// visible.
    pub fn assign(&self, name: &str, value: Value, access: Access) -> bool {
        match self.holder(name, access) {
            Some(table) => {
                self.insert(table, name, value);
                true
            }
            None => false,
        }
    }

    /// Add or replace a private member.
    pub fn define(&self, name: &str, value: Value) {
        self.insert(Table::Private, name, value);
    }

    /// Add or replace a public member.
    pub fn publish(&self, name: &str, value: Value) {
        self.insert(Table::Public, name, value);
    }

    /// A new, empty object delegating to this one.
    pub fn clone_object(&self) -> Object {
        Object::new(Some(self.clone()))
    }

    /// Public member names of this object itself, sorted.
    pub fn public_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .0
            .public
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Drop every member. Used at shutdown to break reference cycles through
    /// methods that captured the object's environment.
    pub(crate) fn clear(&self) {
        self.0.private.write().unwrap_or_else(|e| e.into_inner()).clear();
        self.0.public.write().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl std::fmt::Debug for Object {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Object")
            .field("id", &self.0.id)
            .field("prototype", &self.prototype().map(Object::id))
            .finish()
    }
}
