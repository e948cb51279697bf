//! Lexical environments.
//!
//! An [`Env`] is a reference-counted frame with a link to its parent. Frames
//! live as long as the longest-lived closure or child frame holding them.
//!
//! Two kinds of frame carry an object:
//!
//! - an object's construction body, which holds a weak link to the object
//!   being built, so the object's methods (which capture this frame) do not
//!   keep their own object alive;
//! - a method call frame, which holds the receiver the method was applied to.
//!
//! The nearest of these is the object `$self` refers to, and the place name
//! lookup falls through to once the frame chain is exhausted.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};

use super::object::{Access, Object, ObjectInner};
use super::value::Value;

/// Shared handle to a frame.
pub type Env = Arc<Frame>;

/// One scope level.
pub struct Frame {
    vars: RwLock<HashMap<String, Value>>,
    parent: Option<Env>,
    /// Object under construction when this is an `object` body frame.
    owner: Option<Weak<ObjectInner>>,
    /// Receiver of the method call this frame belongs to.
    receiver: Option<Object>,
}

impl Frame {
    fn with(parent: Option<&Env>, owner: Option<&Object>, receiver: Option<Object>) -> Env {
        Arc::new(Frame {
            vars: RwLock::new(HashMap::new()),
            parent: parent.cloned(),
            owner: owner.map(Object::downgrade),
            receiver,
        })
    }

    /// The outermost frame.
    pub fn global() -> Env {
        Self::with(None, None, None)
    }

    /// A plain nested scope.
    pub fn child(parent: &Env) -> Env {
        Self::with(Some(parent), None, None)
    }

    /// The frame an `object` body (or an imported module) runs in.
    pub fn object_body(parent: &Env, object: &Object) -> Env {
        Self::with(Some(parent), Some(object), None)
    }

    /// The frame a method body runs in.
    pub fn call(parent: &Env, receiver: Option<Object>) -> Env {
        Self::with(Some(parent), None, receiver)
    }

    pub fn parent(&self) -> Option<&Env> {
        self.parent.as_ref()
    }

    /// The object whose body this frame directly evaluates, if any.
    pub fn body_owner(&self) -> Option<Object> {
        self.owner.as_ref().and_then(Object::upgrade)
    }

    /// Bind `name` in this frame.
    pub fn bind(&self, name: &str, value: Value) {
        self.vars
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), value);
    }

    fn get(&self, name: &str) -> Option<Value> {
        self.vars
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    fn frames(&self) -> impl Iterator<Item = &Frame> {
        std::iter::successors(Some(self), |f| f.parent.as_deref())
    }

    /// The object `$self` refers to: the nearest receiver or object body.
    pub fn self_object(&self) -> Option<Object> {
        self.frames().find_map(|frame| {
            frame
                .receiver
                .clone()
                .or_else(|| frame.owner.as_ref().and_then(Object::upgrade))
        })
    }

    /// Look a name up through the frame chain only.
    pub fn lookup_var(&self, name: &str) -> Option<Value> {
        self.frames().find_map(|frame| frame.get(name))
    }

    /// Look a name up through the frame chain, then through the members of
    /// the nearest enclosing object.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        if name == "self" {
            return self.self_object().map(Value::Object);
        }
        self.lookup_var(name)
            .or_else(|| self.self_object()?.member(name, Access::Private))
    }

    /// Rebind an existing name where it is found. Returns false if the name
    /// is not bound anywhere in reach.
    pub fn set(&self, name: &str, value: Value) -> bool {
        for frame in self.frames() {
            let mut vars = frame.vars.write().unwrap_or_else(|e| e.into_inner());
            if let Some(slot) = vars.get_mut(name) {
                *slot = value;
                return true;
            }
        }
        match self.self_object() {
            Some(object) => object.assign(name, value, Access::Private),
            None => false,
        }
    }

    /// Names bound in this frame, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .vars
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Drop every binding in this frame.
    pub(crate) fn clear(&self) {
        self.vars.write().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("names", &self.names())
            .field("object_body", &self.owner.is_some())
            .field("method_call", &self.receiver.is_some())
            .finish()
    }
}
