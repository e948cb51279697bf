//! Builtin commands for conch.
//!
//! Builtins are the commands the shell implements itself. Every builtin
//! implements the same [`Builtin`] trait and is installed as a value:
//!
//! ```text
//! global environment
//! ├── true false echo cd pwd
//! ├── integer add sub mul div mod eq lt gt not
//! ├── list status read write
//! └── jobs wait fg bg kill
//! root object (public)
//! └── clone
//! pipe members
//! └── read write close reader-close
//! ```

mod builtin;
mod context;
mod traits;

use std::sync::Arc;

use crate::interpreter::{BuiltinRef, Env, Object, Value};

pub use builtin::all as builtins;
pub use context::ExecContext;
pub use traits::Builtin;

/// Bind every global builtin in `globals`.
pub fn register_builtins(globals: &Env) {
    for builtin in builtin::all() {
        let name = builtin.name().to_string();
        globals.bind(&name, Value::Builtin(BuiltinRef::new(builtin)));
    }
}

/// Publish the members every object inherits from the root object.
pub fn register_root_members(root: &Object) {
    root.publish("clone", Value::Builtin(BuiltinRef::new(Arc::new(builtin::clone::Clone))));
}

/// Member `name` of a pipe value.
pub fn pipe_member(name: &str) -> Option<Arc<dyn Builtin>> {
    builtin::pipe::member(name)
}
