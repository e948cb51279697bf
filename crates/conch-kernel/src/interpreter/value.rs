//! Runtime values.
//!
//! Data values (atoms, strings, integers, booleans and lists of them) print
//! in the same syntax the reader accepts, which is how they cross pipes into
//! and out of external processes. The remaining variants are handles to live
//! things and print as opaque markers.

use std::fmt;
use std::sync::Arc;

use crate::ast::Node;
use crate::parser;
use crate::scheduler::{ExitStatus, JobId, Pipe};
use crate::tools::Builtin;

use super::object::Object;
use super::scope::Env;

/// A language value.
#[derive(Clone)]
pub enum Value {
    Nil,
    /// A bare word.
    Atom(String),
    /// A quoted string.
    Str(String),
    Integer(i64),
    Boolean(bool),
    List(Arc<[Value]>),
    /// Exit status of a command or job.
    Status(ExitStatus),
    Object(Object),
    Closure(Arc<Closure>),
    Builtin(BuiltinRef),
    Pipe(Pipe),
    /// Handle to a background job.
    Job(JobId),
}

/// A method: parameters, body, and the environment it was created in.
pub struct Closure {
    pub params: Vec<String>,
    /// Body statements.
    pub body: Arc<[Node]>,
    pub env: Env,
    /// Object the method was fetched from; becomes `$self` when applied.
    pub receiver: Option<Object>,
}

impl Closure {
    /// Copy of this closure bound to `receiver`.
    pub fn bind(&self, receiver: Object) -> Closure {
        Closure {
            params: self.params.clone(),
            body: self.body.clone(),
            env: self.env.clone(),
            receiver: Some(receiver),
        }
    }
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closure")
            .field("params", &self.params)
            .field("statements", &self.body.len())
            .field("bound", &self.receiver.is_some())
            .finish()
    }
}

/// A builtin, possibly bound to the value it was fetched from (`$p::read`).
#[derive(Clone)]
pub struct BuiltinRef {
    pub builtin: Arc<dyn Builtin>,
    pub receiver: Option<Box<Value>>,
}

impl BuiltinRef {
    pub fn new(builtin: Arc<dyn Builtin>) -> Self {
        Self {
            builtin,
            receiver: None,
        }
    }

    pub fn bound(builtin: Arc<dyn Builtin>, receiver: Value) -> Self {
        Self {
            builtin,
            receiver: Some(Box::new(receiver)),
        }
    }

    pub fn name(&self) -> &str {
        self.builtin.name()
    }
}

impl Value {
    pub fn atom(text: impl Into<String>) -> Value {
        Value::Atom(text.into())
    }

    pub fn string(text: impl Into<String>) -> Value {
        Value::Str(text.into())
    }

    pub fn list(items: impl Into<Vec<Value>>) -> Value {
        Value::List(Arc::from(items.into()))
    }

    /// Syntax as data, as produced by `quote`.
    pub fn from_node(node: &Node) -> Value {
        match node {
            Node::Atom(text) => Value::Atom(text.clone()),
            Node::Str(text) => Value::Str(text.clone()),
            Node::List(items) => Value::list(items.iter().map(Value::from_node).collect::<Vec<_>>()),
        }
    }

    /// Decode one line received from a pipe or file.
    ///
    /// A line holding exactly one datum yields that datum; zero or several
    /// yield a list of them. Text that does not parse arrives as a string.
    pub fn from_line(line: &str) -> Value {
        let line = line.strip_suffix('\r').unwrap_or(line);
        match parser::read_data(line) {
            Ok(mut data) if data.len() == 1 => Value::from_node(&data.remove(0)),
            Ok(data) => Value::list(data.iter().map(Value::from_node).collect::<Vec<_>>()),
            Err(_) => Value::Str(line.to_string()),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Atom(_) => "atom",
            Value::Str(_) => "string",
            Value::Integer(_) => "integer",
            Value::Boolean(_) => "boolean",
            Value::List(_) => "list",
            Value::Status(_) => "status",
            Value::Object(_) => "object",
            Value::Closure(_) => "method",
            Value::Builtin(_) => "builtin",
            Value::Pipe(_) => "pipe",
            Value::Job(_) => "job",
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Closure(_) | Value::Builtin(_))
    }

    /// `false`, a failed status and nil are false; everything else is true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Boolean(b) => *b,
            Value::Status(s) => s.success(),
            _ => true,
        }
    }

    /// The status this value records in the last-status register.
    pub fn status(&self) -> ExitStatus {
        match self {
            Value::Status(s) => *s,
            Value::Boolean(b) => ExitStatus::from_bool(*b),
            _ => ExitStatus::SUCCESS,
        }
    }

    /// Text of an atom or string.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Atom(s) | Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer value, accepting words that spell one.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Atom(s) | Value::Str(s) => s.trim().parse().ok(),
            Value::Status(s) => Some(s.code() as i64),
            _ => None,
        }
    }

    /// Printable syntax. Data values read back to an equal value.
    pub fn to_syntax(&self) -> String {
        let mut out = String::new();
        self.write_syntax(&mut out);
        out
    }

    fn write_syntax(&self, out: &mut String) {
        match self {
            Value::Atom(text) => write_atom(text, out),
            Value::Str(text) => write_string(text, out),
            Value::List(items) => {
                out.push('(');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(' ');
                    }
                    item.write_syntax(out);
                }
                out.push(')');
            }
            other => out.push_str(&other.to_string()),
        }
    }
}

const SPECIAL: &[char] = &['|', '&', ';', '<', '>', '(', ')', '{', '}', ':', '\'', '"', '#', '\\'];

/// Atoms print as words. Line breaks must not reach the output raw, since
/// a value travels as exactly one line.
fn write_atom(text: &str, out: &mut String) {
    if text.is_empty() {
        out.push_str("\\_");
        return;
    }
    for c in text.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            c if c.is_whitespace() || SPECIAL.contains(&c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
}

fn write_string(text: &str, out: &mut String) {
    out.push('"');
    for c in text.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            c => out.push(c),
        }
    }
    out.push('"');
}

/// Display form: what `echo` prints and what external commands receive.
/// Atoms and strings are raw text; lists print in value syntax.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => Ok(()),
            Value::Atom(s) | Value::Str(s) => f.write_str(s),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::List(_) => f.write_str(&self.to_syntax()),
            Value::Status(s) => write!(f, "{}", s.code()),
            Value::Object(_) => f.write_str("<object>"),
            Value::Closure(_) => f.write_str("<method>"),
            Value::Builtin(b) => write!(f, "<builtin {}>", b.name()),
            Value::Pipe(p) => write!(f, "<pipe {}>", p.id()),
            Value::Job(id) => write!(f, "[{}]", id),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("Nil"),
            Value::Atom(s) => f.debug_tuple("Atom").field(s).finish(),
            Value::Str(s) => f.debug_tuple("Str").field(s).finish(),
            Value::Integer(i) => f.debug_tuple("Integer").field(i).finish(),
            Value::Boolean(b) => f.debug_tuple("Boolean").field(b).finish(),
            Value::List(items) => f.debug_tuple("List").field(items).finish(),
            Value::Status(s) => f.debug_tuple("Status").field(s).finish(),
            Value::Object(o) => write!(f, "Object(#{})", o.id()),
            Value::Closure(c) => c.fmt(f),
            Value::Builtin(b) => write!(f, "Builtin({})", b.name()),
            Value::Pipe(p) => p.fmt(f),
            Value::Job(id) => write!(f, "Job({})", id),
        }
    }
}

/// Data compares by value; objects, methods and pipes by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Atom(a), Value::Atom(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Status(a), Value::Status(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Closure(a), Value::Closure(b)) => Arc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => {
                Arc::ptr_eq(&a.builtin, &b.builtin) && a.receiver == b.receiver
            }
            (Value::Pipe(a), Value::Pipe(b)) => a.ptr_eq(b),
            (Value::Job(a), Value::Job(b)) => a == b,
            _ => false,
        }
    }
}

impl From<ExitStatus> for Value {
    fn from(status: ExitStatus) -> Self {
        Value::Status(status)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}
