//! Syntax tree type definitions.

use std::fmt;
use std::sync::Arc;

/// A syntax node: an atom, a string literal, or an ordered list of nodes.
///
/// Nodes are immutable once produced. Lists share their children through an
/// `Arc` so closures can hold on to method bodies without deep copies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// A bare word: `echo`, `$x`, `point::clone`, `-l`.
    Atom(String),
    /// A quoted string with escapes already processed.
    Str(String),
    /// An ordered list of nodes.
    List(Arc<[Node]>),
}

/// Shell operators that the reader lowers into leading atoms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Pipe,
    And,
    Or,
    Seq,
    Background,
    RedirectIn,
    RedirectOut,
    RedirectAppend,
}

impl Op {
    pub fn as_str(self) -> &'static str {
        match self {
            Op::Pipe => "|",
            Op::And => "&&",
            Op::Or => "||",
            Op::Seq => ";",
            Op::Background => "&",
            Op::RedirectIn => "<",
            Op::RedirectOut => ">",
            Op::RedirectAppend => ">>",
        }
    }

    pub fn from_atom(text: &str) -> Option<Op> {
        Some(match text {
            "|" => Op::Pipe,
            "&&" => Op::And,
            "||" => Op::Or,
            ";" => Op::Seq,
            "&" => Op::Background,
            "<" => Op::RedirectIn,
            ">" => Op::RedirectOut,
            ">>" => Op::RedirectAppend,
            _ => return None,
        })
    }

    /// True for `<`, `>` and `>>`.
    pub fn is_redirect(self) -> bool {
        matches!(self, Op::RedirectIn | Op::RedirectOut | Op::RedirectAppend)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Node {
    pub fn atom(text: impl Into<String>) -> Node {
        Node::Atom(text.into())
    }

    pub fn string(text: impl Into<String>) -> Node {
        Node::Str(text.into())
    }

    pub fn list(items: impl Into<Vec<Node>>) -> Node {
        Node::List(Arc::from(items.into()))
    }

    /// Build an operator form: `(op items...)`.
    pub fn op(op: Op, items: impl IntoIterator<Item = Node>) -> Node {
        let mut all = vec![Node::atom(op.as_str())];
        all.extend(items);
        Node::list(all)
    }

    pub fn as_atom(&self) -> Option<&str> {
        match self {
            Node::Atom(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Node]> {
        match self {
            Node::List(items) => Some(items),
            _ => None,
        }
    }

    /// The leading atom of a list, if any.
    pub fn head_atom(&self) -> Option<&str> {
        self.as_list()?.first()?.as_atom()
    }

    /// The operator this node is a form of, if it is one.
    pub fn operator(&self) -> Option<Op> {
        self.head_atom().and_then(Op::from_atom)
    }

    /// True for a list whose head is the given atom.
    pub fn is_form(&self, keyword: &str) -> bool {
        self.head_atom() == Some(keyword)
    }
}

/// Renders a node back to readable source, mostly for job listings and errors.
impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Atom(text) => f.write_str(text),
            Node::Str(text) => write!(f, "{:?}", text),
            Node::List(items) => {
                if let Some(op) = self.operator() {
                    return fmt_operator(op, &items[1..], f);
                }
                if self.is_form("block") {
                    f.write_str("{ ")?;
                    for (i, item) in items[1..].iter().enumerate() {
                        if i > 0 {
                            f.write_str("; ")?;
                        }
                        write!(f, "{}", item)?;
                    }
                    return f.write_str(" }");
                }
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    match item {
                        Node::List(_) if !item.is_form("block") => write!(f, "({})", item)?,
                        _ => write!(f, "{}", item)?,
                    }
                }
                Ok(())
            }
        }
    }
}

fn fmt_operator(op: Op, rest: &[Node], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match op {
        Op::Background => {
            for item in rest {
                write!(f, "{} ", item)?;
            }
            f.write_str("&")
        }
        Op::RedirectIn | Op::RedirectOut | Op::RedirectAppend => match rest {
            [target, command] => write!(f, "{} {} {}", command, op, target),
            _ => write!(f, "{}", op),
        },
        Op::Seq => {
            for (i, item) in rest.iter().enumerate() {
                if i > 0 {
                    f.write_str("; ")?;
                }
                write!(f, "{}", item)?;
            }
            Ok(())
        }
        Op::Pipe | Op::And | Op::Or => {
            for (i, item) in rest.iter().enumerate() {
                if i > 0 {
                    write!(f, " {} ", op)?;
                }
                write!(f, "{}", item)?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_forms_are_recognized() {
        let node = Node::op(Op::Pipe, [Node::list([Node::atom("ls")]), Node::list([Node::atom("wc")])]);
        assert_eq!(node.operator(), Some(Op::Pipe));
        assert_eq!(node.to_string(), "ls | wc");
    }

    #[test]
    fn redirect_display_puts_target_last() {
        let cmd = Node::list([Node::atom("echo"), Node::atom("hi")]);
        let node = Node::op(Op::RedirectOut, [Node::atom("f"), cmd]);
        assert_eq!(node.to_string(), "echo hi > f");
        assert!(Op::RedirectOut.is_redirect());
        assert!(!Op::Pipe.is_redirect());
    }

    #[test]
    fn plain_lists_are_not_operators() {
        let node = Node::list([Node::atom("define"), Node::atom("x"), Node::atom("1")]);
        assert_eq!(node.operator(), None);
        assert_eq!(node.head_atom(), Some("define"));
    }
}
