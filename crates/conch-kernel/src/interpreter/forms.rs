//! Special forms: lists whose head keyword controls how, and whether, the
//! rest of the list is evaluated.

use std::sync::Arc;

use crate::ast::Node;
use crate::parser::read_all;
use crate::scheduler::Pipe;

use super::error::{EvalError, EvalResult};
use super::eval::{access_for, eval, eval_tail, resolve_path, Tail};
use super::object::Object;
use super::scope::{Env, Frame};
use super::shell::Context;
use super::value::{Closure, Value};

const KEYWORDS: &[&str] = &[
    "define", "public", "set", "if", "object", "method", "pipe", "import", "block", "quote",
];

pub fn is_special(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

/// Evaluate the special form `keyword` applied to `args`.
pub async fn special(keyword: &str, args: &[Node], env: &Env, ctx: &Context) -> EvalResult<Tail> {
    match keyword {
        "block" => block(args, Frame::child(env), ctx).await,
        "if" => conditional(args, env, ctx).await,
        "quote" => match args {
            [datum] => Ok(Tail::Done(Value::from_node(datum))),
            _ => Err(EvalError::arity("quote", "1", args.len())),
        },
        other => {
            let value = match other {
                "define" => define(args, env, ctx).await?,
                "public" => public(args, env, ctx).await?,
                "set" => set(args, env, ctx).await?,
                "object" => object(args, env, ctx).await?,
                "method" => method(args, env)?,
                "pipe" => pipe(args, env, ctx).await?,
                "import" => import(args, env, ctx).await?,
                _ => return Err(EvalError::NotCallable(other.to_string())),
            };
            Ok(Tail::Done(value))
        }
    }
}

/// Statements of a body argument: the contents of a `{...}` block, or the
/// node itself.
fn statements(body: &Node) -> &[Node] {
    match body.as_list() {
        Some(items) if body.is_form("block") => &items[1..],
        _ => std::slice::from_ref(body),
    }
}

fn name_of<'a>(form: &str, node: &'a Node) -> EvalResult<&'a str> {
    match node {
        Node::Atom(word) => Ok(word.strip_prefix('$').unwrap_or(word)),
        Node::Str(text) => Ok(text),
        Node::List(_) => Err(EvalError::type_mismatch(form, "name", "list")),
    }
}

/// Run `body` in `frame`, leaving its last statement in tail position.
async fn block(body: &[Node], frame: Env, ctx: &Context) -> EvalResult<Tail> {
    let Some((last, init)) = body.split_last() else {
        return Ok(Tail::Done(Value::Nil));
    };
    for statement in init {
        let value = eval(statement, &frame, ctx).await?;
        ctx.record(&value);
    }
    eval_tail(last, &frame, ctx).await
}

async fn conditional(args: &[Node], env: &Env, ctx: &Context) -> EvalResult<Tail> {
    let (cond, then, otherwise) = match args {
        [cond, then] => (cond, then, None),
        [cond, then, otherwise] => (cond, then, Some(otherwise)),
        [cond, then, keyword, otherwise] if keyword.as_atom() == Some("else") => {
            (cond, then, Some(otherwise))
        }
        _ => return Err(EvalError::arity("if", "2 or 3", args.len())),
    };
    let branch = if eval(cond, env, ctx).await?.is_truthy() {
        then
    } else {
        match otherwise {
            Some(node) => node,
            None => return Ok(Tail::Done(Value::Nil)),
        }
    };
    eval_tail(branch, env, ctx).await
}

/// `define name value`: a private member inside an object body, a local
/// binding everywhere else.
async fn define(args: &[Node], env: &Env, ctx: &Context) -> EvalResult<Value> {
    let [name, value] = args else {
        return Err(EvalError::arity("define", "2", args.len()));
    };
    let name = name_of("define", name)?;
    let value = eval(value, env, ctx).await?;
    match env.body_owner() {
        Some(object) => object.define(name, value),
        None => env.bind(name, value),
    }
    Ok(Value::Nil)
}

/// `public name value`, or `public name` to publish an existing binding.
async fn public(args: &[Node], env: &Env, ctx: &Context) -> EvalResult<Value> {
    let Some(object) = env.self_object() else {
        return Err(EvalError::type_mismatch("public", "object body", "top level"));
    };
    let (name, value) = match args {
        [name] => {
            let name = name_of("public", name)?;
            let value = env
                .lookup(name)
                .ok_or_else(|| EvalError::UnboundName(name.to_string()))?;
            (name, value)
        }
        [name, value] => (name_of("public", name)?, eval(value, env, ctx).await?),
        _ => return Err(EvalError::arity("public", "1 or 2", args.len())),
    };
    object.publish(name, value);
    Ok(Value::Nil)
}

/// `set target value`: rebind a name or member that already exists.
async fn set(args: &[Node], env: &Env, ctx: &Context) -> EvalResult<Value> {
    let [target, value] = args else {
        return Err(EvalError::arity("set", "2", args.len()));
    };
    let path = name_of("set", target)?;
    let value = eval(value, env, ctx).await?;
    match path.rsplit_once("::") {
        None => {
            if !env.set(path, value) {
                return Err(EvalError::UnboundName(path.to_string()));
            }
        }
        Some((base, member)) => match resolve_path(base, env, ctx)? {
            Value::Object(object) => {
                if !object.assign(member, value, access_for(&object, env)) {
                    return Err(EvalError::UnboundName(path.to_string()));
                }
            }
            other => {
                return Err(EvalError::type_mismatch(
                    format!("set {path}"),
                    "object",
                    other.type_name(),
                ));
            }
        },
    }
    Ok(Value::Nil)
}

/// `object {body}`: a new object prototyped on the root object.
async fn object(args: &[Node], env: &Env, ctx: &Context) -> EvalResult<Value> {
    let object = Object::new(Some(ctx.shell.root.clone()));
    let frame = Frame::object_body(env, &object);
    for body in args {
        for statement in statements(body) {
            eval(statement, &frame, ctx).await?;
        }
    }
    tracing::trace!(object = object.id(), "object constructed");
    Ok(Value::Object(object))
}

/// `method p1 p2 ... {body}`.
fn method(args: &[Node], env: &Env) -> EvalResult<Value> {
    let Some((body, params)) = args.split_last() else {
        return Err(EvalError::arity("method", "at least 1", 0));
    };
    let params = params
        .iter()
        .map(|p| match p {
            Node::Atom(word) if !word.starts_with('$') => Ok(word.clone()),
            other => Err(EvalError::type_mismatch("method", "parameter name", other.to_string())),
        })
        .collect::<EvalResult<Vec<_>>>()?;
    Ok(Value::Closure(Arc::new(Closure {
        params,
        body: statements(body).into(),
        env: env.clone(),
        receiver: None,
    })))
}

/// `pipe`, `pipe CAPACITY` or `pipe os`.
async fn pipe(args: &[Node], env: &Env, ctx: &Context) -> EvalResult<Value> {
    let arg = match args {
        [] => None,
        [arg] => Some(eval(arg, env, ctx).await?),
        _ => return Err(EvalError::arity("pipe", "0 or 1", args.len())),
    };
    let pipe = match arg {
        None => Pipe::queue(ctx.shell.pipe_capacity),
        Some(Value::Atom(mode)) if mode == "os" => Pipe::os()?,
        Some(value) => match value.as_integer() {
            Some(cap) if cap > 0 => Pipe::queue(cap as usize),
            _ => {
                return Err(EvalError::type_mismatch(
                    "pipe",
                    "positive capacity or os",
                    value.to_string(),
                ));
            }
        },
    };
    tracing::trace!(pipe = pipe.id(), os = pipe.is_os(), "pipe created");
    Ok(Value::Pipe(pipe))
}

/// `import PATH`: evaluate a file into a fresh module object. Its public
/// members are what the importer sees.
async fn import(args: &[Node], env: &Env, ctx: &Context) -> EvalResult<Value> {
    let [path] = args else {
        return Err(EvalError::arity("import", "1", args.len()));
    };
    let path = eval(path, env, ctx).await?.to_string();
    let resolved = ctx.shell.resolve(&path);
    let source = tokio::fs::read_to_string(&resolved)
        .await
        .map_err(|e| EvalError::Io(format!("import {path}: {e}")))?;

    let module = Object::new(Some(ctx.shell.root.clone()));
    let frame = Frame::object_body(&ctx.shell.globals, &module);
    for unit in read_all(&source)? {
        eval(&unit, &frame, ctx).await?;
    }
    tracing::debug!(path = %resolved.display(), "imported");
    Ok(Value::Object(module))
}
