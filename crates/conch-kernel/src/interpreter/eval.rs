//! The evaluator.
//!
//! `eval` walks one syntax node. Lists are dispatched on their head:
//!
//! - an operator (`|`, `&&`, `||`, `;`, `&`, redirections) goes to the
//!   operator handlers or the pipeline builder;
//! - a special-form keyword goes to its handler in `forms`;
//! - a head naming a bound callable value is applied;
//! - any other head is an external command.
//!
//! Application is a trampoline: [`eval_tail`] returns [`Tail::Call`] for a
//! call in tail position instead of making it, and [`apply`] loops on it, so
//! self-recursive methods run in constant stack.

use std::future::Future;
use std::pin::Pin;

use crate::ast::{Node, Op};
use crate::scheduler::{self, cancelled, Source};

use super::error::{EvalError, EvalResult};
use super::forms;
use super::object::{Access, Object};
use super::scope::{Env, Frame};
use super::shell::Context;
use super::value::{BuiltinRef, Value};
use crate::tools::ExecContext;

/// Boxed evaluation future; evaluation is recursive.
pub type EvalFuture<'a, T> = Pin<Box<dyn Future<Output = EvalResult<T>> + Send + 'a>>;

/// Outcome of evaluating a node in tail position.
#[derive(Debug)]
pub enum Tail {
    Done(Value),
    /// A call still to be made by the enclosing `apply` loop.
    Call(Value, Vec<Value>),
}

/// Evaluate `node` to a value.
pub fn eval<'a>(node: &'a Node, env: &'a Env, ctx: &'a Context) -> EvalFuture<'a, Value> {
    Box::pin(async move {
        match eval_tail(node, env, ctx).await? {
            Tail::Done(value) => Ok(value),
            Tail::Call(callee, args) => apply(callee, args, ctx).await,
        }
    })
}

/// Evaluate `node`, leaving a call in tail position unmade.
pub fn eval_tail<'a>(node: &'a Node, env: &'a Env, ctx: &'a Context) -> EvalFuture<'a, Tail> {
    Box::pin(async move {
        let items = match node {
            Node::Atom(_) | Node::Str(_) => return Ok(Tail::Done(eval_word(node, env, ctx)?)),
            Node::List(items) => items,
        };
        let Some(head) = items.first() else {
            return Ok(Tail::Done(Value::Nil));
        };
        let args = &items[1..];

        if let Some(op) = node.operator() {
            return eval_operator(op, node, args, env, ctx).await.map(Tail::Done);
        }
        // `(expr)` on a line of its own: the value of the expression.
        if args.is_empty() && matches!(head, Node::List(_)) {
            return eval_tail(head, env, ctx).await;
        }
        if let Some(keyword) = head.as_atom().filter(|w| forms::is_special(w)) {
            return forms::special(keyword, args, env, ctx).await;
        }

        let callee = match resolve_head(head, env, ctx).await? {
            Some(callee) => callee,
            None => return scheduler::run_pipeline(node, env, ctx).await.map(Tail::Done),
        };
        if !callee.is_callable() {
            return Err(EvalError::NotCallable(head.to_string()));
        }
        let args = eval_args(args, env, ctx).await?;
        Ok(Tail::Call(callee, args))
    })
}

/// Apply a callable to already-evaluated arguments.
pub async fn apply(mut callee: Value, mut args: Vec<Value>, ctx: &Context) -> EvalResult<Value> {
    loop {
        let next = match &callee {
            Value::Closure(closure) => {
                if closure.params.len() != args.len() {
                    return Err(EvalError::arity(
                        "method",
                        closure.params.len().to_string(),
                        args.len(),
                    ));
                }
                let frame = Frame::call(&closure.env, closure.receiver.clone());
                for (param, arg) in closure.params.iter().zip(args.drain(..)) {
                    frame.bind(param, arg);
                }
                let Some((last, init)) = closure.body.split_last() else {
                    return Ok(Value::Nil);
                };
                for statement in init {
                    eval(statement, &frame, ctx).await?;
                }
                eval_tail(last, &frame, ctx).await?
            }
            Value::Builtin(builtin) => return call_builtin(builtin, args, ctx).await,
            other => return Err(EvalError::NotCallable(other.to_string())),
        };
        match next {
            Tail::Done(value) => return Ok(value),
            Tail::Call(f, a) => {
                callee = f;
                args = a;
            }
        }
    }
}

async fn call_builtin(builtin: &BuiltinRef, args: Vec<Value>, ctx: &Context) -> EvalResult<Value> {
    let exec = ExecContext::new(ctx, builtin.receiver.as_deref());
    builtin.builtin.call(args, &exec).await
}

/// What a command head denotes: a value to apply, or `None` for an
/// external command.
async fn resolve_head(head: &Node, env: &Env, ctx: &Context) -> EvalResult<Option<Value>> {
    match head {
        Node::Str(_) => Ok(None),
        Node::List(_) => eval(head, env, ctx).await.map(Some),
        Node::Atom(word) => {
            if let Some(path) = word.strip_prefix('$') {
                return resolve_path(path, env, ctx).map(Some);
            }
            if word.contains("::") {
                return resolve_path(word, env, ctx).map(Some);
            }
            Ok(env.lookup(word))
        }
    }
}

/// True if `command` would run as an external process.
pub(crate) fn is_external(command: &Node, env: &Env) -> bool {
    let Some(items) = command.as_list() else {
        return false;
    };
    match items.first() {
        Some(Node::Str(_)) => true,
        Some(Node::Atom(word)) => {
            !word.starts_with('$')
                && !word.contains("::")
                && !forms::is_special(word)
                && Op::from_atom(word).is_none()
                && env.lookup(word).is_none()
        }
        _ => false,
    }
}

/// Evaluate a word in argument position.
pub fn eval_word(node: &Node, env: &Env, ctx: &Context) -> EvalResult<Value> {
    match node {
        Node::Str(text) => Ok(Value::Str(text.clone())),
        Node::Atom(word) => match word.strip_prefix('$') {
            Some(path) if !path.is_empty() => resolve_path(path, env, ctx),
            _ => Ok(Value::Atom(word.clone())),
        },
        Node::List(_) => Err(EvalError::type_mismatch("word", "atom or string", "list")),
    }
}

/// Resolve `name`, `name::member::...`, or `?`.
pub(crate) fn resolve_path(path: &str, env: &Env, ctx: &Context) -> EvalResult<Value> {
    if path == "?" {
        return Ok(Value::Integer(ctx.supervisor().last_status().code() as i64));
    }
    let mut parts = path.split("::");
    let first = parts.next().unwrap_or_default();
    let mut value = env
        .lookup(first)
        .ok_or_else(|| EvalError::UnboundName(first.to_string()))?;
    let mut seen = first.to_string();
    for member in parts {
        value = member_of(&value, member, env).map_err(|e| match e {
            EvalError::UnboundName(_) => EvalError::UnboundName(format!("{seen}::{member}")),
            other => other,
        })?;
        seen.push_str("::");
        seen.push_str(member);
    }
    Ok(value)
}

/// Member access on an object or pipe.
pub(crate) fn member_of(target: &Value, name: &str, env: &Env) -> EvalResult<Value> {
    match target {
        Value::Object(object) => object
            .member(name, access_for(object, env))
            .ok_or_else(|| EvalError::UnboundName(name.to_string())),
        Value::Pipe(_) => crate::tools::pipe_member(name)
            .map(|builtin| Value::Builtin(BuiltinRef::bound(builtin, target.clone())))
            .ok_or_else(|| EvalError::UnboundName(name.to_string())),
        other => Err(EvalError::type_mismatch(
            format!("::{name}"),
            "object",
            other.type_name(),
        )),
    }
}

/// Private members are reachable only from code running inside `object`.
pub(crate) fn access_for(object: &Object, env: &Env) -> Access {
    match env.self_object() {
        Some(me) if me.ptr_eq(object) => Access::Private,
        _ => Access::Public,
    }
}

/// Evaluate command arguments left to right.
pub async fn eval_args(nodes: &[Node], env: &Env, ctx: &Context) -> EvalResult<Vec<Value>> {
    let mut values = Vec::with_capacity(nodes.len());
    for node in nodes {
        values.push(match node {
            Node::List(_) => eval(node, env, ctx).await?,
            word => eval_word(word, env, ctx)?,
        });
    }
    Ok(values)
}

async fn eval_operator(
    op: Op,
    node: &Node,
    args: &[Node],
    env: &Env,
    ctx: &Context,
) -> EvalResult<Value> {
    match op {
        Op::Pipe | Op::RedirectIn | Op::RedirectOut | Op::RedirectAppend => {
            scheduler::run_pipeline(node, env, ctx).await
        }
        Op::Seq => {
            let mut last = Value::Nil;
            for step in args {
                last = eval(step, env, ctx).await?;
                ctx.record(&last);
            }
            Ok(last)
        }
        Op::And | Op::Or => {
            let mut last = Value::Nil;
            for (i, step) in args.iter().enumerate() {
                if i > 0 {
                    let ok = last.status().success();
                    if (op == Op::And) != ok {
                        break;
                    }
                }
                last = eval(step, env, ctx).await?;
                ctx.record(&last);
            }
            Ok(last)
        }
        Op::Background => {
            let body = match args {
                [body] => body.clone(),
                _ => Node::op(Op::Seq, args.iter().cloned()),
            };
            background(body, node.to_string(), env, ctx)
        }
    }
}

/// Start `body` as a background job and return its handle at once.
fn background(body: Node, command: String, env: &Env, ctx: &Context) -> EvalResult<Value> {
    let supervisor = ctx.supervisor().clone();
    let id = supervisor.create_body_job(command);
    let mut job_ctx = ctx.in_job(id);
    if !supervisor.job_control() {
        // Without process groups a background job would compete for input.
        job_ctx.io.stdin = Source::Null;
    }
    let env = env.clone();
    let mut cancel = supervisor.cancellation(id);

    tokio::spawn(async move {
        let run = eval(&body, &env, &job_ctx);
        let result = match cancel.as_mut() {
            Some(cancel) => tokio::select! {
                result = run => result,
                signal = cancelled(cancel) => Ok(Value::Status(scheduler::ExitStatus::from_signal(signal))),
            },
            None => run.await,
        };
        match result {
            Ok(value) => supervisor.finish_body(id, value.status(), None),
            Err(e) => supervisor.finish_body(id, e.status(), Some(e.to_string())),
        }
    });
    Ok(Value::Job(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::Shell;
    use crate::parser::read_all;
    use crate::scheduler::{Io, Sink, Supervisor};
    use std::sync::Arc;

    fn context() -> (Context, Arc<std::sync::Mutex<Vec<u8>>>) {
        let shell = Shell::new(Supervisor::new(None), std::env::temp_dir(), 16);
        let (out, buf) = Sink::capture();
        let io = Io::inherit().with_stdin(Source::Null).with_stdout(out);
        (Context::new(shell, io), buf)
    }

    async fn run(ctx: &Context, src: &str) -> EvalResult<Value> {
        let mut last = Value::Nil;
        for unit in read_all(src).unwrap() {
            last = eval(&unit, &ctx.shell.globals, ctx).await?;
            ctx.record(&last);
        }
        Ok(last)
    }

    #[tokio::test]
    async fn words_evaluate_to_atoms_and_strings() {
        let (ctx, _) = context();
        assert_eq!(run(&ctx, "list a \"b c\"").await.unwrap(), Value::list(vec![
            Value::atom("a"),
            Value::string("b c"),
        ]));
    }

    #[tokio::test]
    async fn unbound_variable_is_an_error() {
        let (ctx, _) = context();
        let err = run(&ctx, "list $nope").await.unwrap_err();
        assert!(matches!(err, EvalError::UnboundName(ref n) if n == "nope"), "{err:?}");
    }

    #[tokio::test]
    async fn bound_non_callable_head_is_not_callable() {
        let (ctx, _) = context();
        let err = run(&ctx, "define x: integer 1\nx").await.unwrap_err();
        assert!(matches!(err, EvalError::NotCallable(_)), "{err:?}");
    }

    #[tokio::test]
    async fn closures_capture_their_environment() {
        let (ctx, _) = context();
        let v = run(
            &ctx,
            "define make: method n { method { add $n 1 } }\n\
             define inc: make 41\n\
             inc",
        )
        .await
        .unwrap();
        assert_eq!(v, Value::Integer(42));
    }

    #[tokio::test]
    async fn wrong_arity() {
        let (ctx, _) = context();
        let err = run(&ctx, "define f: method a b { list $a $b }\nf 1").await.unwrap_err();
        assert!(matches!(err, EvalError::WrongArity { got: 1, .. }), "{err:?}");
    }

    #[tokio::test]
    async fn tail_calls_run_in_constant_stack() {
        let (ctx, _) = context();
        let v = run(
            &ctx,
            "define count: method n acc {\n\
                if (eq $n 0) $acc {\n\
                    count (sub $n 1) (add $acc 1)\n\
                }\n\
             }\n\
             count 100000 0",
        )
        .await
        .unwrap();
        assert_eq!(v, Value::Integer(100000));
    }

    #[tokio::test]
    async fn short_circuit_and_or() {
        let (ctx, out) = context();
        run(&ctx, "false && echo no").await.unwrap();
        assert_eq!(ctx.supervisor().last_status().code(), 1);
        run(&ctx, "false || echo yes").await.unwrap();
        run(&ctx, "true || echo no").await.unwrap();
        assert_eq!(String::from_utf8(out.lock().unwrap().clone()).unwrap(), "yes\n");
    }

    #[tokio::test]
    async fn last_status_is_visible() {
        let (ctx, _) = context();
        let v = run(&ctx, "false\nlist $?").await.unwrap();
        assert_eq!(v, Value::list(vec![Value::Integer(1)]));
    }
}
