//! Pipeline graph builder.
//!
//! Turns a command form into tasks of one job:
//!
//! ```text
//!  (> out (| (< in a) b c))
//!
//!   in ──▶ a ──pipe──▶ b ──pipe──▶ c ──▶ out
//! ```
//!
//! Each stage is either an external command, spawned as a process, or a
//! language form, run in-process as an internal task. Stages are connected
//! by builder-owned pipes: an in-process queue when both neighbours are
//! internal, an OS pipe otherwise. Redirections replace a stage's endpoint;
//! the last one given for a direction wins.

use std::ops::Range;

use crate::ast::{Node, Op};
use crate::interpreter::{eval, eval_args, is_external, Context, Env, EvalError, EvalResult, Value};

use super::io::{Io, Sink, Source};
use super::job::{ExitStatus, JobId};
use super::pipe::Pipe;
use super::supervisor::Spawned;

/// One redirection, target not yet evaluated.
#[derive(Debug, Clone, Copy)]
struct Redirect<'a> {
    op: Op,
    target: &'a Node,
}

/// One `|` stage with its own redirections.
#[derive(Debug)]
struct StageSpec<'a> {
    command: &'a Node,
    redirects: Vec<Redirect<'a>>,
}

/// A redirection with its target evaluated.
enum Endpoint {
    Path { op: Op, path: String },
    Pipe { op: Op, pipe: Pipe },
}

enum Work {
    External(Vec<String>),
    Internal(Node),
}

struct Stage {
    name: String,
    work: Work,
    endpoints: Vec<Endpoint>,
}

/// Strip redirection wrappers off `node`. Returns the redirections in the
/// order they were written and the command underneath.
fn peel(mut node: &Node) -> (Vec<Redirect<'_>>, &Node) {
    let mut redirects = Vec::new();
    while let Some(op) = node.operator().filter(|op| op.is_redirect()) {
        let Some([_, target, inner]) = node.as_list() else {
            break;
        };
        redirects.push(Redirect { op, target });
        node = inner;
    }
    // The outermost wrapper is the last redirection written.
    redirects.reverse();
    (redirects, node)
}

/// Flatten nested `|` forms into stages.
fn stages(node: &Node) -> Vec<StageSpec<'_>> {
    let (outer, body) = peel(node);
    let mut specs = Vec::new();
    collect(body, &mut specs);

    // Redirections around a whole pipeline feed its ends.
    for redirect in outer {
        let index = if redirect.op == Op::RedirectIn { 0 } else { specs.len() - 1 };
        specs[index].redirects.push(redirect);
    }
    specs
}

fn collect<'a>(node: &'a Node, specs: &mut Vec<StageSpec<'a>>) {
    if node.operator() == Some(Op::Pipe) {
        if let Some(items) = node.as_list() {
            for stage in &items[1..] {
                collect(stage, specs);
            }
            return;
        }
    }
    let (redirects, command) = peel(node);
    specs.push(StageSpec { command, redirects });
}

/// Text of a word used as a command name or argument.
fn push_arg(argv: &mut Vec<String>, value: Value) {
    match value {
        Value::List(items) => argv.extend(items.iter().map(Value::to_string)),
        Value::Nil => {}
        other => argv.push(other.to_string()),
    }
}

/// Evaluate everything a stage needs before anything is spawned, so a
/// language error aborts the pipeline before it starts.
async fn prepare(spec: &StageSpec<'_>, env: &Env, ctx: &Context) -> EvalResult<Stage> {
    let (name, work) = if is_external(spec.command, env) {
        let items = spec.command.as_list().unwrap_or_default();
        let mut argv = Vec::with_capacity(items.len());
        if let Some(Node::Atom(head) | Node::Str(head)) = items.first() {
            argv.push(head.clone());
        }
        for value in eval_args(items.get(1..).unwrap_or_default(), env, ctx).await? {
            push_arg(&mut argv, value);
        }
        (argv.first().cloned().unwrap_or_default(), Work::External(argv))
    } else {
        let name = spec
            .command
            .as_list()
            .and_then(|items| items.first())
            .map(Node::to_string)
            .unwrap_or_else(|| spec.command.to_string());
        (name, Work::Internal(spec.command.clone()))
    };

    let mut endpoints = Vec::with_capacity(spec.redirects.len());
    for redirect in &spec.redirects {
        let op = redirect.op;
        endpoints.push(match eval(redirect.target, env, ctx).await? {
            Value::Pipe(pipe) => Endpoint::Pipe { op, pipe },
            other => Endpoint::Path {
                op,
                path: other.to_string(),
            },
        });
    }
    Ok(Stage {
        name,
        work,
        endpoints,
    })
}

/// Open a stage's redirections over its wired endpoints.
fn redirect(io: &mut Io, endpoints: &[Endpoint], ctx: &Context) -> EvalResult<()> {
    for endpoint in endpoints {
        match endpoint {
            Endpoint::Pipe { op: Op::RedirectIn, pipe } => io.stdin = Source::Pipe(pipe.clone()),
            Endpoint::Pipe { pipe, .. } => io.stdout = Sink::Pipe(pipe.clone()),
            Endpoint::Path { op, path } => {
                let resolved = ctx.shell.resolve(path);
                let opened = match op {
                    Op::RedirectIn => Source::open(&resolved).map(|s| io.stdin = s),
                    Op::RedirectAppend => Sink::append(&resolved).map(|s| io.stdout = s),
                    _ => Sink::create(&resolved).map(|s| io.stdout = s),
                };
                opened.map_err(|e| EvalError::RedirectionIo {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
            }
        }
    }
    Ok(())
}

/// Build and run the job `node` denotes, returning its status.
///
/// At top level the pipeline becomes a foreground job of its own; inside a
/// background job its tasks are added to that job.
#[tracing::instrument(level = "debug", skip_all, fields(command = %node))]
pub async fn run_pipeline(node: &Node, env: &Env, ctx: &Context) -> EvalResult<Value> {
    let specs = stages(node);
    let mut planned = Vec::with_capacity(specs.len());
    for spec in &specs {
        planned.push(prepare(spec, env, ctx).await?);
    }

    let supervisor = ctx.supervisor().clone();
    let (id, foreground) = match ctx.job {
        Some(id) => (id, supervisor.is_foreground(id)),
        None => (supervisor.create_job(node.to_string(), true), true),
    };
    let start = supervisor.task_count(id);
    supervisor.begin_launch(id);
    let launched = launch(id, planned, foreground, env, ctx).await;
    supervisor.end_launch(id);
    if let Err(e) = launched {
        if ctx.job.is_none() {
            supervisor.abandon(id);
        }
        return Err(e);
    }
    let range: Range<usize> = start..supervisor.task_count(id);

    let status = match ctx.job {
        None => supervisor.wait_foreground(id, range).await,
        Some(_) => supervisor
            .wait_tasks(id, range)
            .await
            .unwrap_or_else(ExitStatus::stopped),
    };
    tracing::debug!(job = %id, %status, "pipeline finished");
    let value = Value::Status(status);
    ctx.record(&value);
    Ok(value)
}

/// Wire the stages together and start them in order.
async fn launch(
    id: JobId,
    stages: Vec<Stage>,
    foreground: bool,
    env: &Env,
    ctx: &Context,
) -> EvalResult<()> {
    let supervisor = ctx.supervisor().clone();
    let internal: Vec<bool> = stages
        .iter()
        .map(|s| matches!(s.work, Work::Internal(_)))
        .collect();

    let mut links = Vec::with_capacity(stages.len().saturating_sub(1));
    for pair in internal.windows(2) {
        links.push(if pair[0] && pair[1] {
            Pipe::queue(ctx.shell.pipe_capacity)
        } else {
            Pipe::os()?
        });
    }
    tracing::debug!(job = %id, stages = stages.len(), "launching pipeline");

    let cwd = ctx.shell.cwd();
    let mut group = supervisor.job_group(id);
    let mut spawned: Vec<Spawned> = Vec::new();
    let last = stages.len().saturating_sub(1);

    for (i, stage) in stages.into_iter().enumerate() {
        let input = i.checked_sub(1).map(|j| links[j].clone());
        let output = (i < last).then(|| links[i].clone());

        let mut io = ctx.io.clone();
        if let Some(pipe) = &input {
            io.stdin = Source::Pipe(pipe.clone());
        }
        if let Some(pipe) = &output {
            io.stdout = Sink::Pipe(pipe.clone());
        }

        if let Err(e) = redirect(&mut io, &stage.endpoints, ctx) {
            tracing::warn!(job = %id, stage = %stage.name, error = %e, "redirection failed");
            let _ = ctx.io.stderr.write_text(&format!("conch: {e}\n")).await;
            supervisor.fail_task(id, &stage.name, e.status());
            release(input.as_ref(), output.as_ref()).await;
            continue;
        }
        // A link displaced by a redirection still has to see EOF.
        let output_used = matches!(&io.stdout, Sink::Pipe(p) if output.as_ref().is_some_and(|o| o.ptr_eq(p)));
        let input_used = matches!(&io.stdin, Source::Pipe(p) if input.as_ref().is_some_and(|o| o.ptr_eq(p)));
        release(
            input.as_ref().filter(|_| !input_used),
            output.as_ref().filter(|_| !output_used),
        )
        .await;

        match stage.work {
            Work::External(argv) => {
                let child = supervisor
                    .spawn_external(id, &argv, &io, &cwd, group, foreground)
                    .await;
                if let Some(child) = child {
                    if group.is_none() && supervisor.job_control() {
                        group = Some(child.pid());
                    }
                    spawned.push(child);
                }
            }
            Work::Internal(command) => {
                let env = env.clone();
                let stage_ctx = ctx.with_io(io).in_job(id);
                let input = input.filter(|_| input_used);
                let output = output.filter(|_| output_used);
                supervisor.spawn_internal(id, &stage.name, async move {
                    let status = match eval(&command, &env, &stage_ctx).await {
                        Ok(value) => value.status(),
                        Err(e) => {
                            let _ = stage_ctx.io.stderr.write_text(&format!("conch: {e}\n")).await;
                            e.status()
                        }
                    };
                    release(input.as_ref(), output.as_ref()).await;
                    status
                });
            }
        }
    }

    supervisor.start_reapers(id, spawned);
    Ok(())
}

/// Close the builder's ends of a stage's links: EOF downstream, broken
/// pipe upstream.
async fn release(input: Option<&Pipe>, output: Option<&Pipe>) {
    if let Some(pipe) = output {
        pipe.close_writer().await;
    }
    if let Some(pipe) = input {
        pipe.close_reader().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::read_all;

    fn parse(src: &str) -> Node {
        read_all(src).unwrap().remove(0)
    }

    #[test]
    fn redirections_come_back_in_written_order() {
        let node = parse("cmd > a > b");
        let (redirects, command) = peel(&node);
        let targets: Vec<String> = redirects.iter().map(|r| r.target.to_string()).collect();
        assert_eq!(targets, vec!["a", "b"]);
        assert_eq!(command.to_string(), "cmd");
    }

    #[test]
    fn pipelines_flatten_with_stage_redirections() {
        let node = parse("a < in | b | c >> out");
        let specs = stages(&node);
        assert_eq!(specs.len(), 3);
        assert_eq!(specs[0].redirects[0].op, Op::RedirectIn);
        assert!(specs[1].redirects.is_empty());
        assert_eq!(specs[2].redirects[0].op, Op::RedirectAppend);
    }

    #[test]
    fn list_arguments_spread_into_argv() {
        let mut argv = vec!["cmd".to_string()];
        push_arg(&mut argv, Value::list(vec![Value::atom("a"), Value::string("b c")]));
        push_arg(&mut argv, Value::Integer(3));
        push_arg(&mut argv, Value::Nil);
        assert_eq!(argv, vec!["cmd", "a", "b c", "3"]);
    }
}
