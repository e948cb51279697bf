//! End-to-end tests of the language through the kernel facade.
//!
//! Every test runs against a transient kernel, so output is captured in the
//! result rather than printed.

use conch_kernel::{Kernel, KernelConfig, Value};
use rstest::rstest;

fn kernel() -> Kernel {
    Kernel::transient().expect("Failed to create kernel")
}

async fn run(kernel: &Kernel, src: &str) -> conch_kernel::ExecResult {
    kernel.execute(src).await.expect("execution failed")
}

// ============================================================================
// Values and bindings
// ============================================================================

#[rstest]
#[case::atom("list a", "(a)")]
#[case::string("list \"two words\"", "(\"two words\")")]
#[case::nested("list a (list b c)", "(a (b c))")]
#[case::arithmetic("add 2 (mul 3 4)", "14")]
#[case::quote("quote (x \"y\" (z))", "(x \"y\" (z))")]
#[case::integer_word("integer 007", "7")]
#[tokio::test]
async fn values_print_in_their_own_syntax(#[case] src: &str, #[case] expected: &str) {
    let result = run(&kernel(), src).await;
    assert!(result.ok(), "{src}: {:?}", result);
    assert_eq!(result.value.to_syntax(), expected);
}

#[tokio::test]
async fn define_then_set() {
    let kernel = kernel();
    run(&kernel, "define greeting hello").await;
    assert_eq!(kernel.get_var("greeting"), Some(Value::atom("hello")));
    run(&kernel, "set greeting \"good day\"").await;
    assert_eq!(kernel.get_var("greeting"), Some(Value::string("good day")));
}

#[tokio::test]
async fn bindings_persist_across_calls() {
    let kernel = kernel();
    run(&kernel, "define n: integer 1").await;
    run(&kernel, "set n (add $n 1)").await;
    let result = run(&kernel, "echo $n").await;
    assert_eq!(result.out, "2\n");
}

#[tokio::test]
async fn blocks_have_their_own_scope() {
    let kernel = kernel();
    let result = run(&kernel, "{ define inner 1; list $inner }").await;
    assert_eq!(result.value.to_syntax(), "(1)");
    let result = run(&kernel, "list $inner").await;
    assert!(!result.ok());
    assert_eq!(result.error.as_deref(), Some("unbound name: inner"));
}

#[tokio::test]
async fn set_reaches_the_defining_scope() {
    let kernel = kernel();
    run(&kernel, "define x 1\n{ set x 2 }").await;
    assert_eq!(kernel.get_var("x"), Some(Value::atom("2")));
}

// ============================================================================
// Methods
// ============================================================================

#[tokio::test]
async fn methods_take_parameters() {
    let kernel = kernel();
    let result = run(
        &kernel,
        "define greet: method (who) { echo hello $who }\n\
         greet world",
    )
    .await;
    assert_eq!(result.out, "hello world\n");
}

#[tokio::test]
async fn self_recursion_is_not_limited_by_the_stack() {
    let kernel = kernel();
    let result = run(
        &kernel,
        "define loop: method (n) {\n\
             if (eq $n 0) done { loop (sub $n 1) }\n\
         }\n\
         loop 100000",
    )
    .await;
    assert!(result.ok(), "{:?}", result);
    assert_eq!(result.value, Value::atom("done"));
}

#[tokio::test]
async fn wrong_number_of_arguments() {
    let kernel = kernel();
    let result = run(&kernel, "define two: method (a b) { list $a $b }\ntwo 1").await;
    assert!(!result.ok());
    assert!(result.err.starts_with("conch: "), "{}", result.err);
}

// ============================================================================
// Objects
// ============================================================================

const ACCOUNT: &str = "define account: object {\n\
                         define balance: integer 0\n\
                         public deposit: method (n) { set balance (add $balance $n) }\n\
                         public total: method { list $balance }\n\
                         public owner nobody\n\
                       }";

#[tokio::test]
async fn public_members_are_visible_and_private_ones_are_not() {
    let kernel = kernel();
    run(&kernel, ACCOUNT).await;
    let result = run(&kernel, "echo $account::owner").await;
    assert_eq!(result.out, "nobody\n");

    let result = run(&kernel, "$account::deposit 5; $account::total").await;
    assert_eq!(result.value.to_syntax(), "(5)");

    let result = run(&kernel, "list $account::balance").await;
    assert_eq!(result.err, "conch: unbound name: account::balance\n");
}

#[tokio::test]
async fn clones_are_isolated_from_their_prototype_and_each_other() {
    let kernel = kernel();
    run(&kernel, ACCOUNT).await;
    run(
        &kernel,
        "define a: $account::clone\n\
         define b: $account::clone\n\
         $a::deposit 10\n\
         $b::deposit 1; $b::deposit 1",
    )
    .await;
    assert_eq!(run(&kernel, "$a::total").await.value.to_syntax(), "(10)");
    assert_eq!(run(&kernel, "$b::total").await.value.to_syntax(), "(2)");
    assert_eq!(run(&kernel, "$account::total").await.value.to_syntax(), "(0)");
}

#[tokio::test]
async fn clones_inherit_public_members() {
    let kernel = kernel();
    run(&kernel, "define proto: object { public colour red }\ndefine c: $proto::clone").await;
    assert_eq!(run(&kernel, "echo $c::colour").await.out, "red\n");
}

#[tokio::test]
async fn private_members_are_hidden_from_outside() {
    let kernel = kernel();
    run(&kernel, "define vault: object { define secret 42 }").await;
    let result = run(&kernel, "echo $vault::secret").await;
    assert_eq!(result.code(), 1);
    assert_eq!(result.err, "conch: unbound name: vault::secret\n");
}

#[tokio::test]
async fn imported_modules_expose_public_members() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(
        dir.path().join("util.conch"),
        "define hidden 1\npublic twice: method (x) { mul $x 2 }\n",
    )
    .expect("write module");
    let config = KernelConfig::transient().with_cwd(dir.path());
    let kernel = Kernel::new(config).expect("Failed to create kernel");
    let result = run(&kernel, "define util: import util.conch\n$util::twice 21").await;
    assert_eq!(result.value, Value::Integer(42));
    assert!(!run(&kernel, "list $util::hidden").await.ok());
}

// ============================================================================
// Control flow
// ============================================================================

#[rstest]
#[case::and_runs_on_success("true && echo yes", "yes\n")]
#[case::and_skips_on_failure("false && echo no", "")]
#[case::or_runs_on_failure("false || echo yes", "yes\n")]
#[case::or_skips_on_success("true || echo no", "")]
#[case::chain("false && echo a || echo b", "b\n")]
#[case::sequence("echo a; false; echo b", "a\nb\n")]
#[case::if_else("if (eq 1 1) (echo one) else (echo other)", "one\n")]
#[case::if_without_else("if (false) (echo never)", "")]
#[tokio::test]
async fn control_flow(#[case] src: &str, #[case] expected: &str) {
    let result = run(&kernel(), src).await;
    assert_eq!(result.out, expected, "{src}");
}

#[tokio::test]
async fn status_of_a_short_circuit_is_the_last_one_run() {
    let kernel = kernel();
    run(&kernel, "false && true").await;
    assert_eq!(kernel.last_status().code(), 1);
    run(&kernel, "false || status 4").await;
    assert_eq!(kernel.last_status().code(), 4);
}

#[tokio::test]
async fn statuses_are_values() {
    let kernel = kernel();
    let result = run(&kernel, "define s: false\nif $s (echo truthy) (echo falsy)").await;
    assert_eq!(result.out, "falsy\n");
}
