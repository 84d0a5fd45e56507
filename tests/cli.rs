use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

#[test]
fn quill_eval_snippet() {
    let mut cmd = Command::cargo_bin("quill").expect("binary exists");
    cmd.arg("eval").arg("println(1 + 2 + 3)");
    cmd.assert().success().stdout(predicate::str::diff("6\n"));
}

#[test]
fn quill_run_script_file() {
    let dir = tempdir().expect("create temp dir");
    let script = dir.path().join("greet.qs");
    fs::write(
        &script,
        r#"
        class Greeter {
            name = "world"
            greet() { return `Hello, ${name}!` }
        }
        g = new Greeter()
        println(g.greet())
        wait(5)
        println("done")
        "#,
    )
    .expect("write script");

    let mut cmd = Command::cargo_bin("quill").expect("binary exists");
    cmd.arg("run").arg(&script);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Hello, world!\ndone\n"));
}

#[test]
fn quill_reports_errors_with_failure_status() {
    let dir = tempdir().expect("create temp dir");
    let script = dir.path().join("broken.qs");
    fs::write(&script, "x = 1\ny = x + missing\n").expect("write script");

    let mut cmd = Command::cargo_bin("quill").expect("binary exists");
    cmd.arg("run").arg(&script);
    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("NameError: undefined variable `missing`"))
        .stderr(predicate::str::contains("> 2 | y = x + missing"));
}

#[test]
fn quill_lexical_flag_changes_scoping() {
    let source = r#"
        x = "global"
        function show() { return x }
        function run(x) { return show() }
        println(run("param"))
    "#;
    let mut cmd = Command::cargo_bin("quill").expect("binary exists");
    cmd.arg("--lexical").arg("eval").arg(source);
    cmd.assert().success().stdout(predicate::str::diff("global\n"));
}

#[test]
fn quill_run_missing_file_fails() {
    let mut cmd = Command::cargo_bin("quill").expect("binary exists");
    cmd.arg("run").arg("does-not-exist.qs");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("I/O error"));
}
