use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn emits_ir_to_the_requested_path() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("prog.adr");
    std::fs::write(&src, "x = 1\nprint(x)\n").unwrap();
    let out = dir.path().join("prog.ll");

    Command::cargo_bin("adderc")
        .unwrap()
        .arg(&src)
        .arg("--emit")
        .arg("ir")
        .arg("-o")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("prog.ll"));

    let ir = std::fs::read_to_string(&out).unwrap();
    assert!(ir.contains("define i32 @main()"));
    assert!(ir.contains("@ctype.int"));
}

#[test]
fn no_checks_strips_runtime_guards() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("prog.adr");
    std::fs::write(&src, "L = [1, 2]\nL[5]\n").unwrap();
    let out = dir.path().join("prog.ll");

    Command::cargo_bin("adderc")
        .unwrap()
        .arg(&src)
        .arg("--emit")
        .arg("ir")
        .arg("-o")
        .arg(&out)
        .arg("--no-checks")
        .assert()
        .success();

    let ir = std::fs::read_to_string(&out).unwrap();
    assert!(!ir.contains("RuntimeError"));
}

#[test]
fn static_errors_are_reported_with_their_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("bad.adr");
    std::fs::write(&src, "print(missing)\n").unwrap();

    Command::cargo_bin("adderc")
        .unwrap()
        .arg(&src)
        .arg("--emit")
        .arg("ir")
        .assert()
        .failure()
        .stderr(predicate::str::contains("SNameError"));
}
