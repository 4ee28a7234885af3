//! End-to-end checks of the `clmark` binary's failure paths.

use std::process::Command;

fn clmark() -> Command {
    Command::new(env!("CARGO_BIN_EXE_clmark"))
}

#[test]
fn missing_input_exits_with_diagnostic() {
    let dir = tempfile::tempdir().unwrap();
    let output_path = dir.path().join("out.txt");
    let out = clmark()
        .args(["scan", "/nonexistent/clmark/input.txt"])
        .arg(&output_path)
        .output()
        .unwrap();

    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("-- Error"), "stderr: {stderr}");
    assert!(stderr.contains("input.txt"), "stderr: {stderr}");
    assert!(!output_path.exists());
}

#[test]
fn malformed_gemm_input_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.txt");
    std::fs::write(&input, "2 2 2\n1 2 3\n").unwrap();
    let output_path = dir.path().join("out.txt");

    let out = clmark().arg("gemm").arg(&input).arg(&output_path).output().unwrap();

    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("Malformed input"));
    assert!(!output_path.exists());
}

#[test]
fn unknown_variant_is_rejected_by_parser() {
    let out = clmark().args(["gemm", "a.txt", "b.txt", "--variant", "7"]).output().unwrap();
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("out of range"));
}

#[test]
fn empty_scan_input_writes_empty_result() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.txt");
    std::fs::write(&input, "0\n").unwrap();
    let output_path = dir.path().join("out.txt");

    let out = clmark().arg("scan").arg(&input).arg(&output_path).output().unwrap();

    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(std::fs::read_to_string(&output_path).unwrap().trim(), "");
}
