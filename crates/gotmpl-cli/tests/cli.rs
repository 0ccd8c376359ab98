use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};

use serde_json::Value;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("gotmpl-cli-{}-{name}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}

fn write_file(dir: &PathBuf, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, text).expect("write file");
    path
}

fn run_gotmpl(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_gotmpl"))
        .args(args)
        .env_remove("GOTMPL_TEMPLATE_NAME")
        .output()
        .expect("run gotmpl")
}

#[test]
fn render_prints_output() {
    let dir = scratch_dir("render");
    let template = write_file(&dir, "t.tmpl", "Hello {{.Name}}");
    let out = run_gotmpl(&[
        "render",
        "--template",
        template.to_str().expect("path"),
        "--data-json",
        r#"{"Name":"World"}"#,
    ]);
    assert_eq!(out.status.code(), Some(0), "{}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(String::from_utf8_lossy(&out.stdout), "Hello World");
}

#[test]
fn render_failure_exits_nonzero() {
    let dir = scratch_dir("failure");
    let template = write_file(&dir, "t.tmpl", "{{.Missing.Field}}");
    let data = write_file(&dir, "d.json", "{}");
    let args = [
        "render",
        "--template",
        template.to_str().expect("path"),
        "--data",
        data.to_str().expect("path"),
    ];
    let out = run_gotmpl(&args);
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.starts_with("template execution error: template: ollama:1:10:"), "{stderr}");

    let mut legacy = args.to_vec();
    legacy.push("--legacy");
    let out = run_gotmpl(&legacy);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stdout).starts_with("TEMPLATE_EXECUTE_ERROR: "));
}

#[test]
fn render_reads_template_from_stdin() {
    let mut child = Command::new(env!("CARGO_BIN_EXE_gotmpl"))
        .args(["render", "--template", "-", "--data-json", "[1,2]"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("spawn gotmpl");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(b"{{range .}}<{{.}}>{{end}}")
        .expect("write stdin");
    let out = child.wait_with_output().expect("wait");
    assert_eq!(out.status.code(), Some(0));
    assert_eq!(String::from_utf8_lossy(&out.stdout), "<1><2>");
}

#[test]
fn check_reports_json() {
    let dir = scratch_dir("check");
    let good = write_file(&dir, "good.tmpl", r#"{{define "row"}}{{.}}{{end}}"#);
    let out = run_gotmpl(&["check", "--template", good.to_str().expect("path")]);
    assert_eq!(out.status.code(), Some(0));
    let v: Value = serde_json::from_slice(&out.stdout).expect("parse stdout JSON");
    assert_eq!(v["ok"], true);
    assert_eq!(v["templates"], serde_json::json!(["ollama", "row"]));

    let bad = write_file(&dir, "bad.tmpl", "{{if}}");
    let out = run_gotmpl(&["check", "--template", bad.to_str().expect("path")]);
    assert_eq!(out.status.code(), Some(1));
    let v: Value = serde_json::from_slice(&out.stdout).expect("parse stdout JSON");
    assert_eq!(v["ok"], false);
    assert_eq!(v["error"], "template: ollama:1: missing value for if");
}

#[test]
fn debug_log_traces_cli_steps() {
    let dir = scratch_dir("log");
    let template = write_file(&dir, "t.tmpl", "{{.}}");
    let out = Command::new(env!("CARGO_BIN_EXE_gotmpl"))
        .args(["check", "--template", template.to_str().expect("path")])
        .env_remove("GOTMPL_TEMPLATE_NAME")
        .env("GOTMPL_LOG", "debug")
        .output()
        .expect("run gotmpl");
    assert_eq!(out.status.code(), Some(0));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("read input"), "{stderr}");
    assert!(stderr.contains("checked template"), "{stderr}");

    let quiet = run_gotmpl(&["check", "--template", template.to_str().expect("path")]);
    if std::env::var_os("GOTMPL_LOG").is_none() {
        assert!(quiet.stderr.is_empty(), "{}", String::from_utf8_lossy(&quiet.stderr));
    }
}
