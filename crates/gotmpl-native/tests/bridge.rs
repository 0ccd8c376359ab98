use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use renderer::{Bridge, BridgeConfig, ErrorKind, GotmplStatus, Release};

fn c(text: &str) -> CString {
    CString::new(text).expect("no interior nul")
}

fn read(ptr: *const c_char) -> String {
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .expect("utf8")
        .to_string()
}

fn legacy(bridge: &Bridge, template: &str, data: &str) -> (*mut c_char, String) {
    let (template, data) = (c(template), c(data));
    let ptr = unsafe { bridge.render_legacy(template.as_ptr(), data.as_ptr()) };
    assert!(!ptr.is_null());
    (ptr, read(ptr))
}

#[test]
fn renders_hello_world() {
    let bridge = Bridge::default();
    let (ptr, text) = legacy(&bridge, "Hello {{.Name}}", r#"{"Name":"World"}"#);
    assert_eq!(text, "Hello World");
    assert_eq!(bridge.release(ptr), Release::Released);
}

#[test]
fn classifies_failures_by_prefix() {
    let bridge = Bridge::default();
    let cases = [
        ("{{.X}}", "{bad", "JSON_ERROR: "),
        ("{{if}}", "{}", "TEMPLATE_PARSE_ERROR: "),
        ("{{.Missing.Field}}", "{}", "TEMPLATE_EXECUTE_ERROR: "),
    ];
    for (template, data, prefix) in cases {
        let (ptr, text) = legacy(&bridge, template, data);
        assert!(text.starts_with(prefix), "{text}");
        bridge.release(ptr);
    }
    assert_eq!(bridge.registry().live_count(), 0);
}

#[test]
fn parse_errors_name_the_template() {
    let bridge = Bridge::default();
    let (ptr, text) = legacy(&bridge, "{{if}}", "{}");
    assert_eq!(
        text,
        "TEMPLATE_PARSE_ERROR: template: ollama:1: missing value for if"
    );
    bridge.release(ptr);
}

#[test]
fn second_free_is_a_no_op() {
    let bridge = Bridge::default();
    let (ptr, _) = legacy(&bridge, "x", "null");
    assert_eq!(bridge.release(ptr), Release::Released);
    assert_eq!(bridge.release(ptr), Release::Unknown);
    assert_eq!(bridge.release(std::ptr::null()), Release::Unknown);
    assert_eq!(bridge.registry().live_count(), 0);
}

#[test]
fn paired_calls_leave_nothing_live() {
    let bridge = Bridge::default();
    for i in 0..100 {
        let (ptr, text) = legacy(&bridge, "{{.}}", &i.to_string());
        assert_eq!(text, i.to_string());
        bridge.release(ptr);
    }
    assert_eq!(bridge.registry().live_count(), 0);
}

#[test]
fn null_inputs_are_input_errors() {
    let bridge = Bridge::default();
    let data = c("{}");
    let ptr = unsafe { bridge.render_legacy(std::ptr::null(), data.as_ptr()) };
    assert_eq!(read(ptr), "INPUT_ERROR: template handle is null");
    bridge.release(ptr);

    let template = c("x");
    let outcome = unsafe { bridge.render_c(template.as_ptr(), std::ptr::null()) };
    let failure = outcome.expect_err("null data");
    assert_eq!(failure.kind, ErrorKind::InvalidInput);
    assert_eq!(failure.message, "data handle is null");
}

#[test]
fn v1_reports_status_and_exact_length() {
    let bridge = Bridge::default();
    let (template, data) = (c("{{.a}}|{{printf \"%c\" 0}}|"), c(r#"{"a":"é"}"#));
    let result = unsafe { bridge.render_v1(template.as_ptr(), data.as_ptr()) };
    assert_eq!(result.status, GotmplStatus::Ok);
    let bytes = unsafe { std::slice::from_raw_parts(result.ptr.cast::<u8>(), result.len) };
    assert_eq!(bytes, "é|\0|".as_bytes());
    assert_eq!(bridge.release(result.ptr), Release::Released);

    let (template, data) = (c("{{.X}}"), c("[1,"));
    let result = unsafe { bridge.render_v1(template.as_ptr(), data.as_ptr()) };
    assert_eq!(result.status, GotmplStatus::JsonError);
    let message = read(result.ptr);
    assert!(!message.starts_with("JSON_ERROR"), "{message}");
    assert_eq!(message.len(), result.len);
    bridge.release(result.ptr);
    assert_eq!(bridge.registry().live_count(), 0);
}

#[test]
fn config_limits_apply() {
    let mut config = BridgeConfig::default();
    config.template_name = "page".to_string();
    config.exec.max_steps = 3;
    let bridge = Bridge::new(config);
    let failure = bridge
        .render("{{range .}}{{.}}{{end}}", "[1,2,3,4]")
        .expect_err("budget");
    assert_eq!(failure.kind, ErrorKind::TemplateExecuteError);
    assert!(failure.message.starts_with("template: page:"), "{}", failure.message);
    assert!(failure.message.ends_with("step budget exhausted (max_steps=3)"));
}

#[test]
fn concurrent_renders_get_distinct_buffers() {
    let bridge = Bridge::default();
    let threads = 8;
    let per_thread = 50;
    let kept: Vec<Vec<usize>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let bridge = &bridge;
                scope.spawn(move || {
                    let mut kept = Vec::new();
                    for i in 0..per_thread {
                        let (ptr, text) = legacy(bridge, "{{.t}}-{{.i}}", &format!(r#"{{"t":{t},"i":{i}}}"#));
                        assert_eq!(text, format!("{t}-{i}"));
                        if i % 2 == 0 {
                            kept.push(ptr as usize);
                        } else {
                            assert_eq!(bridge.release(ptr), Release::Released);
                        }
                    }
                    kept
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("thread"))
            .collect()
    });

    let mut all: Vec<usize> = kept.into_iter().flatten().collect();
    let total = all.len();
    assert_eq!(bridge.registry().live_count(), total);
    for &addr in &all {
        let ptr = addr as *const c_char;
        assert!(bridge.registry().contains(ptr));
        assert!(read(ptr).contains('-'));
    }
    all.sort_unstable();
    all.dedup();
    assert_eq!(all.len(), total);
    for addr in all {
        assert_eq!(bridge.release(addr as *const c_char), Release::Released);
    }
    assert_eq!(bridge.registry().live_count(), 0);
}

#[test]
fn deep_recursion_is_an_execute_error_not_a_crash() {
    for ifs in [8, 32, 99] {
        let template = format!(
            "{{{{define \"r\"}}}}{}{{{{template \"r\" .}}}}{}{{{{end}}}}{{{{template \"r\" .}}}}",
            "{{if 1}}".repeat(ifs),
            "{{end}}".repeat(ifs)
        );
        let text = std::thread::Builder::new()
            .stack_size(2 << 20)
            .spawn(move || {
                let bridge = Bridge::default();
                let (ptr, text) = legacy(&bridge, &template, "{}");
                assert_eq!(bridge.release(ptr), Release::Released);
                text
            })
            .expect("spawn")
            .join()
            .expect("render thread");
        assert!(text.starts_with("TEMPLATE_EXECUTE_ERROR: template: ollama:"), "{text}");
        assert!(text.ends_with("exceeded maximum template depth (100)"), "{text}");
    }
}
