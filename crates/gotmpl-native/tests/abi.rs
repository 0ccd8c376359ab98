use std::ffi::{CStr, CString};

use renderer::{
    gotmpl_abi_version, gotmpl_free_v1, gotmpl_live_buffers_v1, gotmpl_render_v1, FreeString,
    GotmplFreeStatus, GotmplStatus, RenderTemplate,
};

#[test]
fn legacy_symbols_round_trip() {
    let template = CString::new("Hello {{.Name}}").expect("cstring");
    let data = CString::new(r#"{"Name":"World"}"#).expect("cstring");
    unsafe {
        let ptr = RenderTemplate(template.as_ptr(), data.as_ptr());
        assert!(!ptr.is_null());
        assert_eq!(CStr::from_ptr(ptr).to_str().expect("utf8"), "Hello World");
        FreeString(ptr);
        FreeString(ptr);
        FreeString(std::ptr::null_mut());
    }
}

#[test]
fn v1_symbols_report_status() {
    assert_eq!(gotmpl_abi_version(), 1);
    let template = CString::new("{{.Missing.Field}}").expect("cstring");
    let data = CString::new("{}").expect("cstring");
    unsafe {
        let result = gotmpl_render_v1(template.as_ptr(), data.as_ptr());
        assert_eq!(result.status, GotmplStatus::TemplateExecuteError);
        assert!(gotmpl_live_buffers_v1() >= 1);
        let message = CStr::from_ptr(result.ptr).to_str().expect("utf8");
        assert!(message.starts_with("template: "), "{message}");
        assert_eq!(gotmpl_free_v1(result.ptr), GotmplFreeStatus::Released);
        assert_eq!(gotmpl_free_v1(result.ptr), GotmplFreeStatus::Unknown);
    }
}

#[test]
fn v1_null_input() {
    unsafe {
        let result = gotmpl_render_v1(std::ptr::null(), std::ptr::null());
        assert_eq!(result.status, GotmplStatus::InvalidInput);
        assert_eq!(
            CStr::from_ptr(result.ptr).to_str().expect("utf8"),
            "template handle is null"
        );
        assert_eq!(gotmpl_free_v1(result.ptr), GotmplFreeStatus::Released);
    }
}
