use std::borrow::Cow;
use std::ffi::CStr;
use std::os::raw::c_char;

use gotmpl_core::Template;
use serde_json::Value;

use crate::config::BridgeConfig;
use crate::outcome::{ErrorKind, RenderFailure, RenderOutcome};

/// Reads a caller-owned C string. Invalid UTF-8 is replaced, never rejected.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string that stays valid
/// for `'a`.
pub unsafe fn marshal_input<'a>(
    ptr: *const c_char,
    what: &str,
) -> Result<Cow<'a, str>, RenderFailure> {
    if ptr.is_null() {
        return Err(RenderFailure::new(
            ErrorKind::InvalidInput,
            format!("{what} handle is null"),
        ));
    }
    Ok(CStr::from_ptr(ptr).to_string_lossy())
}

/// Decodes `data`, then compiles and executes `template` against it.
/// JSON is checked first so a bad document is reported even when the
/// template is also broken.
pub fn render(config: &BridgeConfig, template: &str, data: &str) -> RenderOutcome {
    let document: Value = serde_json::from_str(data)
        .map_err(|err| RenderFailure::new(ErrorKind::JsonError, err.to_string()))?;
    let compiled = Template::parse(&config.template_name, template)
        .map_err(|err| RenderFailure::new(ErrorKind::TemplateParseError, err.to_string()))?;
    compiled
        .execute(&document, &config.exec)
        .map_err(|err| RenderFailure::new(ErrorKind::TemplateExecuteError, err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_is_checked_before_template() {
        let failure = render(&BridgeConfig::default(), "{{if}}", "{bad").expect_err("json");
        assert_eq!(failure.kind, ErrorKind::JsonError);
    }

    #[test]
    fn null_input_is_rejected() {
        let failure = unsafe { marshal_input(std::ptr::null(), "data") }.expect_err("null");
        assert_eq!(failure.kind, ErrorKind::InvalidInput);
        assert_eq!(failure.message, "data handle is null");
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let raw = b"a\xffb\0";
        let text = unsafe { marshal_input(raw.as_ptr().cast(), "template") }.expect("text");
        assert_eq!(text, "a\u{FFFD}b");
    }
}
