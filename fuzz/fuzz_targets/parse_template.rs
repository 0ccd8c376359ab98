#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let data = if data.len() > 64 * 1024 {
        &data[..64 * 1024]
    } else {
        data
    };

    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let _ = gotmpl_core::lex::lex(text);
    if let Ok(template) = gotmpl_core::Template::parse("fuzz", text) {
        for name in template.defined_templates() {
            let _ = template.lookup(name);
        }
    }
});
