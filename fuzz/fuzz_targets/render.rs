#![no_main]

use libfuzzer_sys::fuzz_target;
use renderer::{Bridge, BridgeConfig};

// Input layout: template bytes, a NUL separator, JSON bytes.
fuzz_target!(|data: &[u8]| {
    let data = if data.len() > 64 * 1024 {
        &data[..64 * 1024]
    } else {
        data
    };

    let (template, json) = match data.iter().position(|&b| b == 0) {
        Some(split) => (&data[..split], &data[split + 1..]),
        None => (data, &b"{}"[..]),
    };
    let template = String::from_utf8_lossy(template);
    let json = String::from_utf8_lossy(json);

    let mut config = BridgeConfig::default();
    config.exec.max_steps = 100_000;
    config.exec.max_output_bytes = 1 << 20;
    let bridge = Bridge::new(config);
    let _ = bridge.render(&template, &json);
});
