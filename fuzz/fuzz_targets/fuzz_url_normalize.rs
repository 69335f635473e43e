#![no_main]

use libfuzzer_sys::fuzz_target;

use mediaprobe::media::{normalize, normalize_url};

fuzz_target!(|data: &str| {
    // Must never panic, whatever the input.
    let normalized = normalize_url(data);

    if let Ok(parsed) = url::Url::parse(data) {
        let once = normalize(&parsed);
        assert_eq!(once.scheme(), parsed.scheme());
        assert_eq!(once.host_str(), parsed.host_str());
        assert_eq!(once.query(), parsed.query());
        assert_eq!(once.fragment(), parsed.fragment());
        assert_eq!(normalized, once.to_string());
    } else {
        assert_eq!(normalized, data);
    }
});
