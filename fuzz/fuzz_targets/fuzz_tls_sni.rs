#![no_main]

use libfuzzer_sys::fuzz_target;
use netwatch::tls;

fuzz_target!(|data: &[u8]| {
    let _ = tls::parse_sni(data);
});
