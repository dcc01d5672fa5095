#![no_main]

use libfuzzer_sys::fuzz_target;
use netwatch::dns;

fuzz_target!(|data: &[u8]| {
    let _ = dns::parse(data);
});
