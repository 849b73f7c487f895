#[macro_use]
extern crate afl;
use x3dh_keyring::store::{KeyRecord, RecordName};

fn main() {
    fuzz!(|data: &[u8]| {
        let _ = KeyRecord::from_bytes(data);
        if let Ok(name) = std::str::from_utf8(data) {
            let _ = name.parse::<RecordName>();
        }
    });
}
