#[macro_use]
extern crate afl;
use x3dh_keyring::KeyBundle;

fn main() {
    fuzz!(|data: &[u8]| {
        let _ = KeyBundle::from_bytes(data);
        if let Ok(text) = std::str::from_utf8(data) {
            let _ = KeyBundle::decode(text);
        }
    });
}
