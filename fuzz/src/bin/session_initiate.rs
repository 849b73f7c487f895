#[macro_use]
extern crate afl;
use std::sync::Arc;

use x3dh_keyring::crypto::{CryptoProvider, Curve25519Provider};
use x3dh_keyring::{IdentityKeyPair, KeyBundle, RemoteAddress, X3DH};

fn main() {
    // The victim
    let provider = Arc::new(Curve25519Provider::new());
    let identity = IdentityKeyPair::new(provider.generate_key_pair().expect("Setup failed"));
    let x3dh = X3DH::new(b"fuzz-context", provider);

    // Bundles come from the attacker
    fuzz!(|data: &[u8]| {
        if let Ok(bundle) = KeyBundle::from_bytes(data) {
            let _ = x3dh.initiate_session(&identity, &bundle, RemoteAddress::new("mallory", 1));
        }
    });
}
