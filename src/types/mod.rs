mod key_pair;
pub use key_pair::*;

mod x25519;
pub use x25519::*;
