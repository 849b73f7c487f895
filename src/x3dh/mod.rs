mod bundle;
pub use bundle::*;
mod identity_key;
pub use identity_key::*;
mod one_time_pre_key;
pub use one_time_pre_key::*;
mod pre_key;
pub use pre_key::{PreKeyManager, SignedPreKey};

use std::fmt;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::info;
use zeroize::Zeroizing;

use crate::crypto::CryptoProvider;
use crate::{Error, IdentityKeyPair, KeyId, RemoteAddress, codec};

/// Domain-separation prefix F: 32 bytes of 0xFF, prepended to the DH outputs
/// so the input key material can never collide with an XEdDSA hash input.
const DOMAIN_SEPARATOR: [u8; 32] = [0xFF; 32];

/// Length of the derived shared secret.
pub const SHARED_SECRET_SIZE: usize = 32;

/// What the initiator sends to the responder along with its first
/// ciphertext, so the responder can repeat the agreement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InitiationMessage {
    pub identity_key: Vec<u8>,
    pub ephemeral_key: Vec<u8>,
    pub signed_pre_key_id: KeyId,
    pub pre_key_id: Option<KeyId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Role {
    Initiator,
    Responder,
}

/// Output of an X3DH agreement, handed to the ratchet layer.
///
/// The shared secret is wiped from memory when the seed is dropped.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionSeed {
    shared_secret: Zeroizing<Vec<u8>>,
    remote_address: RemoteAddress,
    used_pre_key_id: Option<KeyId>,
    signed_pre_key_id: KeyId,
    ephemeral_key: Vec<u8>,
    local_identity_key: Vec<u8>,
    remote_identity_key: Vec<u8>,
    role: Role,
}

impl SessionSeed {
    pub fn shared_secret(&self) -> &[u8] {
        &self.shared_secret
    }

    pub fn remote_address(&self) -> &RemoteAddress {
        &self.remote_address
    }

    /// The one-time pre-key the agreement used, if any.
    pub fn used_pre_key_id(&self) -> Option<KeyId> {
        self.used_pre_key_id
    }

    pub fn signed_pre_key_id(&self) -> KeyId {
        self.signed_pre_key_id
    }

    /// The initiator's ephemeral public key.
    pub fn ephemeral_key(&self) -> &[u8] {
        &self.ephemeral_key
    }

    pub fn local_identity_key(&self) -> &[u8] {
        &self.local_identity_key
    }

    pub fn remote_identity_key(&self) -> &[u8] {
        &self.remote_identity_key
    }

    /// `AD = IK_initiator || IK_responder`, identical on both sides.
    pub fn associated_data(&self) -> Vec<u8> {
        let (initiator, responder) = match self.role {
            Role::Initiator => (&self.local_identity_key, &self.remote_identity_key),
            Role::Responder => (&self.remote_identity_key, &self.local_identity_key),
        };
        [initiator.as_slice(), responder.as_slice()].concat()
    }

    /// Identifier both parties derive for the session: the hash of the
    /// associated data and the initiator's ephemeral key.
    pub fn session_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.associated_data());
        hasher.update(&self.ephemeral_key);
        codec::encode(&hasher.finalize())
    }

    /// The message to send to the responder. Only an initiator has one.
    pub fn initiation_message(&self) -> Option<InitiationMessage> {
        match self.role {
            Role::Initiator => Some(InitiationMessage {
                identity_key: self.local_identity_key.clone(),
                ephemeral_key: self.ephemeral_key.clone(),
                signed_pre_key_id: self.signed_pre_key_id,
                pre_key_id: self.used_pre_key_id,
            }),
            Role::Responder => None,
        }
    }
}

impl fmt::Debug for SessionSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSeed")
            .field("shared_secret", &"<redacted>")
            .field("remote_address", &self.remote_address)
            .field("used_pre_key_id", &self.used_pre_key_id)
            .field("signed_pre_key_id", &self.signed_pre_key_id)
            .field("role", &self.role)
            .finish()
    }
}

/// Implementation of the X3DH (Extended Triple Diffie-Hellman) key agreement protocol.
///
/// X3DH lets two parties establish a shared secret asynchronously, even if
/// the responder is offline, from the responder's published [`KeyBundle`].
/// It holds no state between calls.
pub struct X3DH {
    info: Vec<u8>,
    provider: Arc<dyn CryptoProvider>,
}

impl X3DH {
    /// Creates a new X3DH instance. `info` binds derived secrets to the
    /// application, so the same keys yield different secrets under a
    /// different `info`.
    pub fn new(info: &[u8], provider: Arc<dyn CryptoProvider>) -> Self {
        Self {
            info: info.to_vec(),
            provider,
        }
    }

    /// Initiates key agreement with a responder's bundle.
    ///
    /// 1. Verifies the signed pre-key signature against the identity key
    /// 2. Generates an ephemeral key pair, never persisted
    /// 3. Performs the DH computations in fixed order
    /// 4. Derives the shared secret
    pub fn initiate_session(
        &self,
        local_identity: &IdentityKeyPair,
        remote_bundle: &KeyBundle,
        remote_address: RemoteAddress,
    ) -> Result<SessionSeed, Error> {
        remote_bundle.validate()?;
        let signed_pre_key = &remote_bundle.signed_pre_key;
        self.check_bundle_key(&remote_bundle.identity_key, "identity key")?;
        self.check_bundle_key(&signed_pre_key.public_key, "signed pre-key public key")?;
        if let Some(pre_key) = &remote_bundle.pre_key {
            self.check_bundle_key(&pre_key.public_key, "one-time pre-key public key")?;
        }

        self.provider.verify(
            &remote_bundle.identity_key,
            &signed_pre_key.public_key,
            &signed_pre_key.signature,
        )?;

        let ephemeral = self.provider.generate_key_pair()?;

        // DH1 = DH(IK_local, SPK_remote)
        let dh1 = self
            .provider
            .diffie_hellman(local_identity.private_key(), &signed_pre_key.public_key)?;
        // DH2 = DH(EK, IK_remote)
        let dh2 = self
            .provider
            .diffie_hellman(ephemeral.private_key(), &remote_bundle.identity_key)?;
        // DH3 = DH(EK, SPK_remote)
        let dh3 = self
            .provider
            .diffie_hellman(ephemeral.private_key(), &signed_pre_key.public_key)?;
        // DH4 = DH(EK, OPK_remote)
        let dh4 = match &remote_bundle.pre_key {
            Some(pre_key) => Some(
                self.provider
                    .diffie_hellman(ephemeral.private_key(), &pre_key.public_key)?,
            ),
            None => None,
        };

        let dh4 = dh4.as_ref().map(|dh4| dh4.as_slice());
        let shared_secret = self.calculate_shared_secret(&dh1, &dh2, &dh3, dh4)?;
        let used_pre_key_id = remote_bundle.pre_key.as_ref().map(|pre_key| pre_key.key_id);

        info!(
            remote = %remote_address,
            signed_pre_key_id = %signed_pre_key.key_id,
            one_time_pre_key = used_pre_key_id.is_some(),
            "initiated X3DH session"
        );

        Ok(SessionSeed {
            shared_secret,
            remote_address,
            used_pre_key_id,
            signed_pre_key_id: signed_pre_key.key_id,
            ephemeral_key: ephemeral.public_key().to_vec(),
            local_identity_key: local_identity.public_key().to_vec(),
            remote_identity_key: remote_bundle.identity_key.clone(),
            role: Role::Initiator,
        })
    }

    /// Processes an initiation from a remote party.
    ///
    /// Repeats the initiator's DH computations from the responder's side.
    /// `one_time_pre_key` must be the key named by the initiation, already
    /// taken out of the store by the caller.
    pub fn accept_session(
        &self,
        local_identity: &IdentityKeyPair,
        signed_pre_key: &SignedPreKey,
        one_time_pre_key: Option<&OneTimePreKey>,
        initiation: &InitiationMessage,
        remote_address: RemoteAddress,
    ) -> Result<SessionSeed, Error> {
        if initiation.signed_pre_key_id != signed_pre_key.key_id() {
            return Err(Error::SignedPreKeyNotFound(initiation.signed_pre_key_id));
        }
        match (initiation.pre_key_id, one_time_pre_key) {
            (Some(expected), Some(pre_key)) if pre_key.key_id() != expected => {
                return Err(Error::PreKeyNotFound(expected));
            }
            (Some(expected), None) => return Err(Error::PreKeyNotFound(expected)),
            (None, Some(_)) => {
                return Err(Error::InvalidKey(
                    "initiation does not name a one-time pre-key".to_string(),
                ));
            }
            _ => {}
        }
        self.provider.validate_public_key(&initiation.identity_key)?;
        self.provider.validate_public_key(&initiation.ephemeral_key)?;

        // DH1 = DH(SPK, IK_remote)
        let dh1 = self.provider.diffie_hellman(
            signed_pre_key.key_pair().private_key(),
            &initiation.identity_key,
        )?;
        // DH2 = DH(IK, EK)
        let dh2 = self
            .provider
            .diffie_hellman(local_identity.private_key(), &initiation.ephemeral_key)?;
        // DH3 = DH(SPK, EK)
        let dh3 = self.provider.diffie_hellman(
            signed_pre_key.key_pair().private_key(),
            &initiation.ephemeral_key,
        )?;
        // DH4 = DH(OPK, EK)
        let dh4 = match one_time_pre_key {
            Some(pre_key) => Some(self.provider.diffie_hellman(
                pre_key.key_pair().private_key(),
                &initiation.ephemeral_key,
            )?),
            None => None,
        };

        let dh4 = dh4.as_ref().map(|dh4| dh4.as_slice());
        let shared_secret = self.calculate_shared_secret(&dh1, &dh2, &dh3, dh4)?;

        info!(
            remote = %remote_address,
            signed_pre_key_id = %signed_pre_key.key_id(),
            one_time_pre_key = one_time_pre_key.is_some(),
            "accepted X3DH session"
        );

        Ok(SessionSeed {
            shared_secret,
            remote_address,
            used_pre_key_id: initiation.pre_key_id,
            signed_pre_key_id: signed_pre_key.key_id(),
            ephemeral_key: initiation.ephemeral_key.clone(),
            local_identity_key: local_identity.public_key().to_vec(),
            remote_identity_key: initiation.identity_key.clone(),
            role: Role::Responder,
        })
    }

    fn check_bundle_key(&self, public_key: &[u8], what: &str) -> Result<(), Error> {
        self.provider
            .validate_public_key(public_key)
            .map_err(|err| Error::InvalidBundleInput(format!("{what}: {err}")))
    }

    /// SK = HKDF(F || DH1 || DH2 || DH3 [|| DH4]) with a zero salt.
    fn calculate_shared_secret(
        &self,
        dh1: &[u8],
        dh2: &[u8],
        dh3: &[u8],
        dh4: Option<&[u8]>,
    ) -> Result<Zeroizing<Vec<u8>>, Error> {
        let mut key_material = Zeroizing::new(Vec::with_capacity(5 * 32));
        key_material.extend_from_slice(&DOMAIN_SEPARATOR);
        key_material.extend_from_slice(dh1);
        key_material.extend_from_slice(dh2);
        key_material.extend_from_slice(dh3);
        if let Some(dh4) = dh4 {
            key_material.extend_from_slice(dh4);
        }

        self.provider
            .derive_key(&key_material, &self.info, SHARED_SECRET_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KeyPair;
    use crate::crypto::Curve25519Provider;

    struct Party {
        identity: IdentityKeyPair,
        signed_pre_key: SignedPreKey,
        one_time_pre_key: OneTimePreKey,
    }

    fn party(provider: &dyn CryptoProvider) -> Party {
        let identity = IdentityKeyPair::new(provider.generate_key_pair().unwrap());
        let spk_pair = provider.generate_key_pair().unwrap();
        let signature = provider
            .sign(identity.private_key(), spk_pair.public_key())
            .unwrap();

        Party {
            signed_pre_key: SignedPreKey::new(KeyId::new(3).unwrap(), spk_pair, signature, 0),
            one_time_pre_key: OneTimePreKey::new(
                KeyId::new(7).unwrap(),
                provider.generate_key_pair().unwrap(),
            ),
            identity,
        }
    }

    fn x3dh(info: &[u8]) -> X3DH {
        X3DH::new(info, Arc::new(Curve25519Provider::new()))
    }

    fn bob() -> RemoteAddress {
        RemoteAddress::new("bob", 1)
    }

    #[test]
    fn test_x3dh_key_agreement() {
        let provider = Curve25519Provider::new();
        let alice = party(&provider);
        let bob_keys = party(&provider);
        let bundle = assemble_bundle(
            &bob_keys.identity,
            &bob_keys.signed_pre_key,
            Some(&bob_keys.one_time_pre_key),
        )
        .unwrap();

        let x3dh = x3dh(b"Test-Protocol-Info");
        let alice_seed = x3dh
            .initiate_session(&alice.identity, &bundle, bob())
            .unwrap();
        let initiation = alice_seed.initiation_message().unwrap();
        assert_eq!(initiation.pre_key_id, Some(KeyId::new(7).unwrap()));

        let bob_seed = x3dh
            .accept_session(
                &bob_keys.identity,
                &bob_keys.signed_pre_key,
                Some(&bob_keys.one_time_pre_key),
                &initiation,
                RemoteAddress::new("alice", 1),
            )
            .unwrap();

        assert_eq!(alice_seed.shared_secret(), bob_seed.shared_secret());
        assert_eq!(alice_seed.shared_secret().len(), SHARED_SECRET_SIZE);
        assert_eq!(alice_seed.associated_data(), bob_seed.associated_data());
        assert_eq!(alice_seed.session_id(), bob_seed.session_id());
        assert!(bob_seed.initiation_message().is_none());
    }

    #[test]
    fn test_x3dh_agreement_without_one_time_key() {
        let provider = Curve25519Provider::new();
        let alice = party(&provider);
        let bob_keys = party(&provider);
        let bundle =
            assemble_bundle(&bob_keys.identity, &bob_keys.signed_pre_key, None).unwrap();

        let x3dh = x3dh(b"Test-Protocol-Info");
        let alice_seed = x3dh
            .initiate_session(&alice.identity, &bundle, bob())
            .unwrap();
        assert_eq!(alice_seed.used_pre_key_id(), None);

        let bob_seed = x3dh
            .accept_session(
                &bob_keys.identity,
                &bob_keys.signed_pre_key,
                None,
                &alice_seed.initiation_message().unwrap(),
                RemoteAddress::new("alice", 1),
            )
            .unwrap();

        assert_eq!(alice_seed.shared_secret(), bob_seed.shared_secret());
    }

    #[test]
    fn test_protocol_info_separates_secrets() {
        let provider = Curve25519Provider::new();
        let alice = party(&provider);
        let bob_keys = party(&provider);
        let bundle =
            assemble_bundle(&bob_keys.identity, &bob_keys.signed_pre_key, None).unwrap();
        let initiation = x3dh(b"Protocol-Info-1")
            .initiate_session(&alice.identity, &bundle, bob())
            .unwrap()
            .initiation_message()
            .unwrap();

        let accept = |info: &[u8]| {
            x3dh(info)
                .accept_session(
                    &bob_keys.identity,
                    &bob_keys.signed_pre_key,
                    None,
                    &initiation,
                    RemoteAddress::new("alice", 1),
                )
                .unwrap()
        };

        assert_ne!(
            accept(b"Protocol-Info-1").shared_secret(),
            accept(b"Protocol-Info-2").shared_secret()
        );
    }

    #[test]
    fn test_forged_signed_pre_key_is_rejected() {
        let provider = Curve25519Provider::new();
        let alice = party(&provider);
        let bob_keys = party(&provider);
        let mallory = party(&provider);

        let mut bundle =
            assemble_bundle(&bob_keys.identity, &bob_keys.signed_pre_key, None).unwrap();
        bundle.signed_pre_key.public_key = mallory.signed_pre_key.public_key().to_vec();

        assert_eq!(
            x3dh(b"info").initiate_session(&alice.identity, &bundle, bob()),
            Err(Error::SignatureVerification)
        );
    }

    #[test]
    fn test_malformed_bundle_key_is_rejected() {
        let provider = Curve25519Provider::new();
        let alice = party(&provider);
        let bob_keys = party(&provider);

        let mut bundle =
            assemble_bundle(&bob_keys.identity, &bob_keys.signed_pre_key, None).unwrap();
        bundle.identity_key.truncate(31);

        assert!(matches!(
            x3dh(b"info").initiate_session(&alice.identity, &bundle, bob()),
            Err(Error::InvalidBundleInput(_))
        ));
    }

    #[test]
    fn test_mismatched_initiation_is_rejected() {
        let provider = Curve25519Provider::new();
        let bob_keys = party(&provider);
        let initiation = InitiationMessage {
            identity_key: provider.generate_key_pair().unwrap().public_key().to_vec(),
            ephemeral_key: provider.generate_key_pair().unwrap().public_key().to_vec(),
            signed_pre_key_id: KeyId::new(3).unwrap(),
            pre_key_id: Some(KeyId::new(8).unwrap()),
        };
        let accept = |spk: &SignedPreKey, otpk: Option<&OneTimePreKey>, msg: &InitiationMessage| {
            x3dh(b"info").accept_session(
                &bob_keys.identity,
                spk,
                otpk,
                msg,
                RemoteAddress::new("alice", 1),
            )
        };

        assert_eq!(
            accept(&bob_keys.signed_pre_key, Some(&bob_keys.one_time_pre_key), &initiation),
            Err(Error::PreKeyNotFound(KeyId::new(8).unwrap()))
        );
        assert_eq!(
            accept(&bob_keys.signed_pre_key, None, &initiation),
            Err(Error::PreKeyNotFound(KeyId::new(8).unwrap()))
        );

        let other_spk = SignedPreKey::new(
            KeyId::new(4).unwrap(),
            KeyPair::new(vec![0; 32], vec![1; 32]),
            vec![0; 64],
            0,
        );
        assert_eq!(
            accept(&other_spk, None, &initiation),
            Err(Error::SignedPreKeyNotFound(KeyId::new(3).unwrap()))
        );
    }

    #[test]
    fn test_seed_debug_hides_secret() {
        let provider = Curve25519Provider::new();
        let alice = party(&provider);
        let bob_keys = party(&provider);
        let bundle =
            assemble_bundle(&bob_keys.identity, &bob_keys.signed_pre_key, None).unwrap();

        let seed = x3dh(b"info")
            .initiate_session(&alice.identity, &bundle, bob())
            .unwrap();
        let rendered = format!("{seed:?}");

        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains(&format!("{:?}", seed.shared_secret())));
    }
}
