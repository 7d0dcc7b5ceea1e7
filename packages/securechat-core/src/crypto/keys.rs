//! # Identity Keys
//!
//! Long-lived per-user keypair used only to wrap and unwrap session keys.
//!
//! ## Key Format
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      IDENTITY KEY SERIALIZATION                         │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  X25519 keypair, exported as an RFC 8037 OKP JSON Web Key:             │
//! │                                                                         │
//! │  Public half (published to the user directory):                        │
//! │  { "kty": "OKP", "crv": "X25519", "x": "<base64url, 32 bytes>" }       │
//! │                                                                         │
//! │  Private half (local key store only, never transmitted):               │
//! │  { "kty": "OKP", "crv": "X25519", "x": "...", "d": "<base64url>" }     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only OKP/X25519 keys are accepted. A directory entry carrying an RSA JWK
//! (`"kty": "RSA"`) fails to import with [`Error::KeyFormat`].

use std::fmt;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as B64URL, Engine as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::provider::{random_array, CryptoProvider};
use crate::error::{Error, Result};

/// JWK key type for octet key pairs
pub const JWK_KEY_TYPE: &str = "OKP";

/// JWK curve name for X25519
pub const JWK_CURVE: &str = "X25519";

/// Length of X25519 public and private keys in bytes
pub const IDENTITY_KEY_SIZE: usize = 32;

/// JSON Web Key (RFC 7517 / RFC 8037) for an X25519 key.
///
/// `d` is present only for private keys. It is zeroized on drop and
/// redacted from `Debug` output.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Jwk {
    /// Key type, always `"OKP"`
    pub kty: String,
    /// Curve, always `"X25519"`
    pub crv: String,
    /// Public key, base64url without padding
    pub x: String,
    /// Private key, base64url without padding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
}

impl Jwk {
    /// Whether this JWK carries private key material
    pub fn is_private(&self) -> bool {
        self.d.is_some()
    }

    /// Serialize to a JSON string
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse from a JSON string
    ///
    /// Malformed JSON is a key format error, not a serialization error,
    /// since the input is a key.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::KeyFormat(format!("Invalid JWK JSON: {}", e)))
    }

    fn check_header(&self) -> Result<()> {
        if self.kty != JWK_KEY_TYPE {
            return Err(Error::KeyFormat(format!("Unsupported kty '{}'", self.kty)));
        }
        if self.crv != JWK_CURVE {
            return Err(Error::KeyFormat(format!("Unsupported crv '{}'", self.crv)));
        }
        Ok(())
    }
}

impl fmt::Debug for Jwk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Jwk")
            .field("kty", &self.kty)
            .field("crv", &self.crv)
            .field("x", &self.x)
            .field("d", &self.d.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Drop for Jwk {
    fn drop(&mut self) {
        if let Some(d) = self.d.as_mut() {
            d.zeroize();
        }
    }
}

/// Public half of an identity keypair
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicIdentityKey(X25519PublicKey);

impl PublicIdentityKey {
    /// Create from raw bytes
    ///
    /// Rejects low-order points, which would make every wrap to this key
    /// derive a predictable secret.
    pub fn from_bytes(bytes: [u8; IDENTITY_KEY_SIZE]) -> Result<Self> {
        let key = X25519PublicKey::from(bytes);
        let probe = StaticSecret::from([0x5au8; IDENTITY_KEY_SIZE]);
        if !probe.diffie_hellman(&key).was_contributory() {
            return Err(Error::KeyFormat("Public key is a low-order point".into()));
        }
        Ok(Self(key))
    }

    /// Get the raw public key bytes
    pub fn to_bytes(&self) -> [u8; IDENTITY_KEY_SIZE] {
        self.0.to_bytes()
    }

    /// SHA-256 fingerprint of the public key, hex encoded
    ///
    /// Safe to display and compare out of band.
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(self.0.as_bytes()))
    }

    pub(crate) fn as_x25519(&self) -> &X25519PublicKey {
        &self.0
    }
}

impl fmt::Debug for PublicIdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicIdentityKey({}…)", &self.fingerprint()[..16])
    }
}

/// Private half of an identity keypair
///
/// Zeroized when dropped. Never serialized except into the local key store.
#[derive(Clone, ZeroizeOnDrop)]
pub struct PrivateIdentityKey {
    #[zeroize(skip)] // x25519_dalek handles its own zeroization
    secret: StaticSecret,
}

impl PrivateIdentityKey {
    /// Create from raw secret bytes
    pub fn from_bytes(bytes: &[u8; IDENTITY_KEY_SIZE]) -> Self {
        Self {
            secret: StaticSecret::from(*bytes),
        }
    }

    /// Get the secret key bytes (for key store persistence only)
    pub fn secret_bytes(&self) -> Zeroizing<[u8; IDENTITY_KEY_SIZE]> {
        Zeroizing::new(self.secret.to_bytes())
    }

    /// Derive the matching public key
    pub fn public_key(&self) -> PublicIdentityKey {
        PublicIdentityKey(X25519PublicKey::from(&self.secret))
    }

    /// X25519 Diffie-Hellman with a peer public key
    ///
    /// A non-contributory result (low-order peer key) is rejected.
    pub(crate) fn diffie_hellman(
        &self,
        their_public: &X25519PublicKey,
    ) -> Result<Zeroizing<[u8; 32]>> {
        let shared = self.secret.diffie_hellman(their_public);
        if !shared.was_contributory() {
            return Err(Error::KeyExchange("Non-contributory key agreement".into()));
        }
        Ok(Zeroizing::new(shared.to_bytes()))
    }
}

impl fmt::Debug for PrivateIdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateIdentityKey(<redacted>)")
    }
}

/// An identity keypair
#[derive(Clone, Debug)]
pub struct IdentityKeyPair {
    /// Public half, shared through the user directory
    pub public: PublicIdentityKey,
    /// Private half, kept on this device
    pub private: PrivateIdentityKey,
}

/// Generate a new identity keypair
///
/// Fails only if the provider cannot produce randomness.
pub fn generate_identity_keypair(provider: &dyn CryptoProvider) -> Result<IdentityKeyPair> {
    let seed = Zeroizing::new(random_array::<IDENTITY_KEY_SIZE>(provider)?);
    let private = PrivateIdentityKey::from_bytes(&seed);
    let public = private.public_key();
    Ok(IdentityKeyPair { public, private })
}

/// Export a public key as a JWK
pub fn export_public_key(key: &PublicIdentityKey) -> Jwk {
    Jwk {
        kty: JWK_KEY_TYPE.to_string(),
        crv: JWK_CURVE.to_string(),
        x: B64URL.encode(key.to_bytes()),
        d: None,
    }
}

/// Import a public key from a JWK
///
/// A private JWK is accepted; only its public component is used.
pub fn import_public_key(jwk: &Jwk) -> Result<PublicIdentityKey> {
    jwk.check_header()?;
    let bytes = decode_key_component(&jwk.x, "x")?;
    PublicIdentityKey::from_bytes(*bytes)
}

/// Export a private key as a JWK (includes the public component)
pub fn export_private_key(key: &PrivateIdentityKey) -> Jwk {
    let mut jwk = export_public_key(&key.public_key());
    jwk.d = Some(B64URL.encode(key.secret_bytes().as_slice()));
    jwk
}

/// Import a private key from a JWK
///
/// The `x` component must match the public key derived from `d`.
pub fn import_private_key(jwk: &Jwk) -> Result<PrivateIdentityKey> {
    jwk.check_header()?;
    let d = jwk
        .d
        .as_deref()
        .ok_or_else(|| Error::KeyFormat("JWK has no private component".into()))?;
    let secret = decode_key_component(d, "d")?;
    let private = PrivateIdentityKey::from_bytes(&secret);

    let declared = decode_key_component(&jwk.x, "x")?;
    if *declared != private.public_key().to_bytes() {
        return Err(Error::KeyFormat("JWK public component does not match private key".into()));
    }
    Ok(private)
}

fn decode_key_component(value: &str, name: &str) -> Result<Zeroizing<[u8; IDENTITY_KEY_SIZE]>> {
    let raw = Zeroizing::new(
        B64URL
            .decode(value)
            .map_err(|e| Error::KeyFormat(format!("JWK '{}' is not base64url: {}", name, e)))?,
    );
    if raw.len() != IDENTITY_KEY_SIZE {
        return Err(Error::KeyFormat(format!(
            "JWK '{}' must be {} bytes, got {}",
            name,
            IDENTITY_KEY_SIZE,
            raw.len()
        )));
    }
    let mut out = Zeroizing::new([0u8; IDENTITY_KEY_SIZE]);
    out.copy_from_slice(&raw);
    Ok(out)
}

// ============================================================================
// TESTS
// ============================================================================
