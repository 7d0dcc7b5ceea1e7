//! # Crypto Provider
//!
//! Randomness is an injected capability rather than a global. Every
//! component that needs fresh key material or nonces takes a
//! [`CryptoProvider`] so tests can swap in a deterministic source.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        PROVIDER INJECTION                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   SecureChatClient ──► KeyExchange ──► generate_session_key()           │
//! │          │                  │                wrap_session_key()         │
//! │          │                  │                                           │
//! │          └──────────────────┴──► Arc<dyn CryptoProvider>                │
//! │                                        │                                │
//! │                          ┌─────────────┴─────────────┐                  │
//! │                          ▼                           ▼                  │
//! │                 OsCryptoProvider          SeededCryptoProvider          │
//! │                 (production, OsRng)       (tests, reproducible)         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};

use crate::error::{Error, Result};

/// Source of cryptographically secure random bytes.
pub trait CryptoProvider: Send + Sync {
    /// Fill `dest` with random bytes.
    ///
    /// Fails with [`Error::RngFailed`] when the entropy source is unusable.
    fn fill_bytes(&self, dest: &mut [u8]) -> Result<()>;
}

/// Shared handle passed to component constructors.
pub type SharedProvider = Arc<dyn CryptoProvider>;

/// Draw a fixed-size random array from a provider.
pub fn random_array<const N: usize>(provider: &dyn CryptoProvider) -> Result<[u8; N]> {
    let mut out = [0u8; N];
    provider.fill_bytes(&mut out)?;
    Ok(out)
}

/// Provider backed by the operating system CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsCryptoProvider;

impl OsCryptoProvider {
    /// Shared handle to the OS provider.
    pub fn shared() -> SharedProvider {
        Arc::new(Self)
    }
}

impl CryptoProvider for OsCryptoProvider {
    fn fill_bytes(&self, dest: &mut [u8]) -> Result<()> {
        OsRng.try_fill_bytes(dest).map_err(|e| {
            tracing::error!("OS random number generator failed: {}", e);
            Error::RngFailed
        })
    }
}

/// Deterministic provider seeded from a `u64`.
///
/// Two providers built from the same seed emit the same byte stream.
/// Only meant for tests and reproducible demos; never use it for real keys.
pub struct SeededCryptoProvider {
    rng: Mutex<StdRng>,
}

impl SeededCryptoProvider {
    /// Create a provider from a seed
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Shared handle seeded from `seed`.
    pub fn shared(seed: u64) -> SharedProvider {
        Arc::new(Self::new(seed))
    }
}

impl CryptoProvider for SeededCryptoProvider {
    fn fill_bytes(&self, dest: &mut [u8]) -> Result<()> {
        self.rng.lock().fill_bytes(dest);
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
