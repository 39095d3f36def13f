//! Key material for upgraded server nodes.
//!
//! Each migrated node gets a brand new traffic key pair (NaCl `box` keys,
//! i.e. X25519) and keeps its existing WireGuard private key, which the
//! legacy server stored separately in the `serverconf` table.

use std::fmt;
use std::path::Path;

use curve25519_dalek::montgomery::MontgomeryPoint;
use legacy_store::{lookup_tunnel_key, StoreError};
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use serde::Deserialize;
use thiserror::Error;

/// Length of both halves of a traffic key pair.
pub const KEY_LEN: usize = 32;

/// Errors raised while producing or relocating key material.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("failed to generate traffic keys: {0}")]
    Generation(#[source] rand::Error),
    #[error("failed to serialize traffic {half} key: {reason}")]
    Serialization {
        half: &'static str,
        reason: &'static str,
    },
    #[error("failed to look up tunnel key: {0}")]
    TunnelKeyLookup(#[from] StoreError),
    #[error("tunnel key record for node {id} is malformed: {source}")]
    TunnelKeyDecode {
        id: String,
        source: serde_json::Error,
    },
    #[error("tunnel key record for node {id} has an empty private key")]
    TunnelKeyEmpty { id: String },
}

/// A freshly generated traffic key pair.
pub struct TrafficKeyPair {
    public: [u8; KEY_LEN],
    private: [u8; KEY_LEN],
}

impl fmt::Debug for TrafficKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrafficKeyPair")
            .field("public", &self.public)
            .field("private", &"<redacted>")
            .finish()
    }
}

/// Canonical byte encodings of a [`TrafficKeyPair`].
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedTrafficKeys {
    pub public: Vec<u8>,
    pub private: Vec<u8>,
}

impl fmt::Debug for EncodedTrafficKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedTrafficKeys")
            .field("public", &self.public)
            .field("private", &"<redacted>")
            .finish()
    }
}

impl TrafficKeyPair {
    pub fn public(&self) -> &[u8; KEY_LEN] {
        &self.public
    }

    /// Encode both halves, refusing degenerate keys.
    pub fn encode(&self) -> Result<EncodedTrafficKeys, KeyError> {
        if self.private.iter().all(|b| *b == 0) {
            return Err(KeyError::Serialization {
                half: "private",
                reason: "all-zero scalar",
            });
        }
        // Clamping keeps real scalars off the small subgroup, so a zero
        // u-coordinate only shows up for corrupted input.
        if self.public.iter().all(|b| *b == 0) {
            return Err(KeyError::Serialization {
                half: "public",
                reason: "low-order point",
            });
        }

        Ok(EncodedTrafficKeys {
            public: self.public.to_vec(),
            private: self.private.to_vec(),
        })
    }
}

/// Generate a traffic key pair from the operating system CSPRNG.
pub fn generate_traffic_keys() -> Result<TrafficKeyPair, KeyError> {
    generate_traffic_keys_with(&mut OsRng)
}

/// Generate a traffic key pair from `rng`.
pub fn generate_traffic_keys_with<R>(rng: &mut R) -> Result<TrafficKeyPair, KeyError>
where
    R: RngCore + CryptoRng + ?Sized,
{
    let mut private = [0u8; KEY_LEN];
    rng.try_fill_bytes(&mut private)
        .map_err(KeyError::Generation)?;
    let public = MontgomeryPoint::mul_base_clamped(private).to_bytes();

    Ok(TrafficKeyPair { public, private })
}

#[derive(Deserialize)]
struct ServerConfKey {
    #[serde(rename = "PrivateKey", default)]
    private_key: String,
}

/// Fetch and decode a node's WireGuard private key from the legacy store.
///
/// `Ok(None)` means the store has no key row for this node.
pub fn tunnel_private_key(store_path: &Path, id: &str) -> Result<Option<Vec<u8>>, KeyError> {
    match lookup_tunnel_key(store_path, id)? {
        Some(blob) => decode_tunnel_key(id, &blob).map(Some),
        None => Ok(None),
    }
}

/// Pull the private key out of a `serverconf` value.
pub fn decode_tunnel_key(id: &str, blob: &[u8]) -> Result<Vec<u8>, KeyError> {
    let key: ServerConfKey =
        serde_json::from_slice(blob).map_err(|source| KeyError::TunnelKeyDecode {
            id: id.to_string(),
            source,
        })?;

    if key.private_key.trim().is_empty() {
        return Err(KeyError::TunnelKeyEmpty { id: id.to_string() });
    }
    Ok(key.private_key.into_bytes())
}
