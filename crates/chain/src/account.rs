//! Aptos account derived from an Ed25519 private key.

use ed25519_dalek::{Signer, SigningKey};
use moverelay_core::error::ChainError;
use sha3::{Digest, Sha3_256};

/// Authentication-key scheme byte for single Ed25519 keys.
const ED25519_SCHEME: u8 = 0x00;

/// AIP-80 prefix some wallets export keys with.
const AIP80_PREFIX: &str = "ed25519-priv-";

/// A signing account. The key never leaves this struct.
pub struct AptosAccount {
    signing_key: SigningKey,
    address: String,
}

impl AptosAccount {
    /// Parse a private key given as hex (with or without `0x`) or in the
    /// AIP-80 `ed25519-priv-0x…` form.
    pub fn from_private_key(raw: &str) -> Result<Self, ChainError> {
        let trimmed = raw.trim();
        let without_prefix = trimmed.strip_prefix(AIP80_PREFIX).unwrap_or(trimmed);
        let hex_part = without_prefix
            .strip_prefix("0x")
            .unwrap_or(without_prefix);

        let bytes = hex::decode(hex_part)
            .map_err(|e| ChainError::new(format!("Invalid private key hex: {e}")))?;
        let secret: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            ChainError::new(format!(
                "Invalid private key length: expected 32 bytes, got {}",
                bytes.len()
            ))
        })?;

        let signing_key = SigningKey::from_bytes(&secret);
        let address = derive_address(signing_key.verifying_key().as_bytes());
        Ok(Self {
            signing_key,
            address,
        })
    }

    /// `0x`-prefixed account address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// `0x`-prefixed hex of the Ed25519 public key.
    pub fn public_key_hex(&self) -> String {
        format!("0x{}", hex::encode(self.signing_key.verifying_key().as_bytes()))
    }

    /// Sign `message` and return the `0x`-prefixed hex signature.
    pub fn sign_hex(&self, message: &[u8]) -> String {
        let signature = self.signing_key.sign(message);
        format!("0x{}", hex::encode(signature.to_bytes()))
    }
}

impl std::fmt::Debug for AptosAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AptosAccount")
            .field("address", &self.address)
            .field("signing_key", &"[REDACTED]")
            .finish()
    }
}

/// Account address for a single-key Ed25519 account:
/// `sha3_256(public_key || 0x00)`.
pub fn derive_address(public_key: &[u8]) -> String {
    let mut hasher = Sha3_256::new();
    hasher.update(public_key);
    hasher.update([ED25519_SCHEME]);
    format!("0x{}", hex::encode(hasher.finalize()))
}
