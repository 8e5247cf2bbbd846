//! Local signing key
//!
//! The key is injected through the environment only. It never appears in
//! the config file, in logs, or in any serialized state.

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use thiserror::Error;

pub const PRIVATE_KEY_ENV: &str = "ANCHORBOT_PRIVATE_KEY";

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("{} is not set", PRIVATE_KEY_ENV)]
    Missing,

    #[error("Invalid private key in ANCHORBOT_PRIVATE_KEY: {0}")]
    Invalid(String),
}

/// Wallet wrapping the local signer.
#[derive(Clone)]
pub struct Wallet {
    signer: PrivateKeySigner,
}

impl Wallet {
    pub fn from_env() -> Result<Self, WalletError> {
        let raw = std::env::var(PRIVATE_KEY_ENV).map_err(|_| WalletError::Missing)?;
        Self::from_key(raw.trim())
    }

    pub fn from_key(key: &str) -> Result<Self, WalletError> {
        let signer: PrivateKeySigner = key
            .parse()
            .map_err(|e| WalletError::Invalid(format!("{e}")))?;
        Ok(Self { signer })
    }

    /// Throwaway wallet for paper trading when no key is configured.
    pub fn random() -> Self {
        Self {
            signer: PrivateKeySigner::random(),
        }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn signer(&self) -> &PrivateKeySigner {
        &self.signer
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never expose key material, even in debug output.
        f.debug_struct("Wallet")
            .field("address", &self.signer.address())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known anvil test key #0.
    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn parses_key_and_derives_address() {
        let wallet = Wallet::from_key(TEST_KEY).unwrap();
        assert_eq!(
            format!("{:#x}", wallet.address()),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
    }

    #[test]
    fn rejects_garbage_key() {
        assert!(matches!(
            Wallet::from_key("not-a-key"),
            Err(WalletError::Invalid(_))
        ));
    }

    #[test]
    fn invalid_key_error_names_the_env_var() {
        let err = Wallet::from_key("not-a-key").unwrap_err();
        assert!(err.to_string().contains(PRIVATE_KEY_ENV));
    }

    #[test]
    fn debug_output_hides_key_material() {
        let wallet = Wallet::from_key(TEST_KEY).unwrap();
        let debug = format!("{wallet:?}");
        assert!(!debug.contains("ac0974"));
        assert!(debug.contains("0xf39F") || debug.to_lowercase().contains("0xf39f"));
    }
}
