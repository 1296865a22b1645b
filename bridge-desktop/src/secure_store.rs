//! OS keychain token storage

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::SecureStore,
};
use keyring::Entry;
use tracing::debug;

const DEFAULT_SERVICE: &str = "playlist-sync";

/// [`SecureStore`] backed by the platform keychain (Keychain, Credential
/// Manager, Secret Service).
///
/// Token keys of the form `tokens:<user>:<provider>` become one keychain
/// entry per provider, with the user id as the account name. Any other key
/// is stored verbatim under the base service. Values must be UTF-8, which
/// the serialized tokens always are.
pub struct KeyringSecureStore {
    service_name: String,
}

impl KeyringSecureStore {
    pub fn new() -> Self {
        Self::with_service_name(DEFAULT_SERVICE)
    }

    pub fn with_service_name(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    /// Keychain `(service, account)` for a store key
    fn locate(&self, key: &str) -> (String, String) {
        let token_key = key
            .strip_prefix("tokens:")
            .and_then(|rest| rest.rsplit_once(':'))
            .filter(|(user, provider)| !user.is_empty() && !provider.is_empty());

        match token_key {
            Some((user, provider)) => {
                (format!("{}.{}", self.service_name, provider), user.to_string())
            }
            None => (self.service_name.clone(), key.to_string()),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry> {
        let (service, account) = self.locate(key);
        Entry::new(&service, &account).map_err(keyring_error)
    }
}

impl Default for KeyringSecureStore {
    fn default() -> Self {
        Self::new()
    }
}

fn keyring_error(e: keyring::Error) -> BridgeError {
    BridgeError::OperationFailed(format!("Keyring error: {}", e))
}

#[async_trait]
impl SecureStore for KeyringSecureStore {
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()> {
        let secret = std::str::from_utf8(value).map_err(|e| {
            BridgeError::OperationFailed(format!("Secret for {key} is not UTF-8: {e}"))
        })?;

        self.entry(key)?
            .set_password(secret)
            .map_err(keyring_error)?;

        debug!(key, "Stored secret in keyring");
        Ok(())
    }

    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.entry(key)?.get_password() {
            Ok(secret) => Ok(Some(secret.into_bytes())),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(keyring_error(e)),
        }
    }

    async fn delete_secret(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => {
                debug!(key, "Deleted secret from keyring");
                Ok(())
            }
            Err(e) => Err(keyring_error(e)),
        }
    }
}
