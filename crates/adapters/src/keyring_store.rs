use kozani_core::auth::{CredentialError, CredentialStore, Credentials};

pub const DEFAULT_SERVICE: &str = "kozani";
pub const DEFAULT_ACCOUNT: &str = "github";

/// Keeps the GitHub token in the OS keychain instead of `credentials.json`.
#[derive(Debug, Clone)]
pub struct KeyringCredentialStore {
    service: String,
    account: String,
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE, DEFAULT_ACCOUNT)
    }
}

impl KeyringCredentialStore {
    #[must_use]
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }
}

#[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
impl KeyringCredentialStore {
    fn entry(&self) -> Result<keyring::Entry, CredentialError> {
        keyring::Entry::new(&self.service, &self.account).map_err(to_credential_error)
    }
}

#[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
impl CredentialStore for KeyringCredentialStore {
    fn load(&self) -> Result<Option<Credentials>, CredentialError> {
        let secret = match self.entry()?.get_password() {
            Ok(secret) => secret,
            Err(keyring::Error::NoEntry) => {
                tracing::debug!("no stored credentials found in keyring");
                return Ok(None);
            }
            Err(error) => return Err(to_credential_error(error)),
        };
        parse_secret(&secret).map(Some)
    }

    fn save(&self, credentials: &Credentials) -> Result<(), CredentialError> {
        let secret = serde_json::to_string(credentials)
            .map_err(|source| CredentialError::Serialize { source })?;
        self.entry()?
            .set_password(&secret)
            .map_err(to_credential_error)?;
        tracing::info!(service = %self.service, "saved credentials to keyring");
        Ok(())
    }

    fn clear(&self) -> Result<(), CredentialError> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(to_credential_error(error)),
        }
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
impl CredentialStore for KeyringCredentialStore {
    fn load(&self) -> Result<Option<Credentials>, CredentialError> {
        Err(unsupported())
    }

    fn save(&self, _credentials: &Credentials) -> Result<(), CredentialError> {
        Err(unsupported())
    }

    fn clear(&self) -> Result<(), CredentialError> {
        Err(unsupported())
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
fn unsupported() -> CredentialError {
    CredentialError::Backend("keyring is not available on this platform".to_string())
}

#[cfg_attr(
    not(any(target_os = "linux", target_os = "macos", target_os = "windows")),
    allow(dead_code)
)]
fn parse_secret(secret: &str) -> Result<Credentials, CredentialError> {
    serde_json::from_str(secret)
        .map_err(|error| CredentialError::Backend(format!("malformed keyring secret: {error}")))
}

#[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
fn to_credential_error(error: keyring::Error) -> CredentialError {
    CredentialError::Backend(error.to_string())
}
