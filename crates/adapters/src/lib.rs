pub mod github;
pub mod keyring_store;
pub mod metadata;
pub mod mysql;
pub mod postgres;

pub use github::GithubDeviceFlow;
pub use keyring_store::KeyringCredentialStore;
pub use metadata::SqlMetadataSource;
