//! Key source abstraction for loading storage key material at startup.

use crate::error::KeySourceError;
use crate::keys::StorageKeys;
use secrecy::{ExposeSecret, SecretString, SecretVec};

/// Default environment variable holding the storage public key PEM.
pub const PUBLIC_KEY_VAR: &str = "SEALROW_PUBLIC_KEY";

/// Default environment variable holding the storage private key PEM.
pub const PRIVATE_KEY_VAR: &str = "SEALROW_PRIVATE_KEY";

/// Default environment variable holding the hex-encoded digest pepper.
pub const PEPPER_VAR: &str = "SEALROW_DIGEST_PEPPER";

/// Supplies the service keypair and, optionally, a digest pepper.
///
/// Implementations are consulted once at startup; the returned material is
/// immutable for the lifetime of the service.
///
/// # Example
///
/// ```rust,ignore
/// use sealrow::key_source::KeySource;
///
/// struct VaultSource;
///
/// impl KeySource for VaultSource {
///     fn storage_keys(&self) -> Result<StorageKeys, KeySourceError> {
///         // Fetch PEMs from a secret store
///     }
/// }
/// ```
pub trait KeySource: Send + Sync {
    /// Loads the storage keypair.
    ///
    /// # Errors
    ///
    /// Returns `KeySourceError::Missing` if a key is not configured,
    /// `KeySourceError::Malformed` if it cannot be parsed and
    /// `KeySourceError::Mismatch` if the halves do not belong together.
    fn storage_keys(&self) -> Result<StorageKeys, KeySourceError>;

    /// Returns the pepper for keyed digests.
    ///
    /// # Returns
    ///
    /// Returns `None` if digests should be plain SHA-256.
    ///
    /// # Errors
    ///
    /// Returns `KeySourceError::Malformed` if a pepper is configured but
    /// unreadable.
    fn pepper(&self) -> Result<Option<SecretVec<u8>>, KeySourceError> {
        Ok(None)
    }
}

/// Key source over PEM text already held in memory.
pub struct PemKeySource {
    public_pem: SecretString,
    private_pem: SecretString,
    pepper: Option<SecretVec<u8>>,
}

impl PemKeySource {
    /// Creates a source from public and private PEM text.
    #[must_use]
    pub const fn new(public_pem: SecretString, private_pem: SecretString) -> Self {
        Self { public_pem, private_pem, pepper: None }
    }

    /// Sets the digest pepper.
    #[must_use]
    pub fn with_pepper(mut self, pepper: SecretVec<u8>) -> Self {
        self.pepper = Some(pepper);
        self
    }
}

impl KeySource for PemKeySource {
    fn storage_keys(&self) -> Result<StorageKeys, KeySourceError> {
        StorageKeys::from_pem(&self.public_pem, &self.private_pem)
    }

    fn pepper(&self) -> Result<Option<SecretVec<u8>>, KeySourceError> {
        Ok(self.pepper.as_ref().map(|p| SecretVec::new(p.expose_secret().clone())))
    }
}

/// Key source reading PEM text from environment variables.
///
/// The private key variable is required. When the public key variable is
/// unset, the public half is derived from the private key.
#[derive(Debug, Clone)]
pub struct EnvKeySource {
    public_var: String,
    private_var: String,
    pepper_var: String,
}

impl Default for EnvKeySource {
    fn default() -> Self {
        Self::new(PUBLIC_KEY_VAR, PRIVATE_KEY_VAR, PEPPER_VAR)
    }
}

impl EnvKeySource {
    /// Creates a source reading the given variable names.
    #[must_use]
    pub fn new(
        public_var: impl Into<String>,
        private_var: impl Into<String>,
        pepper_var: impl Into<String>,
    ) -> Self {
        Self {
            public_var: public_var.into(),
            private_var: private_var.into(),
            pepper_var: pepper_var.into(),
        }
    }

    fn read(var: &str) -> Option<SecretString> {
        std::env::var(var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            // Single-line env values often carry escaped newlines
            .map(|v| SecretString::new(v.replace("\\n", "\n")))
    }
}

impl KeySource for EnvKeySource {
    fn storage_keys(&self) -> Result<StorageKeys, KeySourceError> {
        let private = Self::read(&self.private_var)
            .ok_or_else(|| KeySourceError::Missing(self.private_var.clone()))?;
        match Self::read(&self.public_var) {
            Some(public) => StorageKeys::from_pem(&public, &private),
            None => StorageKeys::from_private_pem(&private),
        }
    }

    fn pepper(&self) -> Result<Option<SecretVec<u8>>, KeySourceError> {
        let Some(encoded) = Self::read(&self.pepper_var) else {
            return Ok(None);
        };
        hex::decode(encoded.expose_secret().trim())
            .map(|bytes| Some(SecretVec::new(bytes)))
            .map_err(|_| KeySourceError::Malformed(format!("{} is not hex", self.pepper_var)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::test_keys;

    // Each test uses its own variable names so parallel tests don't collide.
    fn env_source(prefix: &str) -> EnvKeySource {
        EnvKeySource::new(
            format!("{prefix}_PUBLIC"),
            format!("{prefix}_PRIVATE"),
            format!("{prefix}_PEPPER"),
        )
    }

    #[test]
    fn test_pem_source() {
        let keys = test_keys::storage();
        let source = PemKeySource::new(
            SecretString::new(keys.public_key_pem().unwrap()),
            keys.private_key_pem().unwrap(),
        );
        assert_eq!(source.storage_keys().unwrap().public_key(), keys.public_key());
        assert!(source.pepper().unwrap().is_none());
    }

    #[test]
    fn test_pem_source_pepper() {
        let keys = test_keys::storage();
        let source = PemKeySource::new(
            SecretString::new(keys.public_key_pem().unwrap()),
            keys.private_key_pem().unwrap(),
        )
        .with_pepper(SecretVec::new(vec![7u8; 32]));
        let pepper = source.pepper().unwrap().unwrap();
        assert_eq!(pepper.expose_secret(), &vec![7u8; 32]);
    }

    #[test]
    fn test_env_source_missing_private() {
        let source = env_source("SEALROW_TEST_MISSING");
        let result = source.storage_keys();
        assert!(matches!(result, Err(KeySourceError::Missing(ref v)) if v == "SEALROW_TEST_MISSING_PRIVATE"));
    }

    #[test]
    fn test_env_source_escaped_newlines() {
        let keys = test_keys::storage();
        let private = keys.private_key_pem().unwrap();
        let escaped = private.expose_secret().replace('\n', "\\n");
        std::env::set_var("SEALROW_TEST_ESCAPED_PRIVATE", escaped);

        let source = env_source("SEALROW_TEST_ESCAPED");
        assert_eq!(source.storage_keys().unwrap().public_key(), keys.public_key());
    }

    #[test]
    fn test_env_source_pepper() {
        std::env::set_var("SEALROW_TEST_PEPPER_PEPPER", "00ff10");
        let source = env_source("SEALROW_TEST_PEPPER");
        let pepper = source.pepper().unwrap().unwrap();
        assert_eq!(pepper.expose_secret(), &vec![0x00, 0xff, 0x10]);

        std::env::set_var("SEALROW_TEST_BADPEPPER_PEPPER", "xyz");
        let source = env_source("SEALROW_TEST_BADPEPPER");
        assert!(matches!(source.pepper(), Err(KeySourceError::Malformed(_))));
    }

    #[test]
    fn test_env_source_no_pepper() {
        let source = env_source("SEALROW_TEST_NOPEPPER");
        assert!(source.pepper().unwrap().is_none());
    }
}
