//! File-based key source for `SealRow`.
//!
//! Keys live in a directory supplied by configuration, never at a
//! hard-coded path.

#![warn(clippy::pedantic, clippy::nursery)]

use rand::rngs::OsRng;
use rand::RngCore;
use sealrow::error::KeySourceError;
use sealrow::key_source::KeySource;
use sealrow::keys::StorageKeys;
use secrecy::{ExposeSecret, SecretString, SecretVec};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use zeroize::Zeroizing;

/// File name of the storage public key.
pub const PUBLIC_KEY_FILE: &str = "public.pem";

/// File name of the storage private key.
pub const PRIVATE_KEY_FILE: &str = "private.pem";

/// File name of the digest pepper.
pub const PEPPER_FILE: &str = "pepper.key";

/// Size of a freshly generated pepper.
pub const PEPPER_SIZE: usize = 32;

/// File-based key source.
///
/// Keys are stored with the following structure:
/// ```text
/// keys/
/// ├── public.pem    (SPKI PEM)
/// ├── private.pem   (PKCS#8 PEM, 0600 permissions)
/// └── pepper.key    (optional, raw bytes, 0600 permissions)
/// ```
#[derive(Debug, Clone)]
pub struct FileKeySource {
    key_dir: PathBuf,
}

impl FileKeySource {
    /// Creates a new `FileKeySource`.
    ///
    /// # Arguments
    ///
    /// * `key_dir` - Directory containing key files
    ///
    /// # Errors
    ///
    /// Returns `KeySourceError::Missing` if the directory does not exist.
    pub fn new(key_dir: impl Into<PathBuf>) -> Result<Self, KeySourceError> {
        let key_dir = key_dir.into();
        if !key_dir.is_dir() {
            return Err(KeySourceError::Missing(format!(
                "key directory does not exist: {}",
                key_dir.display()
            )));
        }
        Ok(Self { key_dir })
    }

    /// Initializes a key directory with a fresh keypair and pepper.
    ///
    /// Nothing is written if any key file is already present. If a write
    /// fails midway, the files written so far are removed again.
    ///
    /// # Errors
    ///
    /// Returns `KeySourceError::Io` if the directory already holds a key file
    /// or cannot be written, and `KeySourceError::GenerationFailed` if key
    /// generation fails.
    pub fn init(key_dir: impl AsRef<Path>, bits: usize) -> Result<Self, KeySourceError> {
        let key_dir = key_dir.as_ref();
        fs::create_dir_all(key_dir)?;

        for name in [PRIVATE_KEY_FILE, PUBLIC_KEY_FILE, PEPPER_FILE] {
            let path = key_dir.join(name);
            if path.exists() {
                return Err(KeySourceError::Io(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("refusing to overwrite {}", path.display()),
                )));
            }
        }

        let keys = StorageKeys::generate(bits)?;
        let private_pem = keys.private_key_pem()?;
        let public_pem = keys.public_key_pem()?;
        let mut pepper = Zeroizing::new([0u8; PEPPER_SIZE]);
        OsRng.fill_bytes(pepper.as_mut());

        let files: [(&str, &[u8], bool); 3] = [
            (PRIVATE_KEY_FILE, private_pem.expose_secret().as_bytes(), true),
            (PUBLIC_KEY_FILE, public_pem.as_bytes(), false),
            (PEPPER_FILE, pepper.as_ref(), true),
        ];
        let mut written = Vec::with_capacity(files.len());
        for (name, contents, secret) in files {
            let path = key_dir.join(name);
            if let Err(e) = write_file(&path, contents, secret) {
                warn!(dir = %key_dir.display(), file = name, error = %e, "key directory init failed");
                for path in &written {
                    let _ = fs::remove_file(path);
                }
                return Err(e.into());
            }
            written.push(path);
        }

        info!(dir = %key_dir.display(), bits, "initialized key directory");
        Self::new(key_dir)
    }

    /// Returns the key directory.
    #[must_use]
    pub fn key_dir(&self) -> &Path {
        &self.key_dir
    }

    fn read_pem(&self, name: &str) -> Result<Option<SecretString>, KeySourceError> {
        match fs::read_to_string(self.key_dir.join(name)) {
            Ok(pem) => Ok(Some(SecretString::new(pem))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl KeySource for FileKeySource {
    fn storage_keys(&self) -> Result<StorageKeys, KeySourceError> {
        let private = self
            .read_pem(PRIVATE_KEY_FILE)?
            .ok_or_else(|| KeySourceError::Missing(PRIVATE_KEY_FILE.to_string()))?;
        match self.read_pem(PUBLIC_KEY_FILE)? {
            Some(public) => StorageKeys::from_pem(&public, &private),
            None => StorageKeys::from_private_pem(&private),
        }
    }

    fn pepper(&self) -> Result<Option<SecretVec<u8>>, KeySourceError> {
        match fs::read(self.key_dir.join(PEPPER_FILE)) {
            Ok(bytes) if bytes.is_empty() => {
                Err(KeySourceError::Malformed(format!("{PEPPER_FILE} is empty")))
            }
            Ok(bytes) => Ok(Some(SecretVec::new(bytes))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn write_file(path: &Path, contents: &[u8], secret: bool) -> io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(if secret { 0o600 } else { 0o644 });
    }
    #[cfg(not(unix))]
    let _ = secret;

    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}
