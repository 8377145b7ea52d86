//! Signing keypair lifecycle — load, generate-if-absent, persist, rotate.
//!
//! The proxy owns exactly one RSA keypair at a time, persisted as a
//! PKCS#8 PEM file readable only by the owning user. The private half never
//! leaves the process; relying parties fetch the public half over pinned TLS
//! (see [`crate::assertion::fetch`]).
//!
//! # Write ordering invariant
//!
//! The key file is created with placeholder content, its permissions are
//! tightened to `0600`, and only then is the PEM body written. Key material
//! is never on disk while the file is world-readable.

use std::fs;
use std::path::{Path, PathBuf};

use rsa::RsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rsa::rand_core::OsRng;
use tracing::info;

use crate::{Error, Result};

/// RSA modulus size for generated signing keys.
const KEY_BITS: usize = 2048;

/// Owns the on-disk private signing key.
#[derive(Debug, Clone)]
pub struct KeyStore {
    path: PathBuf,
}

impl KeyStore {
    /// Create a key store backed by the given file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The path of the persisted key file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the signing key from disk.
    ///
    /// # Errors
    ///
    /// `Error::KeyNotFound` if no file exists at the configured path,
    /// `Error::KeyParse` if the file content is not a valid PKCS#8 PEM key.
    pub fn load(&self) -> Result<RsaPrivateKey> {
        if !self.path.exists() {
            return Err(Error::KeyNotFound);
        }
        let pem = fs::read_to_string(&self.path)?;
        RsaPrivateKey::from_pkcs8_pem(&pem).map_err(|e| Error::KeyParse(e.to_string()))
    }

    /// Load the signing key, generating and persisting a fresh one if none
    /// exists yet.
    ///
    /// A corrupt key file is surfaced as `Error::KeyParse`, never silently
    /// regenerated: an operator must decide whether to restore or rotate.
    pub fn ensure_key(&self) -> Result<RsaPrivateKey> {
        match self.load() {
            Ok(key) => Ok(key),
            Err(Error::KeyNotFound) => {
                info!(path = %self.path.display(), "No signing key found, generating");
                let key = generate_key()?;
                self.write_key(&key)?;
                Ok(key)
            }
            Err(e) => Err(e),
        }
    }

    /// Erase the persisted key from the filesystem.
    ///
    /// The next [`KeyStore::ensure_key`] call produces a different keypair;
    /// this is the rotation mechanism.
    pub fn remove_key(&self) -> Result<()> {
        fs::remove_file(&self.path)?;
        info!(path = %self.path.display(), "Signing key removed");
        Ok(())
    }

    /// Persist the key with the hardened write ordering described in the
    /// module docs.
    fn write_key(&self, key: &RsaPrivateKey) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        // Create the file before any key material exists in it.
        fs::write(&self.path, "\n")?;

        // Tighten permissions while the file still holds the placeholder.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }

        // Only now is it safe to deposit the key.
        let pem = key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| Error::Crypto(e.to_string()))?;
        fs::write(&self.path, pem.as_bytes())?;

        info!(path = %self.path.display(), "Signing key persisted");
        Ok(())
    }
}

/// Generate a fresh 2048-bit RSA keypair from the process CSPRNG.
fn generate_key() -> Result<RsaPrivateKey> {
    RsaPrivateKey::new(&mut OsRng, KEY_BITS).map_err(|e| Error::Crypto(e.to_string()))
}
