//! Certificate store backed by a directory of PEM files.
//!
//! The store is scanned by thumbprint (uppercase hex SHA-1 of the certificate
//! DER, the same form the Azure portal displays). Each certificate file
//! (`.pem` or `.crt`) may have a sibling `.key` file with the same stem
//! holding the RSA private key.

use crate::error::CertStoreError;
use sha1::{Digest, Sha1};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use zeroize::Zeroizing;

/// A certificate found in the store.
#[derive(Debug, Clone)]
pub struct StoredCertificate {
    /// Uppercase hex SHA-1 thumbprint of the certificate DER.
    pub thumbprint: String,
    /// The certificate DER bytes.
    pub der: Vec<u8>,
    /// Path the certificate was loaded from.
    pub path: PathBuf,
}

impl StoredCertificate {
    /// Read the private key PEM from the sibling `.key` file.
    ///
    /// The bytes are zeroized on drop.
    pub fn private_key_pem(&self) -> Result<Zeroizing<Vec<u8>>, CertStoreError> {
        let key_path = self.path.with_extension("key");
        match fs::read(&key_path) {
            Ok(bytes) => Ok(Zeroizing::new(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(
                CertStoreError::KeyMissing(key_path.display().to_string()),
            ),
            Err(e) => Err(CertStoreError::ReadFailed(format!(
                "{}: {}",
                key_path.display(),
                e
            ))),
        }
    }
}

/// Compute the uppercase hex SHA-1 thumbprint of certificate DER bytes.
pub fn thumbprint_hex(der: &[u8]) -> String {
    use std::fmt::Write;

    let digest = Sha1::digest(der);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(out, "{:02X}", byte);
    }
    out
}

/// A directory-backed certificate store.
pub struct CertStore {
    dir: PathBuf,
}

impl CertStore {
    /// Create a store over the given directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Find the first certificate whose thumbprint matches, case-insensitively.
    ///
    /// Returns `Ok(None)` when no stored certificate matches. Files that fail
    /// to parse are skipped with a warning so one bad entry cannot block the
    /// lookup. The directory handle is released when the scan ends, whatever
    /// the outcome (RAII on `ReadDir`).
    pub fn find_by_thumbprint(
        &self,
        thumbprint: &str,
    ) -> Result<Option<StoredCertificate>, CertStoreError> {
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| CertStoreError::ReadFailed(format!("{}: {}", self.dir.display(), e)))?;

        // Sort for a deterministic notion of "first match".
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_certificate_file(path))
            .collect();
        paths.sort();

        for path in paths {
            let cert = match load_certificate(&path) {
                Ok(cert) => cert,
                Err(e) => {
                    warn!("Skipping unparseable store entry {}: {}", path.display(), e);
                    continue;
                }
            };

            if cert.thumbprint.eq_ignore_ascii_case(thumbprint) {
                debug!("Matched certificate {} in store", path.display());
                return Ok(Some(cert));
            }
        }

        Ok(None)
    }
}

/// Whether the path looks like a certificate file.
fn is_certificate_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("pem") | Some("crt")
    )
}

/// Load and parse a single PEM certificate file.
fn load_certificate(path: &Path) -> Result<StoredCertificate, CertStoreError> {
    let pem_text = fs::read_to_string(path)
        .map_err(|e| CertStoreError::ReadFailed(format!("{}: {}", path.display(), e)))?;

    let parsed = pem::parse(pem_text.as_bytes())
        .map_err(|e| CertStoreError::ParseFailed(format!("{}: {}", path.display(), e)))?;

    if parsed.tag() != "CERTIFICATE" {
        return Err(CertStoreError::ParseFailed(format!(
            "{}: expected CERTIFICATE block, found {}",
            path.display(),
            parsed.tag()
        )));
    }

    let der = parsed.contents().to_vec();
    Ok(StoredCertificate {
        thumbprint: thumbprint_hex(&der),
        der,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::test_fixtures::{OTHER_CERT_PEM, TEST_CERT_PEM, TEST_CERT_THUMBPRINT};

    /// Create a unique temp store directory for a test.
    fn temp_store(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "graph-connect-store-{}-{}",
            name,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_thumbprint_computation() {
        let parsed = pem::parse(TEST_CERT_PEM.as_bytes()).unwrap();
        assert_eq!(thumbprint_hex(parsed.contents()), TEST_CERT_THUMBPRINT);
    }

    #[test]
    fn test_find_no_match_returns_none() {
        let dir = temp_store("no-match");
        fs::write(dir.join("other.pem"), OTHER_CERT_PEM).unwrap();

        let store = CertStore::new(&dir);
        let found = store
            .find_by_thumbprint("0000000000000000000000000000000000000000")
            .unwrap();
        assert!(found.is_none());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_find_returns_match() {
        let dir = temp_store("match");
        fs::write(dir.join("aaa-other.pem"), OTHER_CERT_PEM).unwrap();
        fs::write(dir.join("bbb-app.pem"), TEST_CERT_PEM).unwrap();

        let store = CertStore::new(&dir);
        let found = store.find_by_thumbprint(TEST_CERT_THUMBPRINT).unwrap();

        let cert = found.expect("certificate should be found");
        assert_eq!(cert.thumbprint, TEST_CERT_THUMBPRINT);
        assert!(cert.path.ends_with("bbb-app.pem"));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_find_is_case_insensitive() {
        let dir = temp_store("case");
        fs::write(dir.join("app.pem"), TEST_CERT_PEM).unwrap();

        let store = CertStore::new(&dir);
        let found = store
            .find_by_thumbprint(&TEST_CERT_THUMBPRINT.to_lowercase())
            .unwrap();
        assert!(found.is_some());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let dir = temp_store("malformed");
        fs::write(dir.join("aaa-garbage.pem"), "not a certificate at all").unwrap();
        fs::write(dir.join("bbb-app.pem"), TEST_CERT_PEM).unwrap();

        let store = CertStore::new(&dir);
        // The scan must complete despite the bad entry.
        let found = store.find_by_thumbprint(TEST_CERT_THUMBPRINT).unwrap();
        assert!(found.is_some());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_store_directory_errors() {
        let store = CertStore::new("/nonexistent/graph-connect-store");
        let result = store.find_by_thumbprint(TEST_CERT_THUMBPRINT);
        assert!(matches!(result, Err(CertStoreError::ReadFailed(_))));
    }

    #[test]
    fn test_missing_private_key() {
        let dir = temp_store("no-key");
        fs::write(dir.join("app.pem"), TEST_CERT_PEM).unwrap();

        let store = CertStore::new(&dir);
        let cert = store
            .find_by_thumbprint(TEST_CERT_THUMBPRINT)
            .unwrap()
            .unwrap();
        assert!(matches!(
            cert.private_key_pem(),
            Err(CertStoreError::KeyMissing(_))
        ));

        let _ = fs::remove_dir_all(&dir);
    }
}
