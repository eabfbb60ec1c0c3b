use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tracing::info;

/// Certificate and private key locations for HTTPS.
#[derive(Debug, Clone)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

impl TlsPaths {
    /// Defaults under `<data_dir>/tls/`, with optional per-file overrides.
    pub fn resolve(
        data_dir: &Path,
        cert: Option<PathBuf>,
        key: Option<PathBuf>,
    ) -> Result<Self> {
        let dir = data_dir.join("tls");
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create TLS directory: {}", dir.display()))?;
        Ok(Self {
            cert: cert.unwrap_or_else(|| dir.join("cert.pem")),
            key: key.unwrap_or_else(|| dir.join("key.pem")),
        })
    }

    /// Make sure both files exist, generating a self-signed pair if either is
    /// missing. Returns the certificate's SHA-256 fingerprint.
    pub fn ensure(&self) -> Result<String> {
        if self.cert.exists() && self.key.exists() {
            fingerprint_from_pem_file(&self.cert)
        } else {
            info!(cert = %self.cert.display(), "generating self-signed TLS certificate");
            self.generate_self_signed()
        }
    }

    fn generate_self_signed(&self) -> Result<String> {
        let mut params =
            rcgen::CertificateParams::new(vec!["localhost".to_string(), "127.0.0.1".to_string()])
                .context("failed to create certificate params")?;
        params
            .distinguished_name
            .push(rcgen::DnType::CommonName, "mealbook self-signed");
        params
            .subject_alt_names
            .push(rcgen::SanType::IpAddress(std::net::IpAddr::V4(
                std::net::Ipv4Addr::LOCALHOST,
            )));

        let key_pair = rcgen::KeyPair::generate().context("failed to generate key pair")?;
        let cert = params
            .self_signed(&key_pair)
            .context("failed to generate self-signed certificate")?;

        std::fs::write(&self.cert, cert.pem()).with_context(|| {
            format!("Failed to write certificate to {}", self.cert.display())
        })?;
        write_private(&self.key, key_pair.serialize_pem().as_bytes())
            .with_context(|| format!("Failed to write private key to {}", self.key.display()))?;

        Ok(sha256_fingerprint(cert.der()))
    }
}

/// Write a file only the owner can read. The mode is set at creation and again
/// afterwards, since an existing file keeps its old mode on open.
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
        options.mode(0o600);
        let mut file = options.open(path)?;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        file.write_all(contents)
    }
    #[cfg(not(unix))]
    {
        options.open(path)?.write_all(contents)
    }
}

/// Colon-separated uppercase hex, the form browsers display.
fn sha256_fingerprint(der: &[u8]) -> String {
    Sha256::digest(der)
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}

fn fingerprint_from_pem_file(cert_path: &Path) -> Result<String> {
    let pem_data = std::fs::read(cert_path)
        .with_context(|| format!("Failed to read certificate from {}", cert_path.display()))?;

    let mut reader = std::io::BufReader::new(pem_data.as_slice());
    let certs: Vec<_> =
        rustls_pemfile::certs(&mut reader).collect::<std::result::Result<_, _>>()?;
    let cert = certs.first().context("No certificate found in PEM file")?;

    Ok(sha256_fingerprint(cert.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_paths(tmp: &tempfile::TempDir) -> TlsPaths {
        TlsPaths::resolve(tmp.path(), None, None).unwrap()
    }

    #[test]
    fn test_resolve_defaults_and_overrides() {
        let tmp = tempfile::TempDir::new().unwrap();
        let paths = temp_paths(&tmp);
        assert_eq!(paths.cert, tmp.path().join("tls").join("cert.pem"));
        assert_eq!(paths.key, tmp.path().join("tls").join("key.pem"));
        assert!(tmp.path().join("tls").is_dir());

        let custom = tmp.path().join("mine.pem");
        let paths = TlsPaths::resolve(tmp.path(), Some(custom.clone()), None).unwrap();
        assert_eq!(paths.cert, custom);
    }

    #[test]
    fn test_ensure_generates_pem_files() {
        let tmp = tempfile::TempDir::new().unwrap();
        let paths = temp_paths(&tmp);

        let fingerprint = paths.ensure().unwrap();

        let cert = std::fs::read_to_string(&paths.cert).unwrap();
        assert!(cert.contains("BEGIN CERTIFICATE"));
        let key = std::fs::read_to_string(&paths.key).unwrap();
        assert!(key.contains("BEGIN PRIVATE KEY"));

        let parts: Vec<&str> = fingerprint.split(':').collect();
        assert_eq!(parts.len(), 32);
        assert!(
            parts
                .iter()
                .all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_hexdigit()))
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_generated_key_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::TempDir::new().unwrap();
        let paths = temp_paths(&tmp);
        // A stale world-readable key is locked down when regenerated.
        std::fs::write(&paths.key, "old").unwrap();
        std::fs::set_permissions(&paths.key, std::fs::Permissions::from_mode(0o644)).unwrap();

        paths.ensure().unwrap();

        let mode = std::fs::metadata(&paths.key).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_ensure_reuses_existing_certificate() {
        let tmp = tempfile::TempDir::new().unwrap();
        let paths = temp_paths(&tmp);
        let generated = paths.ensure().unwrap();
        let reread = paths.ensure().unwrap();
        assert_eq!(generated, reread);
    }
}
