//! Client TLS configuration and certificate loading.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::CertificateDer;
use rustls::{ClientConfig, RootCertStore};

use crate::error::TlsConfigError;

/// ALPN ids offered to servers, most preferred first.
pub const ALPN_PROTOCOLS: [&[u8]; 2] = [b"h2", b"http/1.1"];

/// Load every certificate from a PEM file.
pub fn load_pem_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsConfigError> {
    if !path.exists() {
        return Err(TlsConfigError::NotFound(path.to_path_buf()));
    }
    let io_error = |source| TlsConfigError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = BufReader::new(File::open(path).map_err(io_error)?);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_error)?;
    if certs.is_empty() {
        return Err(TlsConfigError::NoCertificates(path.to_path_buf()));
    }
    Ok(certs)
}

/// Web PKI roots plus the certificates in `pem_paths`.
pub fn root_store<P: AsRef<Path>>(pem_paths: &[P]) -> Result<RootCertStore, TlsConfigError> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    for path in pem_paths {
        for cert in load_pem_certs(path.as_ref())? {
            roots.add(cert)?;
        }
    }
    Ok(roots)
}

/// Client config trusting `roots`, offering h2 and http/1.1.
pub fn client_config(roots: RootCertStore) -> Result<ClientConfig, TlsConfigError> {
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let mut config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();
    config.alpn_protocols = ALPN_PROTOCOLS.iter().map(|p| p.to_vec()).collect();
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_pem_file() {
        let err = load_pem_certs(Path::new("no/such/ca.pem")).unwrap_err();
        assert!(matches!(err, TlsConfigError::NotFound(_)));
    }

    #[test]
    fn default_roots_and_alpn() {
        let roots = root_store::<&Path>(&[]).unwrap();
        assert!(!roots.is_empty());

        let config = client_config(roots).unwrap();
        assert_eq!(config.alpn_protocols, vec![b"h2".to_vec(), b"http/1.1".to_vec()]);
    }
}
