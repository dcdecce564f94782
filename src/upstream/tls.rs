//! Client-side TLS configuration for DoT/DoQ upstreams.

use std::sync::Arc;

use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use tokio_rustls::TlsConnector;

use crate::error::{ForwarderError, Result};

/// Accepts any server certificate without validation. Used only when an
/// upstream is configured with `tls_insecure_skip_verify`, e.g. a
/// loopback test fixture presenting a self-signed certificate with no
/// configured CA to validate it against.
#[derive(Debug)]
struct NoVerifier;

impl rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ED25519,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
        ]
    }
}

/// Builds a `TlsConnector` for dialing a DoT/DoQ upstream. `extra_ca_pem`
/// adds trust anchors beyond the bundled set; `insecure_skip_verify`
/// disables certificate validation entirely (loopback fixtures only).
pub fn build_connector(
    extra_ca_pem: Option<&[u8]>,
    insecure_skip_verify: bool,
) -> Result<TlsConnector> {
    let mut roots = rustls::RootCertStore::empty();
    if let Some(pem) = extra_ca_pem {
        for cert in rustls_pemfile::certs(&mut std::io::Cursor::new(pem)) {
            let cert = cert.map_err(|e| {
                ForwarderError::ConfigInvalid(format!("invalid upstream CA certificate: {e}"))
            })?;
            roots.add(cert).map_err(|e| {
                ForwarderError::ConfigInvalid(format!("invalid upstream CA certificate: {e}"))
            })?;
        }
    }

    let builder = rustls::ClientConfig::builder();
    let mut config = if insecure_skip_verify {
        tracing::warn!("upstream TLS certificate verification disabled");
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerifier))
            .with_no_client_auth()
    } else {
        builder.with_root_certificates(roots).with_no_client_auth()
    };
    config.alpn_protocols = vec![b"dot".to_vec()];

    Ok(TlsConnector::from(Arc::new(config)))
}

/// Builds a `rustls::ClientConfig` suitable for `quinn`'s QUIC transport
/// (DoQ), sharing the same trust configuration as `build_connector`.
pub fn build_quic_client_config(
    extra_ca_pem: Option<&[u8]>,
    insecure_skip_verify: bool,
) -> Result<rustls::ClientConfig> {
    let mut roots = rustls::RootCertStore::empty();
    if let Some(pem) = extra_ca_pem {
        for cert in rustls_pemfile::certs(&mut std::io::Cursor::new(pem)) {
            let cert = cert.map_err(|e| {
                ForwarderError::ConfigInvalid(format!("invalid upstream CA certificate: {e}"))
            })?;
            roots.add(cert).map_err(|e| {
                ForwarderError::ConfigInvalid(format!("invalid upstream CA certificate: {e}"))
            })?;
        }
    }

    let builder = rustls::ClientConfig::builder();
    let mut config = if insecure_skip_verify {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerifier))
            .with_no_client_auth()
    } else {
        builder.with_root_certificates(roots).with_no_client_auth()
    };
    config.alpn_protocols = vec![b"doq".to_vec()];
    Ok(config)
}
