//! Transport security: cipher selection is delegated entirely to
//! `rustls`; this module only decides whether a connection is wrapped in
//! TLS before the handshake in `session::handshake` runs, via the same
//! `tokio`-ecosystem crate the rest of the stack already depends on.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::{client::TlsStream as ClientTlsStream, TlsConnector};

use crate::config::TlsTrustMode;

/// Either a bare TCP stream or one wrapped in TLS, behind a single
/// `AsyncRead + AsyncWrite` surface so the codec and session layers never
/// branch on transport kind.
pub enum Stream {
    Plain(TcpStream),
    Tls(Box<ClientTlsStream<TcpStream>>),
}

impl AsyncRead for Stream {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Stream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Stream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Stream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Plain(s) => Pin::new(s).poll_flush(cx),
            Stream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Stream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Accepts any server certificate without verification. Used only when the
/// config names `tls_trust_mode = blind` — an operator opt-in for
/// environments without a usable CA chain, never a default.
#[derive(Debug)]
struct BlindVerifier;

impl ServerCertVerifier for BlindVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ED25519,
            SignatureScheme::RSA_PSS_SHA256,
        ]
    }
}

fn client_config(trust_mode: TlsTrustMode) -> Result<ClientConfig, io::Error> {
    match trust_mode {
        TlsTrustMode::Verify => {
            let mut roots = rustls::RootCertStore::empty();
            for cert in rustls_native_certs::load_native_certs().map_err(io::Error::other)? {
                roots.add(cert).map_err(io::Error::other)?;
            }
            Ok(ClientConfig::builder().with_root_certificates(roots).with_no_client_auth())
        },
        TlsTrustMode::Blind => Ok(ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(BlindVerifier))
            .with_no_client_auth()),
    }
}

/// Connects a plain TCP stream, then wraps it in TLS when `use_tls` is set.
pub async fn connect(
    host: &str,
    port: u16,
    use_tls: bool,
    trust_mode: TlsTrustMode,
) -> Result<Stream, io::Error> {
    let tcp = TcpStream::connect((host, port)).await?;
    if !use_tls {
        return Ok(Stream::Plain(tcp));
    }
    let config = client_config(trust_mode)?;
    let connector = TlsConnector::from(Arc::new(config));
    let server_name =
        ServerName::try_from(host.to_owned()).map_err(|_| io::Error::other(format!("invalid DNS name `{host}`")))?;
    let tls = connector.connect(server_name, tcp).await?;
    Ok(Stream::Tls(Box::new(tls)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blind_verifier_accepts_any_certificate() {
        let verifier = BlindVerifier;
        let cert = CertificateDer::from(vec![0u8; 4]);
        assert!(verifier
            .verify_server_cert(
                &cert,
                &[],
                &ServerName::try_from("example.test").unwrap(),
                &[],
                UnixTime::now(),
            )
            .is_ok());
    }
}
