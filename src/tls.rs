//! Single-shot TLS client used to read a server's leaf certificate.
//!
//! The client policy is intentionally weak on trust and strict on algorithms:
//! - certificate chain and host name checks are disabled, self-signed broker
//!   certificates are the common case;
//! - only TLS 1.2 suites authenticated with RSA are offered, so the server has
//!   to present an RSA certificate or abort the handshake. TLS 1.3 is off since
//!   its suites don't select the certificate type;
//! - ALPN offers `mqtt`, then `h2`, then `http/1.1`.
//!
//! Handshake signatures are still checked against the key in the presented
//! certificate. The certificate itself is only read for that key, so X.509 v1
//! certificates work too.

use crate::decode::from_certificate;
use crate::error::{Error, Result};
use crate::source::display_target;
use rsa::sha2::{Sha256, Sha384, Sha512};
use rsa::signature::Verifier;
use rsa::{pkcs1v15, pss, RsaPublicKey};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{ring, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{
    CertificateError, CipherSuite, ClientConfig, ClientConnection, DigitallySignedStruct,
    ProtocolVersion, SignatureScheme, SupportedCipherSuite,
};
use sha1::Sha1;
use std::io;
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub const ALPN_PROTOCOLS: [&[u8]; 3] = [b"mqtt", b"h2", b"http/1.1"];

/// Signature schemes the verifier can check, most preferred first.
const RSA_SCHEMES: [SignatureScheme; 7] = [
    SignatureScheme::RSA_PSS_SHA256,
    SignatureScheme::RSA_PSS_SHA384,
    SignatureScheme::RSA_PSS_SHA512,
    SignatureScheme::RSA_PKCS1_SHA256,
    SignatureScheme::RSA_PKCS1_SHA384,
    SignatureScheme::RSA_PKCS1_SHA512,
    SignatureScheme::RSA_PKCS1_SHA1,
];

/// Largest server modulus accepted when checking handshake signatures.
const MAX_MODULUS_BITS: usize = 16384;

/// What the handshake produced.
#[derive(Debug, Clone)]
pub struct PeerCertificate {
    pub der: CertificateDer<'static>,
    pub alpn_protocol: Option<Vec<u8>>,
    pub protocol_version: Option<ProtocolVersion>,
    pub cipher_suite: Option<CipherSuite>,
}

/// `ring` provider reduced to TLS 1.2 suites with RSA authentication.
pub fn rsa_only_provider() -> CryptoProvider {
    let mut provider = ring::default_provider();
    provider.cipher_suites.retain(authenticates_with_rsa);
    provider
}

fn authenticates_with_rsa(suite: &SupportedCipherSuite) -> bool {
    match suite {
        SupportedCipherSuite::Tls12(suite) => {
            suite.sign.iter().all(|scheme| is_rsa_scheme(*scheme))
        }
        SupportedCipherSuite::Tls13(_) => false,
    }
}

fn is_rsa_scheme(scheme: SignatureScheme) -> bool {
    RSA_SCHEMES.contains(&scheme)
}

pub fn client_config() -> Result<ClientConfig> {
    let mut config = ClientConfig::builder_with_provider(Arc::new(rsa_only_provider()))
        .with_protocol_versions(&[&rustls::version::TLS12])?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate))
        .with_no_client_auth();
    config.alpn_protocols = ALPN_PROTOCOLS.iter().map(|proto| proto.to_vec()).collect();

    Ok(config)
}

// region:    --- Verifier

/// Accepts any end-entity certificate for any server name.
///
/// Handshake signatures are verified with the RSA key taken from the
/// certificate, without any further certificate parsing or policy.
#[derive(Debug)]
pub struct AcceptAnyCertificate;

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        debug!(
            "Accepting unverified {} byte certificate from {:?}",
            end_entity.len(),
            server_name
        );
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_rsa_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_rsa_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        RSA_SCHEMES.to_vec()
    }
}

fn verify_rsa_signature(
    message: &[u8],
    cert: &CertificateDer<'_>,
    dss: &DigitallySignedStruct,
) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
    let params = from_certificate(cert)
        .map_err(|e| rustls::Error::General(format!("cannot read server key: {}", e)))?;
    let key = RsaPublicKey::new_with_max_size(params.n, params.e, MAX_MODULUS_BITS)
        .map_err(|e| rustls::Error::General(format!("unusable server key: {}", e)))?;

    let signature = dss.signature();
    let valid = match dss.scheme {
        SignatureScheme::RSA_PKCS1_SHA1 => signature_matches::<pkcs1v15::Signature, _>(
            pkcs1v15::VerifyingKey::<Sha1>::new(key),
            message,
            signature,
        ),
        SignatureScheme::RSA_PKCS1_SHA256 => signature_matches::<pkcs1v15::Signature, _>(
            pkcs1v15::VerifyingKey::<Sha256>::new(key),
            message,
            signature,
        ),
        SignatureScheme::RSA_PKCS1_SHA384 => signature_matches::<pkcs1v15::Signature, _>(
            pkcs1v15::VerifyingKey::<Sha384>::new(key),
            message,
            signature,
        ),
        SignatureScheme::RSA_PKCS1_SHA512 => signature_matches::<pkcs1v15::Signature, _>(
            pkcs1v15::VerifyingKey::<Sha512>::new(key),
            message,
            signature,
        ),
        SignatureScheme::RSA_PSS_SHA256 => signature_matches::<pss::Signature, _>(
            pss::VerifyingKey::<Sha256>::new(key),
            message,
            signature,
        ),
        SignatureScheme::RSA_PSS_SHA384 => signature_matches::<pss::Signature, _>(
            pss::VerifyingKey::<Sha384>::new(key),
            message,
            signature,
        ),
        SignatureScheme::RSA_PSS_SHA512 => signature_matches::<pss::Signature, _>(
            pss::VerifyingKey::<Sha512>::new(key),
            message,
            signature,
        ),
        other => {
            return Err(rustls::Error::General(format!(
                "unsupported signature scheme {:?}",
                other
            )))
        }
    };

    if !valid {
        return Err(rustls::Error::InvalidCertificate(CertificateError::BadSignature));
    }
    debug!("Handshake signature ({:?}) verified", dss.scheme);

    Ok(HandshakeSignatureValid::assertion())
}

fn signature_matches<S, V>(verifier: V, message: &[u8], signature: &[u8]) -> bool
where
    V: Verifier<S>,
    S: for<'a> TryFrom<&'a [u8], Error = rsa::signature::Error>,
{
    S::try_from(signature)
        .and_then(|signature| verifier.verify(message, &signature))
        .is_ok()
}

// endregion: --- Verifier

// region:    --- Session

/// Socket plus TLS state for one handshake. Dropping it sends `close_notify`
/// and shuts the socket down, whatever happened before.
struct Session {
    conn: ClientConnection,
    sock: TcpStream,
}

impl Session {
    fn handshake(&mut self) -> io::Result<()> {
        while self.conn.is_handshaking() {
            self.conn.complete_io(&mut self.sock)?;
        }
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.conn.send_close_notify();
        let _ = self.conn.write_tls(&mut self.sock);
        let _ = self.sock.shutdown(Shutdown::Both);
    }
}

// endregion: --- Session

/// Connects, completes the handshake and returns the leaf certificate.
/// No application data is sent or read.
pub fn fetch_peer_certificate(
    host: &str,
    port: u16,
    timeout: Option<Duration>,
) -> Result<PeerCertificate> {
    let target = display_target(host, port);

    let server_name = ServerName::try_from(host.to_string())
        .map_err(|_| Error::InvalidServerName(host.to_string()))?;
    let conn = ClientConnection::new(Arc::new(client_config()?), server_name)?;

    info!("Connecting to {}", target);
    let sock = connect(host, port, timeout).map_err(|source| Error::Connect {
        target: target.clone(),
        source,
    })?;
    debug!("TCP connection to {} established", target);

    let mut session = Session { conn, sock };
    session.handshake().map_err(|source| Error::Handshake {
        target: target.clone(),
        source,
    })?;

    let conn = &session.conn;
    let der = conn
        .peer_certificates()
        .and_then(|certs| certs.first())
        .map(|cert| cert.clone().into_owned())
        .ok_or_else(|| Error::NoPeerCertificate(target.clone()))?;

    let peer = PeerCertificate {
        der,
        alpn_protocol: conn.alpn_protocol().map(|proto| proto.to_vec()),
        protocol_version: conn.protocol_version(),
        cipher_suite: conn.negotiated_cipher_suite().map(|suite| suite.suite()),
    };
    debug!(
        "Handshake with {} done: {:?}, {:?}, ALPN {:?}",
        target,
        peer.protocol_version,
        peer.cipher_suite,
        peer.alpn_protocol
            .as_deref()
            .map(String::from_utf8_lossy)
    );

    Ok(peer)
}

fn connect(host: &str, port: u16, timeout: Option<Duration>) -> io::Result<TcpStream> {
    let sock = match timeout {
        None => TcpStream::connect((host, port))?,
        Some(timeout) => connect_timeout(host, port, timeout)?,
    };

    sock.set_read_timeout(timeout)?;
    sock.set_write_timeout(timeout)?;
    Ok(sock)
}

fn connect_timeout(host: &str, port: u16, timeout: Duration) -> io::Result<TcpStream> {
    let mut last_error = None;

    for addr in (host, port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(sock) => return Ok(sock),
            Err(error) => {
                debug!("Connect to {} failed: {}", addr, error);
                last_error = Some(error);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "host name resolved to no addresses")
    }))
}

// region:    --- Tests


// endregion: --- Tests
