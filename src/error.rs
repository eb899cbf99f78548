use derive_more::derive::From;
use std::io;
use std::path::PathBuf;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, From)]
pub enum Error {
    /// Source argument is neither a usable `host:port` nor a path.
    Usage(String),
    InvalidServerName(String),

    /// DNS resolution or TCP connect failure.
    Connect {
        target: String,
        source: io::Error,
    },
    /// TLS handshake failure, including the server refusing every RSA suite.
    Handshake {
        target: String,
        source: io::Error,
    },
    NoPeerCertificate(String),

    File {
        path: PathBuf,
        source: io::Error,
    },
    Stdin(io::Error),
    /// Writing the result to stdout failed.
    Output(io::Error),

    KeyDecode(String),
    UnsupportedKeyAlgorithm(String),

    #[from]
    Der(der::Error),
    #[from]
    Pem(der::pem::Error),
    #[from]
    Base64(base64::DecodeError),
    #[from]
    Tls(rustls::Error),
}

impl Error {
    /// Process exit status for this failure class.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Usage(_) | Error::InvalidServerName(_) => 1,
            Error::Connect { .. }
            | Error::Handshake { .. }
            | Error::NoPeerCertificate(_)
            | Error::Tls(_) => 2,
            Error::File { .. } | Error::Stdin(_) | Error::Output(_) => 3,
            Error::KeyDecode(_)
            | Error::UnsupportedKeyAlgorithm(_)
            | Error::Der(_)
            | Error::Pem(_)
            | Error::Base64(_) => 4,
        }
    }
}

// region:    --- Error Boilerplate

impl core::fmt::Display for Error {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::result::Result<(), core::fmt::Error> {
        let msg = match self {
            Error::Usage(msg) => format!("Invalid source: {}", msg),
            Error::InvalidServerName(host) => format!("Invalid server name: {}", host),
            Error::Connect { target, source } => {
                format!("Connection to {} failed: {}", target, source)
            }
            Error::Handshake { target, source } if refused_rsa_suites(source) => format!(
                "TLS handshake with {} failed: {} (the server may not offer an RSA certificate)",
                target, source
            ),
            Error::Handshake { target, source } => {
                format!("TLS handshake with {} failed: {}", target, source)
            }
            Error::NoPeerCertificate(target) => {
                format!("Server {} did not present a certificate", target)
            }
            Error::File { path, source } => {
                format!("Cannot read certificate file {}: {}", path.display(), source)
            }
            Error::Stdin(error) => format!("Cannot read certificate from stdin: {}", error),
            Error::Output(error) => format!("Cannot write fingerprint to stdout: {}", error),
            Error::KeyDecode(msg) => format!("Key decoding failed: {}", msg),
            Error::UnsupportedKeyAlgorithm(oid) => format!(
                "Key decoding failed: public key algorithm {} is not RSA",
                oid
            ),
            Error::Der(error) => format!("Key decoding failed: {}", error),
            Error::Pem(error) => format!("Key decoding failed: invalid PEM: {}", error),
            Error::Base64(error) => format!("Key decoding failed: invalid PEM body: {}", error),
            Error::Tls(error) => format!("TLS configuration error: {}", error),
        };

        write!(fmt, "{}", msg)
    }
}

impl std::error::Error for Error {}

/// True when the server turned the handshake down the way it does when none of
/// the offered RSA suites fits its key.
fn refused_rsa_suites(source: &io::Error) -> bool {
    let tls_error = source
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<rustls::Error>());

    match tls_error {
        Some(rustls::Error::AlertReceived(alert)) => matches!(
            alert,
            rustls::AlertDescription::HandshakeFailure
                | rustls::AlertDescription::InsufficientSecurity
        ),
        Some(rustls::Error::PeerIncompatible(_)) => true,
        _ => false,
    }
}

// endregion: --- Error Boilerplate

// region:    --- Tests


// endregion: --- Tests
