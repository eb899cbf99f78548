//! Certificate acquisition: read a file or stdin as is, or fetch the leaf
//! certificate from a TLS server and PEM-encode it.

use crate::error::{Error, Result};
use crate::source::Source;
use crate::tls;
use der::pem::LineEnding;
use std::io::{self, Read};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

const CERTIFICATE_LABEL: &str = "CERTIFICATE";

#[derive(Debug, Clone, Default)]
pub struct AcquireOptions {
    /// Connect and handshake timeout. `None` leaves it to the OS.
    pub timeout: Option<Duration>,
}

/// Returns the certificate bytes for `source`; PEM for network targets,
/// unmodified file contents otherwise.
pub fn acquire(source: &Source, options: &AcquireOptions) -> Result<Vec<u8>> {
    match source {
        Source::Network { host, port } => {
            let peer = tls::fetch_peer_certificate(host, *port, options.timeout)?;
            info!("Received {} byte certificate from {}", peer.der.len(), source);
            der_to_pem(&peer.der)
        }
        Source::File(path) => read_file(path),
        Source::Stdin => read_stdin(),
    }
}

pub fn der_to_pem(der: &[u8]) -> Result<Vec<u8>> {
    let pem = der::pem::encode_string(CERTIFICATE_LABEL, LineEnding::LF, der)?;
    Ok(pem.into_bytes())
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    let data = std::fs::read(path).map_err(|source| Error::File {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("Read {} bytes from {}", data.len(), path.display());

    Ok(data)
}

fn read_stdin() -> Result<Vec<u8>> {
    let mut data = Vec::new();
    io::stdin().read_to_end(&mut data).map_err(Error::Stdin)?;
    debug!("Read {} bytes from stdin", data.len());

    Ok(data)
}

// region:    --- Tests


// endregion: --- Tests
