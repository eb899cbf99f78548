//! Tasmota-compatible TLS public key fingerprints.
//!
//! Tasmota prints a SHA-1 fingerprint of its MQTT broker's RSA key on the
//! console. This crate computes the same value from a broker's `host:port`
//! or from a certificate file, so the two can be compared by eye.

pub mod acquire;
pub mod decode;
pub mod error;
pub mod fingerprint;
pub mod source;
pub mod tls;

pub use acquire::{acquire, AcquireOptions};
pub use decode::{KeyDecoder, X509KeyDecoder};
pub use error::{Error, Result};
pub use fingerprint::{Fingerprint, RsaPublicParams};
pub use source::Source;

/// Acquire the certificate for `source` and fingerprint its RSA key.
pub fn fingerprint_source(
    source: &Source,
    options: &AcquireOptions,
    decoder: &dyn KeyDecoder,
) -> Result<Fingerprint> {
    let data = acquire(source, options)?;
    let params = decoder.decode(&data)?;

    Ok(params.fingerprint())
}
