//! Extraction of RSA public parameters from certificates and public keys.
//!
//! The fingerprint core only needs `(e, n)`. How those are pulled out of
//! the input is a pluggable [`KeyDecoder`]; [`X509KeyDecoder`] handles the
//! PEM and DER containers a user is likely to have lying around.

use crate::error::{Error, Result};
use crate::fingerprint::RsaPublicParams;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use der::Decode;
use rsa::pkcs1::RsaPublicKey as Pkcs1PublicKey;
use tracing::debug;
use x509_cert::spki::{ObjectIdentifier, SubjectPublicKeyInfoOwned};
use x509_cert::Certificate;

/// rsaEncryption (PKCS #1)
const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");

const PEM_BEGIN: &[u8] = b"-----BEGIN ";
const PEM_END: &[u8] = b"-----END ";
const PEM_DASHES: &[u8] = b"-----";

pub trait KeyDecoder {
    fn decode(&self, data: &[u8]) -> Result<RsaPublicParams>;
}

/// Decodes `CERTIFICATE`, `PUBLIC KEY` and `RSA PUBLIC KEY` PEM blocks, or a
/// bare DER certificate when the input carries no PEM armour.
///
/// Only the first PEM block is used, so a chain file yields its leaf.
/// No size or primality checks are made on the key.
#[derive(Debug, Default, Clone, Copy)]
pub struct X509KeyDecoder;

impl KeyDecoder for X509KeyDecoder {
    fn decode(&self, data: &[u8]) -> Result<RsaPublicParams> {
        let Some(block) = first_pem_block(data) else {
            debug!("No PEM armour found, decoding {} bytes as DER", data.len());
            return from_certificate(data);
        };

        let label = std::str::from_utf8(block.label)
            .map_err(|_| Error::KeyDecode("PEM label is not valid UTF-8".into()))?;
        let der = decode_pem_body(block.body)?;
        debug!("Decoding PEM block '{}' ({} bytes)", label, der.len());

        match label {
            "CERTIFICATE" => from_certificate(&der),
            "PUBLIC KEY" => from_spki(&SubjectPublicKeyInfoOwned::from_der(&der)?),
            "RSA PUBLIC KEY" => from_pkcs1(&der),
            other => Err(Error::KeyDecode(format!("unsupported PEM block '{}'", other))),
        }
    }
}

/// Key of a DER certificate, of any X.509 version.
pub(crate) fn from_certificate(der: &[u8]) -> Result<RsaPublicParams> {
    let cert = Certificate::from_der(der)?;
    from_spki(&cert.tbs_certificate.subject_public_key_info)
}

fn from_spki(spki: &SubjectPublicKeyInfoOwned) -> Result<RsaPublicParams> {
    if spki.algorithm.oid != RSA_ENCRYPTION {
        return Err(Error::UnsupportedKeyAlgorithm(spki.algorithm.oid.to_string()));
    }

    let key = spki
        .subject_public_key
        .as_bytes()
        .ok_or_else(|| Error::KeyDecode("public key bit string is not byte aligned".into()))?;

    from_pkcs1(key)
}

fn from_pkcs1(der: &[u8]) -> Result<RsaPublicParams> {
    let key = Pkcs1PublicKey::from_der(der)?;

    // UintRef strips the DER sign byte
    let params = RsaPublicParams::from_be_bytes(
        key.public_exponent.as_bytes(),
        key.modulus.as_bytes(),
    );
    debug!(
        "Decoded RSA key: {} bit modulus, exponent {}",
        params.modulus_bits(),
        params.e
    );

    Ok(params)
}

struct PemBlock<'a> {
    label: &'a [u8],
    body: &'a [u8],
}

/// Label and base64 body of the first `-----BEGIN ...-----` block. A missing
/// END line leaves the body running to the end of the input.
fn first_pem_block(data: &[u8]) -> Option<PemBlock<'_>> {
    let start = find(data, PEM_BEGIN)? + PEM_BEGIN.len();
    let rest = &data[start..];

    let label_len = find(rest, PEM_DASHES)?;
    let body = &rest[label_len + PEM_DASHES.len()..];
    let body_len = find(body, PEM_END).unwrap_or(body.len());

    Some(PemBlock {
        label: &rest[..label_len],
        body: &body[..body_len],
    })
}

/// Base64 body at any line width. RFC 1421 header lines (`Proc-Type: ...`)
/// are skipped.
fn decode_pem_body(body: &[u8]) -> Result<Vec<u8>> {
    let base64: Vec<u8> = body
        .split(|byte| *byte == b'\n')
        .filter(|line| !line.contains(&b':'))
        .flatten()
        .copied()
        .filter(|byte| !byte.is_ascii_whitespace())
        .collect();

    Ok(STANDARD.decode(base64)?)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

// region:    --- Tests


// endregion: --- Tests
