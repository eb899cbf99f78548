//! Tasmota-compatible RSA public key fingerprints.
//!
//! The key is serialized the way an OpenSSH `ssh-rsa` public key blob is laid
//! out (length-prefixed type, exponent, modulus) and hashed with SHA-1. Unlike
//! OpenSSH, integers are written with their minimal unsigned big-endian
//! encoding: a set top bit does NOT get a `0x00` sign byte. Tasmota (BearSSL)
//! computes it that way, so this has to match bit for bit.

use rsa::BigUint;
use sha1::{Digest, Sha1};
use std::fmt;
use tracing::debug;

const KEY_TYPE: &[u8] = b"ssh-rsa";

/// Firmware label appended to the printed fingerprint.
pub const FIRMWARE_LABEL: &str = "Tasmota v8.4.0+";

/// Public exponent and modulus of an RSA key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaPublicParams {
    pub e: BigUint,
    pub n: BigUint,
}

impl RsaPublicParams {
    pub fn from_be_bytes(e: &[u8], n: &[u8]) -> Self {
        Self {
            e: BigUint::from_bytes_be(e),
            n: BigUint::from_bytes_be(n),
        }
    }

    pub fn modulus_bits(&self) -> usize {
        self.n.bits()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        encode(&self.e, &self.n)
    }
}

/// SHA-1 digest of the canonical key blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 20]);

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Fingerprint followed by the firmware compatibility label.
    pub fn labelled(&self) -> String {
        format!("{} ({})", self, FIRMWARE_LABEL)
    }
}

/// Uppercase hex, one space between bytes: `AA BB ... 11 22`.
impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = hex::encode_upper(self.0);
        let pairs: Vec<&str> = (0..hex.len()).step_by(2).map(|i| &hex[i..i + 2]).collect();
        f.write_str(&pairs.join(" "))
    }
}

pub fn encode(e: &BigUint, n: &BigUint) -> Fingerprint {
    let blob = key_blob(e, n);
    debug!("Hashing {} byte key blob", blob.len());

    Fingerprint(Sha1::digest(&blob).into())
}

/// Builds `len("ssh-rsa") || "ssh-rsa" || len(e) || e || len(n) || n`.
pub fn key_blob(e: &BigUint, n: &BigUint) -> Vec<u8> {
    let e = minimal_be_bytes(e);
    let n = minimal_be_bytes(n);

    let mut blob = Vec::with_capacity(12 + KEY_TYPE.len() + e.len() + n.len());
    put_field(&mut blob, KEY_TYPE);
    put_field(&mut blob, &e);
    put_field(&mut blob, &n);
    blob
}

fn put_field(blob: &mut Vec<u8>, data: &[u8]) {
    blob.extend_from_slice(&(data.len() as u32).to_be_bytes());
    blob.extend_from_slice(data);
}

/// Zero encodes as no bytes at all.
fn minimal_be_bytes(value: &BigUint) -> Vec<u8> {
    if value.bits() == 0 {
        Vec::new()
    } else {
        value.to_bytes_be()
    }
}

// region:    --- Tests

#[cfg(test)]
mod tests {
    use super::*;

    fn hex_bytes(s: &str) -> Vec<u8> {
        hex::decode(s).unwrap()
    }

    #[test]
    fn test_blob_layout_top_bit_set_has_no_padding() {
        // 128-bit modulus with the top bit of the first byte set
        let n = hex_bytes("80010101010101010101010101010101");
        let params = RsaPublicParams::from_be_bytes(&[0x01, 0x00, 0x01], &n);

        let blob = key_blob(&params.e, &params.n);
        assert_eq!(
            hex::encode(&blob),
            "000000077373682d727361\
             00000003010001\
             0000001080010101010101010101010101010101"
        );
    }

    #[test]
    fn test_known_vector_top_bit_set() {
        let n = hex_bytes("80010101010101010101010101010101");
        let params = RsaPublicParams::from_be_bytes(&[0x01, 0x00, 0x01], &n);

        assert_eq!(
            params.fingerprint().to_string(),
            "D1 21 0E B9 06 AB DA CF 54 A3 9D 55 A5 43 E4 E5 BD E5 41 AF"
        );
    }

    #[test]
    fn test_known_vector_top_bit_clear() {
        let n = hex_bytes("7fffffffffffffffffffffffffffffff");
        let params = RsaPublicParams::from_be_bytes(&[0x01, 0x00, 0x01], &n);

        assert_eq!(
            params.fingerprint().to_string(),
            "DB D2 81 9A 0A 15 A3 40 D8 F5 3C 64 88 CA 51 22 DF D3 16 AE"
        );
    }

    #[test]
    fn test_leading_zero_bytes_are_dropped() {
        let params = RsaPublicParams::from_be_bytes(&[0x00, 0x03], &hex_bytes("00c0ffee"));

        assert_eq!(
            hex::encode(key_blob(&params.e, &params.n)),
            "000000077373682d727361000000010300000003c0ffee"
        );
        assert_eq!(
            params.fingerprint().to_string(),
            "B3 54 F0 D3 82 09 E4 3E 65 A4 61 C2 2F 77 8D 06 E2 1A 7B 6B"
        );
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let e = BigUint::from(65537u32);
        let n = BigUint::from_bytes_be(&[0xC3; 256]);

        assert_eq!(encode(&e, &n), encode(&e.clone(), &n.clone()));
    }

    #[test]
    fn test_display_format() {
        let fp = encode(&BigUint::from(3u32), &BigUint::from(0xfeedu32));
        let shown = fp.to_string();

        assert_eq!(fp.as_bytes().len(), 20);
        assert_eq!(shown.len(), 59);
        let groups: Vec<&str> = shown.split(' ').collect();
        assert_eq!(groups.len(), 20);
        for group in groups {
            assert_eq!(group.len(), 2);
            assert!(group
                .chars()
                .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
        }
    }

    #[test]
    fn test_labelled_output() {
        let n = hex_bytes("80010101010101010101010101010101");
        let params = RsaPublicParams::from_be_bytes(&[0x01, 0x00, 0x01], &n);

        assert_eq!(
            params.fingerprint().labelled(),
            "D1 21 0E B9 06 AB DA CF 54 A3 9D 55 A5 43 E4 E5 BD E5 41 AF (Tasmota v8.4.0+)"
        );
    }
}

// endregion: --- Tests
