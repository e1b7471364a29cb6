// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Keelboot Contributors

//! Minimal X.509 emission
//!
//! The core issues exactly two documents: the DeviceID certificate
//! signing request (PKCS#10) and the per-boot AliasID certificate
//! (X.509 v1, ECDSA-with-SHA256). Both have a fixed shape, so they are
//! assembled from DER templates into stack buffers — build the
//! to-be-signed bytes, sign them, wrap the result — and emitted as PEM.
//! Nothing here parses certificates; verification of issued documents
//! is the management service's side of the protocol.

use crate::ecdsa::{self, EccKeypair, EccPublicKey, SIGNATURE_SIZE};
use crate::error::CryptoError;
use crate::hash;
use crate::pem::spki_der;
use crate::rng::CryptoRng;

/// A distinguished name: `CN=…, O=…, C=…`
#[derive(Debug, Clone, Copy)]
pub struct Name {
    /// Common name
    pub common_name: &'static str,
    /// Organization
    pub org: &'static str,
    /// Two-letter country code
    pub country: &'static str,
}

/// Serial number size in bytes
pub const SERIAL_SIZE: usize = 20;

const TAG_INTEGER: u8 = 0x02;
const TAG_BIT_STRING: u8 = 0x03;
const TAG_UTF8_STRING: u8 = 0x0C;
const TAG_PRINTABLE_STRING: u8 = 0x13;
const TAG_UTC_TIME: u8 = 0x17;
const TAG_SEQUENCE: u8 = 0x30;
const TAG_SET: u8 = 0x31;
const TAG_CONTEXT_0: u8 = 0xA0;

/// OID 2.5.4.3 (commonName), pre-encoded
const OID_COMMON_NAME: [u8; 5] = [0x06, 0x03, 0x55, 0x04, 0x03];
/// OID 2.5.4.10 (organizationName), pre-encoded
const OID_ORG: [u8; 5] = [0x06, 0x03, 0x55, 0x04, 0x0A];
/// OID 2.5.4.6 (countryName), pre-encoded
const OID_COUNTRY: [u8; 5] = [0x06, 0x03, 0x55, 0x04, 0x06];

/// AlgorithmIdentifier ecdsa-with-SHA256, pre-encoded
const ALG_ECDSA_SHA256: [u8; 12] = [
    0x30, 0x0A, 0x06, 0x08, 0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x04, 0x03, 0x02,
];

/// Certificate validity window; the device has no clock, so issued
/// AliasID certificates carry a fixed conservative range.
const NOT_BEFORE: &[u8] = b"250101000000Z";
const NOT_AFTER: &[u8] = b"491231235959Z";

/// Bounded DER output buffer
struct DerBuf<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl<'a> DerBuf<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, len: 0 }
    }

    fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    fn push(&mut self, bytes: &[u8]) -> Result<(), CryptoError> {
        let end = self.len.checked_add(bytes.len()).ok_or(CryptoError::BufferTooSmall)?;
        if end > self.buf.len() {
            return Err(CryptoError::BufferTooSmall);
        }
        self.buf[self.len..end].copy_from_slice(bytes);
        self.len = end;
        Ok(())
    }

    /// Write `tag`, a definite length, then `content`
    fn push_tlv(&mut self, tag: u8, content: &[u8]) -> Result<(), CryptoError> {
        let len = content.len();
        if len < 0x80 {
            self.push(&[tag, len as u8])?;
        } else if len < 0x100 {
            self.push(&[tag, 0x81, len as u8])?;
        } else if len < 0x1_0000 {
            self.push(&[tag, 0x82, (len >> 8) as u8, len as u8])?;
        } else {
            return Err(CryptoError::BufferTooSmall);
        }
        self.push(content)
    }
}

/// Derive the certificate serial number from the subject public key
///
/// First 20 bytes of SHA-256 over the SEC1 point, masked positive and
/// nonzero so the DER INTEGER is always exactly 20 bytes.
#[must_use]
pub fn serial_from_key(public: &EccPublicKey) -> [u8; SERIAL_SIZE] {
    let digest = hash::sha256(&public.sec1_uncompressed());
    let mut serial = [0u8; SERIAL_SIZE];
    serial.copy_from_slice(&digest[..SERIAL_SIZE]);
    serial[0] &= 0x7F;
    serial[0] |= 0x01;
    serial
}

/// One RelativeDistinguishedName: SET { SEQUENCE { oid, string } }
fn push_rdn(
    out: &mut DerBuf<'_>,
    oid: &[u8],
    string_tag: u8,
    value: &str,
) -> Result<(), CryptoError> {
    let mut atv = [0u8; 48];
    let mut a = DerBuf::new(&mut atv);
    a.push(oid)?;
    a.push_tlv(string_tag, value.as_bytes())?;

    let mut seq = [0u8; 52];
    let mut s = DerBuf::new(&mut seq);
    s.push_tlv(TAG_SEQUENCE, a.as_slice())?;

    out.push_tlv(TAG_SET, s.as_slice())
}

/// RDNSequence for `CN=…, O=…, C=…`
fn encode_name(name: &Name, out: &mut DerBuf<'_>) -> Result<(), CryptoError> {
    let mut body = [0u8; 120];
    let mut b = DerBuf::new(&mut body);
    push_rdn(&mut b, &OID_COMMON_NAME, TAG_UTF8_STRING, name.common_name)?;
    push_rdn(&mut b, &OID_ORG, TAG_UTF8_STRING, name.org)?;
    push_rdn(&mut b, &OID_COUNTRY, TAG_PRINTABLE_STRING, name.country)?;
    out.push_tlv(TAG_SEQUENCE, b.as_slice())
}

/// DER INTEGER from unsigned big-endian bytes
fn push_der_uint(out: &mut DerBuf<'_>, be: &[u8]) -> Result<(), CryptoError> {
    let mut start = 0;
    while start + 1 < be.len() && be[start] == 0 {
        start += 1;
    }
    let trimmed = &be[start..];

    let mut content = [0u8; 33];
    let len = if trimmed.first().is_some_and(|&b| b & 0x80 != 0) {
        content[1..=trimmed.len()].copy_from_slice(trimmed);
        trimmed.len() + 1
    } else {
        content[..trimmed.len()].copy_from_slice(trimmed);
        trimmed.len()
    };
    out.push_tlv(TAG_INTEGER, &content[..len])
}

/// ECDSA signature value: SEQUENCE { INTEGER r, INTEGER s }
fn push_signature(out: &mut DerBuf<'_>, raw: &[u8; SIGNATURE_SIZE]) -> Result<(), CryptoError> {
    let mut body = [0u8; 72];
    let mut b = DerBuf::new(&mut body);
    push_der_uint(&mut b, &raw[..32])?;
    push_der_uint(&mut b, &raw[32..])?;

    // Wrapped in a BIT STRING with zero unused bits
    let mut bits = [0u8; 80];
    let mut s = DerBuf::new(&mut bits);
    s.push(&[0x00])?;
    s.push_tlv(TAG_SEQUENCE, b.as_slice())?;
    out.push_tlv(TAG_BIT_STRING, s.as_slice())
}

/// Issue a PKCS#10 certificate signing request
///
/// The request binds `subject` to the keypair's public key and is
/// self-signed with the same keypair. Returns the PEM length written
/// into `out`.
pub fn write_csr_pem<R: CryptoRng>(
    subject: &Name,
    keypair: &EccKeypair,
    rng: &mut R,
    out: &mut [u8],
) -> Result<usize, CryptoError> {
    // CertificationRequestInfo ::= SEQUENCE {
    //     version INTEGER 0, subject, subjectPKInfo, attributes [0] }
    let mut info_body = [0u8; 256];
    let mut b = DerBuf::new(&mut info_body);
    b.push(&[TAG_INTEGER, 0x01, 0x00])?;
    encode_name(subject, &mut b)?;
    b.push(&spki_der(&keypair.public()))?;
    b.push(&[TAG_CONTEXT_0, 0x00])?;

    let mut info = [0u8; 280];
    let mut i = DerBuf::new(&mut info);
    i.push_tlv(TAG_SEQUENCE, b.as_slice())?;

    let raw = ecdsa::sign(keypair, i.as_slice(), rng)?;

    // CertificationRequest ::= SEQUENCE { info, algorithm, signature }
    let mut csr_body = [0u8; 400];
    let mut c = DerBuf::new(&mut csr_body);
    c.push(i.as_slice())?;
    c.push(&ALG_ECDSA_SHA256)?;
    push_signature(&mut c, &raw)?;

    let mut csr = [0u8; 420];
    let mut top = DerBuf::new(&mut csr);
    top.push_tlv(TAG_SEQUENCE, c.as_slice())?;

    let written =
        pem_rfc7468::encode("CERTIFICATE REQUEST", pem_rfc7468::LineEnding::LF, top.as_slice(), out)
            .map_err(|_| CryptoError::BufferTooSmall)?;
    Ok(written.len())
}

/// Issue an X.509 v1 certificate over `subject_public`
///
/// Signed by `issuer_keypair`; the serial number is derived from the
/// subject key. Returns the PEM length written into `out`.
pub fn write_cert_pem<R: CryptoRng>(
    issuer: &Name,
    subject: &Name,
    subject_public: &EccPublicKey,
    issuer_keypair: &EccKeypair,
    rng: &mut R,
    out: &mut [u8],
) -> Result<usize, CryptoError> {
    let serial = serial_from_key(subject_public);

    // TBSCertificate (v1) ::= SEQUENCE {
    //     serialNumber, signature, issuer, validity, subject, subjectPKInfo }
    let mut tbs_body = [0u8; 448];
    let mut b = DerBuf::new(&mut tbs_body);
    push_der_uint(&mut b, &serial)?;
    b.push(&ALG_ECDSA_SHA256)?;
    encode_name(issuer, &mut b)?;
    {
        let mut validity = [0u8; 32];
        let mut v = DerBuf::new(&mut validity);
        v.push_tlv(TAG_UTC_TIME, NOT_BEFORE)?;
        v.push_tlv(TAG_UTC_TIME, NOT_AFTER)?;
        b.push_tlv(TAG_SEQUENCE, v.as_slice())?;
    }
    encode_name(subject, &mut b)?;
    b.push(&spki_der(subject_public))?;

    let mut tbs = [0u8; 470];
    let mut t = DerBuf::new(&mut tbs);
    t.push_tlv(TAG_SEQUENCE, b.as_slice())?;

    let raw = ecdsa::sign(issuer_keypair, t.as_slice(), rng)?;

    // Certificate ::= SEQUENCE { tbsCertificate, algorithm, signature }
    let mut cert_body = [0u8; 580];
    let mut c = DerBuf::new(&mut cert_body);
    c.push(t.as_slice())?;
    c.push(&ALG_ECDSA_SHA256)?;
    push_signature(&mut c, &raw)?;

    let mut cert = [0u8; 600];
    let mut top = DerBuf::new(&mut cert);
    top.push_tlv(TAG_SEQUENCE, c.as_slice())?;

    let written =
        pem_rfc7468::encode("CERTIFICATE", pem_rfc7468::LineEnding::LF, top.as_slice(), out)
            .map_err(|_| CryptoError::BufferTooSmall)?;
    Ok(written.len())
}
