use std::fmt;

use crate::passkey::errors::PasskeyError;

const TAG_SEQUENCE: u8 = 0x30;
const TAG_INTEGER: u8 = 0x02;
const SCALAR_LEN: usize = 32;

pub const COMPACT_SIGNATURE_LEN: usize = 2 * SCALAR_LEN;

/// Order of the NIST P-256 (secp256r1) group.
const P256_ORDER: [u8; SCALAR_LEN] = [
    0xff, 0xff, 0xff, 0xff, 0x00, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xbc, 0xe6, 0xfa, 0xad, 0xa7, 0x17, 0x9e, 0x84, 0xf3, 0xb9, 0xca, 0xc2, 0xfc, 0x63, 0x25, 0x51,
];

/// floor(P256_ORDER / 2)
const P256_HALF_ORDER: [u8; SCALAR_LEN] = [
    0x7f, 0xff, 0xff, 0xff, 0x80, 0x00, 0x00, 0x00, 0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xde, 0x73, 0x7d, 0x56, 0xd3, 0x8b, 0xcf, 0x42, 0x79, 0xdc, 0xe5, 0x61, 0x7e, 0x31, 0x92, 0xa8,
];

/// ECDSA P-256 signature as `r || s`, each 32 bytes big-endian, with `s` in the lower
/// half of the group order.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CompactSignature([u8; COMPACT_SIGNATURE_LEN]);

impl CompactSignature {
    pub fn as_bytes(&self) -> &[u8; COMPACT_SIGNATURE_LEN] {
        &self.0
    }

    pub fn r(&self) -> &[u8] {
        &self.0[..SCALAR_LEN]
    }

    pub fn s(&self) -> &[u8] {
        &self.0[SCALAR_LEN..]
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl AsRef<[u8]> for CompactSignature {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for CompactSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CompactSignature({})", self.to_hex())
    }
}

/// Converts a DER `SEQUENCE { INTEGER r, INTEGER s }` into the 64-byte compact form
/// expected by the on-chain verifier, replacing `s` with `n - s` when `s > n/2`.
pub fn compact_signature(der: &[u8]) -> Result<CompactSignature, PasskeyError> {
    let mut outer = DerReader::new(der);
    let body = outer.read(TAG_SEQUENCE, "SEQUENCE")?;
    outer.expect_end("signature")?;

    let mut fields = DerReader::new(body);
    let r = scalar(fields.read(TAG_INTEGER, "INTEGER r")?, "r")?;
    let mut s = scalar(fields.read(TAG_INTEGER, "INTEGER s")?, "s")?;
    fields.expect_end("SEQUENCE")?;

    if s > P256_HALF_ORDER {
        tracing::debug!("Normalizing high-S signature");
        s = sub_be(&P256_ORDER, &s);
    }

    let mut out = [0u8; COMPACT_SIGNATURE_LEN];
    out[..SCALAR_LEN].copy_from_slice(&r);
    out[SCALAR_LEN..].copy_from_slice(&s);
    Ok(CompactSignature(out))
}

struct DerReader<'a> {
    input: &'a [u8],
}

impl<'a> DerReader<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self { input }
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8], PasskeyError> {
        if self.input.len() < n {
            return Err(invalid(format!("{what} overruns the signature")));
        }
        let (head, rest) = self.input.split_at(n);
        self.input = rest;
        Ok(head)
    }

    /// Reads one TLV with tag `tag` and returns its value.
    fn read(&mut self, tag: u8, what: &str) -> Result<&'a [u8], PasskeyError> {
        let found = self.take(1, what)?[0];
        if found != tag {
            return Err(invalid(format!(
                "expected {what} (0x{tag:02x}), found 0x{found:02x}"
            )));
        }

        let len = match self.take(1, what)?[0] {
            short @ 0x00..=0x7f => short as usize,
            0x81 => match self.take(1, what)?[0] {
                long @ 0x80..=0xff => long as usize,
                _ => return Err(invalid(format!("non-minimal length for {what}"))),
            },
            other => {
                return Err(invalid(format!(
                    "unsupported length byte 0x{other:02x} for {what}"
                )));
            }
        };

        self.take(len, what)
    }

    fn expect_end(&self, what: &str) -> Result<(), PasskeyError> {
        if self.input.is_empty() {
            Ok(())
        } else {
            Err(invalid(format!("trailing bytes after {what}")))
        }
    }
}

/// Big-endian INTEGER content to a fixed 32-byte scalar in `[0, n)`.
fn scalar(bytes: &[u8], name: &str) -> Result<[u8; SCALAR_LEN], PasskeyError> {
    if bytes.is_empty() {
        return Err(invalid(format!("empty INTEGER {name}")));
    }
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    let digits = &bytes[start..];
    if digits.len() > SCALAR_LEN {
        return Err(invalid(format!("INTEGER {name} longer than 32 bytes")));
    }

    let mut out = [0u8; SCALAR_LEN];
    out[SCALAR_LEN - digits.len()..].copy_from_slice(digits);

    if out >= P256_ORDER {
        return Err(invalid(format!("INTEGER {name} is not below the curve order")));
    }
    Ok(out)
}

/// a - b for big-endian values with a >= b.
fn sub_be(a: &[u8; SCALAR_LEN], b: &[u8; SCALAR_LEN]) -> [u8; SCALAR_LEN] {
    let mut out = [0u8; SCALAR_LEN];
    let mut borrow = 0u16;
    for i in (0..SCALAR_LEN).rev() {
        let subtrahend = b[i] as u16 + borrow;
        let minuend = a[i] as u16;
        if minuend >= subtrahend {
            out[i] = (minuend - subtrahend) as u8;
            borrow = 0;
        } else {
            out[i] = (minuend + 0x100 - subtrahend) as u8;
            borrow = 1;
        }
    }
    out
}

fn invalid(msg: String) -> PasskeyError {
    tracing::error!("Invalid DER signature: {}", msg);
    PasskeyError::InvalidSignatureFormat(msg)
}
