//! Typed content digests.
//!
//! A [`Digest`] is a hash value tagged with the algorithm that produced it.
//! The set of algorithms is closed: adding one is a code change, so callers
//! can never be talked into accepting a weaker hash through a digest string.
//!
//! # String form
//!
//! ```text
//! shake256:1234075ae4a1e77316cf2d80...
//! ```

use std::fmt;
use std::io::Read;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::digest::{ExtendableOutput, Update, XofReader};
use sha3::Shake256;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{CasError, CasResult};

const READ_BUF_SIZE: usize = 8192;

/// Supported digest algorithms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DigestType {
    /// SHAKE256 with 512 bits of output.
    #[default]
    Shake256,
}

impl DigestType {
    /// Every supported type, in preference order.
    pub const ALL: [DigestType; 1] = [DigestType::Shake256];

    /// String token used in digest strings and cache paths.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shake256 => "shake256",
        }
    }

    /// Fixed output length in bytes.
    pub fn output_len(&self) -> usize {
        match self {
            Self::Shake256 => 64,
        }
    }

    /// Parse a digest type token.
    pub fn parse(token: &str) -> CasResult<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == token)
            .ok_or_else(|| CasError::UnknownDigestType {
                digest_type: token.to_string(),
            })
    }
}

impl fmt::Display for DigestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DigestType {
    type Err = CasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A digest value tagged with its algorithm. Immutable once built.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest {
    digest_type: DigestType,
    value: Vec<u8>,
}

impl Digest {
    /// Build a digest from raw bytes, checking the algorithm's output length.
    pub fn new(digest_type: DigestType, value: impl Into<Vec<u8>>) -> CasResult<Self> {
        let value = value.into();
        if value.len() != digest_type.output_len() {
            return Err(CasError::InvalidDigest {
                reason: format!(
                    "{} digest must be {} bytes, got {}",
                    digest_type,
                    digest_type.output_len(),
                    value.len()
                ),
            });
        }
        Ok(Self { digest_type, value })
    }

    /// Build a digest from a hex string.
    pub fn from_hex(digest_type: DigestType, hex_value: &str) -> CasResult<Self> {
        let value = hex::decode(hex_value).map_err(|e| CasError::InvalidDigest {
            reason: format!("invalid hex: {}", e),
        })?;
        Self::new(digest_type, value)
    }

    /// Algorithm that produced this digest.
    pub fn digest_type(&self) -> DigestType {
        self.digest_type
    }

    /// Raw digest bytes.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Lowercase hex of the raw bytes.
    pub fn hex(&self) -> String {
        hex::encode(&self.value)
    }
}

/// Parse a `type:hex` digest string.
pub fn parse_digest(s: &str) -> CasResult<Digest> {
    let (type_token, hex_value) = s.split_once(':').ok_or_else(|| CasError::InvalidDigest {
        reason: format!("{:?} has no digest type separator ':'", s),
    })?;
    let digest_type = DigestType::parse(type_token)?;
    Digest::from_hex(digest_type, hex_value)
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.digest_type, self.hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self)
    }
}

impl FromStr for Digest {
    type Err = CasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_digest(s)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse_digest(&s).map_err(serde::de::Error::custom)
    }
}

/// Computes digests of a single algorithm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Digester {
    digest_type: DigestType,
}

impl Digester {
    pub fn new(digest_type: DigestType) -> Self {
        Self { digest_type }
    }

    pub fn digest_type(&self) -> DigestType {
        self.digest_type
    }

    /// Digest everything a reader yields.
    pub fn digest_reader<R: Read>(&self, mut reader: R) -> CasResult<Digest> {
        let mut state = HashState::new(self.digest_type);
        let mut buf = [0_u8; READ_BUF_SIZE];

        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            state.update(&buf[..n]);
        }

        Ok(state.finish())
    }

    /// Digest everything an async reader yields.
    pub async fn digest_async_reader<R: AsyncRead + Unpin>(
        &self,
        mut reader: R,
    ) -> CasResult<Digest> {
        let mut state = HashState::new(self.digest_type);
        let mut buf = vec![0_u8; READ_BUF_SIZE];

        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            state.update(&buf[..n]);
        }

        Ok(state.finish())
    }

    /// Digest an in-memory byte slice.
    pub fn digest_bytes(&self, bytes: &[u8]) -> Digest {
        let mut state = HashState::new(self.digest_type);
        state.update(bytes);
        state.finish()
    }
}

enum HashState {
    Shake256(Shake256),
}

impl HashState {
    fn new(digest_type: DigestType) -> Self {
        match digest_type {
            DigestType::Shake256 => Self::Shake256(Shake256::default()),
        }
    }

    fn update(&mut self, bytes: &[u8]) {
        match self {
            Self::Shake256(hasher) => hasher.update(bytes),
        }
    }

    fn finish(self) -> Digest {
        match self {
            Self::Shake256(hasher) => {
                let mut out = vec![0_u8; DigestType::Shake256.output_len()];
                XofReader::read(&mut hasher.finalize_xof(), &mut out);
                Digest {
                    digest_type: DigestType::Shake256,
                    value: out,
                }
            }
        }
    }
}
