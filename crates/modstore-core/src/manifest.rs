//! Manifests: the path → digest listing of a file tree.
//!
//! # Canonical text form
//!
//! ```text
//! shake256:<128 hex chars>  acme/weather/v1/weather.proto\n
//! shake256:<128 hex chars>  buf.yaml\n
//! ```
//!
//! One line per file, sorted by path, digest and path separated by two
//! spaces, every line terminated by `\n`. The digest of this text is the
//! digest of the whole tree, so the encoding must never drift: parsing is
//! strict and only accepts text that re-serializes to the same bytes.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::blob::{Blob, BlobSet, MemoryBlob};
use crate::bucket::ReadBucket;
use crate::cancel::check_cancelled;
use crate::digest::{parse_digest, Digest, Digester};
use crate::error::{CasError, CasResult};
use crate::path::validate_path;

const SEPARATOR: &str = "  ";

/// Ordered, path-unique list of `(path, digest)` entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: BTreeMap<String, Digest>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a manifest from entries in any order.
    pub fn from_entries<I, P>(entries: I) -> CasResult<Self>
    where
        I: IntoIterator<Item = (P, Digest)>,
        P: AsRef<str>,
    {
        let mut manifest = Self::new();
        for (path, digest) in entries {
            manifest.insert(path.as_ref(), digest)?;
        }
        Ok(manifest)
    }

    /// Add an entry.
    ///
    /// Re-adding a path with the same digest is a no-op; with a different
    /// digest it fails.
    pub fn insert(&mut self, path: &str, digest: Digest) -> CasResult<()> {
        validate_path(path)?;
        match self.entries.get(path) {
            Some(existing) if existing == &digest => Ok(()),
            Some(_) => Err(CasError::DuplicatePath {
                path: path.to_string(),
            }),
            None => {
                self.entries.insert(path.to_string(), digest);
                Ok(())
            }
        }
    }

    /// Digest recorded for `path`.
    pub fn digest_for(&self, path: &str) -> Option<&Digest> {
        self.entries.get(path)
    }

    /// All paths, in canonical order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Paths whose content has `digest`.
    pub fn paths_for_digest<'a>(&'a self, digest: &'a Digest) -> impl Iterator<Item = &'a str> {
        self.entries
            .iter()
            .filter(move |(_, d)| *d == digest)
            .map(|(p, _)| p.as_str())
    }

    /// `(path, digest)` pairs in canonical order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Digest)> {
        self.entries.iter().map(|(p, d)| (p.as_str(), d))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse canonical manifest text.
    pub fn parse(text: &str) -> CasResult<Self> {
        let mut entries = BTreeMap::new();
        if text.is_empty() {
            return Ok(Self { entries });
        }

        let body = text.strip_suffix('\n').ok_or_else(|| CasError::MalformedManifest {
            line: text.split('\n').count(),
            reason: "missing trailing newline".to_string(),
        })?;

        let mut previous: Option<&str> = None;
        for (index, line) in body.split('\n').enumerate() {
            let line_no = index + 1;
            let malformed = |reason: String| CasError::MalformedManifest {
                line: line_no,
                reason,
            };

            if line.is_empty() {
                return Err(malformed("blank line".to_string()));
            }
            let (digest_str, path) = line
                .split_once(SEPARATOR)
                .ok_or_else(|| malformed("expected \"<digest>  <path>\"".to_string()))?;

            let digest = parse_digest(digest_str).map_err(|e| malformed(e.to_string()))?;
            if digest.to_string() != digest_str {
                return Err(malformed(format!(
                    "digest {:?} is not in canonical form",
                    digest_str
                )));
            }
            validate_path(path).map_err(|e| malformed(e.to_string()))?;

            if let Some(prev) = previous {
                if path == prev {
                    return Err(malformed(format!("duplicate path {:?}", path)));
                }
                if path < prev {
                    return Err(malformed(format!(
                        "path {:?} is out of order after {:?}",
                        path, prev
                    )));
                }
            }
            previous = Some(path);
            entries.insert(path.to_string(), digest);
        }

        Ok(Self { entries })
    }

    /// Parse canonical manifest bytes.
    pub fn from_bytes(bytes: &[u8]) -> CasResult<Self> {
        let text = std::str::from_utf8(bytes).map_err(|e| CasError::MalformedManifest {
            line: 0,
            reason: format!("manifest is not valid UTF-8: {}", e),
        })?;
        Self::parse(text)
    }

    /// Canonical text form.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for (path, digest) in &self.entries {
            out.push_str(&digest.to_string());
            out.push_str(SEPARATOR);
            out.push_str(path);
            out.push('\n');
        }
        out
    }

    /// The manifest itself as a blob, addressed by the digest of its text.
    pub fn blob(&self, digester: &Digester) -> MemoryBlob {
        MemoryBlob::from_content(digester, self.to_text())
    }

    /// Digest of the canonical text.
    pub fn digest(&self, digester: &Digester) -> Digest {
        digester.digest_bytes(self.to_text().as_bytes())
    }
}

impl fmt::Display for Manifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl FromStr for Manifest {
    type Err = CasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Digest every object in `bucket`, returning its manifest and the blobs.
pub async fn manifest_from_bucket(
    cancel: &CancellationToken,
    bucket: &dyn ReadBucket,
    digester: &Digester,
) -> CasResult<(Manifest, BlobSet)> {
    let objects = bucket.list(cancel, "").await?;

    let mut manifest = Manifest::new();
    let mut blobs = Vec::with_capacity(objects.len());
    for info in objects {
        check_cancelled(cancel)?;
        let content = bucket.get(cancel, &info.path).await?;
        let blob = MemoryBlob::from_content(digester, content);
        manifest.insert(&info.path, blob.digest().clone())?;
        blobs.push(blob);
    }

    let blob_set = BlobSet::from_memory_blobs(blobs)?;
    debug!(
        files = manifest.len(),
        blobs = blob_set.len(),
        "built manifest from bucket"
    );
    Ok((manifest, blob_set))
}
