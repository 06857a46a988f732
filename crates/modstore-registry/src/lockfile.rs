//! Lock file support for reproducible module resolution.
//!
//! The lock file (`modstore.lock`) pins every dependency to a commit and
//! the digest of its manifest.
//!
//! # Lock File Format (v1)
//!
//! ```yaml
//! version: v1
//! deps:
//!   - remote: buf.build
//!     owner: acme
//!     repository: weather
//!     commit: a1b2c3d4e5f64a1b8c9d0e1f2a3b4c5d
//!     digest: shake256:1234075ae4a1e773...
//! ```

use std::path::Path;

use modstore_core::{run_cancellable, Digest};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::data::ModuleData;
use crate::error::{RegistryError, RegistryResult};
use crate::provider::DataProvider;
use crate::reference::{CommitId, FullName, ModulePin};
use crate::verify::DigestMismatchError;

/// Default lock file name.
pub const LOCKFILE_NAME: &str = "modstore.lock";

/// Current lock file schema version.
pub const LOCKFILE_VERSION: &str = "v1";

/// A module lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lockfile {
    /// Schema version.
    pub version: String,

    /// Locked dependencies, sorted by name.
    #[serde(default)]
    pub deps: Vec<LockedDep>,
}

/// A locked dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedDep {
    /// Registry host.
    pub remote: String,

    /// Owning user or organization.
    pub owner: String,

    /// Module name.
    pub repository: String,

    /// Pinned commit.
    pub commit: CommitId,

    /// Digest of the commit's manifest.
    pub digest: Digest,
}

impl LockedDep {
    pub fn full_name(&self) -> RegistryResult<FullName> {
        FullName::new(&self.remote, &self.owner, &self.repository)
    }

    pub fn pin(&self) -> RegistryResult<ModulePin> {
        Ok(ModulePin::new(
            self.full_name()?,
            self.commit,
            self.digest.clone(),
        ))
    }

    fn matches(&self, name: &FullName) -> bool {
        self.remote == name.registry()
            && self.owner == name.owner()
            && self.repository == name.name()
    }
}

impl From<&ModulePin> for LockedDep {
    fn from(pin: &ModulePin) -> Self {
        Self {
            remote: pin.full_name.registry().to_string(),
            owner: pin.full_name.owner().to_string(),
            repository: pin.full_name.name().to_string(),
            commit: pin.commit_id,
            digest: pin.digest.clone(),
        }
    }
}

/// Lock file verification result.
#[derive(Debug, Clone)]
pub struct VerifyLockResult {
    /// Whether every pin matched.
    pub all_match: bool,

    /// Pins whose content matched.
    pub matched: Vec<ModulePin>,

    /// Pins whose content did not match.
    pub mismatched: Vec<LockMismatch>,

    /// Pins no provider could supply.
    pub missing: Vec<ModulePin>,
}

/// A lock file mismatch.
#[derive(Debug, Clone)]
pub struct LockMismatch {
    pub pin: ModulePin,
    pub error: DigestMismatchError,
}

impl Lockfile {
    /// Create a new empty lock file.
    pub fn new() -> Self {
        Self {
            version: LOCKFILE_VERSION.to_string(),
            deps: Vec::new(),
        }
    }

    /// Load a lock file from a path.
    pub async fn load(
        cancel: &CancellationToken,
        path: impl AsRef<Path>,
    ) -> RegistryResult<Self> {
        let path = path.as_ref();

        let content = run_cancellable(cancel, async {
            fs::read_to_string(path).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    RegistryError::Lockfile {
                        message: format!("lock file not found: {}", path.display()),
                    }
                } else {
                    RegistryError::Lockfile {
                        message: format!("failed to read lock file: {}", e),
                    }
                }
            })
        })
        .await?;

        Self::parse(&content)
    }

    /// Parse a lock file from YAML content.
    pub fn parse(content: &str) -> RegistryResult<Self> {
        let lockfile: Lockfile =
            serde_yaml::from_str(content).map_err(|e| RegistryError::Lockfile {
                message: format!("failed to parse lock file: {}", e),
            })?;

        if lockfile.version != LOCKFILE_VERSION {
            return Err(RegistryError::Lockfile {
                message: format!(
                    "unsupported lock file version {:?}, expected {:?}",
                    lockfile.version, LOCKFILE_VERSION
                ),
            });
        }

        for dep in &lockfile.deps {
            dep.full_name().map_err(|e| RegistryError::Lockfile {
                message: format!("invalid dependency: {}", e),
            })?;
        }

        Ok(lockfile)
    }

    /// Save the lock file to a path.
    pub async fn save(
        &self,
        cancel: &CancellationToken,
        path: impl AsRef<Path>,
    ) -> RegistryResult<()> {
        let path = path.as_ref();
        let content = self.to_yaml()?;

        run_cancellable(cancel, async {
            fs::write(path, content)
                .await
                .map_err(|e| RegistryError::Lockfile {
                    message: format!("failed to write lock file: {}", e),
                })
        })
        .await?;

        info!(path = %path.display(), deps = self.deps.len(), "saved lock file");
        Ok(())
    }

    /// Convert to YAML string.
    pub fn to_yaml(&self) -> RegistryResult<String> {
        serde_yaml::to_string(self).map_err(|e| RegistryError::Lockfile {
            message: format!("failed to serialize lock file: {}", e),
        })
    }

    /// Add or update a pin.
    pub fn add_pin(&mut self, pin: &ModulePin) {
        self.deps.retain(|d| !d.matches(&pin.full_name));
        self.deps.push(LockedDep::from(pin));

        // Keep sorted by name
        self.deps.sort_by(|a, b| {
            (&a.remote, &a.owner, &a.repository).cmp(&(&b.remote, &b.owner, &b.repository))
        });
    }

    /// Remove a dependency.
    pub fn remove(&mut self, name: &FullName) -> bool {
        let len_before = self.deps.len();
        self.deps.retain(|d| !d.matches(name));
        self.deps.len() != len_before
    }

    /// Get a locked dependency by name.
    pub fn get(&self, name: &FullName) -> Option<&LockedDep> {
        self.deps.iter().find(|d| d.matches(name))
    }

    /// All pins, in lock file order.
    pub fn pins(&self) -> RegistryResult<Vec<ModulePin>> {
        self.deps.iter().map(LockedDep::pin).collect()
    }
}

impl Default for Lockfile {
    fn default() -> Self {
        Self::new()
    }
}

/// Fetch every pinned module and check it against its pin.
///
/// Cancellation and I/O failures abort; a module that cannot be found or
/// does not match is recorded and verification continues.
pub async fn verify_lockfile(
    cancel: &CancellationToken,
    lockfile: &Lockfile,
    provider: &dyn DataProvider<ModuleData>,
) -> RegistryResult<VerifyLockResult> {
    let mut matched = Vec::new();
    let mut mismatched = Vec::new();
    let mut missing = Vec::new();

    for pin in lockfile.pins()? {
        debug!(pin = %pin, "verifying locked module");

        let outcome = async {
            let key = pin.commit_key();
            let module = provider
                .get_for_keys(cancel, std::slice::from_ref(&key))
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| RegistryError::NotFound {
                    name: key.full_name.to_string(),
                    commit: key.commit_id.to_string(),
                })?;
            module.manifest_bytes(cancel).await
        }
        .await;

        match outcome {
            Ok(_) => matched.push(pin),
            Err(RegistryError::DigestMismatch(error)) => {
                warn!(pin = %pin, "locked module does not match its digest");
                mismatched.push(LockMismatch { pin, error });
            }
            Err(e) if e.is_not_found() => {
                warn!(pin = %pin, error = %e, "locked module not found");
                missing.push(pin);
            }
            Err(e) => return Err(e),
        }
    }

    let all_match = mismatched.is_empty() && missing.is_empty();

    Ok(VerifyLockResult {
        all_match,
        matched,
        mismatched,
        missing,
    })
}
