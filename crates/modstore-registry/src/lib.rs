//! Tamper-proof module and plugin data for the module store.
//!
//! This crate builds on `modstore-core`, providing:
//!
//! - Module names, commit ids and pins
//! - Payloads verified against their pinned digest exactly once
//! - A local cache for modules and plugins, and a caching provider
//! - Assembly of module data from download responses
//! - Lock file support for reproducible resolution
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use modstore_registry::{
//!     CacheConfig, DataCache, DataProvider, Lockfile, ModuleData, LOCKFILE_NAME,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(remote: Arc<dyn DataProvider<ModuleData>>) -> anyhow::Result<()> {
//! let cache = DataCache::open(&CacheConfig::from_env()?)?;
//! let provider = cache.module_provider(remote);
//! let cancel = CancellationToken::new();
//!
//! let lockfile = Lockfile::load(&cancel, LOCKFILE_NAME).await?;
//! let keys: Vec<_> = lockfile.pins()?.iter().map(|pin| pin.commit_key()).collect();
//! for module in provider.get_for_keys(&cancel, &keys).await? {
//!     let files = module.bucket(&cancel).await?;
//!     println!("{}: {} files", module.key(), files.manifest().len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `MODSTORE_CACHE_DIR` | Cache root (default: `<user cache dir>/modstore`) |
//! | `MODSTORE_REGISTRY` | Registry assumed for `owner/name` references |

pub mod cache;
pub mod config;
pub mod data;
pub mod download;
pub mod error;
pub mod lockfile;
pub mod provider;
pub mod reference;
pub mod verify;

// Re-export main types
pub use cache::{DataCache, DataStore, ModuleDataStore, PluginDataStore};
pub use config::{default_cache_dir, CacheConfig, CACHE_DIR_ENV, REGISTRY_ENV};
pub use data::{CommitData, CommitKey, ModuleData, PluginData};
pub use download::DownloadedModule;
pub use error::{RegistryError, RegistryResult};
pub use lockfile::{
    verify_lockfile, LockMismatch, LockedDep, Lockfile, VerifyLockResult, LOCKFILE_NAME,
    LOCKFILE_VERSION,
};
pub use provider::{CachingProvider, DataProvider};
pub use reference::{CommitId, FullName, ModulePin};
pub use verify::{DataKind, DigestMismatchError, FetchFuture, VerifiedPayload};
