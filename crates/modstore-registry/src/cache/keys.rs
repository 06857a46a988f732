//! Store path derivation.
//!
//! ```text
//! <digestType>/<registry>/<owner>/<name>/<dashlessCommitId>[.ext]
//! blobs/<digestType>/<hex[0..2]>/<hex[2..]>
//! ```

use modstore_core::Digest;

use crate::data::CommitKey;

/// Extension of cached plugin binaries.
pub const PLUGIN_EXT: &str = "wasm";

/// Extension of cached module manifests.
pub const MANIFEST_EXT: &str = "manifest";

/// Directory holding content-addressed module file blobs.
pub const BLOBS_DIR: &str = "blobs";

/// Path of the entry for `key`.
pub fn commit_key_path(key: &CommitKey, ext: Option<&str>) -> String {
    let base = format!(
        "{}/{}/{}/{}/{}",
        key.digest.digest_type(),
        key.full_name.registry(),
        key.full_name.owner(),
        key.full_name.name(),
        key.commit_id.dashless()
    );
    match ext {
        Some(ext) => format!("{}.{}", base, ext),
        None => base,
    }
}

/// Path of the blob with `digest`, sharded on the first two hex characters.
pub fn blob_path(digest: &Digest) -> String {
    let hex = digest.hex();
    let (shard, rest) = hex.split_at(2.min(hex.len()));
    format!("{}/{}/{}/{}", BLOBS_DIR, digest.digest_type(), shard, rest)
}
