//! Module names, commit ids and pins.
//!
//! - `buf.build/acme/weather` → [`FullName`] with an explicit registry
//! - `acme/weather` → [`FullName`] in the default registry, when one is given
//! - `0123456789abcdef0123456789abcdef` or the dashed UUID form → [`CommitId`]

use std::fmt;
use std::str::FromStr;

use modstore_core::Digest;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::data::CommitKey;
use crate::error::{RegistryError, RegistryResult};

/// Fully qualified module or plugin name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FullName {
    registry: String,
    owner: String,
    name: String,
}

impl FullName {
    /// Build a name from its components, validating each.
    pub fn new(
        registry: impl Into<String>,
        owner: impl Into<String>,
        name: impl Into<String>,
    ) -> RegistryResult<Self> {
        let full_name = Self {
            registry: registry.into(),
            owner: owner.into(),
            name: name.into(),
        };
        let reference = full_name.to_string();
        validate_registry(&reference, &full_name.registry)?;
        validate_component(&reference, "owner", &full_name.owner)?;
        validate_component(&reference, "name", &full_name.name)?;
        Ok(full_name)
    }

    /// Parse `registry/owner/name`, or `owner/name` when `default_registry`
    /// is given.
    ///
    /// # Examples
    ///
    /// ```
    /// use modstore_registry::FullName;
    ///
    /// let full = FullName::parse("buf.build/acme/weather", None).unwrap();
    /// assert_eq!(full.owner(), "acme");
    ///
    /// let short = FullName::parse("acme/weather", Some("buf.build")).unwrap();
    /// assert_eq!(short, full);
    ///
    /// assert!(FullName::parse("acme/weather", None).is_err());
    /// ```
    pub fn parse(reference: &str, default_registry: Option<&str>) -> RegistryResult<Self> {
        let invalid = |reason: &str| RegistryError::InvalidReference {
            reference: reference.to_string(),
            reason: reason.to_string(),
        };

        let parts: Vec<&str> = reference.split('/').collect();
        match parts.as_slice() {
            [registry, owner, name] => Self::new(*registry, *owner, *name),
            [owner, name] => {
                let registry = default_registry
                    .ok_or_else(|| invalid("missing registry and no default registry configured"))?;
                Self::new(registry, *owner, *name)
            }
            _ => Err(invalid("expected registry/owner/name")),
        }
    }

    pub fn registry(&self) -> &str {
        &self.registry
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for FullName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.registry, self.owner, self.name)
    }
}

impl FromStr for FullName {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s, None)
    }
}

fn validate_component(reference: &str, what: &str, value: &str) -> RegistryResult<()> {
    let invalid = |reason: String| RegistryError::InvalidReference {
        reference: reference.to_string(),
        reason,
    };
    if value.is_empty() {
        return Err(invalid(format!("{} is empty", what)));
    }
    if value == "." || value == ".." {
        return Err(invalid(format!("{} {:?} is not allowed", what, value)));
    }
    if let Some(c) = value
        .chars()
        .find(|c| *c == '/' || *c == ':' || c.is_whitespace() || c.is_control())
    {
        return Err(invalid(format!("{} contains invalid character {:?}", what, c)));
    }
    Ok(())
}

pub(crate) fn validate_registry(reference: &str, registry: &str) -> RegistryResult<()> {
    validate_component(reference, "registry", registry)?;
    let host_like = registry
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
        && !registry.starts_with(['.', '-'])
        && !registry.ends_with(['.', '-']);
    if !host_like {
        return Err(RegistryError::InvalidReference {
            reference: reference.to_string(),
            reason: format!("registry {:?} is not a host name", registry),
        });
    }
    Ok(())
}

/// Identifier of one commit of a module or plugin.
///
/// Printed in the dashless form used in cache paths and lock files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommitId(Uuid);

impl CommitId {
    /// A fresh random commit id.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse the dashless or dashed form.
    pub fn parse(value: &str) -> RegistryResult<Self> {
        Uuid::parse_str(value)
            .map(Self)
            .map_err(|e| RegistryError::InvalidReference {
                reference: value.to_string(),
                reason: format!("invalid commit id: {}", e),
            })
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }

    /// 32 lowercase hex characters, no dashes.
    pub fn dashless(&self) -> String {
        self.0.simple().to_string()
    }
}

impl From<Uuid> for CommitId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for CommitId {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for CommitId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CommitId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A module pinned to a commit and the digest of its content.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModulePin {
    pub full_name: FullName,
    pub commit_id: CommitId,
    pub digest: Digest,
}

impl ModulePin {
    pub fn new(full_name: FullName, commit_id: CommitId, digest: Digest) -> Self {
        Self {
            full_name,
            commit_id,
            digest,
        }
    }

    /// Key under which the pinned content is fetched and cached.
    pub fn commit_key(&self) -> CommitKey {
        CommitKey::new(self.full_name.clone(), self.commit_id, self.digest.clone())
    }
}

impl fmt::Display for ModulePin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.full_name, self.commit_id)
    }
}
