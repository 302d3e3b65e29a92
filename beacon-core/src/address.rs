use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
#[error("invalid content address {address:?}: {reason}")]
pub struct AddressError {
    pub address: String,
    pub reason: &'static str,
}

/// A `<source>:<resource>` pair naming one file under the content root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentAddress {
    source: String,
    resource: String,
}

impl ContentAddress {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Location of the addressed file under `content_root`.
    pub fn resolve(&self, content_root: &Path) -> PathBuf {
        content_root.join(&self.source).join(&self.resource)
    }
}

impl FromStr for ContentAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| AddressError {
            address: s.to_string(),
            reason,
        };

        let Some((source, resource)) = s.split_once(':') else {
            return Err(invalid("expected <source>:<resource>"));
        };
        if source.is_empty() || resource.is_empty() {
            return Err(invalid("source and resource must not be empty"));
        }
        if resource.contains(':') {
            return Err(invalid("expected exactly one ':'"));
        }
        if !is_contained(source) || source.contains('/') {
            return Err(invalid("source must be a single directory name"));
        }
        if !is_contained(resource) {
            return Err(invalid("resource must stay inside its source"));
        }

        Ok(Self {
            source: source.to_string(),
            resource: resource.to_string(),
        })
    }
}

impl TryFrom<String> for ContentAddress {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ContentAddress> for String {
    fn from(value: ContentAddress) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.resource)
    }
}

/// True when `relative` only walks downwards.
pub(crate) fn is_contained(relative: &str) -> bool {
    Path::new(relative)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
