use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::ContentAddress;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read site definition {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse site definition {}: {source}", path.display())]
    Parsing {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// The site definition file: every site published by one build, keyed by
/// name. Sites are walked in name order.
#[derive(Deserialize, Serialize, Debug, Default, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub sites: BTreeMap<String, SiteDefinition>,
}

impl Config {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(&data).map_err(|source| ConfigError::Parsing {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }
}

#[derive(Deserialize, Serialize, Debug, Default, Clone, PartialEq)]
#[serde(default)]
pub struct SiteDefinition {
    pub domains: Vec<String>,
    pub content: Vec<ContentMapping>,
    pub pages: Vec<PageTemplate>,
}

/// Copies one content resource verbatim to every listed path.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ContentMapping {
    pub paths: Vec<String>,
    pub address: ContentAddress,
}

impl std::fmt::Display for ContentMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "content {} -> {:?}", self.address, self.paths)
    }
}

/// Renders one template against `data` once for every listed path.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct PageTemplate {
    pub paths: Vec<String>,
    pub template: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl std::fmt::Display for PageTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "page {} -> {:?}", self.template, self.paths)
    }
}
