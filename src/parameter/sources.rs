//! Provenance attachments carried by parameters
//!
//! Sources are opaque to the engine: they are carried along, never inspected.

use serde::{Deserialize, Serialize};

/// A single bibliographic source
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    #[serde(default)]
    pub authors: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl Source {
    pub fn new(title: impl Into<String>) -> Self {
        Self { title: title.into(), ..Default::default() }
    }
}

/// Ordered list of sources attached to a parameter
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceCollection {
    sources: Vec<Source>,
}

impl SourceCollection {
    pub fn new(sources: Vec<Source>) -> Self {
        Self { sources }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Source> {
        self.sources.iter()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl From<Vec<Source>> for SourceCollection {
    fn from(sources: Vec<Source>) -> Self {
        Self::new(sources)
    }
}
