use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::io::{self, Read};

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One unit of retrieval work, as described by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievePlan {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: Value,
}

impl RetrievePlan {
    /// Host the plan must be executed against, if it is not the default API
    /// connection. Blank hosts count as absent.
    pub fn remote_host(&self) -> Option<&str> {
        self.host
            .as_deref()
            .map(str::trim)
            .filter(|host| !host.is_empty())
    }
}

/// Plans keyed by their server-assigned identifier. Iteration is in key order.
pub type PlanSet = BTreeMap<String, RetrievePlan>;

/// Destination paths already written during one retrieval run.
#[derive(Debug, Default, Clone)]
pub struct PathRegistry {
    paths: HashSet<Utf8PathBuf>,
}

impl PathRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `path` and reports whether it had already been written in this run.
    pub fn register(&mut self, path: &Utf8Path) -> bool {
        !self.paths.insert(path.to_path_buf())
    }

    pub fn contains(&self, path: &Utf8Path) -> bool {
        self.paths.contains(path)
    }
}

/// Response body of one executed plan: a ZIP archive as a byte stream.
pub struct ArchivePayload {
    label: String,
    reader: Box<dyn Read + Send>,
}

impl ArchivePayload {
    pub fn new(label: impl Into<String>, reader: Box<dyn Read + Send>) -> Self {
        Self {
            label: label.into(),
            reader,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Read for ArchivePayload {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl fmt::Debug for ArchivePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchivePayload")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_host_is_treated_as_default_connection() {
        let plan: RetrievePlan = serde_json::from_str(
            r#"{"url":"/metadata/retrieve","host":"  ","port":"","type":"metadataService","metadata":{}}"#,
        )
        .unwrap();
        assert_eq!(plan.remote_host(), None);
        assert_eq!(plan.kind, "metadataService");
    }

    #[test]
    fn registry_reports_second_sighting() {
        let mut registry = PathRegistry::new();
        let path = Utf8Path::new("out/pages/Foo.json");
        assert!(!registry.register(path));
        assert!(registry.register(path));
        assert!(registry.contains(path));
        assert!(!registry.contains(Utf8Path::new("out/pages/Bar.json")));
    }
}
