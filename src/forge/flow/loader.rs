//! Flow loader - YAML/JSON file loading and parsing
//!
//! This module handles loading flow definitions from disk. The format is picked by file
//! extension: `.yaml`/`.yml` or `.json`.

use std::fs;
use std::path::Path;

use super::graph::FlowDefinition;
use crate::kit::error::FlowError;

/// Loads flow definitions from files
pub struct FlowLoader;

impl FlowLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a flow definition from a YAML or JSON file
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<FlowDefinition, FlowError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        match extension(path).as_deref() {
            Some("json") => Self::parse_json(&content),
            _ => Self::parse_yaml(&content),
        }
    }

    /// Parse a flow definition from a YAML string
    pub fn parse_yaml(content: &str) -> Result<FlowDefinition, FlowError> {
        let def: FlowDefinition = serde_yaml::from_str(content)?;
        Ok(def)
    }

    /// Parse a flow definition from a JSON string
    pub fn parse_json(content: &str) -> Result<FlowDefinition, FlowError> {
        let def: FlowDefinition = serde_json::from_str(content)?;
        Ok(def)
    }

    /// Load every flow file in a directory, sorted by file name. Other files are ignored.
    pub fn load_dir<P: AsRef<Path>>(&self, dir: P) -> Result<Vec<FlowDefinition>, FlowError> {
        let mut paths: Vec<_> = fs::read_dir(dir.as_ref())?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .filter(|p| {
                matches!(
                    extension(p).as_deref(),
                    Some("yaml") | Some("yml") | Some("json")
                )
            })
            .collect();
        paths.sort();

        let mut flows = Vec::with_capacity(paths.len());
        for path in paths {
            log::debug!("Loading flow from {}", path.display());
            flows.push(self.load_file(&path)?);
        }
        Ok(flows)
    }
}

impl Default for FlowLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}
