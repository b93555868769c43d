use anyhow::{Context, Result, bail};
use declarative::Topology;
use std::fs;
use std::path::Path;

use crate::schema::StackDocument;

/// Stack document format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// Pick the format from the file extension; anything but `.json` is TOML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Toml,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Toml => "TOML",
            Self::Json => "JSON",
        }
    }
}

/// Parse a stack document
pub fn parse_document(content: &str, format: ConfigFormat) -> Result<StackDocument> {
    match format {
        ConfigFormat::Toml => toml::from_str(content).map_err(anyhow::Error::from),
        ConfigFormat::Json => serde_json::from_str(content).map_err(anyhow::Error::from),
    }
}

/// Read, parse and convert the stack document at `path`.
///
/// Registration errors (duplicate ids, dangling references, wrong kinds) are
/// reported here. Invariants that need the whole topology are checked by
/// [`Topology::validate`].
pub fn load_stack(path: &Path) -> Result<Topology> {
    if !path.exists() {
        bail!(
            "Stack file not found: {} (use -f or STACKFORM_FILE to point at one)",
            path.display()
        );
    }
    let format = ConfigFormat::from_path(path);
    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read stack file: {}", path.display()))?;
    let document = parse_document(&content, format)
        .with_context(|| format!("Invalid {} in {}", format.name(), path.display()))?;

    log::debug!(
        "Loaded {} with {} resource declarations",
        path.display(),
        document.resources.len()
    );
    document
        .into_topology(path)
        .with_context(|| format!("Invalid stack in {}", path.display()))
}
