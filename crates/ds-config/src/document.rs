//! Reading and writing YAML/JSON configuration documents.
//!
//! Both formats are parsed into a `serde_json::Value` tree so the validator
//! sees one representation regardless of the file on disk.

use ds_common::{Error, Result};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::Path;

/// On-disk configuration format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Yaml,
    Json,
}

impl DocumentFormat {
    /// Pick the format from a file extension; anything but `.json` is YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => DocumentFormat::Json,
            _ => DocumentFormat::Yaml,
        }
    }
}

/// Parse document text into a value tree.
pub fn parse_document(text: &str, format: DocumentFormat) -> Result<Value> {
    let value = match format {
        DocumentFormat::Json => serde_json::from_str(text)?,
        DocumentFormat::Yaml => serde_yaml::from_str(text)?,
    };
    Ok(value)
}

/// Read and parse a document, choosing the format from its extension.
pub fn read_document(path: &Path) -> Result<Value> {
    let text = fs::read_to_string(path).map_err(|e| Error::io_at(path, e))?;
    parse_document(&text, DocumentFormat::from_path(path))
}

/// Serialize `value` to `path`, replacing any existing file.
pub fn write_document<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| Error::io_at(parent, e))?;
        }
    }

    let text = match DocumentFormat::from_path(path) {
        DocumentFormat::Json => {
            let mut text = serde_json::to_string_pretty(value)?;
            text.push('\n');
            text
        }
        DocumentFormat::Yaml => serde_yaml::to_string(value)?,
    };

    fs::write(path, text).map_err(|e| Error::io_at(path, e))
}
