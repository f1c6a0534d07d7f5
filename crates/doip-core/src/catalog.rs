//! Response Catalog: deterministic request -> response lookup.
//!
//! Loaded once at construction from a JSON document of `{"req", "res"}`
//! hex-string pairs, then shared read-only across every client session.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use crate::error::ConfigError;

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    req: String,
    res: String,
}

/// Request -> response mapping, keyed on uppercase hex of the UDS request.
#[derive(Debug, Clone, Default)]
pub struct ResponseCatalog {
    entries: HashMap<String, Vec<u8>>,
}

impl ResponseCatalog {
    /// An empty catalog — every lookup falls through to the default
    /// synthesizer.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load a catalog from a JSON file.
    ///
    /// A missing file or malformed document is never fatal: this returns an
    /// empty catalog (and logs a warning) rather than propagating an error
    /// that would prevent the server from starting.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::try_load(path) {
            Ok(catalog) => catalog,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "response catalog not loaded, falling back to empty catalog");
                Self::empty()
            }
        }
    }

    fn try_load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::CatalogRead {
            path: path.display().to_string(),
            source: e.to_string(),
        })?;
        Self::from_json(&raw)
    }

    /// Parse a catalog from an in-memory JSON document (used by `load` and
    /// directly by tests).
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let parsed: Vec<CatalogEntry> = serde_json::from_str(raw)
            .map_err(|e| ConfigError::CatalogEntry(e.to_string()))?;

        let mut entries = HashMap::with_capacity(parsed.len());
        for entry in parsed {
            let req = normalize_hex(&entry.req).ok_or_else(|| {
                ConfigError::CatalogEntry(format!("non-hex request key: {}", entry.req))
            })?;
            let res = hex::decode(normalize_hex(&entry.res).ok_or_else(|| {
                ConfigError::CatalogEntry(format!("non-hex response value: {}", entry.res))
            })?)
            .map_err(|e| ConfigError::CatalogEntry(e.to_string()))?;

            if entries.insert(req.clone(), res).is_some() {
                warn!(request = %req, "duplicate response catalog entry, last one wins");
            }
        }

        Ok(Self { entries })
    }

    /// Exact-match lookup on the canonicalized (uppercase hex) request.
    pub fn lookup(&self, request_hex: &str) -> Option<Vec<u8>> {
        self.entries.get(request_hex).cloned()
    }

    /// Number of entries currently loaded.
    pub fn size(&self) -> usize {
        self.entries.len()
    }
}

fn normalize_hex(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() || s.len() % 2 != 0 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(s.to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_and_looks_up_entries() {
        let catalog = ResponseCatalog::from_json(
            r#"[{"req":"22F190","res":"62F190414243"}]"#,
        )
        .unwrap();
        assert_eq!(catalog.size(), 1);
        assert_eq!(
            catalog.lookup("22F190"),
            Some(vec![0x62, 0xF1, 0x90, 0x41, 0x42, 0x43])
        );
        assert_eq!(catalog.lookup("DEADBEEF"), None);
    }

    #[test]
    fn duplicate_keys_last_wins() {
        let catalog = ResponseCatalog::from_json(
            r#"[{"req":"1003","res":"5003"},{"req":"1003","res":"5003003201F4"}]"#,
        )
        .unwrap();
        assert_eq!(catalog.size(), 1);
        assert_eq!(catalog.lookup("1003"), Some(hex::decode("5003003201F4").unwrap()));
    }

    #[test]
    fn missing_file_yields_empty_catalog() {
        let catalog = ResponseCatalog::load("/nonexistent/path/catalog.json");
        assert_eq!(catalog.size(), 0);
    }

    #[test]
    fn rejects_non_hex_keys() {
        let err = ResponseCatalog::from_json(r#"[{"req":"ZZ","res":"00"}]"#).unwrap_err();
        assert!(matches!(err, ConfigError::CatalogEntry(_)));
    }
}
