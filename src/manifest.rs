//! Bundle manifest: which assets each bundle holds and which bundles it needs.
//!
//! The binary form is a sequential stream: a bundle count, then per bundle its
//! name, its asset names and its direct dependency names, each list preceded
//! by its length (u32, little endian). A JSON form carries the same schema.

use std::path::Path;

use serde::{Deserialize, Serialize};
use speedy::{Readable, Writable};

use crate::error::{BundleError, Result};

/// One bundle as described by the manifest
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Readable, Writable)]
pub struct ManifestEntry {
    pub name: String,
    pub assets: Vec<String>,
    pub dependencies: Vec<String>,
}

impl ManifestEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_assets<I, S>(mut self, assets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.assets.extend(assets.into_iter().map(Into::into));
        self
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies
            .extend(dependencies.into_iter().map(Into::into));
        self
    }
}

/// Deserialized manifest, read once at startup
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Readable, Writable)]
pub struct Manifest {
    pub bundles: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn new(bundles: Vec<ManifestEntry>) -> Self {
        Self { bundles }
    }

    /// Decode the binary stream form
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::read_from_buffer(bytes).map_err(|e| BundleError::ManifestDecode(e.to_string()))
    }

    /// Encode to the binary stream form
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.write_to_vec()
            .map_err(|e| BundleError::ManifestDecode(e.to_string()))
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| BundleError::ManifestDecode(e.to_string()))
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| BundleError::ManifestDecode(e.to_string()))
    }

    /// Load from disk; `.json` files are parsed as JSON, anything else as binary
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            let text =
                std::str::from_utf8(&bytes).map_err(|e| BundleError::ManifestDecode(e.to_string()))?;
            Self::from_json_str(text)
        } else {
            Self::from_bytes(&bytes)
        }
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Manifest {
        Manifest::new(vec![
            ManifestEntry::new("base").with_assets(["y"]),
            ManifestEntry::new("a")
                .with_assets(["x"])
                .with_dependencies(["base"]),
        ])
    }

    #[test]
    fn test_binary_layout_is_count_prefixed() -> Result<()> {
        let manifest = Manifest::new(vec![ManifestEntry::new("ab").with_assets(["c"])]);
        let bytes = manifest.to_bytes()?;

        let expected: Vec<u8> = [
            &1u32.to_le_bytes()[..], // bundle count
            &2u32.to_le_bytes()[..],
            b"ab",
            &1u32.to_le_bytes()[..], // asset count
            &1u32.to_le_bytes()[..],
            b"c",
            &0u32.to_le_bytes()[..], // dependency count
        ]
        .concat();
        assert_eq!(bytes, expected);
        Ok(())
    }

    #[test]
    fn test_binary_decode() -> Result<()> {
        let manifest = sample();
        let decoded = Manifest::from_bytes(&manifest.to_bytes()?)?;
        assert_eq!(decoded, manifest);
        Ok(())
    }

    #[test]
    fn test_truncated_binary_is_rejected() -> Result<()> {
        let bytes = sample().to_bytes()?;
        let err = Manifest::from_bytes(&bytes[..bytes.len() - 3]);
        assert!(matches!(err, Err(BundleError::ManifestDecode(_))));
        Ok(())
    }

    #[test]
    fn test_json_decode() -> Result<()> {
        let json = r#"{ "bundles": [
            { "name": "base", "assets": ["y"], "dependencies": [] },
            { "name": "a", "assets": ["x"], "dependencies": ["base"] }
        ] }"#;
        assert_eq!(Manifest::from_json_str(json)?, sample());
        Ok(())
    }
}
