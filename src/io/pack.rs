use crate::io::{AssetData, BundleDecoder, BundleImage};
use ahash::AHashMap;
use speedy::{Readable, Writable};
use std::sync::Arc;

const PACK_MAGIC: u32 = u32::from_le_bytes(*b"ABP1");

/// Minimal bundle container: a list of named blobs
#[derive(Clone, Debug, PartialEq, Eq, Readable, Writable)]
pub struct PackedBundle {
    magic: u32,
    entries: Vec<(String, Vec<u8>)>,
}

impl PackedBundle {
    pub fn new() -> Self {
        Self {
            magic: PACK_MAGIC,
            entries: Vec::new(),
        }
    }

    pub fn with_asset(mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.entries.push((name.into(), data.into()));
        self
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, String> {
        self.write_to_vec().map_err(|e| e.to_string())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, String> {
        let magic = bytes
            .get(..4)
            .and_then(|head| head.try_into().ok())
            .map(u32::from_le_bytes)
            .ok_or("pack shorter than its header")?;
        if magic != PACK_MAGIC {
            return Err(format!("bad pack magic {magic:#010x}"));
        }
        Self::read_from_buffer(bytes).map_err(|e| e.to_string())
    }
}

impl Default for PackedBundle {
    fn default() -> Self {
        Self::new()
    }
}

/// Decoded [`PackedBundle`]; assets are extracted as `Arc<Vec<u8>>`
pub struct PackedBundleImage {
    assets: AHashMap<String, Arc<Vec<u8>>>,
    size: usize,
}

impl PackedBundleImage {
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

impl BundleImage for PackedBundleImage {
    fn extract(&self, asset_name: &str) -> Option<AssetData> {
        self.assets
            .get(asset_name)
            .map(|data| data.clone() as AssetData)
    }

    fn memory_size(&self) -> usize {
        self.size
    }
}

/// Decoder for [`PackedBundle`] bytes
pub struct PackedBundleDecoder;

impl BundleDecoder for PackedBundleDecoder {
    fn decode(&self, _bundle_name: &str, bytes: &[u8]) -> Result<Arc<dyn BundleImage>, String> {
        let pack = PackedBundle::from_bytes(bytes)?;
        let size = pack.entries.iter().map(|(_, data)| data.len()).sum();
        let assets = pack
            .entries
            .into_iter()
            .map(|(name, data)| (name, Arc::new(data)))
            .collect();
        Ok(Arc::new(PackedBundleImage { assets, size }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_and_extract() -> Result<(), String> {
        let bytes = PackedBundle::new()
            .with_asset("hero.png", vec![1u8, 2, 3])
            .with_asset("hero.mat", b"lit".to_vec())
            .to_bytes()?;

        let image = PackedBundleDecoder.decode("hero", &bytes)?;
        assert_eq!(image.memory_size(), 6);

        let data = image.extract("hero.mat").ok_or("missing asset")?;
        let blob = data.downcast_ref::<Vec<u8>>().ok_or("wrong payload type")?;
        assert_eq!(blob.as_slice(), b"lit");
        assert!(image.extract("villain.png").is_none());
        Ok(())
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(PackedBundleDecoder.decode("x", b"definitely not a pack").is_err());
        assert!(PackedBundleDecoder.decode("x", &[]).is_err());
    }
}
