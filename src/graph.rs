// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bundle registry and the two-pass builder that wires its dependency graph.
//!
//! Pass 1 creates one [`BundleRecord`] per manifest entry and remembers the
//! raw dependency names. Pass 2 resolves every name to a [`BundleId`] and
//! wires both edge directions. Names can only be resolved once every entry
//! exists, since entries may reference bundles listed after them.

use ahash::AHashMap;
use slotmap::SlotMap;
use tracing::{debug, error};

use crate::bundle::{BundleId, BundleRecord, BundleState};
use crate::config::LoaderConfig;
use crate::error::{BundleError, Result};
use crate::manifest::{Manifest, ManifestEntry};

/// Arena of every bundle named in the manifest, addressed by [`BundleId`]
pub struct BundleRegistry {
    records: SlotMap<BundleId, BundleRecord>,
    by_name: AHashMap<String, BundleId>,
    /// Manifest order
    order: Vec<BundleId>,
}

impl BundleRegistry {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            records: SlotMap::with_capacity_and_key(capacity),
            by_name: AHashMap::with_capacity(capacity),
            order: Vec::with_capacity(capacity),
        }
    }

    pub fn id(&self, name: &str) -> Option<BundleId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: BundleId) -> Option<&BundleRecord> {
        self.records.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: BundleId) -> Option<&mut BundleRecord> {
        self.records.get_mut(id)
    }

    pub fn by_name(&self, name: &str) -> Option<&BundleRecord> {
        self.id(name).and_then(|id| self.records.get(id))
    }

    /// Records in manifest order
    pub fn iter(&self) -> impl Iterator<Item = (BundleId, &BundleRecord)> + '_ {
        self.order
            .iter()
            .filter_map(move |&id| self.records.get(id).map(|record| (id, record)))
    }

    pub fn ids(&self) -> &[BundleId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn state(&self, id: BundleId) -> Option<BundleState> {
        self.records.get(id).map(BundleRecord::state)
    }

    /// Loaded, no asset referenced or requested, and no dependent loaded or
    /// on its way to loaded (a dependent mid-decode still needs its parents)
    pub fn can_unload(&self, id: BundleId) -> bool {
        let Some(record) = self.records.get(id) else {
            return false;
        };
        record.is_loaded()
            && record.assets_idle()
            && record.children().iter().all(|&child| {
                self.state(child)
                    .is_none_or(|state| state != BundleState::Loaded && !state.is_in_flight())
            })
    }

    /// First dependent that keeps `id` resident
    pub(crate) fn blocking_child(&self, id: BundleId) -> Option<&BundleRecord> {
        self.records.get(id)?.children().iter().find_map(|&child| {
            self.records
                .get(child)
                .filter(|r| r.is_loaded() || r.state().is_in_flight())
        })
    }

    /// First bundle (manifest order) listing `asset`
    pub fn asset_owner(&self, asset: &str) -> Option<BundleId> {
        self.iter()
            .find(|(_, record)| record.asset(asset).is_some())
            .map(|(id, _)| id)
    }

    fn find_cycle(&self) -> Option<Vec<String>> {
        let mut marks: AHashMap<BundleId, Mark> = AHashMap::with_capacity(self.len());
        let mut stack = Vec::new();

        for &id in &self.order {
            if let Some(cycle) = self.visit(id, &mut marks, &mut stack) {
                return Some(
                    cycle
                        .into_iter()
                        .filter_map(|id| self.records.get(id).map(|r| r.name().to_string()))
                        .collect(),
                );
            }
        }
        None
    }

    fn visit(
        &self,
        id: BundleId,
        marks: &mut AHashMap<BundleId, Mark>,
        stack: &mut Vec<BundleId>,
    ) -> Option<Vec<BundleId>> {
        match marks.get(&id) {
            Some(Mark::Done) => return None,
            Some(Mark::Active) => {
                let start = stack.iter().position(|&s| s == id)?;
                let mut cycle = stack[start..].to_vec();
                cycle.push(id);
                return Some(cycle);
            }
            None => {}
        }

        marks.insert(id, Mark::Active);
        stack.push(id);
        if let Some(record) = self.records.get(id) {
            for &parent in record.parents() {
                if let Some(cycle) = self.visit(parent, marks, stack) {
                    return Some(cycle);
                }
            }
        }
        stack.pop();
        marks.insert(id, Mark::Done);
        None
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Active,
    Done,
}

/// Builds a [`BundleRegistry`] from manifest entries
pub struct DependencyGraphBuilder {
    registry: BundleRegistry,
    unresolved: Vec<(BundleId, Vec<String>)>,
    config: LoaderConfig,
}

impl DependencyGraphBuilder {
    pub fn new(config: &LoaderConfig) -> Self {
        Self {
            registry: BundleRegistry::with_capacity(0),
            unresolved: Vec::new(),
            config: config.clone(),
        }
    }

    /// Run both passes over a whole manifest
    pub fn build(manifest: &Manifest, config: &LoaderConfig) -> Result<BundleRegistry> {
        let mut builder = Self::new(config);
        builder.registry = BundleRegistry::with_capacity(manifest.len());
        for entry in &manifest.bundles {
            builder.add_entry(entry)?;
        }
        builder.resolve()
    }

    /// Pass 1: create the record and keep its dependency names for later
    pub fn add_entry(&mut self, entry: &ManifestEntry) -> Result<BundleId> {
        if self.registry.by_name.contains_key(&entry.name) {
            error!(bundle = %entry.name, "duplicate bundle in manifest");
            return Err(BundleError::DuplicateBundle(entry.name.clone()));
        }

        let file_name = self.config.file_name(&entry.name);
        let record = BundleRecord::new(&entry.name, file_name, &entry.assets);
        let id = self.registry.records.insert(record);
        self.registry.by_name.insert(entry.name.clone(), id);
        self.registry.order.push(id);
        self.unresolved.push((id, entry.dependencies.clone()));
        Ok(id)
    }

    /// Pass 2: resolve names to ids, wire parent and child edges, reject cycles
    pub fn resolve(mut self) -> Result<BundleRegistry> {
        for (id, dependencies) in std::mem::take(&mut self.unresolved) {
            for dependency in dependencies {
                let Some(parent) = self.registry.id(&dependency) else {
                    let bundle = self
                        .registry
                        .get(id)
                        .map(|r| r.name().to_string())
                        .unwrap_or_default();
                    error!(%bundle, %dependency, "manifest references undefined bundle");
                    return Err(BundleError::UnknownDependency { bundle, dependency });
                };

                if let Some(record) = self.registry.get_mut(id) {
                    record.add_parent(parent);
                }
                if let Some(record) = self.registry.get_mut(parent) {
                    record.add_child(id);
                }
            }
        }

        if let Some(cycle) = self.registry.find_cycle() {
            error!(cycle = ?cycle, "bundle dependency cycle");
            return Err(BundleError::DependencyCycle(cycle));
        }

        debug!(bundles = self.registry.len(), "bundle dependency graph built");
        Ok(self.registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, assets: &[&str], deps: &[&str]) -> ManifestEntry {
        ManifestEntry::new(name)
            .with_assets(assets.iter().copied())
            .with_dependencies(deps.iter().copied())
    }

    #[test]
    fn test_forward_references_resolve() -> Result<()> {
        // "a" references "base" before "base" is defined
        let manifest = Manifest::new(vec![
            entry("a", &["x"], &["base"]),
            entry("base", &["y"], &[]),
        ]);
        let registry = DependencyGraphBuilder::build(&manifest, &LoaderConfig::default())?;

        let a = registry.id("a").ok_or(BundleError::UnknownBundle("a".into()))?;
        let base = registry
            .id("base")
            .ok_or(BundleError::UnknownBundle("base".into()))?;
        assert_eq!(registry.get(a).map(|r| r.parents().to_vec()), Some(vec![base]));
        assert_eq!(registry.get(base).map(|r| r.children().to_vec()), Some(vec![a]));
        assert_eq!(registry.asset_owner("y"), Some(base));
        Ok(())
    }

    #[test]
    fn test_unknown_dependency_fails() {
        let manifest = Manifest::new(vec![entry("a", &["x"], &["ghost"])]);
        let err = DependencyGraphBuilder::build(&manifest, &LoaderConfig::default()).err();
        assert_eq!(
            err,
            Some(BundleError::UnknownDependency {
                bundle: "a".into(),
                dependency: "ghost".into()
            })
        );
    }

    #[test]
    fn test_duplicate_bundle_fails() {
        let manifest = Manifest::new(vec![entry("a", &[], &[]), entry("a", &[], &[])]);
        let err = DependencyGraphBuilder::build(&manifest, &LoaderConfig::default()).err();
        assert_eq!(err, Some(BundleError::DuplicateBundle("a".into())));
    }

    #[test]
    fn test_cycle_is_reported() {
        let manifest = Manifest::new(vec![
            entry("a", &[], &["b"]),
            entry("b", &[], &["c"]),
            entry("c", &[], &["a"]),
        ]);
        match DependencyGraphBuilder::build(&manifest, &LoaderConfig::default()) {
            Err(BundleError::DependencyCycle(path)) => {
                assert_eq!(path, vec!["a", "b", "c", "a"]);
            }
            other => panic!("expected cycle, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_diamond_is_not_a_cycle() -> Result<()> {
        let manifest = Manifest::new(vec![
            entry("core", &[], &[]),
            entry("left", &[], &["core"]),
            entry("right", &[], &["core"]),
            entry("top", &[], &["left", "right"]),
        ]);
        let registry = DependencyGraphBuilder::build(&manifest, &LoaderConfig::default())?;
        let core = registry
            .by_name("core")
            .ok_or(BundleError::UnknownBundle("core".into()))?;
        assert_eq!(core.children().len(), 2);
        Ok(())
    }

    #[test]
    fn test_file_name_uses_suffix() -> Result<()> {
        let config = LoaderConfig::default().with_bundle_suffix(".ab");
        let registry =
            DependencyGraphBuilder::build(&Manifest::new(vec![entry("ui", &[], &[])]), &config)?;
        assert_eq!(registry.by_name("ui").map(|r| r.file_name()), Some("ui.ab"));
        Ok(())
    }

    #[test]
    fn test_can_unload_requires_loaded() -> Result<()> {
        let registry = DependencyGraphBuilder::build(
            &Manifest::new(vec![entry("ui", &["button"], &[])]),
            &LoaderConfig::default(),
        )?;
        let ui = registry.id("ui").ok_or(BundleError::UnknownBundle("ui".into()))?;
        assert!(!registry.can_unload(ui));
        Ok(())
    }
}
