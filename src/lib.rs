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

//! Archetype Bundle - dependency-aware asset bundle loading
//!
//! Bundles are named packages of assets that may depend on other bundles.
//! The [`LoadCoordinator`] loads a bundle only after its dependencies,
//! deduplicates concurrent async requests, downloads bundles missing from
//! local storage, counts live asset handles, and evicts unreferenced bundles
//! after a debounce delay driven by [`LoadCoordinator::tick`].

pub mod asset;
pub mod bundle;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod graph;
pub mod io;
pub mod manifest;
pub mod prelude;
pub mod runner;

#[cfg(feature = "profiling")]
pub mod logging;

pub use asset::{AssetHandle, AssetRecord, AssetState};
pub use bundle::{BundleId, BundleRecord, BundleState};
pub use config::LoaderConfig;
pub use coordinator::{
    AssetCallback, BundleCallback, DownloadCallback, LoadCoordinator, LoadCoordinatorBuilder,
    LoaderStats,
};
pub use error::{BundleError, Result};
pub use graph::{BundleRegistry, DependencyGraphBuilder};
pub use io::{AssetData, BundleDecoder, BundleImage, Fetcher, LocalStorage};
pub use manifest::{Manifest, ManifestEntry};
pub use runner::{InlineRunner, JobRunner};

#[cfg(feature = "parallel")]
pub use runner::ThreadPoolRunner;
