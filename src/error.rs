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

//! Error types

use std::fmt;

use crate::bundle::BundleState;

/// Bundle loader error type
///
/// Errors are `Clone` so a single failure can be delivered to every
/// continuation queued on the same bundle or asset.
#[derive(Debug, Clone, PartialEq)]
pub enum BundleError {
    /// Bundle name not present in the manifest
    UnknownBundle(String),

    /// Asset name not listed for the bundle in the manifest
    UnknownAsset { bundle: String, asset: String },

    /// Manifest entry depends on a bundle the manifest never defines
    UnknownDependency { bundle: String, dependency: String },

    /// Two manifest entries share a bundle name
    DuplicateBundle(String),

    /// Dependency edges form a cycle (names in traversal order)
    DependencyCycle(Vec<String>),

    /// Manifest bytes could not be decoded
    ManifestDecode(String),

    /// Configuration could not be parsed
    Config(String),

    /// Operation is not legal in the bundle's current state
    StateConflict {
        bundle: String,
        state: BundleState,
        operation: &'static str,
    },

    /// Platform cannot perform blocking local reads
    SyncLoadUnsupported(String),

    /// Synchronous load of a bundle with no local copy
    NotLocal(String),

    /// Fetch of remote bytes failed
    DownloadFailed { bundle: String, reason: String },

    /// Download did not complete inside the configured timeout
    DownloadTimedOut(String),

    /// Bytes could not be decoded into a bundle image
    DecodeFailed { bundle: String, reason: String },

    /// Decoded image has no entry for a manifest-listed asset
    AssetMissingFromImage { bundle: String, asset: String },

    /// A parent bundle failed to load
    DependencyFailed { bundle: String, dependency: String },

    /// Unload refused because the bundle is still referenced
    UnloadRefused { bundle: String, reason: String },

    /// Handle refers to an earlier load of its bundle or was already released
    StaleHandle { bundle: String, asset: String },

    /// IO error (file operations, etc.)
    Io(String),
}

impl fmt::Display for BundleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BundleError::UnknownBundle(name) => write!(f, "Unknown bundle: {name}"),
            BundleError::UnknownAsset { bundle, asset } => {
                write!(f, "Unknown asset '{asset}' in bundle '{bundle}'")
            }
            BundleError::UnknownDependency { bundle, dependency } => {
                write!(f, "Bundle '{bundle}' depends on undefined bundle '{dependency}'")
            }
            BundleError::DuplicateBundle(name) => write!(f, "Duplicate bundle in manifest: {name}"),
            BundleError::DependencyCycle(path) => {
                write!(f, "Bundle dependency cycle: {}", path.join(" -> "))
            }
            BundleError::ManifestDecode(msg) => write!(f, "Manifest decode error: {msg}"),
            BundleError::Config(msg) => write!(f, "Config error: {msg}"),
            BundleError::StateConflict {
                bundle,
                state,
                operation,
            } => write!(f, "Cannot {operation} bundle '{bundle}' while {state:?}"),
            BundleError::SyncLoadUnsupported(name) => {
                write!(f, "Synchronous load of '{name}' is not supported on this platform")
            }
            BundleError::NotLocal(name) => {
                write!(f, "Bundle '{name}' has no local copy; download it first")
            }
            BundleError::DownloadFailed { bundle, reason } => {
                write!(f, "Download of '{bundle}' failed: {reason}")
            }
            BundleError::DownloadTimedOut(name) => write!(f, "Download of '{name}' timed out"),
            BundleError::DecodeFailed { bundle, reason } => {
                write!(f, "Decode of '{bundle}' failed: {reason}")
            }
            BundleError::AssetMissingFromImage { bundle, asset } => {
                write!(f, "Bundle '{bundle}' image has no asset '{asset}'")
            }
            BundleError::DependencyFailed { bundle, dependency } => {
                write!(f, "Bundle '{bundle}' not loaded: dependency '{dependency}' failed")
            }
            BundleError::UnloadRefused { bundle, reason } => {
                write!(f, "Unload of '{bundle}' refused: {reason}")
            }
            BundleError::StaleHandle { bundle, asset } => {
                write!(f, "Stale handle for '{bundle}/{asset}'")
            }
            BundleError::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for BundleError {}

impl From<std::io::Error> for BundleError {
    fn from(err: std::io::Error) -> Self {
        BundleError::Io(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, BundleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_state_conflict() {
        let err = BundleError::StateConflict {
            bundle: "ui".to_string(),
            state: BundleState::Downloading,
            operation: "synchronously load",
        };
        assert_eq!(
            err.to_string(),
            "Cannot synchronously load bundle 'ui' while Downloading"
        );
    }

    #[test]
    fn test_display_cycle() {
        let err = BundleError::DependencyCycle(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(err.to_string(), "Bundle dependency cycle: a -> b -> a");
    }

    #[test]
    fn test_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(matches!(BundleError::from(io), BundleError::Io(msg) if msg == "gone"));
    }
}
