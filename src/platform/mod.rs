//! What gets launched: the platform definition, the builder contributing
//! framework specifics, and the context shared between them.

pub mod builder;
pub mod context;
pub mod definition;

pub use crate::artifact_cache::{ArtifactReference, CachedArtifact};
pub use builder::{ConfiguredPlatformBuilder, PlatformBuilder};
pub use context::LaunchContext;
pub use definition::{PlatformBundle, PlatformDefinition};
