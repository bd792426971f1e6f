//! Provisioning and launching of OSGi framework platforms.
//!
//! A launch downloads the framework's system bundle plus the platform and
//! user bundles into a working-directory cache, computes the packages the
//! system bundle exports, lets a [`PlatformBuilder`] write framework-specific
//! configuration, and finally starts the JVM as a supervised child process
//! (or hands the command to a [`JavaRunner`]).
//!
//! # Architecture
//!
//! ```text
//! LaunchOrchestrator
//!     │
//!     ├── PlatformBuilder       main class, default definition, VM options
//!     ├── PlatformDefinition    system bundle, platform bundles, packages
//!     ├── ArtifactCache         <work>/bundles, canonical names, index
//!     ├── PackageListAggregator execution environments + extra packages
//!     └── LaunchExecutor
//!             ├── ProcessExecutor ── ProcessSupervisor ── StreamPipe x3
//!             ├── RunnerExecutor ─── JavaRunner
//!             └── DryRunExecutor
//!
//! VersionResolver ── MetadataSource (RepositoryDownloader)
//!     LATEST / SNAPSHOT resolution from maven-metadata.xml
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use framework_runner::artifact_cache::DefaultTransport;
//! use framework_runner::launch::{LaunchOrchestrator, ProcessExecutor};
//! use framework_runner::platform::ConfiguredPlatformBuilder;
//! use framework_runner::Configuration;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Configuration::load(Path::new("runner.toml"))?;
//! let builder = ConfiguredPlatformBuilder::new(config.platform.clone());
//! let orchestrator = LaunchOrchestrator::new(builder, Arc::new(DefaultTransport::new()?));
//! orchestrator.launch(config, &[], ProcessExecutor::new())?;
//! # Ok(())
//! # }
//! ```

pub mod artifact_cache;
pub mod config;
pub mod error;
pub mod launch;
pub mod maven;
pub mod packages;
pub mod platform;
pub mod preflight;
pub mod process;

pub use config::Configuration;
pub use error::{Error, Result};
pub use launch::{JavaRunner, LaunchExecutor, LaunchOrchestrator, LaunchOutcome};
pub use platform::{LaunchContext, PlatformBuilder};
