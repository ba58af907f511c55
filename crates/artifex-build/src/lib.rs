//! Artifex build: external toolchains behind substitutable seams.
//!
//! - [`runner`]: process execution with timeout (`CommandRunner`)
//! - [`installer`]: deduplicated package installs into a shared cache
//! - [`prepare`], [`bundler`], [`diagnostics`], [`preview`]: bundling
//! - [`builder`]: the composed `ArtifactBuilder`

pub mod builder;
pub mod bundler;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod fakes;
pub mod installer;
pub mod prepare;
pub mod preview;
pub mod runner;

pub use builder::ArtifactBuilder;
pub use bundler::{BundleOutput, BundleRequest, Bundler, EsbuildBundler, Loader};
pub use config::BuildConfig;
pub use diagnostics::parse_diagnostics;
pub use error::{BuildError, Result, RunnerError};
pub use fakes::FakeCommandRunner;
pub use installer::{install_command, InstallReport, PackageInstallState, PackageInstaller};
pub use prepare::prepare_entry;
pub use preview::preview_document;
pub use runner::{CommandOutput, CommandRunner, CommandSpec, TokioCommandRunner};
