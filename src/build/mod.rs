// ABOUTME: Build strategies: source retrieval, image construction, and publication.
// ABOUTME: One closed enum of variants, each driven by the same phase functions.

pub mod compose;
mod context;
pub mod docker;
mod fingerprint;
pub mod labels;
pub mod nixpacks;
pub mod phases;
pub mod source;
pub mod static_site;
mod strategy;

#[cfg(test)]
pub(crate) use context::fixtures;
pub use context::{BuildContext, ImageNames, join_path};
pub use fingerprint::{config_fingerprint, is_unchanged};
pub use phases::{ImageBuild, PreparedBuild};
pub use strategy::{Branch, BuildStrategy};
