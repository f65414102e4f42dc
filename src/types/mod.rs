// ABOUTME: Type-safe identifiers and validated domain types.
// ABOUTME: Uses phantom types and validating constructors at the crate boundary.

mod commit;
mod container_name;
mod id;
mod image_ref;

pub use commit::{Commit, CommitError};
pub use container_name::{ContainerName, ContainerNameError};
pub use id::{ApplicationUuid, DeploymentUuid, Id};
pub use image_ref::{ImageRef, ParseImageRefError};
