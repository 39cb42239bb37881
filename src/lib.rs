//! Hierarchical, priority-ordered permission resolution for identified
//! users and groups, addressed by dotted paths (`door.front.unlock`).
//!
//! Build a [`Registry`], hand it an [`IdentityCodec`] for whatever type you
//! use to identify a user, assign permissions and group memberships, then
//! ask it whether a user (or a named group, or the registry-wide default)
//! has a given permission.

mod codec;
mod error;
mod group;
mod path;
mod permission;
mod priority;
mod registry;
mod set;

pub use error::{Error, Result};
pub use path::PermissionPath;
pub use permission::Permission;
pub use priority::Priority;
pub use registry::{IdentityCodec, Registry, Status, DEFAULT_GROUP_NAME};
pub use set::PermissionSet;
