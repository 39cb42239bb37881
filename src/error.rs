//! Error taxonomy for permission parsing, group mutation and persistence.

use std::io;
use thiserror::Error;

/// Everything that can go wrong while parsing, mutating or persisting a
/// [`crate::registry::Registry`].
#[derive(Debug, Error)]
pub enum Error {
    /// A permission string failed the `["-"] PATH ["." "*"] [":" ARG]`
    /// grammar, or its argument continuation failed to join.
    #[error("invalid permission string: {0:?}")]
    InvalidPermission(String),

    /// A group or user name contained characters outside letters and
    /// digits (and was not the reserved `*`, in contexts where `*` is not
    /// legal).
    #[error("invalid group name: {0:?}")]
    InvalidGroupName(String),

    /// A priority string was neither a valid signed 64-bit integer nor a
    /// valid double.
    #[error("invalid priority: {0:?}")]
    InvalidPriority(String),

    /// Assigning `descendant` as a reference of `ancestor` would create a
    /// cycle in the group-to-group DAG.
    #[error("assigning group {descendant:?} to group {ancestor:?} would create a cycle")]
    CircularGroupHierarchy { ancestor: String, descendant: String },

    /// Save or load could not complete because of an underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
