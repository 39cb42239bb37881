//! Arena-resident group records.
//!
//! `Registry` owns every [`GroupRecord`] in a single `Vec<Option<GroupRecord>>`,
//! addressed by the stable [`GroupId`] handles it hands out — a
//! registry-scoped arena that realizes the priority-change callback chain
//! without per-group `Rc<RefCell<_>>` bookkeeping. `referenced_by` plays
//! the role of that callback list: it holds the ids of every group that
//! references this one, so a priority change can be answered by having the
//! registry re-sort each referrer's `referenced` list directly, instead of
//! invoking a closure.

use crate::priority::Priority;
use crate::set::PermissionSet;

/// A stable handle into `Registry`'s group arena. Never reused for a
/// different group while that id could still be reachable — the registry
/// cascades removal through `referenced_by` before freeing a slot, so no
/// live `referenced` list ever points at a freed one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct GroupId(pub usize);

/// What a group is being used as. Only affects how `Registry` looks the
/// group up by external key and whether it may be the target of a
/// group-to-group reference (users and the default group are DAG leaves:
/// nothing may reference them).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GroupRole {
    User,
    Named,
    Default,
}

#[derive(Debug, Clone)]
pub(crate) struct GroupRecord {
    pub name: String,
    pub role: GroupRole,
    pub priority: Priority,
    pub permission_set: PermissionSet,
    /// Sorted by `(priority desc, name asc)`; see `Registry::resort_references`.
    pub referenced: Vec<GroupId>,
    /// Every group that currently references this one, used both to
    /// dispatch a re-sort on priority change and to cascade removal.
    pub referenced_by: Vec<GroupId>,
    /// `None` only for the registry's own default group, whose fallback
    /// chain terminates at the sentinel empty default rather than at
    /// another arena slot.
    pub default_group: Option<GroupId>,
}

impl GroupRecord {
    pub fn new(name: String, role: GroupRole, default_group: Option<GroupId>) -> Self {
        GroupRecord {
            name,
            role,
            priority: Priority::default(),
            permission_set: PermissionSet::new(),
            referenced: Vec::new(),
            referenced_by: Vec::new(),
            default_group,
        }
    }

    /// Whether this group is entirely inert: no permissions of its own,
    /// references nothing, and (checked by the caller against
    /// `referenced_by`/user and default membership) is referenced by
    /// nothing live either.
    pub fn is_content_free(&self) -> bool {
        self.permission_set.is_empty() && self.referenced.is_empty()
    }
}
