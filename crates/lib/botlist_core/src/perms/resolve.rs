//! Resolution of position lists and overrides into one effective list.

use serde::{Deserialize, Serialize};

use super::{GLOBAL, Permission, WILDCARD};

/// A position for the purposes of permission resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialPosition {
    pub id: String,
    /// Lower means higher in the hierarchy.
    pub index: i32,
    pub perms: Vec<Permission>,
}

/// The positions a user holds plus their personal overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffPermissionSet {
    pub user_positions: Vec<PartialPosition>,
    pub perm_overrides: Vec<Permission>,
}

impl StaffPermissionSet {
    /// Merge positions by ascending `(index, id)`, then the overrides.
    pub fn resolve(&self) -> Vec<Permission> {
        let mut positions: Vec<&PartialPosition> = self.user_positions.iter().collect();
        positions.sort_by(|a, b| a.index.cmp(&b.index).then_with(|| a.id.cmp(&b.id)));

        let lists = positions
            .iter()
            .map(|pos| pos.perms.as_slice())
            .chain(std::iter::once(self.perm_overrides.as_slice()));
        resolve(lists)
    }
}

/// Resolve an ordered sequence of permission lists.
///
/// Lists are concatenated in order. `ns.@clear` drops everything merged so far
/// in `ns` (`global.@clear` drops everything). Afterwards every grant covered
/// by a negator anywhere in the concatenation is removed; negators are kept so
/// they still deny wildcard grants at match time. Duplicates collapse to their
/// first occurrence.
pub fn resolve<'a, I>(lists: I) -> Vec<Permission>
where
    I: IntoIterator<Item = &'a [Permission]>,
{
    let mut merged: Vec<Permission> = Vec::new();

    for list in lists {
        for perm in list {
            if perm.is_clear() {
                if perm.namespace() == GLOBAL || perm.namespace() == WILDCARD {
                    merged.clear();
                } else {
                    merged.retain(|p| p.namespace() != perm.namespace());
                }
                continue;
            }
            if !merged.contains(perm) {
                merged.push(perm.clone());
            }
        }
    }

    let negators: Vec<Permission> = merged
        .iter()
        .filter(|p| p.is_negator())
        .map(Permission::base)
        .collect();

    merged.retain(|p| p.is_negator() || !negators.iter().any(|n| n.covers(p)));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perms::matches;

    fn ps(list: &[&str]) -> Vec<Permission> {
        list.iter().map(|s| Permission::parse(s).unwrap()).collect()
    }

    fn strs(perms: &[Permission]) -> Vec<String> {
        perms.iter().map(ToString::to_string).collect()
    }

    fn pos(id: &str, index: i32, perms: &[&str]) -> PartialPosition {
        PartialPosition {
            id: id.into(),
            index,
            perms: ps(perms),
        }
    }

    #[test]
    fn merges_in_index_order_then_overrides() {
        let set = StaffPermissionSet {
            user_positions: vec![pos("b", 2, &["team.view"]), pos("a", 1, &["bot.view"])],
            perm_overrides: ps(&["pack.view"]),
        };
        assert_eq!(strs(&set.resolve()), ["bot.view", "team.view", "pack.view"]);
    }

    #[test]
    fn index_ties_break_by_id() {
        let set = StaffPermissionSet {
            user_positions: vec![pos("z", 1, &["team.view"]), pos("a", 1, &["bot.view"])],
            perm_overrides: vec![],
        };
        assert_eq!(strs(&set.resolve()), ["bot.view", "team.view"]);
    }

    #[test]
    fn negator_removes_exact_grant() {
        let resolved = resolve([ps(&["bot.add", "bot.delete"]).as_slice(), ps(&["~bot.delete"]).as_slice()]);
        assert_eq!(strs(&resolved), ["bot.add", "~bot.delete"]);
    }

    #[test]
    fn negator_placement_does_not_matter() {
        let before = resolve([ps(&["~bot.delete", "bot.delete"]).as_slice()]);
        let after = resolve([ps(&["bot.delete", "~bot.delete"]).as_slice()]);
        assert!(!matches(&before, &Permission::new("bot", "delete")));
        assert!(!matches(&after, &Permission::new("bot", "delete")));
    }

    #[test]
    fn wildcard_negator_removes_namespace_grants() {
        let resolved = resolve([ps(&["bot.add", "bot.*", "team.view", "~bot.*"]).as_slice()]);
        assert_eq!(strs(&resolved), ["team.view", "~bot.*"]);
    }

    #[test]
    fn wildcard_grant_survives_specific_negator_but_is_denied_at_match() {
        let resolved = resolve([ps(&["bot.*", "~bot.delete"]).as_slice()]);
        assert_eq!(strs(&resolved), ["bot.*", "~bot.delete"]);
        assert!(!matches(&resolved, &Permission::new("bot", "delete")));
        assert!(matches(&resolved, &Permission::new("bot", "edit")));
    }

    #[test]
    fn clear_drops_namespace() {
        let resolved = resolve([
            ps(&["bot.add", "team.view"]).as_slice(),
            ps(&["bot.@clear", "bot.edit"]).as_slice(),
        ]);
        assert_eq!(strs(&resolved), ["team.view", "bot.edit"]);
    }

    #[test]
    fn global_clear_drops_everything() {
        let resolved = resolve([
            ps(&["bot.add", "team.view"]).as_slice(),
            ps(&["global.@clear", "pack.view"]).as_slice(),
        ]);
        assert_eq!(strs(&resolved), ["pack.view"]);
    }

    #[test]
    fn duplicates_collapse() {
        let resolved = resolve([ps(&["bot.add", "bot.add"]).as_slice(), ps(&["bot.add"]).as_slice()]);
        assert_eq!(strs(&resolved), ["bot.add"]);
    }

    #[test]
    fn resolution_is_deterministic_and_idempotent() {
        let set = StaffPermissionSet {
            user_positions: vec![
                pos("mod", 3, &["bot.*", "~bot.delete", "team.view"]),
                pos("admin", 1, &["global.view", "pack.@clear", "pack.edit"]),
            ],
            perm_overrides: ps(&["~team.view", "server.*"]),
        };
        let first = set.resolve();
        let second = set.resolve();
        assert_eq!(first, second);
        assert_eq!(resolve([first.as_slice()]), first);
    }

    #[test]
    fn overrides_can_deny_position_grants() {
        let set = StaffPermissionSet {
            user_positions: vec![pos("head", 0, &["global.*"])],
            perm_overrides: ps(&["~rpc.premium_add"]),
        };
        let resolved = set.resolve();
        assert!(!matches(&resolved, &Permission::new("rpc", "premium_add")));
        assert!(matches(&resolved, &Permission::new("rpc", "ban")));
    }
}
