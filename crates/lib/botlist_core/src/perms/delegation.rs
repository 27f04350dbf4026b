//! Rules for changing another principal's permissions.

use super::{Permission, PermissionError, matches};

/// Check that `manager` may turn `current` into `new`.
///
/// Only the symmetric difference is inspected, so permissions the manager
/// does not hold may stay untouched. For each added or removed permission the
/// manager must hold its base form. Granting or revoking `ns.*` additionally
/// requires every negator the manager carries in `ns` to be present in `new`,
/// which keeps a manager from handing out more than they have.
pub fn check_patch_changes(
    manager: &[Permission],
    current: &[Permission],
    new: &[Permission],
) -> Result<(), PermissionError> {
    let added = new.iter().filter(|p| !current.contains(p));
    let removed = current.iter().filter(|p| !new.contains(p));

    for changed in added.chain(removed) {
        if !matches(manager, &changed.base()) {
            return Err(PermissionError::Delegation(format!(
                "You do not have permission to change {changed}"
            )));
        }

        if changed.is_wildcard_action() {
            for negator in manager.iter().filter(|m| m.is_negator()) {
                let same_namespace =
                    changed.is_any_namespace() || negator.namespace() == changed.namespace();
                if same_namespace && !new.contains(negator) {
                    return Err(PermissionError::Delegation(format!(
                        "You do not have permission to change {changed} without also granting {negator}"
                    )));
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ps(list: &[&str]) -> Vec<Permission> {
        list.iter().map(|s| Permission::parse(s).unwrap()).collect()
    }

    #[test]
    fn unchanged_permissions_are_ignored() {
        let manager = ps(&["bot.add"]);
        let current = ps(&["rpc.ban", "bot.add"]);
        let new = ps(&["rpc.ban"]);
        assert!(check_patch_changes(&manager, &current, &new).is_ok());
    }

    #[test]
    fn cannot_grant_what_manager_lacks() {
        let manager = ps(&["bot.add"]);
        let err = check_patch_changes(&manager, &[], &ps(&["bot.delete"])).unwrap_err();
        assert!(matches!(err, PermissionError::Delegation(_)));
    }

    #[test]
    fn cannot_revoke_what_manager_lacks() {
        let manager = ps(&["bot.add"]);
        assert!(check_patch_changes(&manager, &ps(&["bot.delete"]), &[]).is_err());
    }

    #[test]
    fn negator_requires_base_permission() {
        assert!(check_patch_changes(&ps(&["bot.delete"]), &[], &ps(&["~bot.delete"])).is_ok());
        assert!(check_patch_changes(&ps(&["bot.add"]), &[], &ps(&["~bot.delete"])).is_err());
    }

    #[test]
    fn denied_manager_cannot_delegate() {
        let manager = ps(&["bot.*", "~bot.delete"]);
        assert!(check_patch_changes(&manager, &[], &ps(&["bot.delete"])).is_err());
        assert!(check_patch_changes(&manager, &[], &ps(&["bot.edit"])).is_ok());
    }

    #[test]
    fn wildcard_grant_must_carry_manager_negators() {
        let manager = ps(&["bot.*", "~bot.delete"]);
        assert!(check_patch_changes(&manager, &[], &ps(&["bot.*"])).is_err());
        assert!(check_patch_changes(&manager, &[], &ps(&["bot.*", "~bot.delete"])).is_ok());
    }

    #[test]
    fn owner_can_grant_anything() {
        let manager = ps(&["global.*"]);
        let new = ps(&["bot.*", "team_member.add", "~team.delete"]);
        assert!(check_patch_changes(&manager, &[], &new).is_ok());
    }
}
