//! Status reconciliation: joins the scripts on disk with the ledger

use std::collections::BTreeSet;

use super::definitions::{MigrationScript, MigrationState, MigrationStatus};
use super::version::Version;

/// One status per script, ascending by version.
///
/// `scripts` must already be sorted and free of duplicate versions, as
/// `ScriptDirectory::load` returns them. Ledger entries without a script do
/// not appear here; see [`orphaned_versions`].
pub fn reconcile(scripts: &[MigrationScript], applied: &BTreeSet<Version>) -> Vec<MigrationStatus> {
    let most_recent = scripts
        .iter()
        .rev()
        .map(|script| script.version)
        .find(|version| applied.contains(version));

    scripts
        .iter()
        .map(|script| {
            let state = if applied.contains(&script.version) {
                MigrationState::Applied
            } else {
                MigrationState::Pending
            };
            MigrationStatus {
                version: script.version,
                name: script.name.clone(),
                state,
                is_most_recently_applied: Some(script.version) == most_recent,
            }
        })
        .collect()
}

/// Ledger versions that have no script on disk, ascending
pub fn orphaned_versions(scripts: &[MigrationScript], applied: &BTreeSet<Version>) -> Vec<Version> {
    let known: BTreeSet<Version> = scripts.iter().map(|script| script.version).collect();
    applied.difference(&known).copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scripts(versions: &[i64]) -> Vec<MigrationScript> {
        versions
            .iter()
            .map(|v| MigrationScript {
                version: Version::new(*v),
                name: format!("Step {}", v),
                path: PathBuf::from(format!("{}_step_{}.sql", v, v)),
            })
            .collect()
    }

    fn applied(versions: &[i64]) -> BTreeSet<Version> {
        versions.iter().copied().map(Version::new).collect()
    }

    #[test]
    fn test_states_and_most_recent_flag() {
        let statuses = reconcile(&scripts(&[10, 20, 30, 40]), &applied(&[10, 30]));

        let states: Vec<_> = statuses.iter().map(|s| s.state).collect();
        assert_eq!(
            states,
            vec![
                MigrationState::Applied,
                MigrationState::Pending,
                MigrationState::Applied,
                MigrationState::Pending
            ]
        );
        let flagged: Vec<_> = statuses
            .iter()
            .filter(|s| s.is_most_recently_applied)
            .map(|s| s.version.get())
            .collect();
        assert_eq!(flagged, vec![30]);
    }

    #[test]
    fn test_nothing_applied_has_no_flag() {
        let statuses = reconcile(&scripts(&[10, 20]), &BTreeSet::new());
        assert!(statuses.iter().all(|s| !s.is_most_recently_applied));
        assert!(statuses.iter().all(|s| s.state == MigrationState::Pending));
    }

    #[test]
    fn test_orphans_do_not_take_the_flag() {
        let statuses = reconcile(&scripts(&[10, 20]), &applied(&[10, 99]));
        assert!(statuses[0].is_most_recently_applied);
        assert_eq!(statuses.len(), 2);
        assert_eq!(
            orphaned_versions(&scripts(&[10, 20]), &applied(&[10, 99])),
            vec![Version::new(99)]
        );
    }

    #[test]
    fn test_ordering_is_strictly_ascending_for_many_shapes() {
        // Exhaustive over which of five scripts are applied
        let all = scripts(&[3, 7, 11, 19, 23]);
        for mask in 0u32..32 {
            let set: BTreeSet<Version> = all
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, s)| s.version)
                .collect();
            let statuses = reconcile(&all, &set);

            assert_eq!(statuses.len(), all.len());
            assert!(statuses.windows(2).all(|w| w[0].version < w[1].version));
            let flags = statuses.iter().filter(|s| s.is_most_recently_applied).count();
            assert_eq!(flags, usize::from(!set.is_empty()));
        }
    }
}
