//! Collapses a range of changesets into one action per path.

use std::collections::BTreeMap;

use crate::models::{Action, Changeset};

/// Fold `changesets` in ascending id order into a `path -> action` map.
///
/// The last change to a path wins, so an add followed by a delete within the
/// range ends as [`Action::Delete`] and a delete followed by a re-add ends as
/// [`Action::AddOrUpdate`]. Input order is not trusted.
pub fn reduce(mut changesets: Vec<Changeset>) -> BTreeMap<String, Action> {
    changesets.sort_by_key(|cs| cs.id);
    changesets
        .iter()
        .flat_map(|cs| cs.changes.iter())
        .fold(BTreeMap::new(), |mut actions, change| {
            actions.insert(change.path.clone(), change.action.index_action());
            actions
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Change, ChangeAction};

    fn cs(id: i64, changes: Vec<Change>) -> Changeset {
        Changeset {
            id,
            revision: format!("r{}", id),
            changes,
        }
    }

    #[test]
    fn test_empty_range_reduces_to_nothing() {
        assert!(reduce(Vec::new()).is_empty());
    }

    #[test]
    fn test_add_then_delete_is_delete() {
        let actions = reduce(vec![
            cs(1, vec![Change::new(ChangeAction::Added, "p")]),
            cs(2, vec![Change::new(ChangeAction::Deleted, "p")]),
        ]);
        assert_eq!(actions.get("p"), Some(&Action::Delete));
    }

    #[test]
    fn test_delete_then_add_is_add_or_update() {
        let actions = reduce(vec![
            cs(1, vec![Change::new(ChangeAction::Deleted, "p")]),
            cs(2, vec![Change::new(ChangeAction::Added, "p")]),
        ]);
        assert_eq!(actions.get("p"), Some(&Action::AddOrUpdate));
    }

    #[test]
    fn test_out_of_order_input_is_sorted_first() {
        // Newest-first, as backends usually list them.
        let actions = reduce(vec![
            cs(8, vec![Change::new(ChangeAction::Deleted, "c.txt")]),
            cs(7, vec![Change::new(ChangeAction::Modified, "c.txt")]),
            cs(6, vec![Change::new(ChangeAction::Added, "c.txt")]),
        ]);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions.get("c.txt"), Some(&Action::Delete));
    }

    #[test]
    fn test_independent_paths_keep_their_own_action() {
        let actions = reduce(vec![
            cs(
                3,
                vec![
                    Change::new(ChangeAction::Replaced, "a"),
                    Change::new(ChangeAction::Deleted, "b"),
                ],
            ),
            cs(4, vec![Change::new(ChangeAction::Modified, "c")]),
            cs(5, vec![]),
        ]);
        assert_eq!(actions.get("a"), Some(&Action::AddOrUpdate));
        assert_eq!(actions.get("b"), Some(&Action::Delete));
        assert_eq!(actions.get("c"), Some(&Action::AddOrUpdate));
    }
}
