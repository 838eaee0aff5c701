//! Visibility normalization for organization-level items.
//!
//! Runs before any network access, so a malformed row can never cause a
//! partial remote mutation.

use crate::errors::ValidationError;
use crate::item::{Item, Scope, Visibility};

/// Normalize an item's visibility and selected-repository set.
///
/// - Repository-scoped items always end up with [`Visibility::NotApplicable`]
///   and no selected repositories, whatever the input carried.
/// - Organization-scoped items default to [`Visibility::All`].
/// - `selected` requires at least one repository, and repositories are only
///   accepted together with `selected`.
pub fn normalize(mut item: Item) -> Result<Item, ValidationError> {
    match item.item_type.scope {
        Scope::Repository => {
            item.visibility = Some(Visibility::NotApplicable);
            item.selected_repositories.clear();
        }
        Scope::Organization => {
            let visibility = match item.visibility {
                None | Some(Visibility::NotApplicable) => Visibility::All,
                Some(v) => v,
            };
            let has_repositories = !item.selected_repositories.is_empty();
            match (visibility, has_repositories) {
                (Visibility::Selected, false) => {
                    return Err(ValidationError::SelectedRequiresRepositories);
                }
                (v, true) if v != Visibility::Selected => {
                    return Err(ValidationError::RepositoriesWithoutSelected);
                }
                _ => {}
            }
            item.visibility = Some(visibility);
        }
    }
    Ok(item)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemType;

    #[test]
    fn test_repository_scope_is_not_applicable() {
        for visibility in [
            None,
            Some(Visibility::All),
            Some(Visibility::Private),
            Some(Visibility::Selected),
        ] {
            let mut item = Item::new(ItemType::REPO_SECRET, "T", "acme/app")
                .with_selected_repositories(["ignored"]);
            item.visibility = visibility;

            let normalized = normalize(item).unwrap();
            assert_eq!(normalized.visibility, Some(Visibility::NotApplicable));
            assert!(normalized.selected_repositories.is_empty());
        }
    }

    #[test]
    fn test_organization_defaults_to_all() {
        let item = Item::new(ItemType::ORG_VARIABLE, "X", "acme");
        assert_eq!(normalize(item).unwrap().visibility, Some(Visibility::All));
    }

    #[test]
    fn test_selected_without_repositories_is_rejected() {
        let item = Item::new(ItemType::ORG_SECRET, "X", "acme").with_visibility(Visibility::Selected);
        let err = normalize(item).unwrap_err();
        assert_eq!(err, ValidationError::SelectedRequiresRepositories);
        assert_eq!(err.to_string(), "selected requires repositories");
    }

    #[test]
    fn test_repositories_without_selected_are_rejected() {
        for visibility in [None, Some(Visibility::All), Some(Visibility::Private)] {
            let mut item =
                Item::new(ItemType::ORG_SECRET, "X", "acme").with_selected_repositories(["repo1"]);
            item.visibility = visibility;
            assert_eq!(
                normalize(item).unwrap_err(),
                ValidationError::RepositoriesWithoutSelected
            );
        }
    }

    #[test]
    fn test_consistent_combinations_are_accepted() {
        let selected = Item::new(ItemType::ORG_SECRET, "X", "acme")
            .with_visibility(Visibility::Selected)
            .with_selected_repositories(["repo1", "repo2"]);
        let normalized = normalize(selected).unwrap();
        assert_eq!(normalized.visibility, Some(Visibility::Selected));
        assert_eq!(normalized.selected_repositories.len(), 2);

        let private = Item::new(ItemType::ORG_VARIABLE, "X", "acme").with_visibility(Visibility::Private);
        assert_eq!(normalize(private).unwrap().visibility, Some(Visibility::Private));
    }
}
