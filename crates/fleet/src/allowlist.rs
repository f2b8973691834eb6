//! The repository allow-list.
//!
//! A webhook is usually installed org-wide, so events arrive for repositories
//! this fleet was never meant to serve. Those are ignored rather than
//! rejected; see [`crate::IgnoreReason::RepositoryNotAllowed`].

use std::collections::HashSet;

use crate::{FleetError, RepositoryId};

/// Immutable set of repositories permitted to trigger provisioning.
///
/// Built once at startup. Matching is ASCII case-insensitive because GitHub
/// treats `Owner/Repo` and `owner/repo` as the same repository.
#[derive(Debug, Clone, Default)]
pub struct AllowedRepoSet {
    repos: HashSet<String>,
}

impl AllowedRepoSet {
    /// Builds the set from already-validated identifiers.
    pub fn new(repos: impl IntoIterator<Item = RepositoryId>) -> Self {
        Self {
            repos: repos
                .into_iter()
                .map(|r| r.as_str().to_ascii_lowercase())
                .collect(),
        }
    }

    /// Parses a comma or whitespace separated list such as
    /// `"brb/cilium, cilium/cilium"`.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Configuration`] if any entry is not a valid
    /// `owner/name`, or if the list is empty.
    pub fn parse_list(list: &str) -> Result<Self, FleetError> {
        let repos = list
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                RepositoryId::parse(entry).map_err(|e| FleetError::Configuration {
                    message: format!("allowed repository list: {e}"),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if repos.is_empty() {
            return Err(FleetError::Configuration {
                message: "allowed repository list is empty".to_string(),
            });
        }
        Ok(Self::new(repos))
    }

    /// Returns `true` if `repository` may trigger provisioning.
    pub fn is_allowed(&self, repository: &RepositoryId) -> bool {
        self.repos
            .contains(&repository.as_str().to_ascii_lowercase())
    }

    /// Number of repositories in the set.
    pub fn len(&self) -> usize {
        self.repos.len()
    }

    /// Returns `true` if no repository is allowed.
    pub fn is_empty(&self) -> bool {
        self.repos.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo(s: &str) -> RepositoryId {
        RepositoryId::parse(s).unwrap()
    }

    #[test]
    fn allows_listed_repositories_only() {
        let set = AllowedRepoSet::parse_list("brb/cilium,cilium/cilium").unwrap();
        assert!(set.is_allowed(&repo("brb/cilium")));
        assert!(set.is_allowed(&repo("cilium/cilium")));
        assert!(!set.is_allowed(&repo("brb/other")));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn matching_ignores_case() {
        let set = AllowedRepoSet::new([repo("Cilium/Cilium")]);
        assert!(set.is_allowed(&repo("cilium/cilium")));
    }

    #[test]
    fn list_accepts_mixed_separators() {
        let set = AllowedRepoSet::parse_list(" brb/a ,\nbrb/b  brb/c ").unwrap();
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn list_rejects_invalid_or_empty_input() {
        assert!(matches!(
            AllowedRepoSet::parse_list("brb/a,not-a-repo"),
            Err(FleetError::Configuration { .. })
        ));
        assert!(matches!(
            AllowedRepoSet::parse_list(" , "),
            Err(FleetError::Configuration { .. })
        ));
    }
}
