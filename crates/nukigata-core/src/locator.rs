//! Two-rule search for a die drawing under the master folder.
//!
//! Current layout: `{root}/{book}/…/{workcode}.{ext}`, searched breadth-first
//! from the book folder. Legacy layout: `{book}-{workcode}.{ext}` anywhere
//! under the root, searched the same way only when the current layout yields
//! nothing. The first folder in BFS order holding any matching file ends a
//! search, and its matches are ranked by [`EXTENSION_PRIORITY`].

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::drive::{DriveClient, DriveQuery};
use crate::error::{NukigataError, NukigataResult};
use crate::types::{CandidateArtifact, LocateResult, LookupKey, MatchRule, EXTENSION_PRIORITY};

pub const DEFAULT_MAX_FOLDERS: usize = 300;

fn default_max_folders() -> usize {
    DEFAULT_MAX_FOLDERS
}

/// Search limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorConfig {
    /// Folders a single BFS may list before giving up.
    #[serde(default = "default_max_folders")]
    pub max_folders: usize,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            max_folders: default_max_folders(),
        }
    }
}

/// File names `{stem}.{ext}` for every known extension, in priority order.
pub fn candidate_names(stem: &str) -> Vec<String> {
    EXTENSION_PRIORITY
        .iter()
        .map(|ext| format!("{}.{}", stem, ext))
        .collect()
}

/// Stable sort by extension priority; ties keep listing order.
pub fn rank_candidates(mut candidates: Vec<CandidateArtifact>) -> Vec<CandidateArtifact> {
    candidates.sort_by_key(CandidateArtifact::extension_rank);
    candidates
}

/// Matches from one bounded BFS.
struct TreeHits {
    files: Vec<CandidateArtifact>,
    folders_visited: usize,
}

#[derive(Debug, Clone)]
pub struct ResourceLocator {
    drive: DriveClient,
    config: LocatorConfig,
}

impl ResourceLocator {
    pub fn new(drive: DriveClient, config: LocatorConfig) -> Self {
        Self { drive, config }
    }

    pub fn drive(&self) -> &DriveClient {
        &self.drive
    }

    pub fn config(&self) -> &LocatorConfig {
        &self.config
    }

    /// Resolve `key` to ranked candidates under `root_folder_id`.
    ///
    /// A key matching neither layout is `found: false`, not an error.
    pub async fn locate(
        &self,
        key: &LookupKey,
        root_folder_id: &str,
    ) -> NukigataResult<LocateResult> {
        let root = root_folder_id.trim();
        if root.is_empty() {
            return Err(NukigataError::config("root folder id is empty"));
        }

        let mut folders_visited = 0;

        if let Some(book_folder) = self.find_book_folder(root, key.book()).await? {
            let hits = self
                .search_tree(&book_folder, &candidate_names(key.workcode()))
                .await?;
            folders_visited += hits.folders_visited;

            if !hits.files.is_empty() {
                info!(%key, rule = %MatchRule::BookFolder, count = hits.files.len(), "die drawing found");
                return Ok(found(hits.files, MatchRule::BookFolder, folders_visited));
            }
        } else {
            debug!(book = key.book(), root, "no book folder under root");
        }

        let hits = self
            .search_tree(root, &candidate_names(&key.legacy_stem()))
            .await?;
        folders_visited += hits.folders_visited;

        if !hits.files.is_empty() {
            info!(%key, rule = %MatchRule::LegacyName, count = hits.files.len(), "die drawing found");
            return Ok(found(hits.files, MatchRule::LegacyName, folders_visited));
        }

        info!(%key, folders_visited, "die drawing not found");
        Ok(LocateResult::not_found(folders_visited))
    }

    /// First direct child folder of `root` named exactly `book`.
    async fn find_book_folder(&self, root: &str, book: &str) -> NukigataResult<Option<String>> {
        let query = DriveQuery::new()
            .folders_only()
            .in_parent(root)
            .not_trashed()
            .name_equals(book);

        let folders = self.drive.list(&query).await?;
        Ok(folders.into_iter().find(|f| f.name == book).map(|f| f.id))
    }

    /// Breadth-first search from `start` for files named any of `names`.
    async fn search_tree(&self, start: &str, names: &[String]) -> NukigataResult<TreeHits> {
        let mut queue = VecDeque::from([start.to_string()]);
        let mut seen: HashSet<String> = HashSet::from([start.to_string()]);
        let mut folders_visited = 0;

        while let Some(folder) = queue.pop_front() {
            if folders_visited >= self.config.max_folders {
                debug!(start, max_folders = self.config.max_folders, "folder budget exhausted");
                break;
            }
            folders_visited += 1;

            let files_query = DriveQuery::new()
                .name_in(names)
                .in_parent(&folder)
                .not_trashed();
            let files = self.drive.list(&files_query).await?;
            if !files.is_empty() {
                return Ok(TreeHits {
                    files,
                    folders_visited,
                });
            }

            let folders_query = DriveQuery::new()
                .folders_only()
                .in_parent(&folder)
                .not_trashed();
            for child in self.drive.list(&folders_query).await? {
                // A folder with several parents is reachable twice.
                if seen.insert(child.id.clone()) {
                    queue.push_back(child.id);
                }
            }
        }

        Ok(TreeHits {
            files: Vec::new(),
            folders_visited,
        })
    }
}

fn found(files: Vec<CandidateArtifact>, rule: MatchRule, folders_visited: usize) -> LocateResult {
    LocateResult {
        found: true,
        candidates: rank_candidates(files),
        rule: Some(rule),
        folders_visited,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn art(id: &str, name: &str) -> CandidateArtifact {
        CandidateArtifact {
            id: id.into(),
            name: name.into(),
            mime_type: String::new(),
        }
    }

    #[test]
    fn test_candidate_names_follow_priority() {
        assert_eq!(
            candidate_names("Ta-9892"),
            vec!["Ta-9892.jpeg", "Ta-9892.jpg", "Ta-9892.png", "Ta-9892.pdf"]
        );
    }

    #[test]
    fn test_ranking_is_stable() {
        let ranked = rank_candidates(vec![
            art("1", "7.pdf"),
            art("2", "7.png"),
            art("3", "7.tif"),
            art("4", "7.jpg"),
            art("5", "7.png"),
        ]);
        let ids: Vec<&str> = ranked.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["4", "2", "5", "1", "3"]);
    }

    #[test]
    fn test_default_budget() {
        assert_eq!(LocatorConfig::default().max_folders, 300);
        let parsed: LocatorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, LocatorConfig::default());
    }
}
