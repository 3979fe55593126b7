//! Decides whether a push event should start a deploy run.

use glob_match::glob_match;
use serde::{Deserialize, Serialize};

/// The event a run is triggered by.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerEvent {
    pub branch: String,
    pub changed_paths: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

/// Branch and watch-list predicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerPolicy {
    pub branch: String,
    /// Exact paths or glob patterns, relative to the repository root.
    pub watch: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "decision")]
pub enum TriggerDecision {
    Proceed { matched: Vec<String> },
    Skip { reason: SkipReason },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SkipReason {
    BranchMismatch { branch: String, expected: String },
    NoWatchedChanges,
}

impl TriggerDecision {
    pub fn proceeds(&self) -> bool {
        matches!(self, TriggerDecision::Proceed { .. })
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::BranchMismatch { branch, expected } => {
                write!(f, "branch '{}' is not '{}'", branch, expected)
            }
            SkipReason::NoWatchedChanges => write!(f, "no watched paths changed"),
        }
    }
}

impl TriggerPolicy {
    pub fn new(branch: impl Into<String>, watch: Vec<String>) -> Self {
        Self {
            branch: branch.into(),
            watch,
        }
    }

    pub fn evaluate(&self, event: &TriggerEvent) -> TriggerDecision {
        let branch = normalize_branch(&event.branch);
        if branch.is_none() || branch != normalize_branch(&self.branch) {
            return TriggerDecision::Skip {
                reason: SkipReason::BranchMismatch {
                    branch: event.branch.clone(),
                    expected: self.branch.clone(),
                },
            };
        }

        let watch: Vec<String> = self.watch.iter().map(|w| normalize_path(w)).collect();
        let mut matched: Vec<String> = event
            .changed_paths
            .iter()
            .map(|p| normalize_path(p))
            .filter(|path| !path.is_empty())
            .filter(|path| watch.iter().any(|pattern| path_matches(pattern, path)))
            .collect();
        matched.sort();
        matched.dedup();

        if matched.is_empty() {
            TriggerDecision::Skip {
                reason: SkipReason::NoWatchedChanges,
            }
        } else {
            TriggerDecision::Proceed { matched }
        }
    }
}

/// Strip `refs/heads/`. Other ref namespaces (tags, pulls) never name a branch.
fn normalize_branch(branch: &str) -> Option<String> {
    let branch = branch.trim();
    if let Some(name) = branch.strip_prefix("refs/heads/") {
        return Some(name.to_string());
    }
    if branch.starts_with("refs/") || branch.is_empty() {
        return None;
    }
    Some(branch.to_string())
}

fn normalize_path(path: &str) -> String {
    let path = path.trim().replace('\\', "/");
    let mut path = path.as_str();
    while let Some(rest) = path.strip_prefix("./") {
        path = rest;
    }
    path.to_string()
}

fn path_matches(pattern: &str, path: &str) -> bool {
    if pattern.contains(['*', '?', '[', '{']) {
        glob_match(pattern, path)
    } else {
        pattern == path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(branch: &str, paths: &[&str]) -> TriggerEvent {
        TriggerEvent {
            branch: branch.to_string(),
            changed_paths: paths.iter().map(|p| p.to_string()).collect(),
            commit: Some("abc123".to_string()),
        }
    }

    fn policy() -> TriggerPolicy {
        TriggerPolicy::new("main", vec!["main.py".to_string()])
    }

    #[test]
    fn proceeds_on_main_when_artifact_changed() {
        let decision = policy().evaluate(&event("main", &["README.md", "main.py"]));
        assert_eq!(
            decision,
            TriggerDecision::Proceed {
                matched: vec!["main.py".to_string()]
            }
        );
    }

    #[test]
    fn skips_other_branches_regardless_of_paths() {
        for branch in ["develop", "main-old", "refs/heads/feature/main", "refs/tags/main", ""] {
            let decision = policy().evaluate(&event(branch, &["main.py"]));
            assert!(
                matches!(
                    decision,
                    TriggerDecision::Skip {
                        reason: SkipReason::BranchMismatch { .. }
                    }
                ),
                "branch {:?} should skip",
                branch
            );
        }
    }

    #[test]
    fn skips_when_artifact_not_among_changes() {
        let decision = policy().evaluate(&event("main", &["README.md", "docs/main.py"]));
        assert_eq!(
            decision,
            TriggerDecision::Skip {
                reason: SkipReason::NoWatchedChanges
            }
        );
    }

    #[test]
    fn skips_when_nothing_changed() {
        assert!(!policy().evaluate(&event("main", &[])).proceeds());
    }

    #[test]
    fn accepts_full_ref_and_dotted_paths() {
        let decision = policy().evaluate(&event("refs/heads/main", &["./main.py"]));
        assert!(decision.proceeds());
    }

    #[test]
    fn watch_list_supports_globs() {
        let policy = TriggerPolicy::new("main", vec!["bot/**/*.py".to_string()]);
        assert!(policy.evaluate(&event("main", &["bot/cogs/camera.py"])).proceeds());
        assert!(!policy.evaluate(&event("main", &["bot/README.md"])).proceeds());
    }

    #[test]
    fn skip_reason_displays_branches() {
        let reason = SkipReason::BranchMismatch {
            branch: "dev".to_string(),
            expected: "main".to_string(),
        };
        assert_eq!(reason.to_string(), "branch 'dev' is not 'main'");
    }
}
