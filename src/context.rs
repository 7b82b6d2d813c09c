use std::{fmt::Display, fs, path::Path};

use anyhow::{anyhow, Context};
use serde::Deserialize;
use tracing::{debug, trace};

use crate::github::PullRequestEvent;

/// Everything needed to address one pull request on the GitHub API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PullRequestRef {
    pub owner: String,
    pub repo: String,
    #[serde(alias = "pull_number")]
    pub number: u64,
}

impl Display for PullRequestRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.number)
    }
}

impl PullRequestRef {
    /// Extracts the pull request from a `pull_request` event payload. The owner and name are
    /// taken from the head repository, like the workflow context does.
    pub fn from_event_payload(payload: &str) -> anyhow::Result<Self> {
        let event: PullRequestEvent =
            serde_json::from_str(payload).context("couldn't parse event payload")?;
        trace!("event action: {:?}", event.action);

        let pull_request = event
            .pull_request
            .ok_or_else(|| anyhow!("event payload isn't about a pull request"))?;
        let repo = pull_request.head.repo.ok_or_else(|| {
            anyhow!(
                "head repository of PR #{} ({}) is gone",
                pull_request.number,
                pull_request.head.r#ref
            )
        })?;

        Ok(Self {
            owner: repo.owner.login,
            repo: repo.name,
            number: pull_request.number,
        })
    }

    pub fn from_event_file(path: &Path) -> anyhow::Result<Self> {
        let payload = fs::read_to_string(path)
            .with_context(|| format!("couldn't read event payload {}", path.display()))?;
        Self::from_event_payload(&payload)
            .with_context(|| format!("invalid event payload in {}", path.display()))
    }
}

/// Picks the pull request to report on: the triggering event when running in CI, the configured
/// fallback otherwise.
pub fn resolve(
    ci: bool,
    event_path: Option<&Path>,
    fallback: Option<&PullRequestRef>,
) -> anyhow::Result<PullRequestRef> {
    let pr = if ci {
        let path = event_path.ok_or_else(|| {
            anyhow!("running in GitHub Actions but GITHUB_EVENT_PATH isn't set")
        })?;
        PullRequestRef::from_event_file(path)?
    } else {
        fallback
            .cloned()
            .ok_or_else(|| anyhow!("not running in CI and no fallback pull request configured"))?
    };

    debug!("resolved pull request {}", pr);
    Ok(pr)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const EVENT: &str = r#"{
        "action": "closed",
        "number": 12,
        "pull_request": {
            "number": 12,
            "merged": true,
            "head": {
                "ref": "feature/footer",
                "repo": {
                    "name": "milo",
                    "full_name": "someone/milo",
                    "owner": {"login": "someone", "id": 3}
                }
            },
            "base": {"ref": "main"}
        }
    }"#;

    fn fallback() -> PullRequestRef {
        PullRequestRef {
            owner: "adobecom".to_string(),
            repo: "milo".to_string(),
            number: 34,
        }
    }

    #[test]
    fn event_payload_uses_head_repo() {
        let pr = PullRequestRef::from_event_payload(EVENT).unwrap();
        assert_eq!(
            pr,
            PullRequestRef {
                owner: "someone".to_string(),
                repo: "milo".to_string(),
                number: 12,
            }
        );
        assert_eq!(pr.to_string(), "someone/milo#12");
    }

    #[test]
    fn event_without_pull_request() {
        let err = PullRequestRef::from_event_payload(r#"{"action": "created"}"#).unwrap_err();
        assert!(err.to_string().contains("isn't about a pull request"));
    }

    #[test]
    fn deleted_head_repo() {
        let payload = r#"{"pull_request": {"number": 5, "head": {"ref": "x", "repo": null}}}"#;
        assert!(PullRequestRef::from_event_payload(payload).is_err());
    }

    #[test]
    fn local_run_uses_fallback() {
        let pr = resolve(false, None, Some(&fallback())).unwrap();
        assert_eq!(pr, fallback());

        assert!(resolve(false, None, None).is_err());
    }

    #[test]
    fn ci_run_reads_event_file() {
        let path = std::env::temp_dir().join(format!("mergemail-event-{}.json", std::process::id()));
        fs::File::create(&path)
            .unwrap()
            .write_all(EVENT.as_bytes())
            .unwrap();

        let pr = resolve(true, Some(&path), Some(&fallback())).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(pr.number, 12);
        assert_eq!(pr.owner, "someone");

        assert!(resolve(true, None, Some(&fallback())).is_err());
    }
}
