use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use url::Url;

use crate::notifier::utils::shorten_content;

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubUser {
    pub login: String,
}

/// Full user profile, as returned by `GET /users/{username}`.
#[derive(Debug, Deserialize)]
pub struct User {
    pub login: String,
    pub name: Option<String>,
}

impl User {
    /// The profile name, or the login when the user never set one.
    pub fn display_name(&self) -> &str {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => &self.login,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Label {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub html_url: Url,
    pub title: String,
    pub body: Option<String>,
    pub user: GitHubUser,
    pub merged_at: Option<DateTime<Utc>>,
    pub merged_by: Option<GitHubUser>,
    #[serde(default)]
    pub changed_files: u64,
    #[serde(default)]
    pub labels: Vec<Label>,
}

impl PullRequest {
    pub fn has_label(&self, name: &str) -> bool {
        self.labels.iter().any(|label| label.name == name)
    }
}

impl Display for PullRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "PR #{}: {} by {}",
            self.number,
            shorten_content(&self.title),
            self.user.login
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct Review {
    pub state: ReviewState,
    // deleted accounts come back as `null`
    pub user: Option<GitHubUser>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewState {
    Approved,
    ChangesRequested,
    Commented,
    Dismissed,
    Pending,
    #[serde(other)]
    Other,
}

/// Payload of the `pull_request` event that triggered the workflow. Only the fields needed to
/// locate the pull request are kept.
#[derive(Debug, Deserialize)]
pub struct PullRequestEvent {
    pub action: Option<String>,
    pub pull_request: Option<EventPullRequest>,
}

#[derive(Debug, Deserialize)]
pub struct EventPullRequest {
    pub number: u64,
    pub head: PrRef,
}

#[derive(Debug, Deserialize)]
pub struct PrRef {
    pub r#ref: String,
    // `null` when the head fork was deleted
    pub repo: Option<Repository>,
}

#[derive(Debug, Deserialize)]
pub struct Repository {
    pub name: String,
    pub owner: GitHubUser,
}
