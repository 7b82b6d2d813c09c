use async_trait::async_trait;

use crate::context::PullRequestRef;

mod client;
pub use client::GitHubClient;

mod types;
pub use types::*;

/// The few GitHub REST endpoints a notification needs.
#[async_trait]
pub trait GitHubApi: Send + Sync {
    /// `GET /repos/{owner}/{repo}/pulls/{pull_number}`
    async fn pull_request(&self, pr: &PullRequestRef) -> anyhow::Result<PullRequest>;

    /// `GET /repos/{owner}/{repo}/pulls/{pull_number}/reviews`
    async fn reviews(&self, pr: &PullRequestRef) -> anyhow::Result<Vec<Review>>;

    /// `GET /users/{username}`
    async fn user(&self, login: &str) -> anyhow::Result<User>;
}
