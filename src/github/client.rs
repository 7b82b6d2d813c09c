use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, ACCEPT},
    StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize};
use tracing::trace;
use url::Url;

use crate::{
    context::PullRequestRef,
    github::{GitHubApi, PullRequest, Review, User},
};

const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
// GitHub caps pages at 100 items
const REVIEWS_PER_PAGE: &str = "100";

/// [`GitHubApi`] backed by the GitHub REST API.
pub struct GitHubClient {
    http: reqwest::Client,
    base: Url,
    token: Option<String>,
}

impl GitHubClient {
    pub fn new(base: Url, token: Option<String>) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            HeaderName::from_static("x-github-api-version"),
            HeaderValue::from_static(API_VERSION),
        );

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .context("couldn't build GitHub HTTP client")?;

        Ok(Self { http, base, token })
    }

    /// Appends `segments` to the API base URL, keeping any path prefix the base carries (GitHub
    /// Enterprise serves the API under `/api/v3`).
    fn endpoint(&self, segments: &[&str]) -> anyhow::Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("GitHub API url {} can't be a base", self.base))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn pull_endpoint(&self, pr: &PullRequestRef, rest: &[&str]) -> anyhow::Result<Url> {
        let number = pr.number.to_string();
        let mut segments = vec![
            "repos",
            pr.owner.as_str(),
            pr.repo.as_str(),
            "pulls",
            number.as_str(),
        ];
        segments.extend_from_slice(rest);
        self.endpoint(&segments)
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> anyhow::Result<T> {
        trace!("GET {}", url);

        let mut request = self.http.get(url.clone());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("couldn't read response from {}", url))?;

        decode_response(&url, status, &body)
    }
}

/// Turns a GitHub reply into `T`. Error replies carry a JSON `message` explaining the failure,
/// which ends up in the error.
fn decode_response<T: DeserializeOwned>(
    url: &Url,
    status: StatusCode,
    body: &str,
) -> anyhow::Result<T> {
    if !status.is_success() {
        let message = serde_json::from_str::<ErrorReply>(body)
            .map(|reply| reply.message)
            .unwrap_or_else(|_| body.to_string());
        bail!("GitHub rejected request to {}: {} {}", url, status, message);
    }

    serde_json::from_str(body).with_context(|| format!("couldn't decode response from {}", url))
}

#[derive(Deserialize)]
struct ErrorReply {
    message: String,
}

#[async_trait]
impl GitHubApi for GitHubClient {
    async fn pull_request(&self, pr: &PullRequestRef) -> anyhow::Result<PullRequest> {
        let url = self.pull_endpoint(pr, &[])?;
        self.get(url).await
    }

    async fn reviews(&self, pr: &PullRequestRef) -> anyhow::Result<Vec<Review>> {
        let mut url = self.pull_endpoint(pr, &["reviews"])?;
        url.query_pairs_mut().append_pair("per_page", REVIEWS_PER_PAGE);
        self.get(url).await
    }

    async fn user(&self, login: &str) -> anyhow::Result<User> {
        let url = self.endpoint(&["users", login])?;
        self.get(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pr_ref() -> PullRequestRef {
        PullRequestRef {
            owner: "adobecom".to_string(),
            repo: "milo".to_string(),
            number: 34,
        }
    }

    #[test]
    fn endpoints() {
        let base = Url::parse("https://api.github.com").unwrap();
        let client = GitHubClient::new(base, None).unwrap();

        assert_eq!(
            client.pull_endpoint(&pr_ref(), &[]).unwrap().as_str(),
            "https://api.github.com/repos/adobecom/milo/pulls/34"
        );
        assert_eq!(
            client.pull_endpoint(&pr_ref(), &["reviews"]).unwrap().as_str(),
            "https://api.github.com/repos/adobecom/milo/pulls/34/reviews"
        );
        assert_eq!(
            client.endpoint(&["users", "octocat"]).unwrap().as_str(),
            "https://api.github.com/users/octocat"
        );
    }

    #[test]
    fn enterprise_prefix_is_kept() {
        let base = Url::parse("https://github.example.com/api/v3/").unwrap();
        let client = GitHubClient::new(base, Some("token".to_string())).unwrap();

        assert_eq!(
            client.endpoint(&["users", "octocat"]).unwrap().as_str(),
            "https://github.example.com/api/v3/users/octocat"
        );
    }

    #[test]
    fn successful_reply_is_decoded() {
        let url = Url::parse("https://api.github.com/users/octocat").unwrap();
        let user: User = decode_response(
            &url,
            StatusCode::OK,
            r#"{"login": "octocat", "name": "Mona Lisa"}"#,
        )
        .unwrap();
        assert_eq!(user.display_name(), "Mona Lisa");
    }

    #[test]
    fn error_reply_fails_with_message() {
        let url = Url::parse("https://api.github.com/repos/adobecom/milo/pulls/999").unwrap();
        let err = decode_response::<PullRequest>(
            &url,
            StatusCode::NOT_FOUND,
            r#"{"message": "Not Found", "documentation_url": "https://docs.github.com"}"#,
        )
        .unwrap_err()
        .to_string();
        assert!(err.contains("404 Not Found"));
        assert!(err.ends_with("Not Found"));
        assert!(err.contains("/pulls/999"));

        let err = decode_response::<User>(&url, StatusCode::BAD_GATEWAY, "upstream timed out")
            .unwrap_err()
            .to_string();
        assert!(err.ends_with("502 Bad Gateway upstream timed out"));
    }

    #[test]
    fn malformed_success_reply() {
        let url = Url::parse("https://api.github.com/users/octocat").unwrap();
        assert!(decode_response::<User>(&url, StatusCode::OK, "<html>").is_err());
    }
}
