use futures::future::try_join_all;
use tracing::debug;

use crate::github::{GitHubApi, Review, ReviewState};

/// Logins of the users who approved, in review order. A user approving twice is listed once.
pub fn approvers(reviews: &[Review]) -> Vec<String> {
    let mut logins: Vec<String> = Vec::new();

    let approved = reviews
        .iter()
        .filter(|review| review.state == ReviewState::Approved)
        .filter_map(|review| review.user.as_ref());
    for user in approved {
        if !logins.contains(&user.login) {
            logins.push(user.login.clone());
        }
    }

    logins
}

/// Looks up every approver's profile concurrently and returns their display names, in the same
/// order as `logins`. Fails as soon as one lookup fails.
pub async fn display_names(api: &dyn GitHubApi, logins: &[String]) -> anyhow::Result<Vec<String>> {
    debug!("resolving display names of {} approvers", logins.len());

    let lookups = logins.iter().map(|login| async move {
        let user = api.user(login).await?;
        Ok::<_, anyhow::Error>(user.display_name().to_owned())
    });

    try_join_all(lookups).await
}
