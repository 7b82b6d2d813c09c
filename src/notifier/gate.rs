use std::fmt::Display;

use tracing::trace;

use crate::{
    config::{MergemailConfig, Route},
    github::PullRequest,
};

#[derive(Debug, PartialEq, Eq)]
pub enum Decision {
    /// Addresses to notify, one email each
    Send(Vec<String>),
    Skip(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NotMerged,
    IgnoredAuthor(String),
    NoMatchingLabel,
}

impl Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotMerged => write!(f, "PR has not been merged"),
            Self::IgnoredAuthor(login) => write!(f, "PR author {} is ignored", login),
            Self::NoMatchingLabel => write!(f, "PR carries none of the configured labels"),
        }
    }
}

impl Route {
    pub fn matches(&self, pr: &PullRequest) -> bool {
        match &self.label {
            Some(label) => pr.has_label(label),
            None => true,
        }
    }
}

/// Decides who, if anyone, hears about `pr`.
pub fn evaluate(pr: &PullRequest, config: &MergemailConfig) -> Decision {
    if pr.merged_by.is_none() {
        return Decision::Skip(SkipReason::NotMerged);
    }

    if config.ignored_authors.contains(&pr.user.login) {
        return Decision::Skip(SkipReason::IgnoredAuthor(pr.user.login.clone()));
    }

    let mut recipients: Vec<String> = Vec::new();
    for route in config.routes.iter().filter(|route| route.matches(pr)) {
        trace!("route {:?} -> {} matches", route.label, route.to);
        if !recipients.contains(&route.to) {
            recipients.push(route.to.clone());
        }
    }

    if recipients.is_empty() {
        Decision::Skip(SkipReason::NoMatchingLabel)
    } else {
        Decision::Send(recipients)
    }
}
