use anyhow::Context;
use tracing::{debug, info};

use crate::{
    config::MergemailConfig,
    context::PullRequestRef,
    github::GitHubApi,
    mailer::{Email, Mailer},
};

mod approvers;
use approvers::{approvers, display_names};

mod digest;
pub use digest::Digest;

mod gate;
pub use gate::{Decision, SkipReason};

pub(crate) mod utils;

pub struct Mergemail {
    github: Box<dyn GitHubApi>,
    mailer: Box<dyn Mailer>,
    config: MergemailConfig,
}

/// What a run ended up doing.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Addresses that were emailed
    Sent(Vec<String>),
    Skipped(SkipReason),
}

impl Mergemail {
    pub fn new(
        config: MergemailConfig,
        github: Box<dyn GitHubApi>,
        mailer: Box<dyn Mailer>,
    ) -> Self {
        Self {
            github,
            mailer,
            config,
        }
    }

    /// Reports on one pull request: gathers its metadata and approvals, then emails every
    /// recipient whose route matches, or logs why nobody was notified.
    pub async fn run(&self, pr_ref: &PullRequestRef) -> anyhow::Result<Outcome> {
        debug!("fetching {}", pr_ref);

        let (pr, reviews) = tokio::try_join!(
            self.github.pull_request(pr_ref),
            self.github.reviews(pr_ref)
        )
        .with_context(|| format!("couldn't fetch {}", pr_ref))?;
        info!("{} ({})", pr, pr.html_url);

        let mut approved = approvers(&reviews);
        debug!("approved by {:?}", approved);
        if self.config.resolve_display_names {
            approved = display_names(self.github.as_ref(), &approved)
                .await
                .context("couldn't resolve approver names")?;
        }

        let digest = Digest::new(&pr, &approved, &self.config);

        let recipients = match gate::evaluate(&pr, &self.config) {
            Decision::Send(recipients) => recipients,
            Decision::Skip(reason) => {
                info!(
                    title = %digest.title,
                    date = %digest.date,
                    approvers = %digest.approvers,
                    files = %digest.files,
                    "{}, not sending anything",
                    reason
                );
                debug!("content: {}", digest.content);
                return Ok(Outcome::Skipped(reason));
            }
        };

        for to in &recipients {
            let email = Email {
                to: to.clone(),
                from: self.config.sender.clone(),
                template_id: self.config.template_id.clone(),
                data: digest.clone(),
            };
            self.mailer
                .send(&email)
                .await
                .with_context(|| format!("couldn't notify {} about {}", to, pr_ref))?;
        }

        Ok(Outcome::Sent(recipients))
    }
}
