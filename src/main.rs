use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
use config::MergemailConfig;

mod context;
use context::PullRequestRef;

mod github;
use github::GitHubClient;

mod mailer;
use mailer::{DryRunMailer, Mailer, SendGridMailer};

mod notifier;
use notifier::{Mergemail, Outcome};

#[derive(Parser)]
#[command(version, about = "Emails a summary of merged pull requests")]
struct Opts {
    /// Configuration file for mergemail. Without one, a single recipient setup is read from
    /// TO_EMAIL, FROM_NAME, FROM_EMAIL and SG_TEMPLATE.
    #[arg(short, long, env = "MERGEMAIL_CONFIG")]
    config: Option<PathBuf>,

    /// Token for the GitHub API
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,

    /// SendGrid API key, not needed with --dry-run
    #[arg(long, env = "SG_KEY", hide_env_values = true)]
    sendgrid_key: Option<String>,

    /// Payload of the event that triggered the workflow
    #[arg(long, env = "GITHUB_EVENT_PATH")]
    event_path: Option<PathBuf>,

    /// Log the emails instead of sending them
    #[arg(long)]
    dry_run: bool,

    /// Owner of the repository, to report on a pull request by hand
    #[arg(long, requires_all = ["repo", "pull"])]
    owner: Option<String>,

    /// Name of the repository, to report on a pull request by hand
    #[arg(long, requires_all = ["owner", "pull"])]
    repo: Option<String>,

    /// Number of the pull request, to report on a pull request by hand
    #[arg(long, requires_all = ["owner", "repo"])]
    pull: Option<u64>,
}

impl Opts {
    fn manual_pull_request(&self) -> Option<PullRequestRef> {
        match (&self.owner, &self.repo, self.pull) {
            (Some(owner), Some(repo), Some(number)) => Some(PullRequestRef {
                owner: owner.clone(),
                repo: repo.clone(),
                number,
            }),
            _ => None,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let opts = Opts::parse();
    let config = match &opts.config {
        Some(path) => MergemailConfig::from_file(path)?,
        None => MergemailConfig::from_env().context("no config file given")?,
    };

    let pr_ref = match opts.manual_pull_request() {
        Some(pr_ref) => pr_ref,
        None => context::resolve(
            std::env::var_os("GITHUB_ACTIONS").is_some(),
            opts.event_path.as_deref(),
            config.fallback.as_ref(),
        )?,
    };

    let github = GitHubClient::new(config.github_api_url.clone(), opts.github_token.clone())
        .context("failed to create GitHub client")?;
    let mailer: Box<dyn Mailer> = if opts.dry_run {
        Box::new(DryRunMailer)
    } else {
        let api_key = opts
            .sendgrid_key
            .clone()
            .ok_or_else(|| anyhow!("SG_KEY must be set to send emails"))?;
        Box::new(SendGridMailer::new(&config.sendgrid_api_url, api_key)?)
    };

    let mergemail = Mergemail::new(config, Box::new(github), mailer);
    match mergemail.run(&pr_ref).await? {
        Outcome::Sent(recipients) => info!("notified {}", recipients.join(", ")),
        Outcome::Skipped(reason) => info!("nothing sent for {}: {}", pr_ref, reason),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn options_have_help() {
        let command = Opts::command();
        for id in [
            "config",
            "github_token",
            "sendgrid_key",
            "event_path",
            "dry_run",
            "owner",
            "repo",
            "pull",
        ] {
            let arg = command
                .get_arguments()
                .find(|arg| arg.get_id().as_str() == id)
                .unwrap();
            assert!(arg.get_help().is_some(), "--{} has no help", id);
        }
    }

    #[test]
    fn manual_pull_request_needs_all_parts() {
        let opts =
            Opts::try_parse_from(["mergemail", "--owner", "adobecom", "--repo", "milo", "--pull", "34"])
                .unwrap();
        assert_eq!(
            opts.manual_pull_request(),
            Some(PullRequestRef {
                owner: "adobecom".to_string(),
                repo: "milo".to_string(),
                number: 34,
            })
        );

        assert!(Opts::try_parse_from(["mergemail", "--owner", "adobecom"]).is_err());
    }
}
