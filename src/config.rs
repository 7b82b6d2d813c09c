use std::{collections::HashSet, fs::File, io::BufReader, path::Path};

use anyhow::{anyhow, bail, Context};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::context::PullRequestRef;

#[derive(Debug, Deserialize)]
pub struct MergemailConfig {
    /// Identity the notification emails are sent from
    pub sender: Sender,
    /// ID of the SendGrid dynamic template rendering the notification
    pub template_id: String,
    /// Who gets notified, depending on the labels of the merged pull request
    pub routes: Vec<Route>,
    /// Look up the profile name of every approver instead of reporting their login
    #[serde(default)]
    pub resolve_display_names: bool,
    /// Pull requests opened by these logins never trigger a notification
    #[serde(default)]
    pub ignored_authors: Vec<String>,
    /// Timezone the merge date is reported in
    #[serde(default = "default_timezone")]
    pub timezone: Tz,
    /// Pull request to report on when not running in GitHub Actions
    pub fallback: Option<PullRequestRef>,
    #[serde(default = "default_github_api_url")]
    pub github_api_url: Url,
    #[serde(default = "default_sendgrid_api_url")]
    pub sendgrid_api_url: Url,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Sender {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Route {
    /// Label the pull request must carry. A route without label matches every merged PR.
    pub label: Option<String>,
    /// Recipient address
    pub to: String,
    /// Name of the boolean template variable telling whether `label` is set
    pub flag: Option<String>,
}

fn default_timezone() -> Tz {
    chrono_tz::America::Los_Angeles
}

fn default_github_api_url() -> Url {
    Url::parse("https://api.github.com").expect("hardcoded url is valid")
}

fn default_sendgrid_api_url() -> Url {
    Url::parse("https://api.sendgrid.com").expect("hardcoded url is valid")
}

impl MergemailConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let config_file =
            File::open(path).with_context(|| format!("couldn't open {}", path.display()))?;
        let config: Self = serde_yaml::from_reader(BufReader::new(config_file))
            .with_context(|| format!("couldn't parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Builds the single-recipient setup from `TO_EMAIL`, `FROM_NAME`, `FROM_EMAIL` and
    /// `SG_TEMPLATE`.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| {
            lookup(key)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| anyhow!("environment variable {} must be set", key))
        };

        let config = Self {
            sender: Sender {
                name: var("FROM_NAME")?,
                email: var("FROM_EMAIL")?,
            },
            template_id: var("SG_TEMPLATE")?,
            routes: vec![Route {
                label: None,
                to: var("TO_EMAIL")?,
                flag: None,
            }],
            resolve_display_names: false,
            ignored_authors: Vec::new(),
            timezone: default_timezone(),
            fallback: None,
            github_api_url: default_github_api_url(),
            sendgrid_api_url: default_sendgrid_api_url(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.routes.is_empty() {
            bail!("at least one route is needed");
        }
        if self.template_id.is_empty() {
            bail!("template_id can't be empty");
        }

        let mut seen = HashSet::new();
        for route in &self.routes {
            if route.to.trim().is_empty() {
                bail!("route for label {:?} has no recipient", route.label);
            }
            if let (Some(flag), None) = (&route.flag, &route.label) {
                bail!("route to {} sets flag {} but has no label to test", route.to, flag);
            }
            if !seen.insert((route.label.as_deref(), route.to.as_str())) {
                bail!(
                    "route for label {:?} to {} is declared twice",
                    route.label,
                    route.to
                );
            }
        }

        Ok(())
    }
}
