use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use tracing::{info, trace};
use url::Url;

use crate::{
    config::Sender,
    mailer::{Email, Mailer},
    notifier::Digest,
};

/// Sends emails through the SendGrid v3 `mail/send` endpoint, using a dynamic template.
pub struct SendGridMailer {
    http: reqwest::Client,
    endpoint: Url,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct MailSend<'a> {
    personalizations: [Personalization<'a>; 1],
    from: &'a Sender,
    template_id: &'a str,
}

#[derive(Debug, Serialize)]
struct Personalization<'a> {
    to: [Address<'a>; 1],
    dynamic_template_data: &'a Digest,
}

#[derive(Debug, Serialize)]
struct Address<'a> {
    email: &'a str,
}

impl<'a> From<&'a Email> for MailSend<'a> {
    fn from(email: &'a Email) -> Self {
        Self {
            personalizations: [Personalization {
                to: [Address { email: &email.to }],
                dynamic_template_data: &email.data,
            }],
            from: &email.from,
            template_id: &email.template_id,
        }
    }
}

impl SendGridMailer {
    pub fn new(base: &Url, api_key: String) -> anyhow::Result<Self> {
        let mut endpoint = base.clone();
        endpoint
            .path_segments_mut()
            .map_err(|_| anyhow!("SendGrid url {} can't be a base", base))?
            .pop_if_empty()
            .extend(["v3", "mail", "send"]);

        Ok(Self {
            http: reqwest::Client::new(),
            endpoint,
            api_key,
        })
    }
}

#[async_trait]
impl Mailer for SendGridMailer {
    async fn send(&self, email: &Email) -> anyhow::Result<()> {
        trace!("POST {} for {}", self.endpoint, email.to);

        let response = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&MailSend::from(email))
            .send()
            .await
            .with_context(|| format!("request to {} failed", self.endpoint))?;

        let status = response.status();
        let body = if status.is_success() {
            String::new()
        } else {
            response.text().await.unwrap_or_default()
        };
        check_reply(&email.to, status, &body)?;

        info!(to = %email.to, %status, "email sent");
        Ok(())
    }
}

/// SendGrid answers `202 Accepted`; on failure the body lists what's wrong with the request.
fn check_reply(to: &str, status: StatusCode, body: &str) -> anyhow::Result<()> {
    if status.is_success() {
        return Ok(());
    }

    bail!("SendGrid refused email to {}: {} {}", to, status, body.trim())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;

    #[test]
    fn request_body() {
        let email = Email {
            to: "team@example.com".to_string(),
            from: Sender {
                name: "Milo".to_string(),
                email: "noreply@example.com".to_string(),
            },
            template_id: "d-123".to_string(),
            data: Digest {
                title: "Add footer".to_string(),
                date: "Wed Oct 21 2026 3:04:05 PM PDT".to_string(),
                content: "<p>hi</p>\n".to_string(),
                created_by: "author".to_string(),
                approvers: "alice, bob".to_string(),
                released_by: Some("merger".to_string()),
                files: "1 file".to_string(),
                flags: BTreeMap::new(),
            },
        };

        assert_eq!(
            serde_json::to_value(MailSend::from(&email)).unwrap(),
            json!({
                "personalizations": [{
                    "to": [{"email": "team@example.com"}],
                    "dynamic_template_data": {
                        "title": "Add footer",
                        "date": "Wed Oct 21 2026 3:04:05 PM PDT",
                        "content": "<p>hi</p>\n",
                        "createdBy": "author",
                        "approvers": "alice, bob",
                        "releasedBy": "merger",
                        "files": "1 file",
                    },
                }],
                "from": {"name": "Milo", "email": "noreply@example.com"},
                "template_id": "d-123",
            })
        );
    }

    #[test]
    fn endpoint() {
        let base = Url::parse("https://api.sendgrid.com").unwrap();
        let mailer = SendGridMailer::new(&base, "key".to_string()).unwrap();
        assert_eq!(mailer.endpoint.as_str(), "https://api.sendgrid.com/v3/mail/send");

        let base = Url::parse("https://relay.example.com/sendgrid/").unwrap();
        let mailer = SendGridMailer::new(&base, "key".to_string()).unwrap();
        assert_eq!(
            mailer.endpoint.as_str(),
            "https://relay.example.com/sendgrid/v3/mail/send"
        );
    }

    #[test]
    fn accepted_reply() {
        check_reply("team@example.com", StatusCode::ACCEPTED, "").unwrap();
    }

    #[test]
    fn refused_reply_carries_body() {
        let body = r#"{"errors":[{"message":"The template_id must be a valid GUID","field":"template_id"}]}"#;
        let err = check_reply("team@example.com", StatusCode::BAD_REQUEST, body)
            .unwrap_err()
            .to_string();
        assert!(err.contains("team@example.com"));
        assert!(err.contains("400 Bad Request"));
        assert!(err.contains("The template_id must be a valid GUID"));

        let err = check_reply("team@example.com", StatusCode::SERVICE_UNAVAILABLE, "")
            .unwrap_err()
            .to_string();
        assert!(err.contains("503 Service Unavailable"));
    }
}
