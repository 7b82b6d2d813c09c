use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use pulldown_cmark::{html, Event, Options, Parser, Tag, TagEnd};
use serde::Serialize;

use crate::{config::MergemailConfig, github::PullRequest};

const APPROVER_SEPARATOR: &str = ", ";

/// Template variables describing one merged pull request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Digest {
    pub title: String,
    pub date: String,
    /// PR body rendered to HTML
    pub content: String,
    pub created_by: String,
    pub approvers: String,
    pub released_by: Option<String>,
    pub files: String,
    /// One entry per configured route flag, `true` when the route's label is on the PR
    #[serde(flatten)]
    pub flags: BTreeMap<String, bool>,
}

impl Digest {
    pub fn new(pr: &PullRequest, approvers: &[String], config: &MergemailConfig) -> Self {
        let mut flags = BTreeMap::new();
        for route in &config.routes {
            if let (Some(flag), Some(label)) = (&route.flag, &route.label) {
                // several routes may share a flag
                *flags.entry(flag.clone()).or_insert(false) |= pr.has_label(label);
            }
        }

        Self {
            title: pr.title.clone(),
            date: pr
                .merged_at
                .map(|merged_at| format_date(merged_at, config.timezone))
                .unwrap_or_default(),
            content: render_markdown(pr.body.as_deref().unwrap_or_default()),
            created_by: pr.user.login.clone(),
            approvers: join_approvers(approvers),
            released_by: pr.merged_by.as_ref().map(|user| user.login.clone()),
            files: pluralize_files(pr.changed_files),
            flags,
        }
    }
}

/// Formats a timestamp as `Wed Oct 21 2026 3:04:05 PM PDT`, in `tz`.
pub fn format_date(date: DateTime<Utc>, tz: Tz) -> String {
    date.with_timezone(&tz)
        .format("%a %b %d %Y %-I:%M:%S %p %Z")
        .to_string()
}

/// Renders a Markdown PR body to HTML. Raw HTML in the body is escaped rather than passed
/// through: an HTML block becomes a paragraph of its escaped source, Markdown inside it is left
/// as is.
pub fn render_markdown(body: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let mut events = Vec::new();
    for event in Parser::new_ext(body, options) {
        match event {
            Event::Start(Tag::HtmlBlock) => events.push(Event::Start(Tag::Paragraph)),
            Event::End(TagEnd::HtmlBlock) => {
                // the block's last line keeps its newline, it must not end up before `</p>`
                if let Some(Event::Text(raw)) = events.last_mut() {
                    let trimmed = raw.trim_end_matches('\n').to_string();
                    *raw = trimmed.into();
                }
                events.push(Event::End(TagEnd::Paragraph));
            }
            Event::Html(raw) | Event::InlineHtml(raw) => events.push(Event::Text(raw)),
            event => events.push(event),
        }
    }

    let mut rendered = String::with_capacity(body.len() * 3 / 2);
    html::push_html(&mut rendered, events.into_iter());
    rendered
}

pub fn join_approvers(approvers: &[String]) -> String {
    approvers.join(APPROVER_SEPARATOR)
}

pub fn pluralize_files(count: u64) -> String {
    if count == 1 {
        "1 file".to_string()
    } else {
        format!("{} files", count)
    }
}
