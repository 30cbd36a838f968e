// src/notify/email.rs
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use lettre::message::{Mailbox, Message, MultiPart};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};
use std::collections::HashSet;
use std::fmt::Write as _;

use super::DigestNotifier;
use crate::config::EmailConfig;
use crate::item::Digest;
use crate::llm::summarizer::{projects_from_json, ProjectIdea};

const MAX_PICKS: usize = 3;

pub fn subject(digest: &Digest) -> String {
    format!("AI News Digest - {}", digest.generated_at.format("%b %d, %Y"))
}

fn picks(digest: &Digest) -> Vec<ProjectIdea> {
    let mut p = projects_from_json(&digest.project_recommendations);
    p.truncate(MAX_PICKS);
    p
}

pub fn render_plaintext(digest: &Digest) -> String {
    let mut lines = vec![
        format!("AI NEWS DIGEST - {}", digest.generated_at.format("%B %d, %Y")),
        format!("{} items from {} sources", digest.total_items, digest.sources_checked),
        String::new(),
        "TL;DR".to_string(),
        digest.intro_summary.clone(),
        String::new(),
    ];
    for section in &digest.sections {
        lines.push(format!("--- {} ---", section.title));
        for item in &section.items {
            lines.push(format!("  [{}] {}", item.source_name, item.title));
            lines.push(format!("  {}", item.url));
            if !item.summary.is_empty() {
                lines.push(format!("  {}", item.summary));
            }
            lines.push(String::new());
        }
    }
    let picks = picks(digest);
    if !picks.is_empty() {
        lines.push("--- Build This ---".to_string());
        for (i, p) in picks.iter().enumerate() {
            lines.push(format!("  {}. {} [{}]", i + 1, p.name, p.category));
            lines.push(format!("     {}", p.description));
            lines.push(format!("     Why: {}", p.why));
            if !p.url.is_empty() {
                lines.push(format!("     {}", p.url));
            }
            lines.push(String::new());
        }
    }
    lines.join("\n")
}

/// Minimal HTML alternative; every interpolated value is escaped.
pub fn render_html(digest: &Digest) -> String {
    use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};

    let mut h = String::new();
    let _ = write!(
        h,
        "<html><body style=\"font-family:sans-serif;max-width:680px\">\
         <h1>AI News Digest</h1><p>{} &middot; {} items from {} sources</p>",
        digest.generated_at.format("%B %d, %Y"),
        digest.total_items,
        digest.sources_checked
    );
    if !digest.intro_summary.is_empty() {
        let _ = write!(h, "<h2>TL;DR</h2><p>{}</p>", text(&digest.intro_summary));
    }
    for section in &digest.sections {
        let _ = write!(h, "<h2>{}</h2><ul>", text(&section.title));
        for item in &section.items {
            let _ = write!(
                h,
                "<li><a href=\"{}\">{}</a> <small>{}</small>",
                attr(&item.url),
                text(&item.title),
                text(&item.source_name)
            );
            if !item.summary.is_empty() {
                let _ = write!(h, "<p>{}</p>", text(&item.summary));
            }
            h.push_str("</li>");
        }
        h.push_str("</ul>");
    }
    let picks = picks(digest);
    if !picks.is_empty() {
        h.push_str("<h2>Build This</h2><ol>");
        for p in &picks {
            let _ = write!(
                h,
                "<li><b>{}</b> [{}]<p>{}</p><p>Why: {}</p></li>",
                text(&p.name),
                text(&p.category),
                text(&p.description),
                text(&p.why)
            );
        }
        h.push_str("</ol>");
    }
    h.push_str("</body></html>");
    h
}

/// Trimmed, case-insensitively unique, first occurrence wins.
pub fn unique_recipients(list: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    list.iter()
        .map(|r| r.trim())
        .filter(|r| !r.is_empty() && seen.insert(r.to_lowercase()))
        .map(str::to_string)
        .collect()
}

pub struct EmailSender {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl EmailSender {
    /// SMTP over implicit TLS on the configured port.
    pub fn from_config(cfg: &EmailConfig) -> Result<Self> {
        let recipients = unique_recipients(&cfg.recipients);
        if recipients.is_empty() {
            bail!("email.recipients is empty");
        }
        let to = recipients
            .iter()
            .map(|r| r.parse::<Mailbox>().with_context(|| format!("invalid recipient {r}")))
            .collect::<Result<Vec<_>>>()?;
        let from: Mailbox = cfg
            .sender_email
            .parse()
            .with_context(|| format!("invalid sender {}", cfg.sender_email))?;

        let creds = Credentials::new(cfg.sender_email.clone(), cfg.sender_password.clone());
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.smtp_server)
            .with_context(|| format!("invalid smtp server {}", cfg.smtp_server))?
            .port(cfg.smtp_port)
            .credentials(creds)
            .build();

        Ok(Self { mailer, from, to })
    }

    /// One message per recipient. Returns how many were sent.
    pub async fn send_digest(&self, digest: &Digest) -> Result<usize> {
        let subject = subject(digest);
        let plain = render_plaintext(digest);
        let html = render_html(digest);

        let mut sent = 0;
        for to in &self.to {
            let msg = Message::builder()
                .from(self.from.clone())
                .to(to.clone())
                .subject(subject.clone())
                .multipart(MultiPart::alternative_plain_html(plain.clone(), html.clone()))
                .context("build email")?;
            self.mailer.send(msg).await.with_context(|| format!("send email to {to}"))?;
            tracing::info!(to = %to, "digest email sent");
            sent += 1;
        }
        Ok(sent)
    }
}

#[async_trait]
impl DigestNotifier for EmailSender {
    async fn deliver(&self, digest: &Digest) -> Result<()> {
        self.send_digest(digest).await.map(|_| ())
    }

    fn name(&self) -> &str {
        "email"
    }
}
