//! Notification emails for affected users and the admin list.

use crate::config::SmtpConfig;
use crate::error::{CleanupError, Result};
use crate::records::{EmailPayload, RemovedSubscription};
use askama::Template;
use lettre::message::{Mailbox, MultiPart};
use lettre::{Message, SmtpTransport, Transport};
use tracing::{error, info};

pub const USER_NOTICE_SUBJECT: &str = "Your Tableau Subscriptions Have Been Removed";
pub const ADMIN_SUCCESS_SUBJECT: &str = "Success - Tableau Subscriptions Cleanup Operation Completed";
pub const ADMIN_FAILURE_SUBJECT: &str = "Failed - Tableau Subscriptions Cleanup Operation";

#[derive(Debug, Clone, PartialEq)]
pub struct Email {
    pub from: String,
    pub to: String,
    pub bcc: Option<String>,
    pub subject: String,
    pub text: String,
    pub html: String,
}

pub trait Mailer {
    fn send(&self, email: &Email) -> Result<()>;
}

/// Plain SMTP relay, one connection per message.
pub struct SmtpMailer {
    transport: SmtpTransport,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Self {
        let transport = SmtpTransport::builder_dangerous(&config.host)
            .port(config.port)
            .build();
        Self { transport }
    }
}

fn mailbox(address: &str) -> Result<Mailbox> {
    address
        .parse()
        .map_err(|e| CleanupError::notification(address, e))
}

impl Mailer for SmtpMailer {
    fn send(&self, email: &Email) -> Result<()> {
        let mut builder = Message::builder()
            .from(mailbox(&email.from)?)
            .to(mailbox(&email.to)?)
            .subject(email.subject.clone());
        if let Some(bcc) = &email.bcc {
            builder = builder.bcc(mailbox(bcc)?);
        }
        let message = builder
            .multipart(MultiPart::alternative_plain_html(
                email.text.clone(),
                email.html.clone(),
            ))
            .map_err(|e| CleanupError::notification(&email.to, e))?;

        self.transport
            .send(&message)
            .map_err(|e| CleanupError::notification(&email.to, e))?;
        Ok(())
    }
}

const USER_COLUMNS: [&str; 7] = [
    "SITE_NAME",
    "USER_NAME",
    "SITE_ROLE",
    "LAST_LOGIN",
    "SUBSCRIPTION_SUBJECT",
    "SUBSCRIBED_VIEW",
    "SUBSCRIBED_VIEW_LINK",
];

const ADMIN_COLUMNS: [&str; 7] = [
    "SITE_NAME",
    "USER_NAME",
    "USER_ROLE",
    "LAST_LOGIN",
    "SUBJECT",
    "VIEW_NAME",
    "VIEW_URL",
];

#[derive(Template)]
#[template(path = "emails/user_notice.html")]
struct UserNotice<'a> {
    user_name: &'a str,
    server_url: &'a str,
    access_href: String,
    columns: &'a [&'a str],
    rows: &'a [RemovedSubscription],
}

#[derive(Template)]
#[template(path = "emails/admin_success.html")]
struct AdminSuccess<'a> {
    server_url: &'a str,
    columns: &'a [&'a str],
    rows: &'a [RemovedSubscription],
}

#[derive(Template)]
#[template(path = "emails/admin_failure.html")]
struct AdminFailure<'a> {
    message: &'a str,
}

fn text_table(columns: &[&str], rows: &[RemovedSubscription]) -> String {
    let mut lines = vec![columns.join(" | ")];
    lines.extend(rows.iter().map(|row| {
        [
            row.site_name.clone(),
            row.user_name.clone(),
            row.site_role.clone(),
            row.last_login.to_string(),
            row.subject.clone(),
            row.view_name.clone(),
            row.view_link.clone(),
        ]
        .join(" | ")
    }));
    lines.join("\n")
}

pub struct Notifier<'a> {
    mailer: &'a dyn Mailer,
    smtp: &'a SmtpConfig,
    server_url: &'a str,
}

impl<'a> Notifier<'a> {
    pub fn new(mailer: &'a dyn Mailer, smtp: &'a SmtpConfig, server_url: &'a str) -> Self {
        Self {
            mailer,
            smtp,
            server_url,
        }
    }

    pub fn user_notice(&self, payload: &EmailPayload) -> Result<Email> {
        let user_name = payload
            .rows
            .first()
            .map(|row| row.user_name.as_str())
            .unwrap_or(payload.recipient.as_str());
        let html = UserNotice {
            user_name,
            server_url: self.server_url,
            access_href: html_escape::encode_double_quoted_attribute(&self.smtp.access_request_url)
                .into_owned(),
            columns: &USER_COLUMNS,
            rows: &payload.rows,
        }
        .render()
        .map_err(|e| CleanupError::notification(&payload.recipient, e))?;

        Ok(Email {
            from: self.smtp.from.clone(),
            to: payload.recipient.clone(),
            bcc: Some(self.smtp.admin.clone()),
            subject: USER_NOTICE_SUBJECT.to_string(),
            text: text_table(&USER_COLUMNS, &payload.rows),
            html,
        })
    }

    pub fn admin_success(&self, removed: &[RemovedSubscription]) -> Result<Email> {
        let html = AdminSuccess {
            server_url: self.server_url,
            columns: &ADMIN_COLUMNS,
            rows: removed,
        }
        .render()
        .map_err(|e| CleanupError::notification(&self.smtp.admin, e))?;

        Ok(Email {
            from: self.smtp.from.clone(),
            to: self.smtp.admin.clone(),
            bcc: None,
            subject: ADMIN_SUCCESS_SUBJECT.to_string(),
            text: text_table(&ADMIN_COLUMNS, removed),
            html,
        })
    }

    pub fn admin_failure(&self) -> Result<Email> {
        let message = format!(
            "Subscriptions cleanup activity failed on Tableau Server ({}), please check the \
             server logs to investigate the issue.",
            self.server_url
        );
        let html = AdminFailure { message: &message }
            .render()
            .map_err(|e| CleanupError::notification(&self.smtp.admin, e))?;

        Ok(Email {
            from: self.smtp.from.clone(),
            to: self.smtp.admin.clone(),
            bcc: None,
            subject: ADMIN_FAILURE_SUBJECT.to_string(),
            text: message,
            html,
        })
    }

    /// Sends one notice per recipient and returns how many went out. A failed
    /// send is logged and does not stop the others.
    pub fn send_user_notices(&self, payloads: &[EmailPayload]) -> usize {
        let mut sent = 0;
        for payload in payloads {
            match self
                .user_notice(payload)
                .and_then(|email| self.mailer.send(&email))
            {
                Ok(()) => {
                    sent += 1;
                    info!(
                        action = "send",
                        component = "notifier",
                        recipient = %payload.recipient,
                        subscriptions = payload.rows.len(),
                        "Sent removal notice to user"
                    );
                }
                Err(e) => error!(
                    action = "send",
                    component = "notifier",
                    recipient = %payload.recipient,
                    error = %e,
                    "Failed to send removal notice"
                ),
            }
        }
        sent
    }

    pub fn send_admin_success(&self, removed: &[RemovedSubscription]) -> Result<()> {
        self.mailer.send(&self.admin_success(removed)?)?;
        info!(action = "send", component = "notifier", "Sent completion email to admin team");
        Ok(())
    }

    pub fn send_admin_failure(&self) -> Result<()> {
        self.mailer.send(&self.admin_failure()?)?;
        info!(action = "send", component = "notifier", "Sent failure email to admin team");
        Ok(())
    }
}
