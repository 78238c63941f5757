use chrono::{DateTime, NaiveDate};
use std::fmt;

pub const UNLICENSED_ROLE: &str = "Unlicensed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastLogin {
    On(NaiveDate),
    Never,
}

impl LastLogin {
    /// Reduces the server's RFC 3339 timestamp to a calendar date. A missing or
    /// unparseable value counts as never logged in.
    pub fn from_timestamp(raw: Option<&str>) -> Self {
        raw.and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|dt| LastLogin::On(dt.date_naive()))
            .unwrap_or(LastLogin::Never)
    }
}

impl fmt::Display for LastLogin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LastLogin::On(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            LastLogin::Never => f.write_str("Never Logged In"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnlicensedUser {
    pub site_content_url: String,
    pub site_name: String,
    pub site_id: String,
    pub user_id: String,
    pub user_name: String,
    pub user_email: Option<String>,
    pub full_name: Option<String>,
    pub last_login: LastLogin,
    pub site_role: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemovedSubscription {
    pub site_name: String,
    pub user_name: String,
    pub last_login: LastLogin,
    pub subject: String,
    pub view_name: String,
    pub view_link: String,
    pub user_email: Option<String>,
    pub site_role: String,
}

impl RemovedSubscription {
    pub fn view_link_html(&self) -> String {
        format!(
            r#"<a href="{}">Click Here</a>"#,
            html_escape::encode_double_quoted_attribute(&self.view_link)
        )
    }
}

/// Removed subscriptions grouped under the address they get reported to.
#[derive(Debug, Clone, PartialEq)]
pub struct EmailPayload {
    pub recipient: String,
    pub rows: Vec<RemovedSubscription>,
}

/// Everything the removal stage produced, in the order it happened.
#[derive(Debug, Default)]
pub struct Removal {
    pub removed: Vec<RemovedSubscription>,
    pub payloads: Vec<EmailPayload>,
}

impl Removal {
    pub fn record(&mut self, row: RemovedSubscription) {
        if let Some(recipient) = row.user_email.as_deref() {
            match self.payloads.iter_mut().find(|p| p.recipient == recipient) {
                Some(payload) => payload.rows.push(row.clone()),
                None => self.payloads.push(EmailPayload {
                    recipient: recipient.to_string(),
                    rows: vec![row.clone()],
                }),
            }
        }
        self.removed.push(row);
    }

    pub fn is_empty(&self) -> bool {
        self.removed.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub users_scanned: usize,
    pub subscriptions_removed: usize,
    pub emails_sent: usize,
    pub reports_written: usize,
    pub dry_run: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(email: Option<&str>, subject: &str) -> RemovedSubscription {
        RemovedSubscription {
            site_name: "Default".into(),
            user_name: "alice".into(),
            last_login: LastLogin::Never,
            subject: subject.into(),
            view_name: "V1".into(),
            view_link: "https://tableau.example.com/#/views/wb/V1".into(),
            user_email: email.map(str::to_string),
            site_role: UNLICENSED_ROLE.into(),
        }
    }

    #[test]
    fn last_login_parses_rfc3339_to_date() {
        let login = LastLogin::from_timestamp(Some("2024-03-07T22:15:01Z"));
        assert_eq!(login, LastLogin::On(NaiveDate::from_ymd_opt(2024, 3, 7).unwrap()));
        assert_eq!(login.to_string(), "2024-03-07");
    }

    #[test]
    fn missing_last_login_is_never() {
        assert_eq!(LastLogin::from_timestamp(None), LastLogin::Never);
        assert_eq!(LastLogin::Never.to_string(), "Never Logged In");
    }

    #[test]
    fn record_groups_rows_by_recipient_in_first_seen_order() {
        let mut removal = Removal::default();
        removal.record(row(Some("bob@example.com"), "a"));
        removal.record(row(Some("alice@example.com"), "b"));
        removal.record(row(Some("bob@example.com"), "c"));

        assert_eq!(removal.removed.len(), 3);
        assert_eq!(removal.payloads.len(), 2);
        assert_eq!(removal.payloads[0].recipient, "bob@example.com");
        assert_eq!(removal.payloads[0].rows.len(), 2);
        assert_eq!(removal.payloads[1].rows[0].subject, "b");
    }

    #[test]
    fn rows_without_email_are_kept_but_not_addressed() {
        let mut removal = Removal::default();
        removal.record(row(None, "a"));
        assert_eq!(removal.removed.len(), 1);
        assert!(removal.payloads.is_empty());
    }

    #[test]
    fn link_markup_wraps_the_link() {
        assert_eq!(
            row(None, "a").view_link_html(),
            r#"<a href="https://tableau.example.com/#/views/wb/V1">Click Here</a>"#
        );
    }

    #[test]
    fn link_markup_escapes_quotes_in_the_href() {
        let mut removed = row(None, "a");
        removed.view_link = r#"https://tableau.example.com/#/views/wb/V"1"&x"#.into();
        assert_eq!(
            removed.view_link_html(),
            r#"<a href="https://tableau.example.com/#/views/wb/V&quot;1&quot;&amp;x">Click Here</a>"#
        );
    }
}
