//! The slice of the Tableau Server API the cleanup needs, plus a scoped
//! session that always signs out.

use crate::error::Result;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub token: String,
    pub site_id: String,
    pub site_content_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Site {
    pub id: String,
    pub name: String,
    pub content_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub name: String,
    pub site_role: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    /// RFC 3339 timestamp as sent by the server.
    pub last_login: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub id: String,
    pub subject: String,
    pub user_id: String,
    pub target_id: String,
    pub target_kind: String,
}

impl Subscription {
    pub fn targets_view(&self) -> bool {
        self.target_kind.eq_ignore_ascii_case("view")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct View {
    pub id: String,
    pub name: String,
    pub content_url: String,
}

/// Operations against a Tableau Server. Site-scoped calls act on the site the
/// credentials were issued for.
pub trait TableauServer {
    fn sign_in(&self, site_content_url: &str) -> Result<Credentials>;
    fn sign_out(&self, credentials: &Credentials) -> Result<()>;
    fn switch_site(&self, credentials: &Credentials, site_content_url: &str) -> Result<Credentials>;
    fn list_sites(&self, credentials: &Credentials) -> Result<Vec<Site>>;
    fn list_users(&self, credentials: &Credentials) -> Result<Vec<User>>;
    fn list_subscriptions(&self, credentials: &Credentials) -> Result<Vec<Subscription>>;
    fn get_view(&self, credentials: &Credentials, view_id: &str) -> Result<View>;
    fn delete_subscription(&self, credentials: &Credentials, subscription_id: &str) -> Result<()>;
}

/// An authenticated session. Dropping it signs out, whichever way the caller
/// leaves the scope.
pub struct Session<'a> {
    server: &'a dyn TableauServer,
    credentials: Credentials,
}

impl<'a> Session<'a> {
    pub fn open(server: &'a dyn TableauServer, site_content_url: &str) -> Result<Self> {
        let credentials = server.sign_in(site_content_url)?;
        debug!(action = "sign_in", component = "session", site = site_content_url, "Session opened");
        Ok(Self {
            server,
            credentials,
        })
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn switch_site(&mut self, site_content_url: &str) -> Result<()> {
        self.credentials = self.server.switch_site(&self.credentials, site_content_url)?;
        Ok(())
    }

    pub fn sites(&self) -> Result<Vec<Site>> {
        self.server.list_sites(&self.credentials)
    }

    pub fn users(&self) -> Result<Vec<User>> {
        self.server.list_users(&self.credentials)
    }

    pub fn subscriptions(&self) -> Result<Vec<Subscription>> {
        self.server.list_subscriptions(&self.credentials)
    }

    pub fn view(&self, view_id: &str) -> Result<View> {
        self.server.get_view(&self.credentials, view_id)
    }

    pub fn delete_subscription(&self, subscription_id: &str) -> Result<()> {
        self.server
            .delete_subscription(&self.credentials, subscription_id)
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        match self.server.sign_out(&self.credentials) {
            Ok(()) => debug!(
                action = "sign_out",
                component = "session",
                site = %self.credentials.site_content_url,
                "Session closed"
            ),
            Err(e) => warn!(
                action = "sign_out",
                component = "session",
                site = %self.credentials.site_content_url,
                error = %e,
                "Failed to sign out"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CleanupError;
    use crate::testing::MemoryServer;

    #[test]
    fn session_signs_out_when_dropped() {
        let server = MemoryServer::new();
        server.add_site("site-1", "Default", "");
        {
            let session = Session::open(&server, "").unwrap();
            assert_eq!(session.credentials().site_id, "site-1");
            assert_eq!(server.open_sessions(), 1);
        }
        assert_eq!(server.open_sessions(), 0);
    }

    #[test]
    fn session_signs_out_on_early_error_return() {
        fn failing(server: &MemoryServer) -> Result<()> {
            let session = Session::open(server, "")?;
            session.view("missing")?;
            Ok(())
        }

        let server = MemoryServer::new();
        server.add_site("site-1", "Default", "");
        assert!(matches!(failing(&server), Err(CleanupError::Lookup { .. })));
        assert_eq!(server.open_sessions(), 0);
    }

    #[test]
    fn switching_site_rescopes_credentials() {
        let server = MemoryServer::new();
        server.add_site("site-1", "Default", "");
        server.add_site("site-2", "Finance", "finance");
        let mut session = Session::open(&server, "").unwrap();
        session.switch_site("finance").unwrap();
        assert_eq!(session.credentials().site_id, "site-2");
        drop(session);
        assert_eq!(server.open_sessions(), 0);
    }

    #[test]
    fn subscription_target_kind_is_case_insensitive() {
        let sub = Subscription {
            id: "s".into(),
            subject: "Weekly".into(),
            user_id: "u".into(),
            target_id: "v".into(),
            target_kind: "View".into(),
        };
        assert!(sub.targets_view());
        assert!(!Subscription {
            target_kind: "Workbook".into(),
            ..sub
        }
        .targets_view());
    }
}
