//! In-memory server and mailer for unit tests.

use crate::error::{CleanupError, Result};
use crate::notify::{Email, Mailer};
use crate::server::{Credentials, Site, Subscription, TableauServer, User, View};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

#[derive(Default)]
struct State {
    sites: Vec<Site>,
    users: HashMap<String, Vec<User>>,
    subscriptions: HashMap<String, Vec<Subscription>>,
    views: HashMap<String, Vec<View>>,
    deleted: Vec<String>,
    tokens: HashSet<String>,
    failing_sign_ins: HashSet<String>,
    failing_subscriptions: HashSet<String>,
    failing_deletes: HashSet<String>,
    fail_list_sites: bool,
}

#[derive(Default)]
pub struct MemoryServer {
    state: RefCell<State>,
    next_token: Cell<u32>,
}

impl MemoryServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_site(&self, id: &str, name: &str, content_url: &str) {
        self.state.borrow_mut().sites.push(Site {
            id: id.into(),
            name: name.into(),
            content_url: content_url.into(),
        });
    }

    pub fn add_user(
        &self,
        site_id: &str,
        id: &str,
        name: &str,
        site_role: &str,
        email: Option<&str>,
        last_login: Option<&str>,
    ) {
        self.state
            .borrow_mut()
            .users
            .entry(site_id.into())
            .or_default()
            .push(User {
                id: id.into(),
                name: name.into(),
                site_role: site_role.into(),
                email: email.map(str::to_string),
                full_name: None,
                last_login: last_login.map(str::to_string),
            });
    }

    pub fn add_view(&self, site_id: &str, id: &str, name: &str, content_url: &str) {
        self.state
            .borrow_mut()
            .views
            .entry(site_id.into())
            .or_default()
            .push(View {
                id: id.into(),
                name: name.into(),
                content_url: content_url.into(),
            });
    }

    pub fn add_subscription(&self, site_id: &str, id: &str, subject: &str, user_id: &str, view_id: &str) {
        self.push_subscription(site_id, id, subject, user_id, view_id, "View");
    }

    pub fn add_workbook_subscription(
        &self,
        site_id: &str,
        id: &str,
        subject: &str,
        user_id: &str,
        workbook_id: &str,
    ) {
        self.push_subscription(site_id, id, subject, user_id, workbook_id, "Workbook");
    }

    fn push_subscription(
        &self,
        site_id: &str,
        id: &str,
        subject: &str,
        user_id: &str,
        target_id: &str,
        target_kind: &str,
    ) {
        self.state
            .borrow_mut()
            .subscriptions
            .entry(site_id.into())
            .or_default()
            .push(Subscription {
                id: id.into(),
                subject: subject.into(),
                user_id: user_id.into(),
                target_id: target_id.into(),
                target_kind: target_kind.into(),
            });
    }

    pub fn fail_sign_in(&self, site_content_url: &str) {
        self.state
            .borrow_mut()
            .failing_sign_ins
            .insert(site_content_url.into());
    }

    pub fn fail_subscriptions(&self, site_id: &str) {
        self.state
            .borrow_mut()
            .failing_subscriptions
            .insert(site_id.into());
    }

    pub fn fail_delete(&self, subscription_id: &str) {
        self.state
            .borrow_mut()
            .failing_deletes
            .insert(subscription_id.into());
    }

    pub fn fail_list_sites(&self) {
        self.state.borrow_mut().fail_list_sites = true;
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.borrow().deleted.clone()
    }

    pub fn open_sessions(&self) -> usize {
        self.state.borrow().tokens.len()
    }

    fn issue(&self, site_content_url: &str) -> Result<Credentials> {
        let site = self
            .state
            .borrow()
            .sites
            .iter()
            .find(|s| s.content_url == site_content_url)
            .cloned()
            .ok_or_else(|| CleanupError::authentication(site_content_url, "unknown site"))?;

        let token = format!("token-{}", self.next_token.get());
        self.next_token.set(self.next_token.get() + 1);
        self.state.borrow_mut().tokens.insert(token.clone());

        Ok(Credentials {
            token,
            site_id: site.id,
            site_content_url: site.content_url,
        })
    }

    fn check(&self, credentials: &Credentials) -> Result<()> {
        if self.state.borrow().tokens.contains(&credentials.token) {
            Ok(())
        } else {
            Err(CleanupError::authentication(
                &credentials.site_content_url,
                "token is not signed in",
            ))
        }
    }
}

impl TableauServer for MemoryServer {
    fn sign_in(&self, site_content_url: &str) -> Result<Credentials> {
        if self.state.borrow().failing_sign_ins.contains(site_content_url) {
            return Err(CleanupError::authentication(site_content_url, "401 Unauthorized"));
        }
        self.issue(site_content_url)
    }

    fn sign_out(&self, credentials: &Credentials) -> Result<()> {
        self.check(credentials)?;
        self.state.borrow_mut().tokens.remove(&credentials.token);
        Ok(())
    }

    fn switch_site(&self, credentials: &Credentials, site_content_url: &str) -> Result<Credentials> {
        self.check(credentials)?;
        if credentials.site_content_url == site_content_url {
            return Err(CleanupError::authentication(site_content_url, "403 Site already in use"));
        }
        let switched = self.issue(site_content_url)?;
        self.state.borrow_mut().tokens.remove(&credentials.token);
        Ok(switched)
    }

    fn list_sites(&self, credentials: &Credentials) -> Result<Vec<Site>> {
        self.check(credentials)?;
        let state = self.state.borrow();
        if state.fail_list_sites {
            return Err(CleanupError::lookup("sites", "500 Internal Server Error"));
        }
        Ok(state.sites.clone())
    }

    fn list_users(&self, credentials: &Credentials) -> Result<Vec<User>> {
        self.check(credentials)?;
        Ok(self
            .state
            .borrow()
            .users
            .get(&credentials.site_id)
            .cloned()
            .unwrap_or_default())
    }

    fn list_subscriptions(&self, credentials: &Credentials) -> Result<Vec<Subscription>> {
        self.check(credentials)?;
        let state = self.state.borrow();
        if state.failing_subscriptions.contains(&credentials.site_id) {
            return Err(CleanupError::lookup("subscriptions", "500 Internal Server Error"));
        }
        Ok(state
            .subscriptions
            .get(&credentials.site_id)
            .cloned()
            .unwrap_or_default())
    }

    fn get_view(&self, credentials: &Credentials, view_id: &str) -> Result<View> {
        self.check(credentials)?;
        self.state
            .borrow()
            .views
            .get(&credentials.site_id)
            .and_then(|views| views.iter().find(|v| v.id == view_id).cloned())
            .ok_or_else(|| CleanupError::lookup(format!("view {}", view_id), "404 Not Found"))
    }

    fn delete_subscription(&self, credentials: &Credentials, subscription_id: &str) -> Result<()> {
        self.check(credentials)?;
        let mut state = self.state.borrow_mut();
        if state.failing_deletes.contains(subscription_id) {
            return Err(CleanupError::delete(subscription_id, "500 Internal Server Error"));
        }
        let subscriptions = state
            .subscriptions
            .get_mut(&credentials.site_id)
            .ok_or_else(|| CleanupError::delete(subscription_id, "404 Not Found"))?;
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != subscription_id);
        if subscriptions.len() == before {
            return Err(CleanupError::delete(subscription_id, "404 Not Found"));
        }
        state.deleted.push(subscription_id.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryMailer {
    sent: RefCell<Vec<Email>>,
    failing: RefCell<HashSet<String>>,
}

impl MemoryMailer {
    pub fn fail_for(&self, recipient: &str) {
        self.failing.borrow_mut().insert(recipient.into());
    }

    pub fn sent(&self) -> Vec<Email> {
        self.sent.borrow().clone()
    }
}

impl Mailer for MemoryMailer {
    fn send(&self, email: &Email) -> Result<()> {
        if self.failing.borrow().contains(&email.to) {
            return Err(CleanupError::notification(&email.to, "550 mailbox unavailable"));
        }
        self.sent.borrow_mut().push(email.clone());
        Ok(())
    }
}
