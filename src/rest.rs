//! Blocking JSON client for the Tableau Server REST API.

use crate::config::TableauConfig;
use crate::error::{CleanupError, Result};
use crate::server::{Credentials, Site, Subscription, TableauServer, User, View};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

const AUTH_HEADER: &str = "X-Tableau-Auth";

pub struct RestClient {
    http: Client,
    api_base: String,
    username: String,
    password: String,
    page_size: usize,
}

impl RestClient {
    pub fn new(config: &TableauConfig) -> reqwest::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;

        Ok(Self {
            http,
            api_base: format!(
                "{}/api/{}",
                config.server_url.trim_end_matches('/'),
                config.api_version
            ),
            username: config.username.clone(),
            password: config.password.clone(),
            page_size: config.page_size,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path)
    }

    fn authed(&self, request: RequestBuilder, credentials: &Credentials) -> RequestBuilder {
        request.header(AUTH_HEADER, &credentials.token)
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        credentials: &Credentials,
        path: &str,
        query: &[(&str, String)],
    ) -> reqwest::Result<T> {
        self.authed(self.http.get(self.url(path)), credentials)
            .query(query)
            .send()?
            .error_for_status()?
            .json()
    }

    /// Walks every page of a list endpoint.
    fn get_all<P: Page + DeserializeOwned>(
        &self,
        credentials: &Credentials,
        path: &str,
        extra_query: &[(&str, &str)],
    ) -> reqwest::Result<Vec<P::Item>> {
        let mut items = Vec::new();
        let mut page_number = 1usize;

        loop {
            let mut query: Vec<(&str, String)> = vec![
                ("pageSize", self.page_size.to_string()),
                ("pageNumber", page_number.to_string()),
            ];
            query.extend(extra_query.iter().map(|(k, v)| (*k, v.to_string())));

            let page: P = self.get_json(credentials, path, &query)?;
            let (pagination, batch) = page.into_parts();
            let fetched = batch.len();
            items.extend(batch);

            let total = pagination.map_or(items.len(), |p| p.total_available());
            debug!(
                action = "page",
                component = "rest_client",
                path = path,
                page_number,
                fetched,
                total,
                "Fetched page"
            );
            if fetched == 0 || items.len() >= total {
                return Ok(items);
            }
            page_number += 1;
        }
    }

    fn post_credentials<B: Serialize>(
        &self,
        path: &str,
        token: Option<&str>,
        body: &B,
    ) -> reqwest::Result<Credentials> {
        let mut request = self.http.post(self.url(path)).json(body);
        if let Some(token) = token {
            request = request.header(AUTH_HEADER, token);
        }
        let envelope: CredentialsEnvelope = request.send()?.error_for_status()?.json()?;
        Ok(envelope.credentials.into())
    }
}

impl TableauServer for RestClient {
    fn sign_in(&self, site_content_url: &str) -> Result<Credentials> {
        let body = SignInRequest {
            credentials: SignInCredentials {
                name: &self.username,
                password: &self.password,
                site: SiteRef {
                    content_url: site_content_url,
                },
            },
        };
        self.post_credentials("auth/signin", None, &body)
            .map_err(|e| CleanupError::authentication(site_content_url, e))
    }

    fn sign_out(&self, credentials: &Credentials) -> Result<()> {
        self.authed(self.http.post(self.url("auth/signout")), credentials)
            .send()
            .and_then(|r| r.error_for_status())
            .map(|_| ())
            .map_err(|e| CleanupError::authentication(&credentials.site_content_url, e))
    }

    fn switch_site(&self, credentials: &Credentials, site_content_url: &str) -> Result<Credentials> {
        let body = SwitchSiteRequest {
            site: SiteRef {
                content_url: site_content_url,
            },
        };
        self.post_credentials("auth/switchSite", Some(&credentials.token), &body)
            .map_err(|e| CleanupError::authentication(site_content_url, e))
    }

    fn list_sites(&self, credentials: &Credentials) -> Result<Vec<Site>> {
        self.get_all::<SitesPage>(credentials, "sites", &[])
            .map_err(|e| CleanupError::lookup("sites", e))
    }

    fn list_users(&self, credentials: &Credentials) -> Result<Vec<User>> {
        let path = format!("sites/{}/users", credentials.site_id);
        self.get_all::<UsersPage>(credentials, &path, &[("fields", "_all_")])
            .map_err(|e| CleanupError::lookup(format!("users of site {}", credentials.site_id), e))
    }

    fn list_subscriptions(&self, credentials: &Credentials) -> Result<Vec<Subscription>> {
        let path = format!("sites/{}/subscriptions", credentials.site_id);
        self.get_all::<SubscriptionsPage>(credentials, &path, &[])
            .map_err(|e| {
                CleanupError::lookup(format!("subscriptions of site {}", credentials.site_id), e)
            })
    }

    fn get_view(&self, credentials: &Credentials, view_id: &str) -> Result<View> {
        let path = format!("sites/{}/views/{}", credentials.site_id, view_id);
        self.get_json::<ViewEnvelope>(credentials, &path, &[])
            .map(|envelope| envelope.view.into())
            .map_err(|e| CleanupError::lookup(format!("view {}", view_id), e))
    }

    fn delete_subscription(&self, credentials: &Credentials, subscription_id: &str) -> Result<()> {
        let path = format!(
            "sites/{}/subscriptions/{}",
            credentials.site_id, subscription_id
        );
        self.authed(self.http.delete(self.url(&path)), credentials)
            .send()
            .and_then(|r| r.error_for_status())
            .map(|_| ())
            .map_err(|e| CleanupError::delete(subscription_id, e))
    }
}

#[derive(Serialize)]
struct SignInRequest<'a> {
    credentials: SignInCredentials<'a>,
}

#[derive(Serialize)]
struct SignInCredentials<'a> {
    name: &'a str,
    password: &'a str,
    site: SiteRef<'a>,
}

#[derive(Serialize)]
struct SwitchSiteRequest<'a> {
    site: SiteRef<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SiteRef<'a> {
    content_url: &'a str,
}

#[derive(Deserialize)]
struct CredentialsEnvelope {
    credentials: CredentialsBody,
}

#[derive(Deserialize)]
struct CredentialsBody {
    token: String,
    site: CredentialsSite,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CredentialsSite {
    id: String,
    #[serde(default)]
    content_url: String,
}

#[derive(Deserialize)]
struct IdOnly {
    id: String,
}

impl From<CredentialsBody> for Credentials {
    fn from(body: CredentialsBody) -> Self {
        Credentials {
            token: body.token,
            site_id: body.site.id,
            site_content_url: body.site.content_url,
        }
    }
}

/// Tableau sends pagination counters as strings.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Pagination {
    total_available: String,
}

impl Pagination {
    fn total_available(&self) -> usize {
        self.total_available.parse().unwrap_or(0)
    }
}

trait Page {
    type Item;
    fn into_parts(self) -> (Option<Pagination>, Vec<Self::Item>);
}

#[derive(Deserialize)]
struct SitesPage {
    pagination: Option<Pagination>,
    #[serde(default)]
    sites: SiteList,
}

#[derive(Deserialize, Default)]
struct SiteList {
    #[serde(default)]
    site: Vec<SiteBody>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SiteBody {
    id: String,
    name: String,
    #[serde(default)]
    content_url: String,
}

impl Page for SitesPage {
    type Item = Site;
    fn into_parts(self) -> (Option<Pagination>, Vec<Site>) {
        let sites = self
            .sites
            .site
            .into_iter()
            .map(|s| Site {
                id: s.id,
                name: s.name,
                content_url: s.content_url,
            })
            .collect();
        (self.pagination, sites)
    }
}

#[derive(Deserialize)]
struct UsersPage {
    pagination: Option<Pagination>,
    #[serde(default)]
    users: UserList,
}

#[derive(Deserialize, Default)]
struct UserList {
    #[serde(default)]
    user: Vec<UserBody>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserBody {
    id: String,
    name: String,
    site_role: String,
    email: Option<String>,
    full_name: Option<String>,
    last_login: Option<String>,
}

impl Page for UsersPage {
    type Item = User;
    fn into_parts(self) -> (Option<Pagination>, Vec<User>) {
        let users = self
            .users
            .user
            .into_iter()
            .map(|u| User {
                id: u.id,
                name: u.name,
                site_role: u.site_role,
                email: u.email.filter(|e| !e.is_empty()),
                full_name: u.full_name,
                last_login: u.last_login,
            })
            .collect();
        (self.pagination, users)
    }
}

#[derive(Deserialize)]
struct SubscriptionsPage {
    pagination: Option<Pagination>,
    #[serde(default)]
    subscriptions: SubscriptionList,
}

#[derive(Deserialize, Default)]
struct SubscriptionList {
    #[serde(default)]
    subscription: Vec<SubscriptionBody>,
}

#[derive(Deserialize)]
struct SubscriptionBody {
    id: String,
    #[serde(default)]
    subject: String,
    content: SubscriptionContent,
    user: IdOnly,
}

#[derive(Deserialize)]
struct SubscriptionContent {
    id: String,
    #[serde(rename = "type")]
    kind: String,
}

impl Page for SubscriptionsPage {
    type Item = Subscription;
    fn into_parts(self) -> (Option<Pagination>, Vec<Subscription>) {
        let subscriptions = self
            .subscriptions
            .subscription
            .into_iter()
            .map(|s| Subscription {
                id: s.id,
                subject: s.subject,
                user_id: s.user.id,
                target_id: s.content.id,
                target_kind: s.content.kind,
            })
            .collect();
        (self.pagination, subscriptions)
    }
}

#[derive(Deserialize)]
struct ViewEnvelope {
    view: ViewBody,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ViewBody {
    id: String,
    name: String,
    content_url: String,
}

impl From<ViewBody> for View {
    fn from(body: ViewBody) -> Self {
        View {
            id: body.id,
            name: body.name,
            content_url: body.content_url,
        }
    }
}
