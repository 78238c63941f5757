use crate::error::Result;
use crate::records::{LastLogin, UnlicensedUser, UNLICENSED_ROLE};
use crate::server::{Session, TableauServer};
use std::time::Instant;
use tracing::{debug, info};

/// Collects every unlicensed user on every site reachable from one session.
///
/// `Ok` with an empty list means the server had no unlicensed users; any
/// failure along the way is returned as `Err`.
pub fn find_unlicensed_users(
    server: &dyn TableauServer,
    initial_site: &str,
) -> Result<Vec<UnlicensedUser>> {
    let start_time = Instant::now();
    info!(action = "start", component = "user_scan", "Scanning sites for unlicensed users");

    let mut session = Session::open(server, initial_site)?;
    let sites = session.sites()?;
    info!(action = "query", component = "user_scan", site_count = sites.len(), "Found sites");

    let mut unlicensed = Vec::new();
    for site in sites {
        // The server refuses a switch to the site the session is already on
        if session.credentials().site_content_url != site.content_url {
            session.switch_site(&site.content_url)?;
            debug!(action = "switch", component = "user_scan", site = %site.name, "Switched to site");
        }

        let users = session.users()?;
        let before = unlicensed.len();
        unlicensed.extend(
            users
                .into_iter()
                .filter(|user| user.site_role == UNLICENSED_ROLE)
                .map(|user| UnlicensedUser {
                    site_content_url: site.content_url.clone(),
                    site_name: site.name.clone(),
                    site_id: site.id.clone(),
                    last_login: LastLogin::from_timestamp(user.last_login.as_deref()),
                    user_id: user.id,
                    user_name: user.name,
                    user_email: user.email,
                    full_name: user.full_name,
                    site_role: user.site_role,
                }),
        );
        info!(
            action = "filter",
            component = "user_scan",
            site = %site.name,
            unlicensed_count = unlicensed.len() - before,
            "Collected unlicensed users for site"
        );
    }

    info!(
        action = "complete",
        component = "user_scan",
        unlicensed_count = unlicensed.len(),
        duration_ms = start_time.elapsed().as_millis(),
        "User scan completed"
    );
    Ok(unlicensed)
}
