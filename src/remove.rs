use crate::error::{CleanupError, Result};
use crate::records::{Removal, RemovedSubscription, UnlicensedUser};
use crate::server::{Session, Subscription, TableauServer};
use std::time::Instant;
use tracing::{error, info, warn};

const DEFAULT_SITE_NAME: &str = "Default";

#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveOptions {
    /// Match and record subscriptions without deleting them.
    pub dry_run: bool,
}

/// Browser link to a view. The default site lives at the server root, every
/// other site under `#/site/{content_url}`.
pub fn build_view_link(
    server_base: &str,
    site_name: &str,
    site_content_url: &str,
    view_content_url: &str,
) -> String {
    let server_base = server_base.trim_end_matches('/');
    let link = if site_name == DEFAULT_SITE_NAME {
        format!("{}/#/views/{}", server_base, view_content_url)
    } else {
        format!(
            "{}/#/site/{}/views/{}",
            server_base, site_content_url, view_content_url
        )
    };
    link.replace("sheets/", "")
}

/// Deletes the subscriptions owned by each unlicensed user.
///
/// Every user gets a fresh session on their own site. Failures are logged and
/// skip the user or subscription they belong to; the rest carries on.
pub fn remove_subscriptions(
    server: &dyn TableauServer,
    server_base: &str,
    users: &[UnlicensedUser],
    options: RemoveOptions,
) -> Removal {
    let start_time = Instant::now();
    let mut removal = Removal::default();

    for user in users {
        info!(
            action = "start",
            component = "subscription_removal",
            user = %user.user_name,
            site = %user.site_name,
            "Processing user"
        );
        if let Err(e) = remove_for_user(server, server_base, user, options, &mut removal) {
            error!(
                action = "skip",
                component = "subscription_removal",
                user = %user.user_name,
                site = %user.site_name,
                error = %e,
                "Skipping user"
            );
        }
    }

    info!(
        action = "complete",
        component = "subscription_removal",
        removed = removal.removed.len(),
        recipients = removal.payloads.len(),
        dry_run = options.dry_run,
        duration_ms = start_time.elapsed().as_millis(),
        "Finished processing all users"
    );
    removal
}

fn remove_for_user(
    server: &dyn TableauServer,
    server_base: &str,
    user: &UnlicensedUser,
    options: RemoveOptions,
    removal: &mut Removal,
) -> Result<()> {
    let session = Session::open(server, &user.site_content_url)?;
    let subscriptions = session.subscriptions()?;
    info!(
        action = "query",
        component = "subscription_removal",
        site = %user.site_name,
        subscription_count = subscriptions.len(),
        "Retrieved subscriptions"
    );

    for subscription in subscriptions
        .iter()
        .filter(|s| s.user_id == user.user_id)
    {
        match remove_one(&session, server_base, user, subscription, options) {
            Ok(row) => removal.record(row),
            Err(e) => warn!(
                action = "skip",
                component = "subscription_removal",
                subscription = %subscription.id,
                error = %e,
                "Skipping subscription"
            ),
        }
    }
    Ok(())
}

fn remove_one(
    session: &Session<'_>,
    server_base: &str,
    user: &UnlicensedUser,
    subscription: &Subscription,
    options: RemoveOptions,
) -> Result<RemovedSubscription> {
    if !subscription.targets_view() {
        return Err(CleanupError::lookup(
            format!("view for subscription {}", subscription.id),
            format!("target is a {}, not a view", subscription.target_kind),
        ));
    }
    let view = session.view(&subscription.target_id)?;
    let view_link = build_view_link(
        server_base,
        &user.site_name,
        &user.site_content_url,
        &view.content_url,
    );

    if options.dry_run {
        info!(
            action = "dry_run",
            component = "subscription_removal",
            subscription = %subscription.id,
            view = %view.name,
            "Would delete subscription"
        );
    } else {
        session.delete_subscription(&subscription.id)?;
        info!(
            action = "delete",
            component = "subscription_removal",
            subscription = %subscription.id,
            view = %view.name,
            user = %user.user_name,
            "Deleted subscription"
        );
    }

    Ok(RemovedSubscription {
        site_name: user.site_name.clone(),
        user_name: user.user_name.clone(),
        last_login: user.last_login,
        subject: subscription.subject.clone(),
        view_name: view.name,
        view_link,
        user_email: user.user_email.clone(),
        site_role: user.site_role.clone(),
    })
}
