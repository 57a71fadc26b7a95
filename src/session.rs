//! Client-only session flag and route gating.
//!
//! There is no credential check here: `login` only flips the flag. The flag
//! is read from the store once when the session is opened and every mutation
//! is written back before the call returns.
use anyhow::Result;
use tracing::info;

use crate::storage::{Store, AUTH_KEY};

pub const LOGIN_PATH: &str = "/login";
pub const NOT_FOUND_PATH: &str = "/404";
pub const DASHBOARD_PATH: &str = "/dashboard";

const PUBLIC_PATHS: [&str; 2] = [LOGIN_PATH, NOT_FOUND_PATH];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Login,
    Dashboard,
    Plants,
    Ports,
    Trains,
    Vessels,
    DataManagement,
    NotFound,
}

impl Route {
    /// Resolve a path to a route; unknown paths resolve to `NotFound`.
    pub fn resolve(path: &str) -> Option<Route> {
        let path = normalize_path(path);
        let route = match path.as_str() {
            "/" => return None,
            LOGIN_PATH => Route::Login,
            DASHBOARD_PATH => Route::Dashboard,
            "/plants" => Route::Plants,
            "/ports" => Route::Ports,
            "/trains" => Route::Trains,
            "/vessels" => Route::Vessels,
            "/data-management" => Route::DataManagement,
            _ => Route::NotFound,
        };
        Some(route)
    }

    pub fn path(&self) -> &'static str {
        match self {
            Route::Login => LOGIN_PATH,
            Route::Dashboard => DASHBOARD_PATH,
            Route::Plants => "/plants",
            Route::Ports => "/ports",
            Route::Trains => "/trains",
            Route::Vessels => "/vessels",
            Route::DataManagement => "/data-management",
            Route::NotFound => NOT_FOUND_PATH,
        }
    }

    pub fn is_public(&self) -> bool {
        matches!(self, Route::NotFound) || PUBLIC_PATHS.contains(&self.path())
    }
}

fn normalize_path(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or_default().trim();
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Render(Route),
    Redirect(&'static str),
}

/// Capability object holding the session flag. Constructed once at startup
/// and passed to whatever needs to gate or mutate it.
#[derive(Debug)]
pub struct Session {
    store: Store,
    authenticated: bool,
}

impl Session {
    pub async fn open(store: Store) -> Result<Self> {
        let stored = store.get(AUTH_KEY).await?;
        let authenticated = stored.as_deref() == Some("true");
        Ok(Self {
            store,
            authenticated,
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub async fn login(&mut self) -> Result<()> {
        self.set(true).await?;
        info!("session logged in");
        Ok(())
    }

    pub async fn logout(&mut self) -> Result<()> {
        self.set(false).await?;
        info!("session logged out");
        Ok(())
    }

    async fn set(&mut self, value: bool) -> Result<()> {
        self.store
            .set(AUTH_KEY, if value { "true" } else { "false" })
            .await?;
        self.authenticated = value;
        Ok(())
    }

    pub fn navigate(&self, path: &str) -> Navigation {
        gate(self.authenticated, path)
    }
}

/// Decide what navigating to `path` does for the given flag.
pub fn gate(authenticated: bool, path: &str) -> Navigation {
    match Route::resolve(path) {
        None if authenticated => Navigation::Redirect(DASHBOARD_PATH),
        None => Navigation::Redirect(LOGIN_PATH),
        Some(route) if route.is_public() || authenticated => Navigation::Render(route),
        Some(_) => Navigation::Redirect(LOGIN_PATH),
    }
}
