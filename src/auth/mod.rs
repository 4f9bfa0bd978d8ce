//! Login sessions
//!
//! `/auth/callback` turns a verified identity into a user and a session
//! token carried in an HttpOnly cookie. Only SHA-256 hashes of tokens are
//! kept in memory.

use crate::config::AuthConfig;
use crate::models::User;
use crate::services::AccountService;
use crate::Result;
use axum::http::{header, HeaderMap};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

pub mod provider;

pub use provider::{IdentityProvider, ProxyHeaderProvider, VerifiedIdentity};

pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[derive(Clone, Default)]
pub struct AuthSessions {
    tokens: Arc<RwLock<HashMap<String, Uuid>>>,
}

impl AuthSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// New random token bound to `user_id`.
    pub async fn issue(&self, user_id: Uuid) -> String {
        let token = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
        self.tokens.write().await.insert(hash_token(&token), user_id);
        token
    }

    pub async fn resolve(&self, token: &str) -> Option<Uuid> {
        self.tokens.read().await.get(&hash_token(token)).copied()
    }

    pub async fn revoke(&self, token: &str) -> bool {
        self.tokens.write().await.remove(&hash_token(token)).is_some()
    }
}

/// Find or create the user behind `identity` and record the login.
pub async fn complete_login(
    accounts: &AccountService,
    identity: &VerifiedIdentity,
) -> Result<User> {
    let name = identity.name.as_deref().unwrap_or("");
    let user = accounts.find_or_create_user(&identity.email, name).await?;
    accounts.touch_last_login(user.id).await?;
    info!(user_id = %user.id, "Login completed");
    Ok(user)
}

/// Value of cookie `name` from the request's `Cookie` headers.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

pub fn session_cookie(name: &str, token: &str) -> String {
    format!("{}={}; Path=/; HttpOnly; SameSite=Lax", name, token)
}

pub fn clear_cookie(name: &str) -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", name)
}

/// Where to send the browser after logout. Without a provider logout URL the
/// browser goes straight back to `return_to`.
pub fn logout_url(config: &AuthConfig, return_to: &str) -> String {
    let Some(base) = config.logout_url.as_deref() else {
        return return_to.to_string();
    };

    let mut url = format!(
        "{}{}returnTo={}",
        base,
        if base.contains('?') { '&' } else { '?' },
        urlencoding::encode(return_to)
    );
    if let Some(client_id) = config.client_id.as_deref() {
        url.push_str("&client_id=");
        url.push_str(&urlencoding::encode(client_id));
    }
    url
}
