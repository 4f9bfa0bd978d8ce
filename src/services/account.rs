//! Account profile operations

use crate::error::FintrackError;
use crate::models::{User, UserProfile, UserUpdate};
use crate::store::LedgerStore;
use crate::Result;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const USER_UPDATED: &str = "User's information has been updated.";
pub const USER_MISSING: &str = "Error: User does not exist.";

const UPDATABLE_FIELDS: [&str; 2] = ["name", "email"];

#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn LedgerStore>,
}

impl AccountService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Profile of the caller, or `None` when the record is gone.
    pub async fn get_user(&self, user_id: Uuid) -> Result<Option<UserProfile>> {
        let user = self.store.get_user(user_id).await?;
        Ok(user.as_ref().map(UserProfile::from))
    }

    /// Apply `name`/`email` from `fields` to the caller's own record.
    ///
    /// Always answers with a status line; failures are described, not raised.
    pub async fn update_user(&self, user_id: Uuid, fields: &Value) -> String {
        let Some(map) = fields.as_object() else {
            return "Error: fields must be a JSON object with name and/or email.".to_string();
        };

        let ignored: Vec<&str> = map
            .keys()
            .map(String::as_str)
            .filter(|k| !UPDATABLE_FIELDS.contains(k))
            .collect();
        if !ignored.is_empty() {
            warn!(user_id = %user_id, ignored = ?ignored, "Ignoring non-updatable user fields");
        }

        let update: UserUpdate = match serde_json::from_value(fields.clone()) {
            Ok(update) => update,
            Err(e) => return format!("Error: {}", e),
        };

        if let Err(e) = validate_user_update(&update) {
            return format!("Error: {}", e);
        }

        if update.is_empty() {
            return "Error: Nothing to update. Provide a name or email.".to_string();
        }

        match self.store.update_user(user_id, &update).await {
            Ok(_) => {
                info!(user_id = %user_id, "User information updated");
                USER_UPDATED.to_string()
            }
            Err(FintrackError::NotFound { .. }) => USER_MISSING.to_string(),
            Err(FintrackError::Validation(msg)) => format!("Error: {}", msg),
            Err(e) => {
                error!(user_id = %user_id, error = %e, "Failed to update user");
                format!("Error: {}", e)
            }
        }
    }

    /// Login support: look the user up by email, creating them on first sight.
    pub async fn find_or_create_user(&self, email: &str, name: &str) -> Result<User> {
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(FintrackError::Validation(format!(
                "'{}' is not a valid email address",
                email
            )));
        }

        if let Some(user) = self.store.find_user_by_email(email).await? {
            return Ok(user);
        }

        let name = match name.trim() {
            "" => email.split('@').next().unwrap_or(email),
            trimmed => trimmed,
        };

        let user = self.store.create_user(name, email).await?;
        info!(user_id = %user.id, "Created user on first login");
        Ok(user)
    }

    pub async fn touch_last_login(&self, user_id: Uuid) -> Result<()> {
        self.store.touch_last_login(user_id, Utc::now()).await
    }
}

fn validate_user_update(update: &UserUpdate) -> Result<()> {
    if let Some(name) = &update.name {
        if name.trim().is_empty() {
            return Err(FintrackError::Validation("name must not be empty".to_string()));
        }
    }
    if let Some(email) = &update.email {
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(FintrackError::Validation(format!(
                "'{}' is not a valid email address",
                email
            )));
        }
    }
    Ok(())
}
