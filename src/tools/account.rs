//! Account tools: read and update the caller's own profile

use super::{CallerContext, Tool};
use crate::models::ToolOutput;
use crate::services::AccountService;
use crate::Result;
use serde_json::{json, Value};

pub struct GetUserInformationTool {
    accounts: AccountService,
}

impl GetUserInformationTool {
    pub fn new(accounts: AccountService) -> Self {
        Self { accounts }
    }
}

#[async_trait::async_trait]
impl Tool for GetUserInformationTool {
    fn name(&self) -> &'static str {
        "get_user_information"
    }

    fn description(&self) -> &'static str {
        "Get the authenticated user's profile: id, name, email and last login time. \
         Returns an empty object if the user record no longer exists."
    }

    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, caller: &CallerContext, _args: &Value) -> Result<ToolOutput> {
        match self.accounts.get_user(caller.user_id).await? {
            Some(profile) => ToolOutput::json(&profile),
            None => Ok(ToolOutput::success("{}")),
        }
    }
}

pub struct UpdateUserInformationTool {
    accounts: AccountService,
}

impl UpdateUserInformationTool {
    pub fn new(accounts: AccountService) -> Self {
        Self { accounts }
    }
}

#[async_trait::async_trait]
impl Tool for UpdateUserInformationTool {
    fn name(&self) -> &'static str {
        "update_user_information"
    }

    fn description(&self) -> &'static str {
        "Update the authenticated user's name and/or email. Only the fields provided are \
         changed. Returns a status message describing the outcome."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "New display name"},
                "email": {"type": "string", "description": "New email address"}
            }
        })
    }

    async fn execute(&self, caller: &CallerContext, args: &Value) -> Result<ToolOutput> {
        let status = self.accounts.update_user(caller.user_id, args).await;
        if status.starts_with("Error") {
            Ok(ToolOutput::failure(status))
        } else {
            Ok(ToolOutput::success(status))
        }
    }
}
