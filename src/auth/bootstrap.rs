use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::center::{permission_record, AuthorizationCenter};
use crate::error::ApiError;

/// A permission this service declares: where it lives, the status codes it
/// supports, and the request-session key its grant is stored under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDefault {
    pub center_name: String,
    pub permission_name: String,
    #[serde(default)]
    pub status: Vec<u32>,
    pub session_key: String,
}

/// What a bootstrap run wrote
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    pub permissions_created: usize,
    pub permission_sets_created: usize,
}

/// Spawn the one-shot registration of `defaults`. It waits for the configured
/// delay first, is skipped in debug mode, and only logs failures. Nothing
/// needs to await the handle.
pub fn spawn_permission_bootstrap(center: Arc<AuthorizationCenter>, defaults: Vec<PermissionDefault>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if center.settings().debug_mode() {
            warn!("authorization debug mode; permission bootstrap skipped");
            return;
        }
        tokio::time::sleep(center.settings().bootstrap_delay).await;
        match register_permissions(&center, &defaults).await {
            Ok(report) => info!(
                "permission bootstrap done: {} permissions, {} permission sets created",
                report.permissions_created, report.permission_sets_created
            ),
            Err(e) => error!("permission bootstrap failed: {}", e),
        }
    })
}

/// Ensure every `(center_name, permission_name)` has a permission record and
/// every declared status a permission-set record pointing at it
pub async fn register_permissions(
    center: &AuthorizationCenter,
    defaults: &[PermissionDefault],
) -> Result<BootstrapReport, ApiError> {
    let mut report = BootstrapReport::default();
    let Some(permissions) = center.permission_store() else {
        error!("permission collection not configured; cannot register permissions");
        return Ok(report);
    };

    for per in defaults {
        let record = permission_record(&per.center_name, &per.permission_name);
        let existing = permissions.find(&Value::Object(record.clone()), false).await?;
        let permission_id = match existing.first().and_then(|doc| doc.get("id")).and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                report.permissions_created += 1;
                permissions.insert(&Value::Object(record.clone())).await?
            }
        };

        let Some(sets) = center.permission_set_store() else {
            error!("permission set collection not configured; cannot register role permissions");
            continue;
        };
        for status in &per.status {
            let mut entry = record.clone();
            entry.insert("permission_status".to_string(), Value::from(*status));
            if !sets.exists(&Value::Object(entry.clone())).await? {
                entry.insert("permission_id".to_string(), Value::String(permission_id.clone()));
                sets.insert(&Value::Object(entry)).await?;
                report.permission_sets_created += 1;
            }
        }
    }
    Ok(report)
}
