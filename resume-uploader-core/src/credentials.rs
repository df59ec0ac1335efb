use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::PasswordRef;
use crate::contract::CredentialStore;
use crate::error::CredentialError;

/// Environment variable first, then the OS keychain (`security` on macOS,
/// `secret-tool` elsewhere). Never writes anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCredentialStore;

#[async_trait]
impl CredentialStore for SystemCredentialStore {
    async fn lookup(&self, reference: &PasswordRef, account: &str) -> Result<String, CredentialError> {
        if let Some(var) = &reference.env_var {
            match std::env::var(var) {
                Ok(value) if !value.is_empty() => {
                    info!(env_var = %var, "[CREDENTIALS] Password taken from environment");
                    return Ok(value);
                }
                _ => debug!(env_var = %var, "[CREDENTIALS] Password env var not set"),
            }
        }

        if let Some(service) = &reference.keychain_service {
            if let Some(value) = keychain_lookup(service, account).await {
                info!(service = %service, "[CREDENTIALS] Password taken from keychain");
                return Ok(value);
            }
            debug!(service = %service, "[CREDENTIALS] No keychain entry");
        }

        Err(CredentialError::NotFound {
            reference: reference.describe(),
        })
    }
}

async fn keychain_lookup(service: &str, account: &str) -> Option<String> {
    let mut cmd = if cfg!(target_os = "macos") {
        let mut cmd = Command::new("security");
        cmd.arg("find-generic-password");
        if !account.is_empty() {
            cmd.args(["-a", account]);
        }
        cmd.args(["-s", service, "-w"]);
        cmd
    } else {
        let mut cmd = Command::new("secret-tool");
        cmd.args(["lookup", "service", service]);
        if !account.is_empty() {
            cmd.args(["account", account]);
        }
        cmd
    };

    let output = match cmd.stderr(Stdio::null()).output().await {
        Ok(output) => output,
        Err(e) => {
            debug!(error = %e, "[CREDENTIALS] Keychain tool unavailable");
            return None;
        }
    };
    if !output.status.success() {
        return None;
    }
    let secret = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!secret.is_empty()).then_some(secret)
}
