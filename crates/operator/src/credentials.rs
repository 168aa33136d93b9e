//! Administrative credentials for the SQL surface

use crate::error::Result;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};
use std::fmt;
use tracing::warn;

pub const USERNAME_KEY: &str = "username";
pub const PASSWORD_KEY: &str = "password";
pub const DEFAULT_ADMIN_USER: &str = "root";

#[derive(Clone, PartialEq, Eq)]
pub struct AdminCredentials {
    pub username: String,
    pub password: String,
}

impl Default for AdminCredentials {
    fn default() -> Self {
        Self {
            username: DEFAULT_ADMIN_USER.to_string(),
            password: String::new(),
        }
    }
}

// Keep passwords out of logs
impl fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
pub trait CredentialsProvider: Send + Sync {
    /// Credentials stored in `secret_name`, or the defaults when no secret is configured
    async fn credentials(
        &self,
        namespace: &str,
        secret_name: Option<&str>,
    ) -> Result<AdminCredentials>;
}

pub struct SecretCredentialsProvider {
    client: Client,
}

impl SecretCredentialsProvider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn from_secret(secret: &Secret) -> AdminCredentials {
        let read = |key: &str| {
            secret
                .data
                .as_ref()
                .and_then(|d| d.get(key))
                .and_then(|v| String::from_utf8(v.0.clone()).ok())
                .or_else(|| secret.string_data.as_ref().and_then(|d| d.get(key).cloned()))
        };
        let defaults = AdminCredentials::default();
        AdminCredentials {
            username: read(USERNAME_KEY).unwrap_or(defaults.username),
            password: read(PASSWORD_KEY).unwrap_or(defaults.password),
        }
    }
}

#[async_trait]
impl CredentialsProvider for SecretCredentialsProvider {
    async fn credentials(
        &self,
        namespace: &str,
        secret_name: Option<&str>,
    ) -> Result<AdminCredentials> {
        let Some(name) = secret_name else {
            return Ok(AdminCredentials::default());
        };
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        match api.get_opt(name).await? {
            Some(secret) => Ok(Self::from_secret(&secret)),
            None => {
                warn!(namespace = %namespace, secret = %name, "Auth secret not found, using default credentials");
                Ok(AdminCredentials::default())
            }
        }
    }
}
