//! Base RPC client and the shared client trait.

use async_trait::async_trait;
use serde::Deserialize;

use crate::errors::ClientError;
use crate::types::{CheckPermissionRequest, UserPermission};

/// What every layer of the SDK stack speaks.
#[async_trait]
pub trait PermissionRpc: Send + Sync {
    async fn check_permission(&self, request: &CheckPermissionRequest)
        -> Result<bool, ClientError>;

    /// Positional: result `i` answers request `i`.
    async fn batch_check_permission(
        &self,
        requests: &[CheckPermissionRequest],
    ) -> Result<Vec<bool>, ClientError>;

    async fn get_all_permissions(
        &self,
        biz_id: i64,
        user_id: i64,
    ) -> Result<UserPermission, ClientError>;
}

/// HTTP transport for the permission service. `with_bearer` is the
/// authorized decoration: the token rides every outgoing call.
pub struct HttpClient {
    http: reqwest::Client,
    base_url: String,
    bearer: Option<String>,
}

impl HttpClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            bearer: None,
        }
    }

    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.http.request(method, format!("{}{}", self.base_url, path));
        if let Some(token) = &self.bearer {
            builder = builder.header(reqwest::header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder
    }

    async fn handle<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        if response.status().is_success() {
            return Ok(response.json().await?);
        }
        #[derive(Deserialize)]
        struct WireError {
            code: String,
            message: String,
        }
        let status = response.status();
        match response.json::<WireError>().await {
            Ok(err) => Err(ClientError::Server {
                code: err.code,
                message: err.message,
            }),
            Err(_) => Err(ClientError::Server {
                code: status.as_str().to_string(),
                message: status.to_string(),
            }),
        }
    }
}

#[derive(Deserialize)]
struct CheckResponse {
    allowed: bool,
}

#[derive(Deserialize)]
struct BatchCheckResponse {
    allowed: Vec<bool>,
}

#[derive(Deserialize)]
struct AllPermissionsResponse {
    user_permissions: Vec<UserPermissionRow>,
}

#[derive(Deserialize)]
struct UserPermissionRow {
    resource_type: String,
    resource_key: String,
    permission_action: String,
    effect: crate::types::Effect,
}

#[cfg(test)]
pub(crate) mod tests_support {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Fixed-answer RPC double that counts calls.
    pub struct ScriptedRpc {
        allow: bool,
        snapshot: Option<UserPermission>,
        check_calls: AtomicUsize,
        batch_calls: AtomicUsize,
    }

    impl ScriptedRpc {
        pub fn allowing(allow: bool) -> Self {
            Self {
                allow,
                snapshot: None,
                check_calls: AtomicUsize::new(0),
                batch_calls: AtomicUsize::new(0),
            }
        }

        pub fn with_snapshot(allow: bool, snapshot: UserPermission) -> Self {
            Self {
                allow,
                snapshot: Some(snapshot),
                check_calls: AtomicUsize::new(0),
                batch_calls: AtomicUsize::new(0),
            }
        }

        pub fn check_calls(&self) -> usize {
            self.check_calls.load(Ordering::SeqCst)
        }

        pub fn batch_calls(&self) -> usize {
            self.batch_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PermissionRpc for ScriptedRpc {
        async fn check_permission(
            &self,
            _request: &CheckPermissionRequest,
        ) -> Result<bool, ClientError> {
            self.check_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.allow)
        }

        async fn batch_check_permission(
            &self,
            requests: &[CheckPermissionRequest],
        ) -> Result<Vec<bool>, ClientError> {
            self.batch_calls.fetch_add(1, Ordering::SeqCst);
            // Odd uids are allowed so positional fan-out is observable.
            Ok(requests
                .iter()
                .map(|r| if self.allow { true } else { r.uid % 2 == 1 })
                .collect())
        }

        async fn get_all_permissions(
            &self,
            biz_id: i64,
            user_id: i64,
        ) -> Result<UserPermission, ClientError> {
            Ok(self.snapshot.clone().unwrap_or(UserPermission {
                user_id,
                biz_id,
                permissions: Vec::new(),
            }))
        }
    }
}

#[async_trait]
impl PermissionRpc for HttpClient {
    async fn check_permission(
        &self,
        request: &CheckPermissionRequest,
    ) -> Result<bool, ClientError> {
        let response = self
            .request(reqwest::Method::POST, "/v1/permissions/check")
            .json(request)
            .send()
            .await?;
        let body: CheckResponse = Self::handle(response).await?;
        Ok(body.allowed)
    }

    async fn batch_check_permission(
        &self,
        requests: &[CheckPermissionRequest],
    ) -> Result<Vec<bool>, ClientError> {
        let response = self
            .request(reqwest::Method::POST, "/v1/permissions/check-batch")
            .json(&serde_json::json!({ "requests": requests }))
            .send()
            .await?;
        let body: BatchCheckResponse = Self::handle(response).await?;
        Ok(body.allowed)
    }

    async fn get_all_permissions(
        &self,
        biz_id: i64,
        user_id: i64,
    ) -> Result<UserPermission, ClientError> {
        let response = self
            .request(reqwest::Method::GET, "/v1/permissions/all")
            .query(&[("biz_id", biz_id), ("user_id", user_id)])
            .send()
            .await?;
        let body: AllPermissionsResponse = Self::handle(response).await?;
        Ok(UserPermission {
            user_id,
            biz_id,
            permissions: body
                .user_permissions
                .into_iter()
                .map(|row| crate::types::PermissionEntry {
                    resource: crate::types::ResourceRef {
                        key: row.resource_key,
                        resource_type: row.resource_type,
                    },
                    action: row.permission_action,
                    effect: row.effect,
                })
                .collect(),
        })
    }
}
