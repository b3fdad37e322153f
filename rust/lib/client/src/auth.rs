//! Credentials and tenant scoping.
//!
//! Nothing here is global: a [`CredentialSource`] is asked for a fresh
//! [`RequestContext`] right before every request and every live connect.

use serde::Deserialize;

use crate::error::ApiError;

// ── RequestContext ──────────────────────────────────────────────────

/// Bearer credential plus tenant, attached to one request or connect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub token: Option<String>,
    pub tenant_id: Option<String>,
}

impl RequestContext {
    pub fn new(token: Option<String>, tenant_id: Option<String>) -> Self {
        Self { token, tenant_id }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }
}

// ── CredentialSource ────────────────────────────────────────────────

/// Pluggable provider of the current credential and tenant.
#[async_trait::async_trait]
pub trait CredentialSource: Send + Sync + 'static {
    async fn context(&self) -> Result<RequestContext, ApiError>;
}

/// Anonymous requests, no tenant.
pub struct NoCredentials;

#[async_trait::async_trait]
impl CredentialSource for NoCredentials {
    async fn context(&self) -> Result<RequestContext, ApiError> {
        Ok(RequestContext::anonymous())
    }
}

/// Fixed token and tenant obtained elsewhere (config file, env).
pub struct StaticCredentials(RequestContext);

impl StaticCredentials {
    pub fn new(ctx: RequestContext) -> Self {
        Self(ctx)
    }
}

#[async_trait::async_trait]
impl CredentialSource for StaticCredentials {
    async fn context(&self) -> Result<RequestContext, ApiError> {
        Ok(self.0.clone())
    }
}

/// Token issued by the backend login endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Password login against `/api/v1/auth/login`. Logs in lazily on first
/// use and again once the cached token expires.
pub struct PasswordLogin {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    tenant_id: Option<String>,
    cached: tokio::sync::RwLock<Option<CachedToken>>,
}

struct CachedToken {
    access_token: String,
    /// Seconds since epoch.
    expires_at: i64,
}

impl CachedToken {
    fn fresh(&self) -> bool {
        chrono::Utc::now().timestamp() < self.expires_at
    }
}

impl PasswordLogin {
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        tenant_id: Option<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            username: username.into(),
            password: password.into(),
            tenant_id,
            cached: tokio::sync::RwLock::new(None),
        }
    }

    /// Exchange the password for a token.
    pub async fn login(&self) -> Result<LoginResponse, ApiError> {
        let url = format!("{}/api/v1/auth/login", self.base_url);
        let mut req = self
            .http
            .post(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&serde_json::json!({
                "username": self.username,
                "password": self.password,
            }));
        if let Some(ref tenant) = self.tenant_id {
            req = req.header(crate::http::TENANT_HEADER, tenant);
        }
        let resp = req.send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Auth(format!(
                "login failed ({}): {}",
                status.as_u16(),
                crate::error::server_message(status.as_u16(), &body)
            )));
        }
        resp.json::<LoginResponse>()
            .await
            .map_err(|e| ApiError::Decode(format!("login response: {e}")))
    }

    fn request_context(&self, token: String) -> RequestContext {
        RequestContext::new(Some(token), self.tenant_id.clone())
    }
}

#[async_trait::async_trait]
impl CredentialSource for PasswordLogin {
    async fn context(&self) -> Result<RequestContext, ApiError> {
        {
            let guard = self.cached.read().await;
            if let Some(ref cached) = *guard {
                if cached.fresh() {
                    return Ok(self.request_context(cached.access_token.clone()));
                }
            }
        }

        let mut guard = self.cached.write().await;
        if let Some(ref cached) = *guard {
            if cached.fresh() {
                return Ok(self.request_context(cached.access_token.clone()));
            }
        }

        let lr = self.login().await?;
        // Expire 30s early so a token never lapses mid-request.
        let expires_at = match lr.expires_in.map(i64::try_from) {
            Some(Ok(secs)) => chrono::Utc::now()
                .timestamp()
                .saturating_add(secs)
                .saturating_sub(30),
            Some(Err(_)) | None => i64::MAX,
        };
        let token = lr.access_token.clone();
        *guard = Some(CachedToken {
            access_token: lr.access_token,
            expires_at,
        });
        Ok(self.request_context(token))
    }
}

// ── Roles ───────────────────────────────────────────────────────────

/// Roles of the current actor, as reported by the `me` endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roles(Vec<String>);

impl Roles {
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(roles.into_iter().map(Into::into).collect())
    }

    /// Roles from a `me` response: top-level `roles`, else `user.roles`.
    pub fn from_me(value: &serde_json::Value) -> Self {
        let list = value
            .get("roles")
            .and_then(|r| r.as_array())
            .filter(|r| !r.is_empty())
            .or_else(|| value.pointer("/user/roles").and_then(|r| r.as_array()));
        match list {
            Some(items) => Self::new(items.iter().filter_map(|v| v.as_str())),
            None => Self::default(),
        }
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn has(&self, role: &str) -> bool {
        self.0.iter().any(|r| r == role)
    }

    pub fn has_any(&self, roles: &[&str]) -> bool {
        roles.iter().any(|r| self.has(r))
    }

    /// Gate for drag gestures on the scheduling board.
    pub fn can_edit_schedule(&self) -> bool {
        self.has_any(&["scheduler", "admin"])
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::Router;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::routing::post;

    use super::*;

    struct LoginServer {
        logins: AtomicUsize,
        expires_in: Option<u64>,
        tenants: std::sync::Mutex<Vec<String>>,
    }

    async fn issue_token(
        State(srv): State<Arc<LoginServer>>,
        headers: HeaderMap,
        axum::Json(body): axum::Json<serde_json::Value>,
    ) -> Response {
        if let Some(t) = headers.get(crate::http::TENANT_HEADER).and_then(|v| v.to_str().ok()) {
            srv.tenants.lock().unwrap().push(t.to_string());
        }
        if body["password"] != "secret" {
            return (StatusCode::UNAUTHORIZED, axum::Json(serde_json::json!({"message": "bad password"})))
                .into_response();
        }
        let n = srv.logins.fetch_add(1, Ordering::SeqCst) + 1;
        axum::Json(serde_json::json!({
            "access_token": format!("t{n}"),
            "expires_in": srv.expires_in,
            "roles": ["scheduler"],
        }))
        .into_response()
    }

    async fn start_login_server(expires_in: Option<u64>) -> (String, Arc<LoginServer>) {
        let srv = Arc::new(LoginServer {
            logins: AtomicUsize::new(0),
            expires_in,
            tenants: std::sync::Mutex::new(Vec::new()),
        });
        let app = Router::new()
            .route("/api/v1/auth/login", post(issue_token))
            .with_state(srv.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/"), srv)
    }

    #[tokio::test]
    async fn password_login_caches_token() {
        let (base, srv) = start_login_server(Some(3600)).await;
        let creds = PasswordLogin::new(base, "planner", "secret", Some("acme".into()));

        let first = creds.context().await.unwrap();
        let second = creds.context().await.unwrap();
        assert_eq!(first.token.as_deref(), Some("t1"));
        assert_eq!(first.tenant_id.as_deref(), Some("acme"));
        assert_eq!(second, first);
        assert_eq!(srv.logins.load(Ordering::SeqCst), 1);
        assert_eq!(*srv.tenants.lock().unwrap(), vec!["acme".to_string()]);
    }

    #[tokio::test]
    async fn password_login_renews_inside_early_expiry() {
        // Shorter than the 30s margin: stale as soon as it is issued.
        let (base, srv) = start_login_server(Some(10)).await;
        let creds = PasswordLogin::new(base, "planner", "secret", None);

        assert_eq!(creds.context().await.unwrap().token.as_deref(), Some("t1"));
        assert_eq!(creds.context().await.unwrap().token.as_deref(), Some("t2"));
        assert_eq!(srv.logins.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn password_login_huge_or_missing_expiry_never_renews() {
        for expires_in in [Some(u64::MAX), Some(i64::MAX as u64), None] {
            let (base, srv) = start_login_server(expires_in).await;
            let creds = PasswordLogin::new(base, "planner", "secret", None);
            creds.context().await.unwrap();
            creds.context().await.unwrap();
            assert_eq!(srv.logins.load(Ordering::SeqCst), 1, "{expires_in:?}");
        }
    }

    #[tokio::test]
    async fn password_login_rejected() {
        let (base, _srv) = start_login_server(Some(3600)).await;
        let creds = PasswordLogin::new(base, "planner", "wrong", None);
        match creds.context().await.unwrap_err() {
            ApiError::Auth(msg) => {
                assert!(msg.contains("401"), "{msg}");
                assert!(msg.contains("bad password"), "{msg}");
            }
            other => panic!("expected Auth, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_credentials_is_anonymous() {
        let ctx = NoCredentials.context().await.unwrap();
        assert!(ctx.token.is_none());
        assert!(ctx.tenant_id.is_none());
    }

    #[tokio::test]
    async fn static_credentials_return_value() {
        let src = StaticCredentials::new(RequestContext::anonymous().with_token("jwt").with_tenant("acme"));
        let ctx = src.context().await.unwrap();
        assert_eq!(ctx.token.as_deref(), Some("jwt"));
        assert_eq!(ctx.tenant_id.as_deref(), Some("acme"));
    }

    #[test]
    fn schedule_edit_gate() {
        assert!(Roles::new(["viewer", "scheduler"]).can_edit_schedule());
        assert!(Roles::new(["admin"]).can_edit_schedule());
        assert!(!Roles::new(["viewer", "quality"]).can_edit_schedule());
        assert!(!Roles::default().can_edit_schedule());
    }

    #[test]
    fn roles_from_me_response() {
        let top = serde_json::json!({"roles": ["admin"], "user": {"roles": ["viewer"]}});
        assert_eq!(Roles::from_me(&top), Roles::new(["admin"]));

        let nested = serde_json::json!({"user": {"id": "u1", "roles": ["scheduler"]}});
        assert!(Roles::from_me(&nested).can_edit_schedule());

        let none = serde_json::json!({"id": "u1"});
        assert!(Roles::from_me(&none).as_slice().is_empty());
    }
}
