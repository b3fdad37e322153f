//! HTTP [`ScheduleSource`] with endpoint fallback.
//!
//! Deployments expose the scheduling API under slightly different routes, so
//! each call walks a fixed list of candidates and the first success wins.
//! A 401 stops the walk immediately.

use mfgsuite_schedule::{Board, Operation, OperationPatch};
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::auth::{RequestContext, Roles};
use crate::error::{ApiError, server_message};
use crate::source::{ScheduleSource, UpdateOperationRequest};

pub const TENANT_HEADER: &str = "X-Tenant-ID";

const SCHEDULING: [&str; 3] = ["api", "v1", "scheduling"];

pub struct HttpSource {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpSource {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: &str) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ApiError::Transport(format!("invalid base url '{base_url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::Transport(format!("invalid base url '{base_url}'")));
        }
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `{base}/{segments...}?{query}` with each segment percent-encoded.
    fn url(&self, segments: &[&str], query: Option<(&str, &str)>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        if let Some((k, v)) = query {
            url.query_pairs_mut().append_pair(k, v);
        }
        url
    }

    fn scheduling_url(&self, tail: &[&str], query: Option<(&str, &str)>) -> Url {
        let segments: Vec<&str> = SCHEDULING.iter().chain(tail.iter()).copied().collect();
        self.url(&segments, query)
    }

    fn board_candidates(&self, board_id: &str) -> Vec<(Method, Url)> {
        vec![
            (Method::GET, self.scheduling_url(&["boards", board_id], None)),
            (Method::GET, self.scheduling_url(&["board"], Some(("board", board_id)))),
            (Method::GET, self.scheduling_url(&["schedule"], Some(("board", board_id)))),
        ]
    }

    fn update_candidates(&self, operation_id: &str) -> Vec<(Method, Url)> {
        let plural = self.scheduling_url(&["operations", operation_id], None);
        vec![
            (Method::POST, plural.clone()),
            (Method::PATCH, plural),
            (Method::POST, self.scheduling_url(&["operation", operation_id], None)),
        ]
    }

    /// Attach `Accept`, bearer token and tenant header.
    fn authed(builder: reqwest::RequestBuilder, ctx: &RequestContext) -> reqwest::RequestBuilder {
        let mut builder = builder.header(reqwest::header::ACCEPT, "application/json");
        if let Some(ref token) = ctx.token {
            builder = builder.bearer_auth(token);
        }
        if let Some(ref tenant) = ctx.tenant_id {
            builder = builder.header(TENANT_HEADER, tenant);
        }
        builder
    }

    /// Map an HTTP response to a decoded body or an `ApiError`.
    async fn parse<R: DeserializeOwned>(resp: reqwest::Response) -> Result<R, ApiError> {
        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            let code = status.as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Server {
                status: code,
                message: server_message(code, &body),
            });
        }
        let text = resp.text().await?;
        serde_json::from_str(&text).map_err(|e| ApiError::Decode(format!("response body: {e}")))
    }

    async fn send<R: DeserializeOwned>(
        &self,
        ctx: &RequestContext,
        method: Method,
        url: Url,
        body: Option<&serde_json::Value>,
    ) -> Result<R, ApiError> {
        let mut req = Self::authed(self.http.request(method, url), ctx);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await?;
        Self::parse(resp).await
    }

    /// Try each candidate in order; first success wins, 401 ends the walk.
    async fn walk<R: DeserializeOwned>(
        &self,
        what: &str,
        ctx: &RequestContext,
        candidates: Vec<(Method, Url)>,
        body: Option<&serde_json::Value>,
    ) -> Result<R, ApiError> {
        let attempts = candidates.len();
        let mut last = None;
        for (method, url) in candidates {
            debug!("{what}: {method} {url}");
            match self.send(ctx, method.clone(), url.clone(), body).await {
                Ok(value) => return Ok(value),
                Err(ApiError::Unauthorized) => return Err(ApiError::Unauthorized),
                Err(e) => {
                    debug!("{what}: {method} {url} failed: {e}");
                    last = Some(e);
                }
            }
        }
        Err(ApiError::Exhausted {
            attempts,
            last: Box::new(last.unwrap_or_else(|| ApiError::Transport("no endpoints".into()))),
        })
    }

    /// Roles of the current actor (`/api/v1/auth/me`, then `/api/v1/users/me`).
    pub async fn me(&self, ctx: &RequestContext) -> Result<Roles, ApiError> {
        let candidates = vec![
            (Method::GET, self.url(&["api", "v1", "auth", "me"], None)),
            (Method::GET, self.url(&["api", "v1", "users", "me"], None)),
        ];
        let value: serde_json::Value = self.walk("me", ctx, candidates, None).await?;
        Ok(Roles::from_me(&value))
    }
}

/// Live channel address: `{base}/ws/scheduler?token=..&tenant=..&board=..`.
///
/// Credentials travel in the query because WebSocket upgrades from a browser
/// cannot carry custom headers; the backend accepts both. An `http(s)` base is
/// rewritten to `ws(s)`. Empty values are left out.
pub fn live_url(base: &str, ctx: &RequestContext, board_id: &str) -> Result<Url, ApiError> {
    let mut url = Url::parse(base)
        .map_err(|e| ApiError::Transport(format!("invalid live url '{base}': {e}")))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(ApiError::Transport(format!("unsupported live scheme '{other}'"))),
    };
    url.set_scheme(scheme)
        .map_err(|_| ApiError::Transport(format!("cannot switch '{base}' to {scheme}")))?;
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(["ws", "scheduler"]);
    }
    url.set_query(None);
    {
        let mut query = url.query_pairs_mut();
        let params = [
            ("token", ctx.token.as_deref()),
            ("tenant", ctx.tenant_id.as_deref()),
            ("board", Some(board_id)),
        ];
        for (key, value) in params {
            if let Some(v) = value.filter(|v| !v.is_empty()) {
                query.append_pair(key, v);
            }
        }
    }
    if url.query() == Some("") {
        url.set_query(None);
    }
    Ok(url)
}

#[async_trait::async_trait]
impl ScheduleSource for HttpSource {
    async fn get_board(&self, ctx: &RequestContext, board_id: &str) -> Result<Board, ApiError> {
        self.walk("get_board", ctx, self.board_candidates(board_id), None)
            .await
    }

    async fn update_operation(
        &self,
        ctx: &RequestContext,
        board_id: &str,
        operation_id: &str,
        patch: &OperationPatch,
    ) -> Result<Operation, ApiError> {
        let body = serde_json::to_value(UpdateOperationRequest::new(board_id, patch))
            .map_err(|e| ApiError::Decode(format!("request body: {e}")))?;
        self.walk(
            "update_operation",
            ctx,
            self.update_candidates(operation_id),
            Some(&body),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use axum::Router;
    use axum::extract::{Path, Query, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::routing::{get, post};
    use chrono::{DateTime, Utc};
    use mfgsuite_schedule::OperationStatus;

    use super::*;

    // =====================================================================
    // Test server
    // =====================================================================

    #[derive(Default)]
    struct Recorder {
        hits: Mutex<Vec<String>>,
        headers: Mutex<Vec<HeaderMap>>,
        bodies: Mutex<Vec<serde_json::Value>>,
    }

    impl Recorder {
        fn hit(&self, what: String, headers: &HeaderMap) {
            self.hits.lock().unwrap().push(what);
            self.headers.lock().unwrap().push(headers.clone());
        }

        fn hits(&self) -> Vec<String> {
            self.hits.lock().unwrap().clone()
        }
    }

    type Shared = State<Arc<Recorder>>;

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn board_json(id: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "name": "Line",
            "workCenters": [{"id": "WC-A", "name": "Mill"}],
            "operations": [{
                "id": "OP-1",
                "workOrderNo": "WO-1",
                "workCenterId": "WC-A",
                "start": "2024-05-01T10:00:00Z",
                "end": "2024-05-01T11:00:00Z",
                "status": "planned"
            }]
        })
    }

    fn operation_json(body: &serde_json::Value) -> serde_json::Value {
        serde_json::json!({
            "id": "OP-1",
            "workOrderNo": "WO-1",
            "workCenterId": body.get("workCenterId").cloned().unwrap_or("WC-A".into()),
            "start": body.get("start").cloned().unwrap_or("2024-05-01T10:00:00Z".into()),
            "end": body.get("end").cloned().unwrap_or("2024-05-01T11:00:00Z".into()),
            "status": "planned"
        })
    }

    async fn boards_by_path(
        State(rec): Shared,
        Path(id): Path<String>,
        headers: HeaderMap,
    ) -> Response {
        rec.hit(format!("boards/{id}"), &headers);
        match id.as_str() {
            "locked" => StatusCode::UNAUTHORIZED.into_response(),
            "line 1/a" => axum::Json(board_json(&id)).into_response(),
            _ => (StatusCode::NOT_FOUND, axum::Json(serde_json::json!({"detail": "no such route"})))
                .into_response(),
        }
    }

    async fn board_by_query(
        State(rec): Shared,
        Query(q): Query<HashMap<String, String>>,
        headers: HeaderMap,
    ) -> Response {
        let id = q.get("board").cloned().unwrap_or_default();
        rec.hit(format!("board?{id}"), &headers);
        match id.as_str() {
            "default" | "locked" => axum::Json(board_json(&id)).into_response(),
            _ => StatusCode::NOT_FOUND.into_response(),
        }
    }

    async fn schedule_by_query(
        State(rec): Shared,
        Query(q): Query<HashMap<String, String>>,
        headers: HeaderMap,
    ) -> Response {
        let id = q.get("board").cloned().unwrap_or_default();
        rec.hit(format!("schedule?{id}"), &headers);
        (
            StatusCode::SERVICE_UNAVAILABLE,
            axum::Json(serde_json::json!({"error": {"message": "scheduler offline"}})),
        )
            .into_response()
    }

    async fn post_operations(State(rec): Shared, Path(id): Path<String>, headers: HeaderMap) -> Response {
        rec.hit(format!("POST operations/{id}"), &headers);
        StatusCode::METHOD_NOT_ALLOWED.into_response()
    }

    async fn patch_operations(
        State(rec): Shared,
        Path(id): Path<String>,
        headers: HeaderMap,
        axum::Json(body): axum::Json<serde_json::Value>,
    ) -> Response {
        rec.hit(format!("PATCH operations/{id}"), &headers);
        rec.bodies.lock().unwrap().push(body.clone());
        if id == "OP-1" {
            axum::Json(operation_json(&body)).into_response()
        } else {
            (StatusCode::NOT_FOUND, axum::Json(serde_json::json!({"message": "unknown operation"})))
                .into_response()
        }
    }

    async fn post_operation(State(rec): Shared, Path(id): Path<String>, headers: HeaderMap) -> Response {
        rec.hit(format!("POST operation/{id}"), &headers);
        (StatusCode::CONFLICT, axum::Json(serde_json::json!({"message": "operation locked"})))
            .into_response()
    }

    async fn auth_me(State(rec): Shared, headers: HeaderMap) -> Response {
        rec.hit("auth/me".into(), &headers);
        StatusCode::NOT_FOUND.into_response()
    }

    async fn users_me(State(rec): Shared, headers: HeaderMap) -> Response {
        rec.hit("users/me".into(), &headers);
        axum::Json(serde_json::json!({"user": {"id": "u1", "roles": ["scheduler"]}})).into_response()
    }

    async fn start_test_server() -> (String, Arc<Recorder>) {
        let rec = Arc::new(Recorder::default());
        let app = Router::new()
            .route("/api/v1/scheduling/boards/{id}", get(boards_by_path))
            .route("/api/v1/scheduling/board", get(board_by_query))
            .route("/api/v1/scheduling/schedule", get(schedule_by_query))
            .route(
                "/api/v1/scheduling/operations/{id}",
                post(post_operations).patch(patch_operations),
            )
            .route("/api/v1/scheduling/operation/{id}", post(post_operation))
            .route("/api/v1/auth/me", get(auth_me))
            .route("/api/v1/users/me", get(users_me))
            .with_state(rec.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), rec)
    }

    fn ctx() -> RequestContext {
        RequestContext::anonymous().with_token("jwt-123").with_tenant("acme")
    }

    // =====================================================================
    // URL building
    // =====================================================================

    #[test]
    fn candidate_urls() {
        let src = HttpSource::new("http://erp.local/").unwrap();
        let urls: Vec<String> = src
            .board_candidates("default")
            .into_iter()
            .map(|(_, u)| u.to_string())
            .collect();
        assert_eq!(
            urls,
            vec![
                "http://erp.local/api/v1/scheduling/boards/default",
                "http://erp.local/api/v1/scheduling/board?board=default",
                "http://erp.local/api/v1/scheduling/schedule?board=default",
            ]
        );

        let updates: Vec<(Method, String)> = src
            .update_candidates("OP-1")
            .into_iter()
            .map(|(m, u)| (m, u.to_string()))
            .collect();
        assert_eq!(updates[0], (Method::POST, "http://erp.local/api/v1/scheduling/operations/OP-1".into()));
        assert_eq!(updates[1].0, Method::PATCH);
        assert_eq!(updates[2], (Method::POST, "http://erp.local/api/v1/scheduling/operation/OP-1".into()));
    }

    #[test]
    fn path_segments_are_encoded_under_prefix() {
        let src = HttpSource::new("https://host/erp").unwrap();
        let (_, url) = &src.board_candidates("line 1/a")[0];
        assert_eq!(url.as_str(), "https://host/erp/api/v1/scheduling/boards/line%201%2Fa");
        let (_, url) = &src.board_candidates("a&b")[1];
        assert_eq!(url.query(), Some("board=a%26b"));
    }

    #[test]
    fn live_url_rewrites_scheme_and_adds_query() {
        let url = live_url("https://erp.example.com/", &ctx(), "default").unwrap();
        assert_eq!(
            url.as_str(),
            "wss://erp.example.com/ws/scheduler?token=jwt-123&tenant=acme&board=default"
        );

        let url = live_url("http://10.0.0.5:8080", &RequestContext::anonymous(), "line 2").unwrap();
        assert_eq!(url.as_str(), "ws://10.0.0.5:8080/ws/scheduler?board=line+2");

        let url = live_url("ws://gw/erp", &RequestContext::anonymous(), "").unwrap();
        assert_eq!(url.as_str(), "ws://gw/erp/ws/scheduler");

        assert!(live_url("ftp://gw", &ctx(), "default").is_err());
    }

    #[test]
    fn rejects_bad_base_url() {
        assert!(HttpSource::new("not a url").is_err());
        assert!(HttpSource::new("mailto:ops@example.com").is_err());
    }

    // =====================================================================
    // Against a live server
    // =====================================================================

    #[tokio::test]
    async fn board_falls_back_and_sends_headers() {
        let (base, rec) = start_test_server().await;
        let src = HttpSource::new(&base).unwrap();

        let board = src.get_board(&ctx(), "default").await.unwrap();
        assert_eq!(board.id, "default");
        assert_eq!(board.operations.len(), 1);
        assert_eq!(rec.hits(), vec!["boards/default", "board?default"]);

        let headers = rec.headers.lock().unwrap();
        for h in headers.iter() {
            assert_eq!(h["authorization"], "Bearer jwt-123");
            assert_eq!(h["x-tenant-id"], "acme");
            assert_eq!(h["accept"], "application/json");
        }
    }

    #[tokio::test]
    async fn anonymous_context_sends_no_auth_headers() {
        let (base, rec) = start_test_server().await;
        let src = HttpSource::new(&base).unwrap();
        src.get_board(&RequestContext::anonymous(), "default").await.unwrap();

        let headers = rec.headers.lock().unwrap();
        assert!(headers.iter().all(|h| !h.contains_key("authorization")));
        assert!(headers.iter().all(|h| !h.contains_key("x-tenant-id")));
    }

    #[tokio::test]
    async fn encoded_board_id_reaches_server_intact() {
        let (base, rec) = start_test_server().await;
        let src = HttpSource::new(&base).unwrap();
        let board = src.get_board(&ctx(), "line 1/a").await.unwrap();
        assert_eq!(board.id, "line 1/a");
        assert_eq!(rec.hits(), vec!["boards/line 1/a"]);
    }

    #[tokio::test]
    async fn unauthorized_stops_the_walk() {
        let (base, rec) = start_test_server().await;
        let src = HttpSource::new(&base).unwrap();
        let err = src.get_board(&ctx(), "locked").await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized), "got {err:?}");
        // board?locked would have succeeded.
        assert_eq!(rec.hits(), vec!["boards/locked"]);
    }

    #[tokio::test]
    async fn exhausted_keeps_last_server_message() {
        let (base, rec) = start_test_server().await;
        let src = HttpSource::new(&base).unwrap();
        let err = src.get_board(&ctx(), "missing").await.unwrap_err();
        match err {
            ApiError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                match *last {
                    ApiError::Server { status, ref message } => {
                        assert_eq!(status, 503);
                        assert_eq!(message, "scheduler offline");
                    }
                    ref other => panic!("expected Server, got {other:?}"),
                }
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
        assert_eq!(rec.hits().len(), 3);
    }

    #[tokio::test]
    async fn update_falls_back_to_patch_without_status() {
        let (base, rec) = start_test_server().await;
        let src = HttpSource::new(&base).unwrap();
        let patch = OperationPatch {
            start: Some(ts("2024-05-01T10:30:00Z")),
            end: Some(ts("2024-05-01T11:30:00Z")),
            status: Some(OperationStatus::Completed),
            ..Default::default()
        };

        let op = src.update_operation(&ctx(), "default", "OP-1", &patch).await.unwrap();
        assert_eq!(op.start, ts("2024-05-01T10:30:00Z"));
        assert_eq!(op.end, ts("2024-05-01T11:30:00Z"));
        assert_eq!(rec.hits(), vec!["POST operations/OP-1", "PATCH operations/OP-1"]);

        let bodies = rec.bodies.lock().unwrap();
        assert_eq!(bodies[0]["boardId"], "default");
        assert!(bodies[0].get("status").is_none());
    }

    #[tokio::test]
    async fn update_exhausts_all_three_candidates() {
        let (base, rec) = start_test_server().await;
        let src = HttpSource::new(&base).unwrap();
        let patch = OperationPatch {
            work_center_id: Some("WC-B".into()),
            ..Default::default()
        };
        let err = src.update_operation(&ctx(), "default", "OP-9", &patch).await.unwrap_err();
        assert!(matches!(err, ApiError::Exhausted { attempts: 3, .. }), "got {err:?}");
        assert_eq!(
            rec.hits(),
            vec!["POST operations/OP-9", "PATCH operations/OP-9", "POST operation/OP-9"]
        );
        assert!(err.to_string().contains("operation locked"));
    }

    #[tokio::test]
    async fn me_falls_back_to_users_route() {
        let (base, rec) = start_test_server().await;
        let src = HttpSource::new(&base).unwrap();
        let roles = src.me(&ctx()).await.unwrap();
        assert!(roles.can_edit_schedule());
        assert_eq!(rec.hits(), vec!["auth/me", "users/me"]);
    }

    #[tokio::test]
    async fn connection_refused_is_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let src = HttpSource::new(&format!("http://{addr}")).unwrap();
        let err = src.get_board(&ctx(), "default").await.unwrap_err();
        match err {
            ApiError::Exhausted { last, .. } => assert!(matches!(*last, ApiError::Network(_))),
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }
}
