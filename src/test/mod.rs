//! Request-level tests which drive the whole router against an in-memory
//! database.

use std::time::Duration;

use axum::{
    Router,
    body::Body,
    extract::Request,
    http::header::{CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE},
    response::Response,
};
use diesel::{
    SqliteConnection,
    r2d2::{Builder, ConnectionManager, Pool},
};
use serde::Serialize;
use tower::{Service, ServiceExt};

use crate::{
    auth::{
        LOGIN_COOKIE, User,
        register::{NewUser, create_user},
    },
    config::create_app,
    state::{DbPool, SqlitePragmas},
};

mod workflow;

// This is a macro rather than a function because the `assert!` panic
// then directly notes the span of the call site (rather than requiring
// a look at the stack trace to find it).
macro_rules! assert_res_ok {
    ($response:expr) => {
        assert!(
            $response.status().is_success()
                || $response.status().is_redirection(),
            "response status = {:?}, str = {}",
            $response.status(),
            {
                let body_bytes =
                    axum::body::to_bytes($response.into_body(), usize::MAX)
                        .await
                        .unwrap();
                String::from_utf8_lossy(&body_bytes).to_string()
            }
        );
    };
}
pub(crate) use assert_res_ok;

pub const PASSWORD: &str = "password";

pub struct Harness {
    pub app: Router,
    pub pool: DbPool,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(Pool::builder(), &[])
    }

    /// The modules labelled in `disabled` are switched off.
    pub fn with_disabled(disabled: &[&str]) -> Self {
        let disabled = disabled.iter().map(|l| l.to_string()).collect::<Vec<_>>();
        Self::build(Pool::builder(), &disabled)
    }

    /// Connection checkouts give up after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::build(Pool::builder().connection_timeout(timeout), &[])
    }

    fn build(
        builder: Builder<ConnectionManager<SqliteConnection>>,
        disabled: &[String],
    ) -> Self {
        let pool: DbPool = builder
            .max_size(1)
            .connection_customizer(Box::new(SqlitePragmas))
            .build(ConnectionManager::<SqliteConnection>::new(":memory:"))
            .unwrap();
        let app = create_app(pool.clone(), disabled);
        assert_eq!(pool.state().idle_connections, 1);
        Self { app, pool }
    }

    /// Inserts a user directly, bypassing the registration form.
    pub fn user(&self, username: &str, superuser: bool) -> User {
        let mut conn = self.pool.get().unwrap();
        create_user(
            NewUser {
                username,
                email: &format!("{username}@example.com"),
                password: PASSWORD,
                first_name: username,
                last_name: "",
                is_staff: superuser,
                is_superuser: superuser,
            },
            &mut *conn,
        )
        .unwrap()
    }

    pub async fn send(&self, req: Request) -> Response {
        let mut app = self.app.clone().into_service();
        let app = ServiceExt::<Request>::ready(&mut app).await.unwrap();
        app.call(req).await.unwrap()
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response {
        let mut req = Request::builder().method("GET").uri(uri);
        if let Some(cookie) = cookie {
            req = req.header(COOKIE, cookie);
        }
        self.send(req.body(Body::empty()).unwrap()).await
    }

    pub async fn post_form(
        &self,
        uri: &str,
        cookie: Option<&str>,
        form: &(impl Serialize + ?Sized),
    ) -> Response {
        let mut req = Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            req = req.header(COOKIE, cookie);
        }
        let body = serde_urlencoded::to_string(form).unwrap();
        self.send(req.body(Body::from(body)).unwrap()).await
    }

    pub async fn send_json(
        &self,
        method: &str,
        uri: &str,
        cookie: Option<&str>,
        json: serde_json::Value,
    ) -> Response {
        let mut req = Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            req = req.header(COOKIE, cookie);
        }
        self.send(req.body(Body::from(json.to_string())).unwrap())
            .await
    }

    /// Logs in and returns the `name=value` of the session cookie.
    pub async fn login(&self, username: &str) -> String {
        self.login_with(username, PASSWORD).await
    }

    pub async fn login_with(&self, username: &str, password: &str) -> String {
        let res = self
            .post_form("/login", None, &[("id", username), ("password", password)])
            .await;
        assert!(res.status().is_redirection(), "{:?}", res.status());
        res.headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|v| v.starts_with(LOGIN_COOKIE))
            .and_then(|v| v.split(';').next())
            .unwrap()
            .to_string()
    }
}

pub fn location(res: &Response) -> &str {
    res.headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

pub async fn body_text(res: Response) -> String {
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8_lossy(&bytes).to_string()
}

pub async fn body_json(res: Response) -> serde_json::Value {
    serde_json::from_str(&body_text(res).await).unwrap()
}
