use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::Cookie;
use axum_extra::extract::{PrivateCookieJar, cookie::Key};
use chrono::{Days, NaiveDateTime, Utc};
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use serde::{Deserialize, Serialize};

use crate::{
    schema::users,
    state::{DbPool, ThreadSafeConn},
    util_resp::FailureResponse,
};

pub mod login;
pub mod register;

pub const LOGIN_COOKIE: &str = "cworg_session";

#[derive(Debug, Queryable, Selectable, Serialize, Deserialize, Clone)]
#[diesel(table_name = users)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub created_at: NaiveDateTime,
}

impl PartialEq for User {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl User {
    pub fn validate_username(username: &str) -> bool {
        (username.chars().count() > 2)
            && username
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || "@.+-_".contains(c))
    }

    pub fn validate_password(password: &str) -> bool {
        password.len() >= 6
    }

    /// "first last" when either is set, otherwise the username.
    pub fn full_name(&self) -> String {
        let name = format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string();
        if name.is_empty() {
            self.username.clone()
        } else {
            name
        }
    }

    #[tracing::instrument(skip(conn))]
    pub fn fetch(
        id: i32,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Result<User, FailureResponse> {
        users::table
            .find(id)
            .select(User::as_select())
            .first(conn)
            .optional()?
            .ok_or(FailureResponse::NotFound(()))
    }
}

#[derive(Debug)]
pub enum AuthError {
    NoDatabase,
    /// Not logged in. Carries the path to come back to after logging in.
    Unauthorized(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            AuthError::NoDatabase => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error")
                    .into_response()
            }
            AuthError::Unauthorized(next) => {
                let next: String =
                    url::form_urlencoded::byte_serialize(next.as_bytes())
                        .collect();
                Redirect::to(&format!("/login?next={next}")).into_response()
            }
        }
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
pub struct LoginSession {
    id: i32,
    expiry: NaiveDateTime,
}

/// The logged-in user. Extracting it uses the request's transactional
/// connection, so it must come before any [`crate::state::Conn`] in a
/// handler's arguments.
#[async_trait]
impl<S> FromRequestParts<S> for User
where
    S: Send + Sync,
    DbPool: FromRef<S>,
    Key: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let next = parts
            .uri
            .path_and_query()
            .map(|p| p.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        let jar: PrivateCookieJar<Key> =
            match PrivateCookieJar::from_request_parts(parts, state).await {
                Ok(jar) => jar,
                Err(never) => match never {},
            };

        let login: LoginSession = match jar
            .get(LOGIN_COOKIE)
            .and_then(|c| serde_json::from_str::<LoginSession>(c.value()).ok())
        {
            Some(t) if Utc::now().naive_utc() < t.expiry => t,
            _ => return Err(AuthError::Unauthorized(next)),
        };

        let pool = DbPool::from_ref(state);
        let slot = ThreadSafeConn::open(parts, &pool)
            .await
            .map_err(|_| AuthError::NoDatabase)?;
        let mut guard = slot.inner.try_lock().map_err(|_| {
            tracing::error!(
                "the request connection is already held; extract the user \
                 before the connection"
            );
            AuthError::NoDatabase
        })?;
        let conn = guard.as_mut().ok_or(AuthError::NoDatabase)?;

        let user = users::table
            .find(login.id)
            .select(User::as_select())
            .first(conn)
            .optional()
            .map_err(|e| {
                tracing::error!("failed to load the session user: {e}");
                AuthError::NoDatabase
            })?;

        user.ok_or(AuthError::Unauthorized(next))
    }
}

pub fn set_login_cookie(id: i32, jar: PrivateCookieJar) -> PrivateCookieJar {
    let session = LoginSession {
        id,
        expiry: Utc::now()
            .naive_utc()
            .checked_add_days(Days::new(7))
            .unwrap_or(NaiveDateTime::MAX),
    };
    match serde_json::to_string(&session) {
        Ok(value) => jar.add(
            Cookie::build((LOGIN_COOKIE, value))
                .path("/")
                .http_only(true)
                .build(),
        ),
        Err(e) => {
            tracing::error!("failed to serialize the login session: {e}");
            jar
        }
    }
}

pub fn clear_login_cookie(jar: PrivateCookieJar) -> PrivateCookieJar {
    jar.remove(Cookie::build(LOGIN_COOKIE).path("/"))
}

pub fn hash_password(
    password: &str,
) -> Result<String, argon2::password_hash::Error> {
    use argon2::{
        Argon2, PasswordHasher,
        password_hash::{SaltString, rand_core::OsRng},
    };

    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

/// Checks `password` against the stored hash of `user`.
pub fn verify_password(user: &User, password: &str) -> bool {
    use argon2::{Argon2, PasswordHash, PasswordVerifier};

    PasswordHash::new(&user.password_hash)
        .map(|hash| {
            Argon2::default()
                .verify_password(password.as_bytes(), &hash)
                .is_ok()
        })
        .unwrap_or_else(|e| {
            tracing::error!(user = user.id, "stored password hash is malformed: {e}");
            false
        })
}
