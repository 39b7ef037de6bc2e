use axum::{
    Form,
    extract::Query,
    response::Redirect,
};
use axum_extra::extract::PrivateCookieJar;
use diesel::prelude::*;
use hypertext::prelude::*;
use serde::Deserialize;
use url::Url;

use crate::{
    auth::{User, clear_login_cookie, set_login_cookie, verify_password},
    schema::users,
    state::Conn,
    template::Page,
    util_resp::{
        StandardResponse, SuccessResponse, bad_request, see_other_ok, success,
    },
    widgets::alert::ErrorAlert,
};

#[derive(Deserialize, Default)]
pub struct NextQuery {
    next: Option<String>,
}

/// Only same-site paths are followed after logging in.
fn redirect_target(next: Option<&str>) -> String {
    let base = match Url::parse("http://localhost/") {
        Ok(base) => base,
        Err(_) => return "/".to_string(),
    };
    match next.and_then(|n| base.join(n).ok()) {
        Some(url) if url.origin() == base.origin() => {
            let mut target = url.path().to_string();
            if let Some(q) = url.query() {
                target.push('?');
                target.push_str(q);
            }
            target
        }
        _ => "/".to_string(),
    }
}

struct LoginBox<'a> {
    next: Option<&'a str>,
}

impl Renderable for LoginBox<'_> {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        let action = match self.next {
            Some(n) => format!(
                "/login?next={}",
                url::form_urlencoded::byte_serialize(n.as_bytes())
                    .collect::<String>()
            ),
            None => "/login".to_string(),
        };

        maud! {
            h1 { "Login" }
            form method="post" action=(action) class="mt-4" {
                div class="mb-3" {
                    label for="id" class="form-label" { "Username or email" }
                    input type="text" class="form-control" id="id" name="id";
                }
                div class="mb-3" {
                    label for="password" class="form-label" { "Password" }
                    input type="password" class="form-control" id="password" name="password";
                }
                button type="submit" class="btn btn-primary" { "Login" }
            }
            p class="mt-3" {
                "No account yet? " a href="/register" { "Register" }
            }
        }
        .render_to(buffer);
    }
}

pub async fn login_page(
    user: Option<User>,
    Query(q): Query<NextQuery>,
) -> StandardResponse {
    if user.is_some() {
        return see_other_ok(Redirect::to(&redirect_target(q.next.as_deref())));
    }

    success(
        Page::new()
            .title("Login")
            .body(LoginBox {
                next: q.next.as_deref(),
            })
            .render(),
    )
}

#[derive(Deserialize)]
pub struct LoginForm {
    id: String,
    password: String,
}

#[tracing::instrument(skip_all)]
pub async fn do_login(
    Query(q): Query<NextQuery>,
    jar: PrivateCookieJar,
    mut conn: Conn<true>,
    Form(form): Form<LoginForm>,
) -> StandardResponse {
    let user = users::table
        .filter(users::email.eq(&form.id).or(users::username.eq(&form.id)))
        .select(User::as_select())
        .first::<User>(&mut *conn)
        .optional()?;

    let next = q.next.as_deref();
    let failed = || {
        bad_request(
            Page::new()
                .title("Login")
                .body(maud! {
                    ErrorAlert msg = "Incorrect username or password.";
                    (LoginBox { next })
                })
                .render(),
        )
    };

    let Some(user) = user else {
        return failed();
    };

    if !verify_password(&user, &form.password) {
        return failed();
    }

    tracing::info!(user = user.id, "logged in");

    Ok(SuccessResponse::SeeOtherWithCookies(
        set_login_cookie(user.id, jar),
        Box::new(Redirect::to(&redirect_target(next))),
    ))
}

pub async fn do_logout(jar: PrivateCookieJar) -> StandardResponse {
    Ok(SuccessResponse::SeeOtherWithCookies(
        clear_login_cookie(jar),
        Box::new(Redirect::to("/login")),
    ))
}

#[cfg(test)]
mod tests {
    use super::redirect_target;

    #[test]
    fn only_local_redirects_are_followed() {
        assert_eq!(redirect_target(Some("/meets/x/?a=1")), "/meets/x/?a=1");
        assert_eq!(redirect_target(Some("https://evil.example/")), "/");
        assert_eq!(redirect_target(Some("//evil.example/x")), "/");
        assert_eq!(redirect_target(None), "/");
    }
}
