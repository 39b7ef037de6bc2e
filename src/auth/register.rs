use axum::{Form, response::Redirect};
use axum_extra::extract::PrivateCookieJar;
use chrono::Utc;
use diesel::{connection::LoadConnection, insert_into, prelude::*, sqlite::Sqlite};
use hypertext::prelude::*;
use serde::Deserialize;

use crate::{
    auth::{User, hash_password, set_login_cookie},
    error::SaveError,
    schema::users,
    state::Conn,
    template::Page,
    userprofile::UserProfile,
    util_resp::{
        StandardResponse, SuccessResponse, bad_request, see_other_ok, success,
    },
    validation::*,
    widgets::alert::ErrorAlert,
};

pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub is_staff: bool,
    pub is_superuser: bool,
}

/// Inserts a user together with its (empty) profile.
pub fn create_user(
    new: NewUser<'_>,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<User, SaveError> {
    let password_hash = hash_password(new.password)?;

    let user = insert_into(users::table)
        .values((
            users::username.eq(new.username),
            users::email.eq(new.email),
            users::password_hash.eq(password_hash),
            users::first_name.eq(new.first_name),
            users::last_name.eq(new.last_name),
            users::is_staff.eq(new.is_staff),
            users::is_superuser.eq(new.is_superuser),
            users::created_at.eq(Utc::now().naive_utc()),
        ))
        .returning(User::as_returning())
        .get_result::<User>(conn)?;

    UserProfile::create_for(&user, conn)?;

    tracing::info!(user = user.id, username = %user.username, "created user");
    Ok(user)
}

fn register_form() -> impl Renderable {
    maud! {
        h1 {"Register"}
        form method="post" class="mt-4" {
            div class="mb-3" {
                label for="username" class="form-label" { "Username" }
                input type="text" class="form-control" id="username" name="username";
            }
            div class="mb-3" {
                label for="email" class="form-label" { "Email" }
                input type="email" class="form-control" id="email" name="email";
            }
            div class="row" {
                div class="mb-3 col" {
                    label for="first_name" class="form-label" { "First name" }
                    input type="text" class="form-control" id="first_name" name="first_name";
                }
                div class="mb-3 col" {
                    label for="last_name" class="form-label" { "Last name" }
                    input type="text" class="form-control" id="last_name" name="last_name";
                }
            }
            div class="mb-3" {
                label for="password" class="form-label" { "Password" }
                input type="password" class="form-control" id="password" name="password";
            }
            div class="mb-3" {
                label for="password2" class="form-label" { "Confirm Password" }
                input type="password" class="form-control" id="password2" name="password2";
            }
            button type="submit" class="btn btn-primary" { "Register" }
        }
    }
}

pub async fn register_page(user: Option<User>) -> StandardResponse {
    if user.is_some() {
        return see_other_ok(Redirect::to("/"));
    }

    success(Page::new().title("Register").body(register_form()).render())
}

#[derive(Deserialize)]
pub struct RegisterForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password2: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

impl RegisterForm {
    fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if !User::validate_username(&self.username) {
            problems.push(
                "Usernames are at least three characters: letters, digits \
                 and @/./+/-/_ only."
                    .to_string(),
            );
        }
        if let Err(e) = is_ascii_no_spaces(&self.username) {
            problems.push(format!("Username {e}."));
        }
        if let Err(e) = is_valid_email(&self.email) {
            problems.push(e);
        }
        if !User::validate_password(&self.password) {
            problems.push("Passwords are at least six characters.".to_string());
        }
        if self.password != self.password2 {
            problems.push("The two passwords do not match.".to_string());
        }
        problems
    }
}

#[tracing::instrument(skip_all)]
pub async fn do_register(
    user: Option<User>,
    jar: PrivateCookieJar,
    mut conn: Conn<true>,
    Form(form): Form<RegisterForm>,
) -> StandardResponse {
    if user.is_some() {
        return see_other_ok(Redirect::to("/"));
    }

    let mut problems = form.problems();

    if problems.is_empty() {
        let existing = users::table
            .filter(
                users::username
                    .eq(&form.username)
                    .or(users::email.eq(&form.email)),
            )
            .select(User::as_select())
            .first::<User>(&mut *conn)
            .optional()?;

        if let Some(existing) = existing {
            problems.push(if existing.email == form.email {
                "That email is already taken.".to_string()
            } else {
                "That username is already taken.".to_string()
            });
        }
    }

    if !problems.is_empty() {
        return bad_request(
            Page::new()
                .title("Register")
                .body(maud! {
                    @for problem in &problems {
                        ErrorAlert msg=(problem);
                    }
                    (register_form())
                })
                .render(),
        );
    }

    let user = create_user(
        NewUser {
            username: &form.username,
            email: &form.email,
            password: &form.password,
            first_name: &form.first_name,
            last_name: &form.last_name,
            is_staff: false,
            is_superuser: false,
        },
        &mut *conn,
    )?;

    Ok(SuccessResponse::SeeOtherWithCookies(
        set_login_cookie(user.id, jar),
        Box::new(Redirect::to("/")),
    ))
}
