use axum::{Form, response::Redirect};
use diesel::prelude::*;
use serde::Deserialize;

use crate::{
    auth::{AuthError, User, hash_password, verify_password},
    error::SaveError,
    msg::{Level, Msg},
    permission::ensure,
    schema::{user_profiles, users},
    sitemodule::{templates::TemplateCtx, urls::Kwargs},
    state::Conn,
    userprofile::UserProfile,
    util_resp::{
        FailureResponse, StandardResponse, bad_request, see_other_ok, success,
    },
    validation::{is_valid_url, max_length},
    views::{
        FieldErrors, FormContext, ViewCtx,
        form::{Field, FieldKind, Fieldset, add_error, check},
    },
};

/// Sends the user to their own profile.
pub async fn index(
    user: Result<User, AuthError>,
    mut conn: Conn<true>,
) -> StandardResponse {
    let user = match user {
        Ok(user) => user,
        Err(AuthError::Unauthorized(_)) => {
            return see_other_ok(Redirect::to("/login"));
        }
        Err(AuthError::NoDatabase) => return Err(FailureResponse::ServerError(())),
    };
    let profile = UserProfile::create_for(&user, &mut *conn)?;
    see_other_ok(Redirect::to(&format!("/users/{}/", profile.id)))
}

#[derive(Deserialize, Default)]
pub struct ProfileForm {
    #[serde(default)]
    fullname: String,
    #[serde(default)]
    sms: String,
    #[serde(default)]
    phone: String,
    #[serde(default)]
    address: String,
    #[serde(default)]
    image_url: String,
}

impl ProfileForm {
    fn from_profile(profile: &UserProfile) -> Self {
        Self {
            fullname: profile.fullname.clone(),
            sms: profile.sms.clone(),
            phone: profile.phone.clone(),
            address: profile.address.clone(),
            image_url: profile.image_url.clone(),
        }
    }

    fn errors(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        check(&mut errors, "fullname", max_length(&self.fullname, 100));
        check(&mut errors, "sms", max_length(&self.sms, 20));
        check(&mut errors, "phone", max_length(&self.phone, 20));
        check(&mut errors, "address", max_length(&self.address, 200));
        check(&mut errors, "image_url", is_valid_url(&self.image_url));
        errors
    }

    fn context(&self, ctx: &ViewCtx, profile: &UserProfile) -> FormContext {
        FormContext::new(
            format!("Profile of {}", profile.display_name(&ctx.user)),
            ctx.path.clone(),
        )
        .fieldset(
            Fieldset::new(None)
                .row(vec![
                    Field::text("fullname", "Full name").value(&self.fullname),
                ])
                .row(vec![
                    Field::text("sms", "SMS").value(&self.sms),
                    Field::text("phone", "Phone").value(&self.phone),
                ])
                .row(vec![Field::text("address", "Address").value(&self.address)])
                .row(vec![
                    Field::new("image_url", "Image", FieldKind::Url)
                        .value(&self.image_url)
                        .help("A link to your picture"),
                ]),
        )
    }
}

fn fetch_own_profile(
    ctx: &ViewCtx,
    pk: i32,
    conn: &mut Conn<true>,
) -> Result<UserProfile, FailureResponse> {
    let profile = user_profiles::table
        .find(pk)
        .select(UserProfile::as_select())
        .first(&mut **conn)?;
    ensure(profile.user_id == ctx.user.id)?;
    Ok(profile)
}

#[tracing::instrument(skip_all)]
pub async fn profile_page(
    ctx: ViewCtx,
    Kwargs(pk): Kwargs<i32>,
    mut conn: Conn<true>,
) -> StandardResponse {
    let profile = fetch_own_profile(&ctx, pk, &mut conn)?;
    let form = ProfileForm::from_profile(&profile).context(&ctx, &profile);
    success(ctx.render::<UserProfile>(
        &form.title,
        "_detail",
        "common/views/form",
        TemplateCtx::Form(&form),
    )?)
}

#[tracing::instrument(skip_all)]
pub async fn do_update_profile(
    ctx: ViewCtx,
    Kwargs(pk): Kwargs<i32>,
    mut conn: Conn<true>,
    Form(form): Form<ProfileForm>,
) -> StandardResponse {
    let profile = fetch_own_profile(&ctx, pk, &mut conn)?;

    let errors = form.errors();
    if !errors.is_empty() {
        let page = form.context(&ctx, &profile).with_errors(&errors);
        return bad_request(ctx.render::<UserProfile>(
            &page.title,
            "_detail",
            "common/views/form",
            TemplateCtx::Form(&page),
        )?);
    }

    let profile = diesel::update(user_profiles::table.find(profile.id))
        .set((
            user_profiles::fullname.eq(form.fullname.trim()),
            user_profiles::sms.eq(form.sms.trim()),
            user_profiles::phone.eq(form.phone.trim()),
            user_profiles::address.eq(form.address.trim()),
            user_profiles::image_url.eq(form.image_url.trim()),
        ))
        .returning(UserProfile::as_returning())
        .get_result(&mut *conn)?;

    tracing::info!(profile = profile.id, "updated profile");

    let url = ctx.path.clone();
    let msg = Msg::saved(
        "user profile",
        profile.display_name(&ctx.user),
        Some(url.clone()),
        "updated",
    );
    ctx.redirect_with(&url, msg)
}

#[derive(Deserialize, Default)]
pub struct PasswordChangeForm {
    #[serde(default)]
    old_password: String,
    #[serde(default)]
    new_password1: String,
    #[serde(default)]
    new_password2: String,
}

impl PasswordChangeForm {
    fn errors(&self, user: &User) -> FieldErrors {
        let mut errors = FieldErrors::new();
        if !verify_password(user, &self.old_password) {
            add_error(
                &mut errors,
                "old_password",
                "Your old password was entered incorrectly. Please enter it again.",
            );
        }
        if !User::validate_password(&self.new_password1) {
            add_error(
                &mut errors,
                "new_password1",
                "Passwords are at least six characters.",
            );
        }
        if self.new_password1 != self.new_password2 {
            add_error(
                &mut errors,
                "new_password2",
                "The two password fields didn't match.",
            );
        }
        errors
    }

    fn context(ctx: &ViewCtx) -> FormContext {
        FormContext::new("Password change", ctx.path.clone()).fieldset(
            Fieldset::new(None)
                .row(vec![
                    Field::new("old_password", "Old password", FieldKind::Password)
                        .required(),
                ])
                .row(vec![
                    Field::new("new_password1", "New password", FieldKind::Password)
                        .required(),
                    Field::new(
                        "new_password2",
                        "New password confirmation",
                        FieldKind::Password,
                    )
                    .required(),
                ]),
        )
    }
}

fn render_password_form(
    ctx: &ViewCtx,
    form: &FormContext,
) -> Result<hypertext::Rendered<String>, FailureResponse> {
    ctx.render::<UserProfile>(
        &form.title,
        "_password_change",
        "common/views/form",
        TemplateCtx::Form(form),
    )
}

#[tracing::instrument(skip_all)]
pub async fn password_change_page(ctx: ViewCtx) -> StandardResponse {
    success(render_password_form(&ctx, &PasswordChangeForm::context(&ctx))?)
}

/// Stores a new password once the current one is confirmed. The session
/// cookie stays valid.
#[tracing::instrument(skip_all)]
pub async fn do_password_change(
    ctx: ViewCtx,
    mut conn: Conn<true>,
    Form(form): Form<PasswordChangeForm>,
) -> StandardResponse {
    let errors = form.errors(&ctx.user);
    if !errors.is_empty() {
        let page = PasswordChangeForm::context(&ctx).with_errors(&errors);
        return bad_request(render_password_form(&ctx, &page)?);
    }

    let password_hash = hash_password(&form.new_password1).map_err(SaveError::from)?;
    diesel::update(users::table.find(ctx.user.id))
        .set(users::password_hash.eq(password_hash))
        .execute(&mut *conn)?;
    tracing::info!(user = ctx.user.id, "changed password");

    let url = ctx
        .reverse::<&str>("users:index", &[])
        .unwrap_or_else(|| "/".to_string());
    ctx.redirect_with(&url, Msg::new(Level::Success, "Your password was changed."))
}

#[cfg(test)]
mod tests {
    use diesel::{Connection, SqliteConnection, connection::SimpleConnection};
    use diesel_migrations::MigrationHarness;

    use super::*;
    use crate::{
        MIGRATIONS,
        auth::register::{NewUser, create_user},
    };

    fn user() -> User {
        let mut conn = SqliteConnection::establish(":memory:").unwrap();
        conn.batch_execute("PRAGMA foreign_keys = ON;").unwrap();
        conn.run_pending_migrations(MIGRATIONS).unwrap();
        create_user(
            NewUser {
                username: "dana",
                email: "dana@example.com",
                password: "secret1",
                first_name: "",
                last_name: "",
                is_staff: false,
                is_superuser: false,
            },
            &mut conn,
        )
        .unwrap()
    }

    #[test]
    fn password_change_checks_every_field() {
        let user = user();
        let form = PasswordChangeForm {
            old_password: "wrong".to_string(),
            new_password1: "abc".to_string(),
            new_password2: "abd".to_string(),
        };
        let errors = form.errors(&user);
        assert!(errors.contains_key("old_password"));
        assert!(errors.contains_key("new_password1"));
        assert!(errors.contains_key("new_password2"));

        let form = PasswordChangeForm {
            old_password: "secret1".to_string(),
            new_password1: "secret2".to_string(),
            new_password2: "secret2".to_string(),
        };
        assert!(form.errors(&user).is_empty());
    }
}
