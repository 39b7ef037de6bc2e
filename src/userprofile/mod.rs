//! User profiles (the `users` module).

use std::collections::HashMap;

use axum::routing::get;
use diesel::{connection::LoadConnection, insert_into, prelude::*, sqlite::Sqlite};
use serde::Serialize;

use crate::{
    auth::User,
    calendar,
    schema::{user_profiles, users},
    sitemodule::{SiteModule, path},
    views::SiteModel,
};

pub mod views;

#[derive(Queryable, Selectable, Serialize, Debug, Clone)]
#[diesel(table_name = user_profiles)]
#[diesel(check_for_backend(Sqlite))]
pub struct UserProfile {
    pub id: i32,
    pub user_id: i32,
    pub fullname: String,
    pub sms: String,
    pub phone: String,
    pub address: String,
    pub image_url: String,
}

impl SiteModel for UserProfile {
    const APP_LABEL: &'static str = "users";
    const MODEL_NAME: &'static str = "user";
    const VERBOSE_NAME: &'static str = "user profile";
    const VERBOSE_NAME_PLURAL: &'static str = "user profiles";

    fn id(&self) -> i32 {
        self.id
    }

    fn display(&self) -> String {
        self.fullname.clone()
    }
}

impl UserProfile {
    /// Creates the profile of `user` unless it already has one.
    pub fn create_for(
        user: &User,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> QueryResult<UserProfile> {
        insert_into(user_profiles::table)
            .values(user_profiles::user_id.eq(user.id))
            .on_conflict(user_profiles::user_id)
            .do_nothing()
            .execute(conn)?;

        user_profiles::table
            .filter(user_profiles::user_id.eq(user.id))
            .select(UserProfile::as_select())
            .first(conn)
    }

    /// The profile's full name, else the user's "first last", else the
    /// username.
    pub fn display_name(&self, user: &User) -> String {
        if self.fullname.trim().is_empty() {
            user.full_name()
        } else {
            self.fullname.clone()
        }
    }
}

/// How a user is shown to other users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Person {
    pub user_id: i32,
    pub profile_id: Option<i32>,
    pub name: String,
}

/// Display names of `ids`, keyed by user id. Unknown ids are left out.
pub fn people(
    ids: impl IntoIterator<Item = i32>,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> QueryResult<HashMap<i32, Person>> {
    let ids = ids.into_iter().collect::<Vec<_>>();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = users::table
        .left_join(user_profiles::table)
        .filter(users::id.eq_any(&ids))
        .select((User::as_select(), Option::<UserProfile>::as_select()))
        .load::<(User, Option<UserProfile>)>(conn)?;

    Ok(rows
        .into_iter()
        .map(|(user, profile)| {
            let person = Person {
                user_id: user.id,
                profile_id: profile.as_ref().map(|p| p.id),
                name: match &profile {
                    Some(p) => p.display_name(&user),
                    None => user.full_name(),
                },
            };
            (user.id, person)
        })
        .collect())
}

pub fn person(
    id: i32,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> QueryResult<Option<Person>> {
    Ok(people([id], conn)?.remove(&id))
}

/// All users as `(id, display name)` select choices, sorted by name.
pub fn user_choices(
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> QueryResult<Vec<(String, String)>> {
    let ids = users::table.select(users::id).load::<i32>(conn)?;
    let mut choices = people(ids, conn)?
        .into_values()
        .map(|p| (p.user_id.to_string(), p.name))
        .collect::<Vec<_>>();
    choices.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(choices)
}

pub fn module() -> SiteModule {
    SiteModule::new("userprofile")
        .label("users")
        .verbose_name("User", "Users")
        .icon("person")
        .order(100)
        .description("Your profile and calendar feeds")
        .model_alias("users", "user")
        .model_alias("userprofile", "user")
        .menu_item("My profile", "index")
        .menu_item("Change password", "password_change")
        .urls(vec![
            path("", get(views::index), "index"),
            path(
                "password_change/",
                get(views::password_change_page).post(views::do_password_change),
                "password_change",
            ),
            path(
                "<int:pk>/",
                get(views::profile_page).post(views::do_update_profile),
                "user_detail",
            ),
            path(
                "api/<int:pk>/calendar.xml",
                get(calendar::calendar_xml),
                "calendar_xml",
            ),
            path(
                "api/<int:pk>/calendar/<int:year>/<int:month>/",
                get(calendar::calendar_json),
                "calendar_json",
            ),
        ])
}
