//! Teams and their members.

use axum::routing::get;
use chrono::{NaiveDateTime, Utc};
use diesel::{connection::LoadConnection, insert_into, prelude::*, sqlite::Sqlite};
use serde::Serialize;

use crate::{
    auth::User,
    error::SaveError,
    permission::{ModelPermissions, is_member},
    schema::{team_members, teams},
    sitemodule::{SiteModule, path},
    slug::{allocate, slugify},
    userprofile::Person,
    views::SiteModel,
};

pub mod join;
pub mod members;
pub mod views;

pub const DEFAULT_RATING: i32 = 100;

#[derive(Queryable, Selectable, Serialize, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = teams)]
#[diesel(check_for_backend(Sqlite))]
pub struct Team {
    pub id: i32,
    pub slug: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub join_password: String,
    pub description: String,
    pub owner_id: Option<i32>,
    pub created_at: NaiveDateTime,
}

impl SiteModel for Team {
    const APP_LABEL: &'static str = "teams";
    const MODEL_NAME: &'static str = "team";
    const VERBOSE_NAME: &'static str = "team";
    const VERBOSE_NAME_PLURAL: &'static str = "teams";

    fn id(&self) -> i32 {
        self.id
    }

    fn display(&self) -> String {
        self.name.clone()
    }
}

impl ModelPermissions for Team {
    fn has_view_permission(
        &self,
        _user: &User,
        _conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> QueryResult<bool> {
        Ok(true)
    }

    fn has_update_permission(
        &self,
        user: &User,
        _conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> QueryResult<bool> {
        Ok(user.is_superuser || self.owner_id == Some(user.id))
    }

    fn has_delete_permission(
        &self,
        user: &User,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> QueryResult<bool> {
        self.has_update_permission(user, conn)
    }
}

impl Team {
    pub fn fetch_by_slug(
        slug: &str,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> QueryResult<Team> {
        teams::table
            .filter(teams::slug.eq(slug))
            .select(Team::as_select())
            .first(conn)
    }

    pub fn fetch(
        id: i32,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> QueryResult<Team> {
        teams::table.find(id).select(Team::as_select()).first(conn)
    }
}

#[derive(Queryable, Selectable, Serialize, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = team_members)]
#[diesel(check_for_backend(Sqlite))]
pub struct TeamMember {
    pub id: i32,
    pub team_id: i32,
    pub user_id: i32,
    pub rating: i32,
    pub played: i32,
    pub wins: i32,
    pub losses: i32,
}

/// A membership together with what is needed to show and link it.
#[derive(Debug, Clone)]
pub struct Member {
    pub row: TeamMember,
    pub team: Team,
    pub person: Person,
}

impl SiteModel for Member {
    const APP_LABEL: &'static str = "teams";
    const MODEL_NAME: &'static str = "member";
    const VERBOSE_NAME: &'static str = "team member";
    const VERBOSE_NAME_PLURAL: &'static str = "team members";

    fn id(&self) -> i32 {
        self.row.id
    }

    fn display(&self) -> String {
        self.person.name.clone()
    }
}

impl ModelPermissions for Member {
    fn has_view_permission(
        &self,
        user: &User,
        _conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> QueryResult<bool> {
        Ok(user.is_superuser || user.is_staff || self.row.user_id == user.id)
    }

    fn has_update_permission(
        &self,
        user: &User,
        _conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> QueryResult<bool> {
        Ok(user.is_superuser || self.team.owner_id == Some(user.id))
    }
}

/// The editable columns of a team.
#[derive(Debug, Clone, Default)]
pub struct TeamData {
    pub slug: String,
    pub name: String,
    pub join_password: String,
    pub description: String,
    pub owner_id: Option<i32>,
}

impl TeamData {
    /// Fills in a free slug when none is set.
    fn prepare(
        &mut self,
        id: Option<i32>,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Result<(), SaveError> {
        if self.slug.is_empty() {
            // ids start at 1, so 0 excludes nothing
            let this = id.unwrap_or(0);
            self.slug = allocate(&slugify(&self.name), "team", &[], |slug| {
                teams::table
                    .filter(teams::slug.eq(slug).and(teams::id.ne(this)))
                    .select(teams::id)
                    .order_by(teams::id.desc())
                    .first::<i32>(conn)
                    .optional()
            })?;
        }
        Ok(())
    }
}

/// Creates a team; its creator becomes its first member.
pub fn create_team(
    mut data: TeamData,
    creator: &User,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<Team, SaveError> {
    data.prepare(None, conn)?;

    let team = insert_into(teams::table)
        .values((
            teams::slug.eq(&data.slug),
            teams::name.eq(&data.name),
            teams::join_password.eq(&data.join_password),
            teams::description.eq(&data.description),
            teams::owner_id.eq(data.owner_id),
            teams::created_at.eq(Utc::now().naive_utc()),
        ))
        .returning(Team::as_returning())
        .get_result(conn)?;

    add_member(team.id, creator.id, DEFAULT_RATING, conn)?;
    if let Some(owner) = team.owner_id {
        add_member(team.id, owner, DEFAULT_RATING, conn)?;
    }

    tracing::info!(team = team.id, slug = %team.slug, "created team");
    Ok(team)
}

pub fn update_team(
    id: i32,
    mut data: TeamData,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<Team, SaveError> {
    data.prepare(Some(id), conn)?;

    let team = diesel::update(teams::table.find(id))
        .set((
            teams::slug.eq(&data.slug),
            teams::name.eq(&data.name),
            teams::join_password.eq(&data.join_password),
            teams::description.eq(&data.description),
            teams::owner_id.eq(data.owner_id),
        ))
        .returning(Team::as_returning())
        .get_result(conn)?;
    Ok(team)
}

/// Adds `user_id` to the team; a no-op when already a member.
pub fn add_member(
    team_id: i32,
    user_id: i32,
    rating: i32,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> QueryResult<()> {
    if is_member(user_id, team_id, conn)? {
        return Ok(());
    }
    insert_into(team_members::table)
        .values((
            team_members::team_id.eq(team_id),
            team_members::user_id.eq(user_id),
            team_members::rating.eq(rating),
        ))
        .execute(conn)?;
    Ok(())
}

/// The user ids of the members of a team.
pub fn member_ids(
    team_id: i32,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> QueryResult<Vec<i32>> {
    team_members::table
        .filter(team_members::team_id.eq(team_id))
        .select(team_members::user_id)
        .order_by(team_members::id.asc())
        .load(conn)
}

pub fn module() -> SiteModule {
    SiteModule::new("teams")
        .verbose_name("Team", "Teams")
        .icon("groups")
        .order(70)
        .description("Teams, their members and joining them")
        .model_alias("teams", "team")
        .model_alias("teammembers", "member")
        .model_alias("teammember", "member")
        .model_alias("members", "member")
        .model_key("team", |o| {
            o.downcast_ref::<Team>().map(|t| vec![t.slug.clone()])
        })
        .model_key("member", |o| {
            o.downcast_ref::<Member>()
                .map(|m| vec![m.team.slug.clone(), m.row.id.to_string()])
        })
        .index("team_list")
        .menu_item("All teams", "team_list")
        .menu_item("Join a team", "team_join")
        .urls(vec![
            path("", get(views::team_list), "team_list"),
            path(
                "create/",
                get(views::create_team_page).post(views::do_create_team),
                "team_create",
            ),
            path(
                "join/",
                get(join::join_team_page).post(join::do_join_team),
                "team_join",
            ),
            path("<slug:slug>/members/", get(members::member_list), "member_list"),
            path(
                "<slug:slug>/members/<int:pk>/",
                get(members::member_detail),
                "member_detail",
            ),
            path(
                "<slug:slug>/update/",
                get(views::update_team_page).post(views::do_update_team),
                "team_update",
            ),
            path(
                "<slug:slug>/delete/",
                get(views::delete_team_page).post(views::do_delete_team),
                "team_delete",
            ),
            path("<slug:slug>/", get(views::team_detail), "team_detail"),
        ])
}
