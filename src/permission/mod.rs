//! Who may do what with each model.
//!
//! Every model served through the generic views implements
//! [`ModelPermissions`]. The defaults follow the site-wide rules: superusers
//! may do anything, staff may look at anything, and everyone else is decided
//! by the model's own predicates.

use diesel::{connection::LoadConnection, dsl::exists, prelude::*, select, sqlite::Sqlite};

use crate::{
    auth::User,
    schema::{team_members, teams},
    util_resp::FailureResponse,
    views::SiteModel,
};

pub trait ModelPermissions: SiteModel + Sized {
    fn has_list_permission(
        _user: &User,
        _conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> QueryResult<bool> {
        Ok(true)
    }

    fn has_add_permission(
        user: &User,
        _conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> QueryResult<bool> {
        Ok(user.is_superuser)
    }

    /// Staff may view everything; otherwise viewing follows the update
    /// permission.
    fn has_view_permission(
        &self,
        user: &User,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> QueryResult<bool> {
        if user.is_superuser || user.is_staff {
            return Ok(true);
        }
        self.has_update_permission(user, conn)
    }

    fn has_update_permission(
        &self,
        user: &User,
        _conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> QueryResult<bool> {
        Ok(user.is_superuser)
    }

    fn has_delete_permission(
        &self,
        user: &User,
        _conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> QueryResult<bool> {
        Ok(user.is_superuser)
    }
}

/// 403 unless `allowed`.
pub fn ensure(allowed: bool) -> Result<(), FailureResponse> {
    if allowed {
        Ok(())
    } else {
        Err(FailureResponse::Unauthorized(()))
    }
}

pub fn is_member(
    user_id: i32,
    team_id: i32,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> QueryResult<bool> {
    select(exists(
        team_members::table.filter(
            team_members::user_id
                .eq(user_id)
                .and(team_members::team_id.eq(team_id)),
        ),
    ))
    .get_result(conn)
}

pub fn owns_any_team(
    user_id: i32,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> QueryResult<bool> {
    select(exists(teams::table.filter(teams::owner_id.eq(user_id))))
        .get_result(conn)
}

pub fn team_owner(
    team_id: i32,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> QueryResult<Option<i32>> {
    teams::table
        .find(team_id)
        .select(teams::owner_id)
        .first::<Option<i32>>(conn)
        .optional()
        .map(Option::flatten)
}

/// The ids of the teams `user_id` belongs to.
pub fn team_ids_of(
    user_id: i32,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> QueryResult<Vec<i32>> {
    team_members::table
        .filter(team_members::user_id.eq(user_id))
        .select(team_members::team_id)
        .load(conn)
}
