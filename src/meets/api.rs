//! The JSON api of the meets module.
//!
//! Everything but the attendance endpoint needs a logged-in user and answers
//! 401 otherwise. The attendance endpoint is addressed by the slot's token,
//! which is the credential.

use axum::{
    Json, async_trait,
    extract::{FromRef, FromRequestParts, Path, Query},
    http::{StatusCode, request::Parts},
};
use axum_extra::extract::cookie::Key;
use chrono::{NaiveDateTime, Utc};
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use serde::{Deserialize, Serialize};

use crate::{
    auth::{AuthError, User},
    meets::{
        AttendanceState, Attendee, AttendeeData, Meet, MeetData, check_duration,
        check_starttime, create_meet, new_token, token_expiry, update_attendee,
        update_meet,
    },
    permission::ModelPermissions,
    schema::{attendees, locations, meets, teams, users},
    state::{Conn, DbPool},
    util_resp::ApiError,
    views::{Pagination, list::PageQuery},
};

pub const PAGE_SIZE: i64 = 20;

/// The logged-in user of an api request.
pub struct ApiUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for ApiUser
where
    S: Send + Sync,
    DbPool: FromRef<S>,
    Key: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        match User::from_request_parts(parts, state).await {
            Ok(user) => Ok(ApiUser(user)),
            Err(AuthError::Unauthorized(_)) => Err(ApiError::not_authenticated()),
            Err(AuthError::NoDatabase) => Err(ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Server error.",
            )),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct MeetSummary {
    pub slug: String,
    pub name: String,
    pub team: Option<i32>,
    pub starttime: NaiveDateTime,
    pub manager: Option<i32>,
    pub comments: String,
}

impl From<Meet> for MeetSummary {
    fn from(m: Meet) -> Self {
        Self {
            slug: m.slug,
            name: m.name,
            team: m.team_id,
            starttime: m.starttime,
            manager: m.manager_id,
            comments: m.comments,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct MeetDetail {
    pub id: i32,
    pub slug: String,
    pub name: String,
    pub location: Option<i32>,
    pub team: Option<i32>,
    pub starttime: NaiveDateTime,
    /// In minutes.
    pub duration: i32,
    pub manager: Option<i32>,
    pub min_attendees: i32,
    pub max_attendees: i32,
    pub comments: String,
}

impl From<Meet> for MeetDetail {
    fn from(m: Meet) -> Self {
        Self {
            id: m.id,
            slug: m.slug,
            name: m.name,
            location: m.location_id,
            team: m.team_id,
            starttime: m.starttime,
            duration: m.duration_minutes,
            manager: m.manager_id,
            min_attendees: m.min_attendees,
            max_attendees: m.max_attendees,
            comments: m.comments,
        }
    }
}

#[derive(Serialize, Debug)]
pub struct Paginated<T> {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

/// `?q=` as a LIKE pattern matching anywhere.
fn contains_pattern(q: &str) -> String {
    let escaped = q
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// Keeps the search term on the page links.
fn with_query(url: Option<String>, q: &str) -> Option<String> {
    url.map(|url| {
        if q.is_empty() {
            url
        } else {
            let q: String =
                url::form_urlencoded::byte_serialize(q.as_bytes()).collect();
            format!("{url}&q={q}")
        }
    })
}

#[tracing::instrument(skip_all)]
pub async fn meet_api_list(
    ApiUser(_user): ApiUser,
    Query(query): Query<PageQuery>,
    mut conn: Conn<true>,
) -> Result<Json<Paginated<MeetSummary>>, ApiError> {
    let q = query.q.as_deref().map(str::trim).unwrap_or_default();
    let pattern = contains_pattern(q);
    let matching = || {
        meets::name
            .like(pattern.clone())
            .escape('\\')
            .or(meets::comments.like(pattern.clone()).escape('\\'))
    };

    let count = meets::table
        .filter(matching())
        .count()
        .get_result::<i64>(&mut *conn)?;
    let pagination =
        Pagination::new("/meets/api/", query.page.as_deref(), count, PAGE_SIZE)
            .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "Invalid page."))?;

    let results = meets::table
        .filter(matching())
        .select(Meet::as_select())
        .order_by(meets::starttime.asc())
        .then_order_by(meets::id.asc())
        .offset(pagination.offset())
        .limit(pagination.limit())
        .load::<Meet>(&mut *conn)?
        .into_iter()
        .map(MeetSummary::from)
        .collect();

    Ok(Json(Paginated {
        count,
        next: with_query(pagination.next_url, q),
        previous: with_query(pagination.prev_url, q),
        results,
    }))
}

/// The writable fields of a meet. Absent fields keep their current value on
/// update and take the defaults on create.
#[derive(Deserialize, Debug, Default)]
pub struct MeetInput {
    pub name: Option<String>,
    pub team: Option<i32>,
    pub starttime: Option<NaiveDateTime>,
    pub duration: Option<i32>,
    pub location: Option<i32>,
    pub manager: Option<i32>,
    pub min_attendees: Option<i32>,
    pub max_attendees: Option<i32>,
    pub comments: Option<String>,
}

fn invalid(detail: impl Into<String>) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, detail)
}

/// A related row named by a payload field.
fn found<T>(row: QueryResult<T>, field: &str) -> Result<T, ApiError> {
    match row {
        Err(diesel::result::Error::NotFound) => Err(invalid(format!(
            "{field}: Invalid pk - object does not exist."
        ))),
        row => Ok(row?),
    }
}

impl MeetInput {
    /// Applies the input over `data` and checks it.
    fn apply(
        self,
        mut data: MeetData,
        user: &User,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Result<MeetData, ApiError> {
        if let Some(name) = self.name {
            if name.chars().count() > 100 {
                return Err(invalid(
                    "name: Ensure this field has no more than 100 characters.",
                ));
            }
            data.name = name.trim().to_string();
        }
        if let Some(comments) = self.comments {
            if comments.chars().count() > 200 {
                return Err(invalid(
                    "comments: Ensure this field has no more than 200 characters.",
                ));
            }
            data.comments = comments;
        }
        if let Some(team) = self.team {
            let owner = found(
                teams::table
                    .find(team)
                    .select(teams::owner_id)
                    .first::<Option<i32>>(conn),
                "team",
            )?;
            let moved = data.team_id != Some(team);
            if moved && !user.is_superuser && owner != Some(user.id) {
                return Err(invalid(
                    "team: You can only schedule meets for your own teams.",
                ));
            }
            data.team_id = Some(team);
        }
        if let Some(location) = self.location {
            found(
                locations::table
                    .find(location)
                    .select(locations::id)
                    .first::<i32>(conn),
                "location",
            )?;
            data.location_id = Some(location);
        }
        if let Some(manager) = self.manager {
            found(
                users::table.find(manager).select(users::id).first::<i32>(conn),
                "manager",
            )?;
            data.manager_id = Some(manager);
        }
        if let Some(starttime) = self.starttime {
            data.starttime =
                check_starttime(starttime).map_err(|e| invalid(format!("starttime: {e}")))?;
        }
        if let Some(duration) = self.duration {
            data.duration_minutes =
                check_duration(duration).map_err(|e| invalid(format!("duration: {e}")))?;
        }
        for (field, value, target) in [
            ("min_attendees", self.min_attendees, &mut data.min_attendees),
            ("max_attendees", self.max_attendees, &mut data.max_attendees),
        ] {
            if let Some(value) = value {
                if value < 1 {
                    return Err(invalid(format!(
                        "{field}: Ensure this value is greater than or equal to 1."
                    )));
                }
                *target = value;
            }
        }
        Ok(data)
    }
}

#[tracing::instrument(skip_all)]
pub async fn meet_api_create(
    ApiUser(user): ApiUser,
    mut conn: Conn<true>,
    Json(input): Json<MeetInput>,
) -> Result<(StatusCode, Json<MeetDetail>), ApiError> {
    if !Meet::has_add_permission(&user, &mut *conn)? {
        return Err(ApiError::forbidden());
    }
    let Some(starttime) = input.starttime else {
        return Err(invalid("starttime: This field is required."));
    };

    let data = input.apply(MeetData::new("", starttime), &user, &mut *conn)?;
    let meet = create_meet(data, &mut *conn)?;
    Ok((StatusCode::CREATED, Json(meet.into())))
}

#[tracing::instrument(skip_all)]
pub async fn meet_api_detail(
    ApiUser(_user): ApiUser,
    Path(slug): Path<String>,
    mut conn: Conn<true>,
) -> Result<Json<MeetDetail>, ApiError> {
    let meet = Meet::fetch_by_slug(&slug, &mut *conn)?;
    Ok(Json(meet.into()))
}

/// The meet, if `user` runs it.
fn fetch_owned(
    user: &User,
    slug: &str,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<Meet, ApiError> {
    let meet = Meet::fetch_by_slug(slug, conn)?;
    if meet.has_update_permission(user, conn)? {
        Ok(meet)
    } else {
        Err(ApiError::forbidden())
    }
}

#[tracing::instrument(skip_all)]
pub async fn meet_api_update(
    ApiUser(user): ApiUser,
    Path(slug): Path<String>,
    mut conn: Conn<true>,
    Json(input): Json<MeetInput>,
) -> Result<Json<MeetDetail>, ApiError> {
    let meet = fetch_owned(&user, &slug, &mut *conn)?;
    let data = input.apply(MeetData::from_meet(&meet), &user, &mut *conn)?;
    let meet = update_meet(meet.id, data, &mut *conn)?;
    Ok(Json(meet.into()))
}

#[tracing::instrument(skip_all)]
pub async fn meet_api_delete(
    ApiUser(user): ApiUser,
    Path(slug): Path<String>,
    mut conn: Conn<true>,
) -> Result<StatusCode, ApiError> {
    let meet = fetch_owned(&user, &slug, &mut *conn)?;
    diesel::delete(meets::table.find(meet.id)).execute(&mut *conn)?;
    tracing::info!(meet = meet.id, user = user.id, "deleted meet through the api");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Attendance {
    pub id: i32,
    pub meet: String,
    pub player: Option<i32>,
    pub attendance: AttendanceState,
}

impl Attendance {
    fn new(attendee: &Attendee, meet: String) -> Self {
        Self {
            id: attendee.id,
            meet,
            player: attendee.player_id,
            attendance: attendee.state(),
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct AttendanceInput {
    pub attendance: AttendanceState,
}

/// The slot holding `token`, with the slug of its meet. Expired tokens are
/// gone.
fn fetch_by_token(
    token: &str,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<(Attendee, String), ApiError> {
    let (attendee, meet) = attendees::table
        .inner_join(meets::table)
        .filter(attendees::token.eq(token))
        .select((Attendee::as_select(), meets::slug))
        .first::<(Attendee, String)>(conn)?;
    if attendee.token_expiration <= Utc::now().naive_utc() {
        return Err(ApiError::new(StatusCode::GONE, "This link has expired."));
    }
    Ok((attendee, meet))
}

#[tracing::instrument(skip_all)]
pub async fn attendance_api_detail(
    Path(token): Path<String>,
    mut conn: Conn<true>,
) -> Result<Json<Attendance>, ApiError> {
    let (attendee, meet) = fetch_by_token(&token, &mut *conn)?;
    Ok(Json(Attendance::new(&attendee, meet)))
}

/// Sets the attendance of the slot and rotates its token.
#[tracing::instrument(skip_all)]
pub async fn attendance_api_update(
    Path(token): Path<String>,
    mut conn: Conn<true>,
    Json(input): Json<AttendanceInput>,
) -> Result<Json<Attendance>, ApiError> {
    let (attendee, meet) = fetch_by_token(&token, &mut *conn)?;

    let updated = update_attendee(
        attendee.id,
        AttendeeData {
            attendance: input.attendance,
            ..AttendeeData::from_attendee(&attendee)
        },
        &mut *conn,
    )?;
    diesel::update(attendees::table.find(attendee.id))
        .set((
            attendees::token.eq(new_token()),
            attendees::token_expiration.eq(token_expiry(Utc::now().naive_utc())),
        ))
        .execute(&mut *conn)?;

    tracing::info!(
        attendee = attendee.id,
        state = updated.state().code(),
        "attendance set"
    );
    Ok(Json(Attendance::new(&updated, meet)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_terms_are_escaped() {
        assert_eq!(contains_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(contains_pattern(""), "%%");
    }

    #[test]
    fn page_links_keep_the_search() {
        assert_eq!(
            with_query(Some("/meets/api/?page=2".to_string()), "friday night"),
            Some("/meets/api/?page=2&q=friday+night".to_string())
        );
        assert_eq!(with_query(None, "x"), None);
        assert_eq!(
            with_query(Some("/meets/api/?page=2".to_string()), ""),
            Some("/meets/api/?page=2".to_string())
        );
    }

    #[test]
    fn detail_renames_columns() {
        let meet = Meet {
            id: 3,
            slug: "friday".to_string(),
            name: "Friday".to_string(),
            team_id: Some(1),
            location_id: None,
            manager_id: Some(2),
            starttime: NaiveDateTime::default(),
            duration_minutes: 60,
            min_attendees: 4,
            max_attendees: 6,
            comments: String::new(),
        };
        let json = serde_json::to_value(MeetDetail::from(meet)).unwrap();
        assert_eq!(json["duration"], 60);
        assert_eq!(json["team"], 1);
        assert_eq!(json["location"], serde_json::Value::Null);
        assert_eq!(json["starttime"], "1970-01-01T00:00:00");
    }
}
