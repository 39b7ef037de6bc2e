//! Meets and their rosters.
//!
//! A meet belongs to a team and owns a roster of attendee slots. Saving a
//! meet runs the same hooks whichever surface (pages or the JSON api) the
//! write comes from: the capacity is clamped, the manager defaults to the
//! team owner, a slug is allocated and the roster is topped up to
//! `min_attendees` empty slots.

use std::ops::RangeInclusive;

use axum::routing::{get, post};
use chrono::{Datelike, Days, Duration, NaiveDateTime, Utc};
use diesel::{connection::LoadConnection, insert_into, prelude::*, sqlite::Sqlite};
use pulldown_cmark::{Options, Parser, html};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::User,
    error::SaveError,
    locations::Location,
    permission::{ModelPermissions, is_member, owns_any_team, team_owner},
    schema::{attendees, locations, meets, teams},
    sitemodule::{SiteModule, path},
    slug::{allocate, slugify},
    teams::Team,
    userprofile::{Person, people},
    views::SiteModel,
};

pub mod api;
pub mod attendees_views;
pub mod roster;
pub mod views;

/// The absolute maximum of a meet's `min_attendees`.
pub const MAX_ATTENDEES: i32 = 100;
pub const DEFAULT_NAME: &str = "Unnamed Event";
pub const DEFAULT_DURATION: i32 = 90;

const RESERVED: &[&str] = &["api", "attendance", "attendees", "attendee", "meets", "meet"];

#[derive(Queryable, Selectable, Serialize, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = meets)]
#[diesel(check_for_backend(Sqlite))]
pub struct Meet {
    pub id: i32,
    pub slug: String,
    pub name: String,
    pub team_id: Option<i32>,
    pub location_id: Option<i32>,
    pub manager_id: Option<i32>,
    pub starttime: NaiveDateTime,
    pub duration_minutes: i32,
    pub min_attendees: i32,
    pub max_attendees: i32,
    pub comments: String,
}

impl SiteModel for Meet {
    const APP_LABEL: &'static str = "meets";
    const MODEL_NAME: &'static str = "meet";
    const VERBOSE_NAME: &'static str = "meet";
    const VERBOSE_NAME_PLURAL: &'static str = "meets";

    fn id(&self) -> i32 {
        self.id
    }

    fn display(&self) -> String {
        self.name.clone()
    }
}

impl Meet {
    pub fn fetch_by_slug(
        slug: &str,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> QueryResult<Meet> {
        meets::table
            .filter(meets::slug.eq(slug))
            .select(Meet::as_select())
            .first(conn)
    }

    /// `None` when the end does not fit in a date.
    pub fn endtime(&self) -> Option<NaiveDateTime> {
        self.starttime
            .checked_add_signed(Duration::minutes(self.duration_minutes.into()))
    }

    /// The manager or the owner of the meet's team.
    pub fn is_run_by(
        &self,
        user: &User,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> QueryResult<bool> {
        if self.manager_id == Some(user.id) {
            return Ok(true);
        }
        Ok(match self.team_id {
            Some(team) => team_owner(team, conn)? == Some(user.id),
            None => false,
        })
    }

    pub fn comments_html(&self) -> String {
        comments_html(&self.comments)
    }
}

/// A meet lasts at most a week.
pub const MAX_DURATION: i32 = 7 * 24 * 60;

pub const YEARS: RangeInclusive<i32> = 1900..=9999;

pub fn check_duration(minutes: i32) -> Result<i32, String> {
    if !(0..=MAX_DURATION).contains(&minutes) {
        return Err(format!(
            "Ensure this value is between 0 and {MAX_DURATION}."
        ));
    }
    Ok(minutes)
}

pub fn check_starttime(starttime: NaiveDateTime) -> Result<NaiveDateTime, String> {
    if !YEARS.contains(&starttime.year()) {
        return Err(format!(
            "Enter a date between the years {} and {}.",
            YEARS.start(),
            YEARS.end()
        ));
    }
    Ok(starttime)
}

/// Renders Markdown comments as sanitised html.
pub fn comments_html(comments: &str) -> String {
    let mut out = String::new();
    html::push_html(
        &mut out,
        Parser::new_ext(comments, Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TABLES),
    );
    ammonia::clean(&out)
}

impl ModelPermissions for Meet {
    fn has_add_permission(
        user: &User,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> QueryResult<bool> {
        Ok(user.is_superuser || owns_any_team(user.id, conn)?)
    }

    fn has_view_permission(
        &self,
        user: &User,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> QueryResult<bool> {
        if user.is_superuser {
            return Ok(true);
        }
        match self.team_id {
            Some(team) => is_member(user.id, team, conn),
            None => Ok(false),
        }
    }

    fn has_update_permission(
        &self,
        user: &User,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> QueryResult<bool> {
        Ok(user.is_superuser || self.is_run_by(user, conn)?)
    }

    fn has_delete_permission(
        &self,
        user: &User,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> QueryResult<bool> {
        self.has_update_permission(user, conn)
    }
}

/// The writable columns of a meet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeetData {
    pub slug: String,
    pub name: String,
    pub team_id: Option<i32>,
    pub location_id: Option<i32>,
    pub manager_id: Option<i32>,
    pub starttime: NaiveDateTime,
    pub duration_minutes: i32,
    pub min_attendees: i32,
    pub max_attendees: i32,
    pub comments: String,
}

impl MeetData {
    pub fn new(name: &str, starttime: NaiveDateTime) -> Self {
        Self {
            slug: String::new(),
            name: name.to_string(),
            team_id: None,
            location_id: None,
            manager_id: None,
            starttime,
            duration_minutes: DEFAULT_DURATION,
            min_attendees: 1,
            max_attendees: 1,
            comments: String::new(),
        }
    }

    pub fn from_meet(meet: &Meet) -> Self {
        Self {
            slug: meet.slug.clone(),
            name: meet.name.clone(),
            team_id: meet.team_id,
            location_id: meet.location_id,
            manager_id: meet.manager_id,
            starttime: meet.starttime,
            duration_minutes: meet.duration_minutes,
            min_attendees: meet.min_attendees,
            max_attendees: meet.max_attendees,
            comments: meet.comments.clone(),
        }
    }

    /// The pre-save hooks.
    fn prepare(
        &mut self,
        id: Option<i32>,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Result<(), SaveError> {
        if self.name.trim().is_empty() {
            self.name = DEFAULT_NAME.to_string();
        }
        self.min_attendees = self.min_attendees.min(MAX_ATTENDEES);
        self.max_attendees = self.max_attendees.max(self.min_attendees);

        if self.manager_id.is_none() {
            if let Some(team) = self.team_id {
                self.manager_id = team_owner(team, conn)?;
            }
        }

        if self.slug.is_empty() {
            let candidate = slugify(&format!(
                "{}-{}",
                self.name,
                self.starttime.format("%Y-%m-%d %H:%M:%S")
            ));
            let this = id.unwrap_or(0);
            self.slug = allocate(&candidate, "meet", RESERVED, |slug| {
                meets::table
                    .filter(meets::slug.eq(slug).and(meets::id.ne(this)))
                    .select(meets::id)
                    .order_by(meets::id.desc())
                    .first::<i32>(conn)
                    .optional()
            })?;
        }
        Ok(())
    }
}

#[tracing::instrument(skip(conn))]
pub fn create_meet(
    mut data: MeetData,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<Meet, SaveError> {
    data.prepare(None, conn)?;

    let meet = insert_into(meets::table)
        .values((
            meets::slug.eq(&data.slug),
            meets::name.eq(&data.name),
            meets::team_id.eq(data.team_id),
            meets::location_id.eq(data.location_id),
            meets::manager_id.eq(data.manager_id),
            meets::starttime.eq(data.starttime),
            meets::duration_minutes.eq(data.duration_minutes),
            meets::min_attendees.eq(data.min_attendees),
            meets::max_attendees.eq(data.max_attendees),
            meets::comments.eq(&data.comments),
        ))
        .returning(Meet::as_returning())
        .get_result(conn)?;

    let added = allocate_slots(&meet, conn)?;
    tracing::info!(meet = meet.id, slug = %meet.slug, slots = added, "created meet");
    Ok(meet)
}

#[tracing::instrument(skip(conn))]
pub fn update_meet(
    id: i32,
    mut data: MeetData,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<Meet, SaveError> {
    data.prepare(Some(id), conn)?;

    let meet = diesel::update(meets::table.find(id))
        .set((
            meets::slug.eq(&data.slug),
            meets::name.eq(&data.name),
            meets::team_id.eq(data.team_id),
            meets::location_id.eq(data.location_id),
            meets::manager_id.eq(data.manager_id),
            meets::starttime.eq(data.starttime),
            meets::duration_minutes.eq(data.duration_minutes),
            meets::min_attendees.eq(data.min_attendees),
            meets::max_attendees.eq(data.max_attendees),
            meets::comments.eq(&data.comments),
        ))
        .returning(Meet::as_returning())
        .get_result(conn)?;

    allocate_slots(&meet, conn)?;
    Ok(meet)
}

/// Inserts empty attendee slots until the roster of `meet` holds at least
/// `min_attendees` rows. Returns the number of slots added.
pub fn allocate_slots(
    meet: &Meet,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> QueryResult<usize> {
    let current = attendees::table
        .filter(attendees::meet_id.eq(meet.id))
        .count()
        .get_result::<i64>(conn)?;
    let missing = (i64::from(meet.min_attendees) - current).max(0);

    for _ in 0..missing {
        insert_attendee(meet.id, AttendeeData::default(), conn)?;
    }
    Ok(missing as usize)
}

/// A meet together with the names needed to show it.
#[derive(Debug, Clone)]
pub struct MeetInfo {
    pub meet: Meet,
    pub team: Option<Team>,
    pub location: Option<Location>,
    pub manager: Option<Person>,
}

/// Loads the team, location and manager of each meet.
pub fn meet_infos(
    meets: Vec<Meet>,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> QueryResult<Vec<MeetInfo>> {
    let team_ids = meets.iter().filter_map(|m| m.team_id).collect::<Vec<_>>();
    let location_ids = meets.iter().filter_map(|m| m.location_id).collect::<Vec<_>>();

    let teams = teams::table
        .filter(teams::id.eq_any(&team_ids))
        .select(Team::as_select())
        .load::<Team>(conn)?;
    let locations = locations::table
        .filter(locations::id.eq_any(&location_ids))
        .select(Location::as_select())
        .load::<Location>(conn)?;
    let managers = people(meets.iter().filter_map(|m| m.manager_id), conn)?;

    Ok(meets
        .into_iter()
        .map(|meet| MeetInfo {
            team: teams.iter().find(|t| Some(t.id) == meet.team_id).cloned(),
            location: locations
                .iter()
                .find(|l| Some(l.id) == meet.location_id)
                .cloned(),
            manager: meet.manager_id.and_then(|id| managers.get(&id).cloned()),
            meet,
        })
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AttendanceState {
    #[default]
    #[serde(rename = "--")]
    Unassigned,
    #[serde(rename = "AS")]
    Assigned,
    #[serde(rename = "NS")]
    NeedSub,
    #[serde(rename = "OK")]
    Confirmed,
}

impl AttendanceState {
    pub const ALL: [AttendanceState; 4] = [
        AttendanceState::Unassigned,
        AttendanceState::Assigned,
        AttendanceState::NeedSub,
        AttendanceState::Confirmed,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            AttendanceState::Unassigned => "--",
            AttendanceState::Assigned => "AS",
            AttendanceState::NeedSub => "NS",
            AttendanceState::Confirmed => "OK",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AttendanceState::Unassigned => "Unassigned",
            AttendanceState::Assigned => "Assigned",
            AttendanceState::NeedSub => "Need a sub",
            AttendanceState::Confirmed => "Confirmed",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }

    /// `(code, label)` select choices.
    pub fn choices() -> Vec<(String, String)> {
        Self::ALL
            .iter()
            .map(|s| (s.code().to_string(), s.label().to_string()))
            .collect()
    }
}

#[derive(Queryable, Selectable, Serialize, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = attendees)]
#[diesel(check_for_backend(Sqlite))]
pub struct Attendee {
    pub id: i32,
    pub meet_id: i32,
    pub player_id: Option<i32>,
    pub attendance: String,
    pub substitute_id: Option<i32>,
    #[serde(skip_serializing)]
    pub token: String,
    pub token_expiration: NaiveDateTime,
}

impl Attendee {
    /// Unknown codes read as unassigned.
    pub fn state(&self) -> AttendanceState {
        AttendanceState::from_code(&self.attendance).unwrap_or_default()
    }

    pub fn is_confirmed(&self) -> bool {
        self.state() == AttendanceState::Confirmed
    }
}

pub fn new_token() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn token_expiry(now: NaiveDateTime) -> NaiveDateTime {
    now.checked_add_days(Days::new(1)).unwrap_or(NaiveDateTime::MAX)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttendeeData {
    pub player_id: Option<i32>,
    pub attendance: AttendanceState,
    pub substitute_id: Option<i32>,
}

impl AttendeeData {
    pub fn from_attendee(a: &Attendee) -> Self {
        Self {
            player_id: a.player_id,
            attendance: a.state(),
            substitute_id: a.substitute_id,
        }
    }

    /// An unassigned slot which has a player is assigned.
    pub fn promoted(mut self) -> Self {
        if self.attendance == AttendanceState::Unassigned && self.player_id.is_some() {
            self.attendance = AttendanceState::Assigned;
        }
        self
    }
}

pub fn insert_attendee(
    meet_id: i32,
    data: AttendeeData,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> QueryResult<Attendee> {
    let data = data.promoted();
    insert_into(attendees::table)
        .values((
            attendees::meet_id.eq(meet_id),
            attendees::player_id.eq(data.player_id),
            attendees::attendance.eq(data.attendance.code()),
            attendees::substitute_id.eq(data.substitute_id),
            attendees::token.eq(new_token()),
            attendees::token_expiration.eq(token_expiry(Utc::now().naive_utc())),
        ))
        .returning(Attendee::as_returning())
        .get_result(conn)
}

pub fn update_attendee(
    id: i32,
    data: AttendeeData,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> QueryResult<Attendee> {
    let data = data.promoted();
    diesel::update(attendees::table.find(id))
        .set((
            attendees::player_id.eq(data.player_id),
            attendees::attendance.eq(data.attendance.code()),
            attendees::substitute_id.eq(data.substitute_id),
        ))
        .returning(Attendee::as_returning())
        .get_result(conn)
}

/// An attendee with its meet and the people in the slot.
#[derive(Debug, Clone)]
pub struct RosterSlot {
    pub attendee: Attendee,
    pub meet: Meet,
    pub player: Option<Person>,
    pub substitute: Option<Person>,
}

impl SiteModel for RosterSlot {
    const APP_LABEL: &'static str = "meets";
    const MODEL_NAME: &'static str = "attendee";
    const VERBOSE_NAME: &'static str = "attendee";
    const VERBOSE_NAME_PLURAL: &'static str = "attendees";

    fn id(&self) -> i32 {
        self.attendee.id
    }

    fn display(&self) -> String {
        match &self.player {
            Some(p) => p.name.clone(),
            None => "Unassigned".to_string(),
        }
    }
}

impl ModelPermissions for RosterSlot {
    fn has_view_permission(
        &self,
        user: &User,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> QueryResult<bool> {
        if user.is_superuser || user.is_staff {
            return Ok(true);
        }
        match self.meet.team_id {
            Some(team) => is_member(user.id, team, conn),
            None => Ok(false),
        }
    }

    fn has_update_permission(
        &self,
        user: &User,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> QueryResult<bool> {
        Ok(user.is_superuser
            || self.attendee.player_id == Some(user.id)
            || self.meet.is_run_by(user, conn)?)
    }

    fn has_delete_permission(
        &self,
        user: &User,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> QueryResult<bool> {
        Ok(user.is_superuser || self.meet.is_run_by(user, conn)?)
    }
}

/// The roster of `meet` in slot order.
pub fn load_roster(
    meet: &Meet,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> QueryResult<Vec<RosterSlot>> {
    let rows = attendees::table
        .filter(attendees::meet_id.eq(meet.id))
        .select(Attendee::as_select())
        .order_by(attendees::id.asc())
        .load::<Attendee>(conn)?;
    let persons = people(
        rows.iter()
            .flat_map(|a| [a.player_id, a.substitute_id])
            .flatten(),
        conn,
    )?;

    Ok(rows
        .into_iter()
        .map(|attendee| RosterSlot {
            player: attendee.player_id.and_then(|id| persons.get(&id).cloned()),
            substitute: attendee
                .substitute_id
                .and_then(|id| persons.get(&id).cloned()),
            meet: meet.clone(),
            attendee,
        })
        .collect())
}

pub fn module() -> SiteModule {
    SiteModule::new("meets")
        .verbose_name("Meet", "Meets")
        .icon("event")
        .order(30)
        .description("Scheduled meets and who attends them")
        .model_alias("meets", "meet")
        .model_alias("attendees", "attendee")
        .model_key("meet", |o| {
            o.downcast_ref::<Meet>().map(|m| vec![m.slug.clone()])
        })
        .model_key("attendee", |o| {
            o.downcast_ref::<RosterSlot>()
                .map(|s| vec![s.meet.slug.clone(), s.attendee.id.to_string()])
        })
        .index("meet_list")
        .menu_item("All meets", "meet_list")
        .menu_item("New meet", "meet_create")
        .urls(vec![
            path("", get(views::meet_list), "meet_list"),
            path(
                "create/",
                get(views::create_meet_page).post(views::do_create_meet),
                "meet_create",
            ),
            path("api/", get(api::meet_api_list), "meet_api_list"),
            path(
                "api/create/",
                post(api::meet_api_create),
                "meet_api_create",
            ),
            path(
                "api/attendance/<str:token>/update",
                get(api::attendance_api_detail).put(api::attendance_api_update),
                "attendance_api_update",
            ),
            path(
                "api/<slug:slug>/update/",
                get(api::meet_api_detail).put(api::meet_api_update),
                "meet_api_update",
            ),
            path(
                "api/<slug:slug>/delete/",
                get(api::meet_api_detail).delete(api::meet_api_delete),
                "meet_api_delete",
            ),
            path("api/<slug:slug>/", get(api::meet_api_detail), "meet_api_detail"),
            path(
                "<slug:slug>/attendees/<int:pk>/",
                get(attendees_views::attendee_detail),
                "attendee_detail",
            ),
            path(
                "<slug:slug>/attendees/<int:pk>/update/",
                get(attendees_views::update_attendee_page)
                    .post(attendees_views::do_update_attendee),
                "attendee_update",
            ),
            path(
                "<slug:slug>/attendees/",
                get(attendees_views::attendee_list),
                "attendee_list",
            ),
            path(
                "<slug:slug>/attendees/update/",
                get(roster::roster_page).post(roster::do_update_roster),
                "attendee_list_update",
            ),
            path(
                "<slug:slug>/update/",
                get(views::update_meet_page).post(views::do_update_meet),
                "meet_update",
            ),
            path(
                "<slug:slug>/delete/",
                get(views::delete_meet_page).post(views::do_delete_meet),
                "meet_delete",
            ),
            path("<slug:slug>/", get(views::meet_detail), "meet_detail"),
        ])
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use diesel::{Connection, SqliteConnection, connection::SimpleConnection};
    use diesel_migrations::MigrationHarness;

    use super::*;
    use crate::{
        MIGRATIONS,
        auth::register::{NewUser, create_user},
        teams::{TeamData, create_team},
    };

    fn conn() -> SqliteConnection {
        let mut conn = SqliteConnection::establish(":memory:").unwrap();
        conn.batch_execute("PRAGMA foreign_keys = ON;").unwrap();
        conn.run_pending_migrations(MIGRATIONS).unwrap();
        conn
    }

    fn user(name: &str, conn: &mut SqliteConnection) -> User {
        create_user(
            NewUser {
                username: name,
                email: &format!("{name}@example.com"),
                password: "password",
                first_name: "",
                last_name: "",
                is_staff: false,
                is_superuser: false,
            },
            conn,
        )
        .unwrap()
    }

    fn friday() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 3)
            .unwrap()
            .and_hms_opt(19, 0, 0)
            .unwrap()
    }

    #[test]
    fn hooks_clamp_capacity_and_default_the_manager() {
        let mut conn = conn();
        let owner = user("owner", &mut conn);
        let team = create_team(
            TeamData {
                name: "Reds".to_string(),
                join_password: "pw".to_string(),
                owner_id: Some(owner.id),
                ..Default::default()
            },
            &owner,
            &mut conn,
        )
        .unwrap();

        let meet = create_meet(
            MeetData {
                team_id: Some(team.id),
                min_attendees: 250,
                max_attendees: 3,
                ..MeetData::new("Friday", friday())
            },
            &mut conn,
        )
        .unwrap();

        assert_eq!(meet.min_attendees, MAX_ATTENDEES);
        assert_eq!(meet.max_attendees, MAX_ATTENDEES);
        assert_eq!(meet.manager_id, Some(owner.id));
        assert_eq!(meet.slug, "friday-2024-05-03-190000");
        assert_eq!(load_roster(&meet, &mut conn).unwrap().len(), 100);
    }

    #[test]
    fn same_name_and_time_gets_a_suffix() {
        let mut conn = conn();
        let first = create_meet(MeetData::new("Friday", friday()), &mut conn).unwrap();
        let second = create_meet(MeetData::new("Friday", friday()), &mut conn).unwrap();
        assert_eq!(second.slug, format!("{}-{}", first.slug, first.id));
    }

    #[test]
    fn blank_name_gets_the_default() {
        let mut conn = conn();
        let meet = create_meet(MeetData::new(" ", friday()), &mut conn).unwrap();
        assert_eq!(meet.name, DEFAULT_NAME);
        assert_eq!(meet.slug, "unnamed-event-2024-05-03-190000");
    }

    #[test]
    fn slots_are_topped_up_not_trimmed() {
        let mut conn = conn();
        let meet = create_meet(
            MeetData {
                min_attendees: 3,
                max_attendees: 5,
                ..MeetData::new("Practice", friday())
            },
            &mut conn,
        )
        .unwrap();
        assert_eq!(load_roster(&meet, &mut conn).unwrap().len(), 3);

        let meet = update_meet(
            meet.id,
            MeetData {
                min_attendees: 2,
                ..MeetData::from_meet(&meet)
            },
            &mut conn,
        )
        .unwrap();
        assert_eq!(allocate_slots(&meet, &mut conn).unwrap(), 0);
        assert_eq!(load_roster(&meet, &mut conn).unwrap().len(), 3);
        assert_eq!(meet.slug, "practice-2024-05-03-190000");
    }

    #[test]
    fn an_unassigned_slot_with_a_player_is_assigned() {
        let mut conn = conn();
        let player = user("player", &mut conn);
        let meet = create_meet(MeetData::new("Practice", friday()), &mut conn).unwrap();
        let slot = &load_roster(&meet, &mut conn).unwrap()[0];
        assert_eq!(slot.attendee.state(), AttendanceState::Unassigned);
        assert_eq!(slot.display(), "Unassigned");
        assert_eq!(slot.attendee.token.len(), 32);

        let updated = update_attendee(
            slot.attendee.id,
            AttendeeData {
                player_id: Some(player.id),
                ..Default::default()
            },
            &mut conn,
        )
        .unwrap();
        assert_eq!(updated.state(), AttendanceState::Assigned);

        let confirmed = update_attendee(
            slot.attendee.id,
            AttendeeData {
                player_id: Some(player.id),
                attendance: AttendanceState::Confirmed,
                substitute_id: None,
            },
            &mut conn,
        )
        .unwrap();
        assert!(confirmed.is_confirmed());
    }

    #[test]
    fn attendance_codes() {
        assert_eq!(AttendanceState::from_code("NS"), Some(AttendanceState::NeedSub));
        assert_eq!(AttendanceState::from_code("XX"), None);
        assert_eq!(AttendanceState::choices()[0], ("--".to_string(), "Unassigned".to_string()));
        assert_eq!(
            serde_json::to_string(&AttendanceState::Confirmed).unwrap(),
            "\"OK\""
        );
    }

    #[test]
    fn comments_are_sanitised() {
        let html = comments_html("Bring water.\n\n<script>alert(1)</script>Cones");
        assert!(html.contains("<p>Bring water.</p>"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("Cones"));
    }

    #[test]
    fn comments_are_markdown() {
        let html = comments_html("Bring **water**.\n\n- cones\n- bibs\n\n<script>alert(1)</script>");
        assert!(html.contains("<strong>water</strong>"));
        assert!(html.contains("<ul>"));
        assert!(html.contains("<li>cones</li>"));
        assert!(html.contains("<li>bibs</li>"));
        assert!(!html.contains("script"));
        assert!(!html.contains("alert"));
    }

    #[test]
    fn endtime_adds_the_duration() {
        let mut conn = conn();
        let meet = create_meet(MeetData::new("Practice", friday()), &mut conn).unwrap();
        assert_eq!(meet.endtime(), Some(friday() + Duration::minutes(90)));
    }

    #[test]
    fn endtime_past_the_last_date_is_none() {
        let meet = Meet {
            starttime: NaiveDateTime::MAX - Duration::minutes(1),
            duration_minutes: 90,
            ..create_meet(MeetData::new("Practice", friday()), &mut conn()).unwrap()
        };
        assert_eq!(meet.endtime(), None);
    }

    #[test]
    fn schedules_are_bounded() {
        assert_eq!(check_duration(MAX_DURATION), Ok(MAX_DURATION));
        assert!(check_duration(MAX_DURATION + 1).is_err());
        assert!(check_duration(-1).is_err());
        assert!(check_starttime(friday()).is_ok());
        let far: NaiveDateTime =
            serde_json::from_str("\"+260000-01-01T00:00:00\"").unwrap();
        assert!(check_starttime(far).is_err());
    }
}
