use axum::{
    Form,
    extract::{Path, Query},
};
use chrono::{Days, Local, NaiveDateTime, NaiveTime, Timelike};
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use serde::Deserialize;

use crate::{
    auth::User,
    locations::location_choices,
    meets::{
        DEFAULT_DURATION, Meet, MeetData, MeetInfo, RosterSlot, check_duration,
        check_starttime, create_meet, load_roster, meet_infos, update_meet,
    },
    permission::{ModelPermissions, ensure, team_ids_of},
    schema::{attendees, meets, teams},
    sitemodule::templates::TemplateCtx,
    state::Conn,
    teams::{Team, views::profile_url},
    userprofile::user_choices,
    util_resp::{FailureResponse, StandardResponse, bad_request, err_not_found, success},
    validation::{max_length, required},
    views::{
        Cell, DetailSection, FieldErrors, FormContext, ModelList, Pagination, SiteModel,
        ViewCtx,
        detail::{build_delete, build_detail},
        form::{
            Field, FieldKind, Fieldset, add_error, check, check_choice,
            format_datetime, parse_datetime, parse_int, parse_optional_id,
        },
        list::{PageQuery, build_list},
    },
};

pub struct MeetRow(MeetInfo);

impl ModelList for MeetRow {
    type Model = Meet;

    const LIST_DISPLAY: &'static [(&'static str, &'static str)] = &[
        ("name", "Name"),
        ("team", "Team"),
        ("starttime", "Start"),
        ("location", "Location"),
        ("manager", "Manager"),
    ];
    const LIST_DISPLAY_LINKS: &'static [&'static str] = &["name", "starttime"];
    const PAGINATE_BY: Option<i64> = Some(100);

    fn object(&self) -> &Meet {
        &self.0.meet
    }

    fn field_value(&self, field: &str) -> String {
        let info = &self.0;
        match field {
            "name" => info.meet.name.clone(),
            "team" => info.team.as_ref().map(|t| t.name.clone()).unwrap_or_default(),
            "starttime" => info.meet.starttime.format("%Y-%m-%d %H:%M").to_string(),
            "location" => info
                .location
                .as_ref()
                .map(|l| l.name.clone())
                .unwrap_or_default(),
            "manager" => info
                .manager
                .as_ref()
                .map(|p| p.name.clone())
                .unwrap_or_default(),
            _ => String::new(),
        }
    }

    /// Superusers are sent to the edit pages of related rows.
    fn get_field_url(&self, field: &str, ctx: &ViewCtx) -> Option<String> {
        let verb = if ctx.user.is_superuser { "update" } else { "detail" };
        match field {
            "team" => ctx.object_url(self.0.team.as_ref()?, verb),
            "location" => ctx.object_url(self.0.location.as_ref()?, verb),
            "manager" => profile_url(ctx, self.0.manager.as_ref()),
            _ => None,
        }
    }
}

/// The meets `user` may see: all for superusers, else those of their teams.
fn visible_meets(
    user: &User,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> QueryResult<Option<Vec<i32>>> {
    if user.is_superuser {
        Ok(None)
    } else {
        team_ids_of(user.id, conn).map(Some)
    }
}

#[tracing::instrument(skip_all)]
pub async fn meet_list(
    ctx: ViewCtx,
    Query(q): Query<PageQuery>,
    mut conn: Conn<true>,
) -> StandardResponse {
    ensure(Meet::has_list_permission(&ctx.user, &mut *conn)?)?;

    let teams = visible_meets(&ctx.user, &mut *conn)?;
    let count = match &teams {
        None => meets::table.count().get_result::<i64>(&mut *conn)?,
        Some(ids) => meets::table
            .filter(meets::team_id.eq_any(ids))
            .count()
            .get_result::<i64>(&mut *conn)?,
    };
    let per_page = MeetRow::PAGINATE_BY.unwrap_or(count.max(1));
    let Some(pagination) =
        Pagination::new(&ctx.path, q.page.as_deref(), count, per_page)
    else {
        return err_not_found();
    };

    let page = match &teams {
        None => meets::table
            .select(Meet::as_select())
            .order_by(meets::id.asc())
            .offset(pagination.offset())
            .limit(pagination.limit())
            .load::<Meet>(&mut *conn)?,
        Some(ids) => meets::table
            .filter(meets::team_id.eq_any(ids))
            .select(Meet::as_select())
            .order_by(meets::id.asc())
            .offset(pagination.offset())
            .limit(pagination.limit())
            .load::<Meet>(&mut *conn)?,
    };
    let rows = meet_infos(page, &mut *conn)?
        .into_iter()
        .map(MeetRow)
        .collect::<Vec<_>>();

    let add_url = if Meet::has_add_permission(&ctx.user, &mut *conn)? {
        ctx.model_url::<Meet>("create")
    } else {
        None
    };

    let list = build_list(&ctx, &rows, add_url, Some(pagination));
    success(ctx.render::<Meet>(
        &list.title,
        "_list",
        "site/model_list",
        TemplateCtx::List(&list),
    )?)
}

/// The teams a meet may be scheduled for by `user`.
fn team_choices(
    user: &User,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> QueryResult<Vec<Team>> {
    if user.is_superuser {
        teams::table
            .select(Team::as_select())
            .order_by(teams::id.asc())
            .load(conn)
    } else {
        teams::table
            .filter(teams::owner_id.eq(user.id))
            .select(Team::as_select())
            .order_by(teams::id.asc())
            .load(conn)
    }
}

struct Choices {
    teams: Vec<(String, String)>,
    locations: Vec<(String, String)>,
    users: Vec<(String, String)>,
}

impl Choices {
    fn load(
        user: &User,
        current_team: Option<i32>,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> QueryResult<Self> {
        let mut teams = team_choices(user, conn)?;
        if let Some(id) = current_team {
            if !teams.iter().any(|t| t.id == id) {
                teams.push(Team::fetch(id, conn)?);
            }
        }
        Ok(Self {
            teams: teams
                .into_iter()
                .map(|t| (t.id.to_string(), t.name))
                .collect(),
            locations: location_choices(conn)?,
            users: user_choices(conn)?,
        })
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct MeetForm {
    #[serde(default)]
    name: String,
    #[serde(default)]
    team: String,
    #[serde(default)]
    starttime: String,
    #[serde(default)]
    duration: String,
    #[serde(default)]
    location: String,
    #[serde(default)]
    manager: String,
    #[serde(default)]
    min_attendees: String,
    #[serde(default)]
    max_attendees: String,
    #[serde(default)]
    comments: String,
}

impl MeetForm {
    /// Start tomorrow at the current hour; the first team on offer and its
    /// owner as manager.
    fn initial(teams: &[Team], now: NaiveDateTime) -> Self {
        let starttime = now
            .date()
            .checked_add_days(Days::new(1))
            .unwrap_or(now.date())
            .and_time(NaiveTime::from_hms_opt(now.hour(), 0, 0).unwrap_or_default());
        let team = teams.first();
        Self {
            team: team.map(|t| t.id.to_string()).unwrap_or_default(),
            manager: team
                .and_then(|t| t.owner_id)
                .map(|id| id.to_string())
                .unwrap_or_default(),
            starttime: format_datetime(&starttime),
            duration: DEFAULT_DURATION.to_string(),
            min_attendees: "1".to_string(),
            max_attendees: "1".to_string(),
            ..Default::default()
        }
    }

    fn from_meet(meet: &Meet) -> Self {
        let id = |v: Option<i32>| v.map(|v| v.to_string()).unwrap_or_default();
        Self {
            name: meet.name.clone(),
            team: id(meet.team_id),
            starttime: format_datetime(&meet.starttime),
            duration: meet.duration_minutes.to_string(),
            location: id(meet.location_id),
            manager: id(meet.manager_id),
            min_attendees: meet.min_attendees.to_string(),
            max_attendees: meet.max_attendees.to_string(),
            comments: meet.comments.clone(),
        }
    }

    fn validate(&self, choices: &Choices) -> Result<MeetData, FieldErrors> {
        let mut errors = FieldErrors::new();
        check(&mut errors, "name", required(&self.name));
        check(&mut errors, "name", max_length(&self.name, 100));
        check(&mut errors, "comments", max_length(&self.comments, 200));

        let mut select = |field: &str, value: &str, choices: &[(String, String)]| {
            match parse_optional_id(value) {
                Ok(id) => {
                    check_choice(&mut errors, field, id, choices);
                    id
                }
                Err(e) => {
                    add_error(&mut errors, field, e);
                    None
                }
            }
        };
        let team_id = select("team", &self.team, &choices.teams);
        let location_id = select("location", &self.location, &choices.locations);
        let manager_id = select("manager", &self.manager, &choices.users);
        if team_id.is_none() {
            add_error(&mut errors, "team", "This field is required.");
        }

        let starttime = parse_datetime(&self.starttime)
            .and_then(check_starttime)
            .map_err(|e| add_error(&mut errors, "starttime", e))
            .ok();
        let duration = parse_int(&self.duration, 0)
            .and_then(check_duration)
            .map_err(|e| add_error(&mut errors, "duration", e))
            .ok();
        let min_attendees = parse_int(&self.min_attendees, 1)
            .map_err(|e| add_error(&mut errors, "min_attendees", e))
            .ok();
        let max_attendees = parse_int(&self.max_attendees, 1)
            .map_err(|e| add_error(&mut errors, "max_attendees", e))
            .ok();

        match (starttime, duration, min_attendees, max_attendees) {
            (Some(starttime), Some(duration), Some(min), Some(max))
                if errors.is_empty() =>
            {
                Ok(MeetData {
                    team_id,
                    location_id,
                    manager_id,
                    duration_minutes: duration,
                    min_attendees: min,
                    max_attendees: max,
                    comments: self.comments.trim().to_string(),
                    ..MeetData::new(self.name.trim(), starttime)
                })
            }
            _ => Err(errors),
        }
    }

    fn context(
        &self,
        title: String,
        action: String,
        choices: Choices,
        cancel_url: Option<String>,
    ) -> FormContext {
        FormContext::new(title, action)
            .fieldset(
                Fieldset::new(None)
                    .row(vec![
                        Field::text("name", "Meet name").value(&self.name).required(),
                    ])
                    .row(vec![
                        Field::new("team", "Team", FieldKind::Select(choices.teams))
                            .value(&self.team)
                            .required(),
                    ])
                    .row(vec![
                        Field::new("starttime", "Meet date/time", FieldKind::DateTime)
                            .value(&self.starttime)
                            .required(),
                        Field::new("duration", "Duration", FieldKind::Number)
                            .value(&self.duration)
                            .help("In minutes"),
                        Field::new("location", "Location", FieldKind::Select(choices.locations))
                            .value(&self.location),
                    ]),
            )
            .fieldset(
                Fieldset::new(Some("Attendees"))
                    .row(vec![
                        Field::new("manager", "Manager", FieldKind::Select(choices.users))
                            .value(&self.manager)
                            .help("Defaults to the owner of the team"),
                        Field::new("min_attendees", "Min attendees", FieldKind::Number)
                            .value(&self.min_attendees),
                        Field::new("max_attendees", "Max attendees", FieldKind::Number)
                            .value(&self.max_attendees),
                    ])
                    .row(vec![
                        Field::new("comments", "Comments", FieldKind::TextArea)
                            .value(&self.comments),
                    ]),
            )
            .cancel_url(cancel_url)
    }
}

fn form_page(
    ctx: &ViewCtx,
    form: &FormContext,
) -> Result<hypertext::Rendered<String>, FailureResponse> {
    ctx.render::<Meet>(
        &form.title,
        "_form",
        "common/views/form",
        TemplateCtx::Form(form),
    )
}

#[tracing::instrument(skip_all)]
pub async fn create_meet_page(ctx: ViewCtx, mut conn: Conn<true>) -> StandardResponse {
    ensure(Meet::has_add_permission(&ctx.user, &mut *conn)?)?;

    let teams = team_choices(&ctx.user, &mut *conn)?;
    let form = MeetForm::initial(&teams, Local::now().naive_local());
    let page = form.context(
        "Add meet".to_string(),
        ctx.path.clone(),
        Choices::load(&ctx.user, None, &mut *conn)?,
        ctx.model_url::<Meet>("list"),
    );
    success(form_page(&ctx, &page)?)
}

#[tracing::instrument(skip_all)]
pub async fn do_create_meet(
    ctx: ViewCtx,
    mut conn: Conn<true>,
    Form(form): Form<MeetForm>,
) -> StandardResponse {
    ensure(Meet::has_add_permission(&ctx.user, &mut *conn)?)?;

    let choices = Choices::load(&ctx.user, None, &mut *conn)?;
    match form.validate(&choices) {
        Ok(data) => {
            let meet = create_meet(data, &mut *conn)?;
            ctx.saved(&meet, "added")
        }
        Err(errors) => {
            let page = form
                .context(
                    "Add meet".to_string(),
                    ctx.path.clone(),
                    choices,
                    ctx.model_url::<Meet>("list"),
                )
                .with_errors(&errors);
            bad_request(form_page(&ctx, &page)?)
        }
    }
}

/// The url of a roster slot for `ctx.user`: the edit page for staff and for
/// the slot's own player, the detail page otherwise.
pub fn slot_url(ctx: &ViewCtx, slot: &RosterSlot) -> Option<String> {
    let verb = if ctx.user.is_staff || slot.attendee.player_id == Some(ctx.user.id) {
        "update"
    } else {
        "detail"
    };
    ctx.object_url(slot, verb)
}

pub fn roster_rows(ctx: &ViewCtx, roster: &[RosterSlot]) -> Vec<Vec<Cell>> {
    roster
        .iter()
        .map(|slot| {
            vec![
                Cell::link(slot.display(), slot_url(ctx, slot)),
                Cell::new(slot.attendee.state().label()),
                Cell::link(
                    slot.substitute
                        .as_ref()
                        .map(|p| p.name.clone())
                        .unwrap_or_default(),
                    profile_url(ctx, slot.substitute.as_ref()),
                ),
            ]
        })
        .collect()
}

#[tracing::instrument(skip_all)]
pub async fn meet_detail(
    ctx: ViewCtx,
    Path(slug): Path<String>,
    mut conn: Conn<true>,
) -> StandardResponse {
    let meet = Meet::fetch_by_slug(&slug, &mut *conn)?;
    ensure(meet.has_view_permission(&ctx.user, &mut *conn)?)?;

    let can_update = meet.has_update_permission(&ctx.user, &mut *conn)?;
    let can_delete = meet.has_delete_permission(&ctx.user, &mut *conn)?;
    let manage_attendees = ctx.user.is_superuser || meet.manager_id == Some(ctx.user.id);

    let roster = load_roster(&meet, &mut *conn)?;
    let Some(info) = meet_infos(vec![meet.clone()], &mut *conn)?.pop() else {
        return err_not_found();
    };

    let mut detail = build_detail(
        &ctx,
        &meet,
        [
            ("Name", Cell::new(&meet.name)),
            (
                "Team",
                Cell::link(
                    info.team.as_ref().map(|t| t.name.clone()).unwrap_or_default(),
                    info.team.as_ref().and_then(|t| ctx.object_url(t, "detail")),
                ),
            ),
            ("Start", Cell::new(meet.starttime.format("%Y-%m-%d %H:%M").to_string())),
            ("Duration", Cell::new(format!("{} minutes", meet.duration_minutes))),
            (
                "End",
                Cell::new(
                    meet.endtime()
                        .map(|end| end.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_default(),
                ),
            ),
            (
                "Location",
                Cell::link(
                    info.location.as_ref().map(|l| l.name.clone()).unwrap_or_default(),
                    info.location.as_ref().and_then(|l| ctx.object_url(l, "detail")),
                ),
            ),
            (
                "Manager",
                Cell::link(
                    info.manager.as_ref().map(|p| p.name.clone()).unwrap_or_default(),
                    profile_url(&ctx, info.manager.as_ref()),
                ),
            ),
            ("Min attendees", Cell::new(meet.min_attendees.to_string())),
            ("Max attendees", Cell::new(meet.max_attendees.to_string())),
        ],
        can_update,
        can_delete,
    );

    let comments = meet.comments_html();
    if !comments.is_empty() {
        detail.sections.push(DetailSection::Html {
            title: "Comments".to_string(),
            html: comments,
        });
    }

    let mut actions = Vec::new();
    if let Some(url) = ctx.reverse("meets:attendee_list", &[&meet.slug]) {
        actions.push((url, "All attendees".to_string()));
    }
    if manage_attendees {
        if let Some(url) = ctx.reverse("meets:attendee_list_update", &[&meet.slug]) {
            actions.push((url, "Manage attendees".to_string()));
        }
    }
    detail.sections.push(DetailSection::Table {
        title: "Attendees".to_string(),
        headers: vec!["Player", "Attendance", "Substitute"],
        rows: roster_rows(&ctx, &roster),
        actions,
    });

    success(ctx.render::<Meet>(
        &detail.title,
        "_detail",
        "site/model_detail",
        TemplateCtx::Detail(&detail),
    )?)
}

fn fetch_with(
    ctx: &ViewCtx,
    slug: &str,
    delete: bool,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<Meet, FailureResponse> {
    let meet = Meet::fetch_by_slug(slug, conn)?;
    let allowed = if delete {
        meet.has_delete_permission(&ctx.user, conn)?
    } else {
        meet.has_update_permission(&ctx.user, conn)?
    };
    ensure(allowed)?;
    Ok(meet)
}

#[tracing::instrument(skip_all)]
pub async fn update_meet_page(
    ctx: ViewCtx,
    Path(slug): Path<String>,
    mut conn: Conn<true>,
) -> StandardResponse {
    let meet = fetch_with(&ctx, &slug, false, &mut *conn)?;
    let page = MeetForm::from_meet(&meet).context(
        format!("Change meet {}", meet.name),
        ctx.path.clone(),
        Choices::load(&ctx.user, meet.team_id, &mut *conn)?,
        ctx.object_url(&meet, "detail"),
    );
    success(form_page(&ctx, &page)?)
}

#[tracing::instrument(skip_all)]
pub async fn do_update_meet(
    ctx: ViewCtx,
    Path(slug): Path<String>,
    mut conn: Conn<true>,
    Form(form): Form<MeetForm>,
) -> StandardResponse {
    let meet = fetch_with(&ctx, &slug, false, &mut *conn)?;
    let choices = Choices::load(&ctx.user, meet.team_id, &mut *conn)?;

    match form.validate(&choices) {
        Ok(mut data) => {
            data.slug = meet.slug.clone();
            let meet = update_meet(meet.id, data, &mut *conn)?;
            ctx.saved(&meet, "updated")
        }
        Err(errors) => {
            let page = form
                .context(
                    format!("Change meet {}", meet.name),
                    ctx.path.clone(),
                    choices,
                    ctx.object_url(&meet, "detail"),
                )
                .with_errors(&errors);
            bad_request(form_page(&ctx, &page)?)
        }
    }
}

#[tracing::instrument(skip_all)]
pub async fn delete_meet_page(
    ctx: ViewCtx,
    Path(slug): Path<String>,
    mut conn: Conn<true>,
) -> StandardResponse {
    let meet = fetch_with(&ctx, &slug, true, &mut *conn)?;
    let slots = attendees::table
        .filter(attendees::meet_id.eq(meet.id))
        .count()
        .get_result::<i64>(&mut *conn)?;

    let delete = build_delete(&ctx, &meet, vec![("attendees", slots)]);
    success(ctx.render::<Meet>(
        &delete.title,
        "_confirm_delete",
        "site/model_confirm_delete",
        TemplateCtx::Delete(&delete),
    )?)
}

#[tracing::instrument(skip_all)]
pub async fn do_delete_meet(
    ctx: ViewCtx,
    Path(slug): Path<String>,
    mut conn: Conn<true>,
) -> StandardResponse {
    let meet = fetch_with(&ctx, &slug, true, &mut *conn)?;
    diesel::delete(meets::table.find(meet.id)).execute(&mut *conn)?;
    tracing::info!(meet = meet.id, "deleted meet");
    ctx.deleted(&meet)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn team(id: i32, owner: Option<i32>) -> Team {
        Team {
            id,
            slug: format!("team-{id}"),
            name: format!("Team {id}"),
            join_password: String::new(),
            description: String::new(),
            owner_id: owner,
            created_at: NaiveDateTime::default(),
        }
    }

    #[test]
    fn initial_form_starts_tomorrow_on_the_hour() {
        let now = NaiveDate::from_ymd_opt(2024, 12, 31)
            .unwrap()
            .and_hms_opt(18, 42, 10)
            .unwrap();
        let form = MeetForm::initial(&[team(4, Some(9)), team(5, None)], now);
        assert_eq!(form.starttime, "2025-01-01T18:00");
        assert_eq!(form.team, "4");
        assert_eq!(form.manager, "9");
        assert_eq!(form.duration, "90");
    }

    fn choices() -> Choices {
        Choices {
            teams: vec![("4".to_string(), "Team 4".to_string())],
            locations: vec![],
            users: vec![("9".to_string(), "Owner".to_string())],
        }
    }

    #[test]
    fn validation_requires_team_and_time() {
        let form = MeetForm {
            name: "Friday".to_string(),
            starttime: "soon".to_string(),
            duration: "90".to_string(),
            min_attendees: "1".to_string(),
            max_attendees: "1".to_string(),
            ..Default::default()
        };
        let errors = form.validate(&choices()).unwrap_err();
        assert!(errors.contains_key("team"));
        assert!(errors.contains_key("starttime"));
    }

    #[test]
    fn validation_rejects_foreign_choices() {
        let form = MeetForm {
            name: "Friday".to_string(),
            team: "5".to_string(),
            starttime: "2024-05-03T19:00".to_string(),
            duration: "90".to_string(),
            min_attendees: "2".to_string(),
            max_attendees: "4".to_string(),
            ..Default::default()
        };
        assert!(form.validate(&choices()).unwrap_err().contains_key("team"));

        let ok = MeetForm {
            team: "4".to_string(),
            ..form
        }
        .validate(&choices())
        .unwrap();
        assert_eq!(ok.team_id, Some(4));
        assert_eq!(ok.manager_id, None);
        assert_eq!(ok.min_attendees, 2);
    }

    #[test]
    fn validation_bounds_the_schedule() {
        let form = MeetForm {
            name: "Friday".to_string(),
            team: "4".to_string(),
            starttime: "+260000-01-01T00:00".to_string(),
            duration: i32::MAX.to_string(),
            min_attendees: "1".to_string(),
            max_attendees: "1".to_string(),
            ..Default::default()
        };
        let errors = form.validate(&choices()).unwrap_err();
        assert!(errors.contains_key("starttime"));
        assert!(errors.contains_key("duration"));
    }
}
