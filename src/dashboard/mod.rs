//! The landing page of a logged-in user and the dashboard calendar feeds.

use axum::routing::get;
use chrono::{Local, NaiveDateTime};
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use hypertext::prelude::*;

use crate::{
    calendar,
    meets::{Meet, meet_infos},
    permission::team_ids_of,
    schema::{meets, teams},
    sitemodule::{SiteModule, path},
    state::Conn,
    teams::{Team, views::profile_url},
    userprofile::people,
    util_resp::{StandardResponse, success},
    views::{Cell, ViewCtx},
    widgets::table::Table,
};

pub const UPCOMING: i64 = 5;

/// The next meets of the teams of `user_id`, from `since` on.
pub fn upcoming_meets(
    user_id: i32,
    since: NaiveDateTime,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> QueryResult<Vec<Meet>> {
    let teams = team_ids_of(user_id, conn)?;
    meets::table
        .filter(meets::team_id.eq_any(teams))
        .filter(meets::starttime.ge(since))
        .select(Meet::as_select())
        .order_by(meets::starttime.asc())
        .limit(UPCOMING)
        .load(conn)
}

struct Dashboard<'a> {
    teams: &'a [Vec<Cell>],
    meets: &'a [Vec<Cell>],
}

impl Renderable for Dashboard<'_> {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        maud! {
            div class="row g-4" {
                div class="col-lg-7" {
                    h2 class="h5" { "Upcoming meets" }
                    Table headers=(&["Meet", "Team", "Date"]) rows=(self.meets);
                }
                div class="col-lg-5" {
                    h2 class="h5" { "My teams" }
                    Table headers=(&["Team", "Owner"]) rows=(self.teams);
                }
            }
        }
        .render_to(buffer);
    }
}

#[tracing::instrument(skip_all)]
pub async fn dashboard(ctx: ViewCtx, mut conn: Conn<true>) -> StandardResponse {
    let team_ids = team_ids_of(ctx.user.id, &mut *conn)?;
    let my_teams = teams::table
        .filter(teams::id.eq_any(&team_ids))
        .select(Team::as_select())
        .order_by(teams::name.asc())
        .load::<Team>(&mut *conn)?;
    let owners = people(my_teams.iter().filter_map(|t| t.owner_id), &mut *conn)?;
    let team_rows = my_teams
        .iter()
        .map(|team| {
            let owner = team.owner_id.and_then(|id| owners.get(&id));
            vec![
                Cell::link(&team.name, ctx.object_url(team, "detail")),
                Cell::link(
                    owner.map(|p| p.name.clone()).unwrap_or_default(),
                    profile_url(&ctx, owner),
                ),
            ]
        })
        .collect::<Vec<_>>();

    let today = Local::now().date_naive().and_time(Default::default());
    let upcoming = upcoming_meets(ctx.user.id, today, &mut *conn)?;
    let meet_rows = meet_infos(upcoming, &mut *conn)?
        .into_iter()
        .map(|info| {
            vec![
                Cell::link(&info.meet.name, ctx.object_url(&info.meet, "detail")),
                Cell::new(info.team.map(|t| t.name).unwrap_or_default()),
                Cell::new(info.meet.starttime.format("%Y-%m-%d %H:%M").to_string()),
            ]
        })
        .collect::<Vec<_>>();

    success(
        ctx.page()
            .title("Dashboard")
            .body(Dashboard {
                teams: &team_rows,
                meets: &meet_rows,
            })
            .render(),
    )
}

pub fn module() -> SiteModule {
    SiteModule::new("dashboard")
        .verbose_name("Dashboard", "Dashboard")
        .icon("dashboard")
        .order(10)
        .description("Your teams and upcoming meets")
        .index("dashboard")
        .menu_item("Dashboard", "dashboard")
        .urls(vec![
            path("", get(dashboard), "dashboard"),
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

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate};
    use diesel::{Connection, SqliteConnection};
    use diesel_migrations::MigrationHarness;

    use super::*;
    use crate::{
        MIGRATIONS,
        auth::register::{NewUser, create_user},
        meets::{MeetData, create_meet},
        teams::{TeamData, create_team},
    };

    #[test]
    fn upcoming_is_limited_to_own_teams_and_future() {
        let mut conn = SqliteConnection::establish(":memory:").unwrap();
        conn.run_pending_migrations(MIGRATIONS).unwrap();
        let user = create_user(
            NewUser {
                username: "ann",
                email: "ann@example.com",
                password: "password",
                first_name: "",
                last_name: "",
                is_staff: false,
                is_superuser: false,
            },
            &mut conn,
        )
        .unwrap();
        let mine = create_team(
            TeamData {
                name: "Mine".to_string(),
                owner_id: Some(user.id),
                ..Default::default()
            },
            &user,
            &mut conn,
        )
        .unwrap();

        let base = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        for day in 0..8 {
            create_meet(
                MeetData {
                    team_id: Some(mine.id),
                    ..MeetData::new("Practice", base + Duration::days(day - 1))
                },
                &mut conn,
            )
            .unwrap();
        }
        create_meet(MeetData::new("Elsewhere", base), &mut conn).unwrap();

        let upcoming = upcoming_meets(user.id, base, &mut conn).unwrap();
        assert_eq!(upcoming.len(), UPCOMING as usize);
        assert!(upcoming.iter().all(|m| m.starttime >= base));
        assert!(upcoming.windows(2).all(|w| w[0].starttime <= w[1].starttime));
        assert!(upcoming.iter().all(|m| m.team_id == Some(mine.id)));
    }
}
