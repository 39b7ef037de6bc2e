//! Seeds a database with demo users, a team, locations and a month of meets.

use std::{error::Error, fs::File};

use chrono::{Datelike, Duration, Local, NaiveTime, Weekday};
use clap::Parser;
use cworg::{
    auth::register::{NewUser, create_user},
    locations::{LocationData, create_location},
    meets::{
        AttendanceState, AttendeeData, MeetData, create_meet, load_roster,
        update_attendee,
    },
    schema::users,
    teams::{DEFAULT_RATING, TeamData, add_member, create_team},
};
use diesel::{Connection, SqliteConnection, prelude::*};
use diesel_migrations::MigrationHarness;
use serde::Deserialize;

#[derive(Parser)]
pub struct Seed {
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,
    /// Number of weekly meets to create.
    #[arg(long, default_value_t = 4)]
    weeks: i64,
    #[arg(long, default_value = "src/bin/members.csv")]
    members: String,
    #[arg(long, default_value = "src/bin/locations.csv")]
    locations: String,
}

#[derive(Deserialize, Debug)]
struct MemberRow {
    username: String,
    email: String,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
}

#[derive(Deserialize, Debug)]
struct LocationRow {
    name: String,
    #[serde(default)]
    address: String,
    #[serde(default)]
    phone: String,
    #[serde(default)]
    homepage: String,
    #[serde(default)]
    description: String,
}

const PASSWORD: &str = "password";

fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    tracing_subscriber::fmt().init();
    let args = Seed::parse();

    let mut conn = SqliteConnection::establish(&args.database_url)?;
    conn.run_pending_migrations(cworg::MIGRATIONS)?;

    let existing = users::table.count().get_result::<i64>(&mut conn)?;
    if existing > 0 {
        tracing::warn!(users = existing, "database already has users; not seeding");
        return Ok(());
    }

    conn.transaction(|conn| seed(&args, conn))
}

fn seed(
    args: &Seed,
    conn: &mut SqliteConnection,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let admin = create_user(
        NewUser {
            username: "admin",
            email: "admin@example.com",
            password: PASSWORD,
            first_name: "Ada",
            last_name: "Admin",
            is_staff: true,
            is_superuser: true,
        },
        conn,
    )?;

    let team = create_team(
        TeamData {
            name: "Tuesday Club".to_string(),
            join_password: "shuttle".to_string(),
            description: "Weekly doubles.".to_string(),
            owner_id: Some(admin.id),
            ..Default::default()
        },
        &admin,
        conn,
    )?;

    let mut players = Vec::new();
    for row in csv::Reader::from_reader(File::open(&args.members)?).deserialize() {
        let row: MemberRow = row?;
        let user = create_user(
            NewUser {
                username: &row.username,
                email: &row.email,
                password: PASSWORD,
                first_name: &row.first_name,
                last_name: &row.last_name,
                is_staff: false,
                is_superuser: false,
            },
            conn,
        )?;
        add_member(team.id, user.id, DEFAULT_RATING, conn)?;
        players.push(user.id);
    }

    let mut venues = Vec::new();
    for row in csv::Reader::from_reader(File::open(&args.locations)?).deserialize() {
        let row: LocationRow = row?;
        let location = create_location(
            LocationData {
                name: row.name,
                address: row.address,
                phone: row.phone,
                homepage: row.homepage,
                description: row.description,
                ..Default::default()
            },
            conn,
        )?;
        venues.push(location.id);
    }

    let today = Local::now().date_naive();
    let days_ahead = (7 + Weekday::Tue.num_days_from_monday()
        - today.weekday().num_days_from_monday())
        % 7;
    let first = today + Duration::days(i64::from(days_ahead));
    let evening = NaiveTime::from_hms_opt(19, 30, 0).unwrap_or_default();

    for week in 0..args.weeks {
        let meet = create_meet(
            MeetData {
                team_id: Some(team.id),
                location_id: venues.get(week as usize % venues.len().max(1)).copied(),
                min_attendees: 4,
                max_attendees: 6,
                ..MeetData::new(
                    "Club night",
                    (first + Duration::weeks(week)).and_time(evening),
                )
            },
            conn,
        )?;

        for (i, slot) in load_roster(&meet, conn)?.iter().enumerate() {
            let pick = (i + week as usize) % players.len().max(1);
            let Some(player) = players.get(pick) else {
                continue;
            };
            update_attendee(
                slot.attendee.id,
                AttendeeData {
                    player_id: Some(*player),
                    attendance: AttendanceState::Assigned,
                    substitute_id: None,
                },
                conn,
            )?;
        }
    }

    tracing::info!(
        players = players.len(),
        locations = venues.len(),
        meets = args.weeks,
        "seeded; log in as admin/{PASSWORD}"
    );
    Ok(())
}
