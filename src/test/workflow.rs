use std::time::Duration;

use axum::http::{StatusCode, header::CONTENT_TYPE};
use chrono::{Days, NaiveDate, Utc};
use diesel::prelude::*;
use serde_json::json;

use super::{Harness, assert_res_ok, body_json, body_text, location};
use crate::{
    auth::User,
    meets::{Attendee, Meet, MeetData, create_meet},
    schema::{attendees, meets, team_members, teams},
    teams::{Team, TeamData, create_team},
};

/// A team owned by `owner` with a meet of `slots` empty roster slots.
fn team_with_meet(h: &Harness, owner: &User, slots: i32) -> (Team, Meet) {
    let mut conn = h.pool.get().unwrap();
    let team = create_team(
        TeamData {
            name: "Tuesday Club".to_string(),
            join_password: "shuttle".to_string(),
            owner_id: Some(owner.id),
            ..Default::default()
        },
        owner,
        &mut *conn,
    )
    .unwrap();
    let start = NaiveDate::from_ymd_opt(2030, 1, 8)
        .unwrap()
        .and_hms_opt(19, 30, 0)
        .unwrap();
    let meet = create_meet(
        MeetData {
            team_id: Some(team.id),
            min_attendees: slots,
            max_attendees: slots,
            ..MeetData::new("Club night", start)
        },
        &mut *conn,
    )
    .unwrap();
    (team, meet)
}

#[tokio::test]
async fn anonymous_visitors_are_sent_to_login() {
    let h = Harness::new();

    let res = h.get("/", None).await;
    assert_eq!(location(&res), "/login");

    let res = h.get("/meets/", None).await;
    assert!(res.status().is_redirection());
    assert!(location(&res).starts_with("/login?next="), "{}", location(&res));

    let res = h.get("/meets/api/", None).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        body_json(res).await["detail"],
        "Authentication credentials were not provided."
    );

    let res = h.get("/no-such-module/", None).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn registration_leads_to_the_dashboard() {
    let h = Harness::new();

    let res = h
        .post_form(
            "/register",
            None,
            &[
                ("username", "carol"),
                ("email", "carol@example.com"),
                ("password", "password"),
                ("password2", "password"),
            ],
        )
        .await;
    assert_res_ok!(res);

    let res = h
        .post_form(
            "/register",
            None,
            &[
                ("username", "carol"),
                ("email", "carol@example.com"),
                ("password", "password"),
                ("password2", "password"),
            ],
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(res).await.contains("already taken"));

    let cookie = h.login("carol").await;
    let res = h.get("/", Some(&cookie)).await;
    assert_eq!(location(&res), "/dashboard/");

    let res = h.get("/dashboard/", Some(&cookie)).await;
    assert_eq!(res.status(), StatusCode::OK);
    let page = body_text(res).await;
    assert!(page.contains("Upcoming meets"));
    assert!(page.contains("Dashboard"));
}

#[tokio::test]
async fn a_team_schedules_a_meet_and_fills_its_roster() {
    let h = Harness::new();
    let admin = h.user("admin", true);
    let bob = h.user("bob", false);
    let admin_cookie = h.login("admin").await;
    let bob_cookie = h.login("bob").await;

    let bob_id = bob.id.to_string();
    let admin_id = admin.id.to_string();

    // Only superusers create teams.
    let team_form = [
        ("name", "Tuesday Club"),
        ("join_password", "shuttle"),
        ("description", "Weekly doubles"),
        ("owner", admin_id.as_str()),
    ];
    let res = h.post_form("/teams/create/", Some(&bob_cookie), &team_form).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let res = h.post_form("/teams/create/", Some(&admin_cookie), &team_form).await;
    assert_res_ok!(res);

    let team_id: i32 = {
        let mut conn = h.pool.get().unwrap();
        teams::table
            .filter(teams::name.eq("Tuesday Club"))
            .select(teams::id)
            .first(&mut conn)
            .unwrap()
    };
    let team = team_id.to_string();

    let res = h
        .post_form(
            "/teams/join/",
            Some(&bob_cookie),
            &[("team", team.as_str()), ("password", "badminton")],
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(
        body_text(res)
            .await
            .contains("Password to join the team is incorrect")
    );
    let res = h
        .post_form(
            "/teams/join/",
            Some(&bob_cookie),
            &[("team", team.as_str()), ("password", "shuttle"), ("rating", "120")],
        )
        .await;
    assert_res_ok!(res);
    {
        let mut conn = h.pool.get().unwrap();
        let members = team_members::table
            .filter(team_members::team_id.eq(team_id))
            .count()
            .get_result::<i64>(&mut conn)
            .unwrap();
        assert_eq!(members, 2);
    }

    let res = h
        .post_form(
            "/meets/create/",
            Some(&admin_cookie),
            &[
                ("name", "Club night"),
                ("team", team.as_str()),
                ("starttime", "2030-01-08T19:30"),
                ("duration", "90"),
                ("location", ""),
                ("manager", ""),
                ("min_attendees", "2"),
                ("max_attendees", "4"),
                ("comments", "Bring <em>water</em><script>alert(1)</script>"),
            ],
        )
        .await;
    assert_res_ok!(res);

    let (meet, slots) = {
        let mut conn = h.pool.get().unwrap();
        let meet = meets::table
            .filter(meets::team_id.eq(team_id))
            .select(Meet::as_select())
            .first::<Meet>(&mut conn)
            .unwrap();
        let slots = attendees::table
            .filter(attendees::meet_id.eq(meet.id))
            .select(Attendee::as_select())
            .order_by(attendees::id.asc())
            .load::<Attendee>(&mut conn)
            .unwrap();
        (meet, slots)
    };
    assert_eq!(meet.manager_id, Some(admin.id));
    assert_eq!(slots.len(), 2);

    let detail = format!("/meets/{}/", meet.slug);
    let res = h.get(&detail, Some(&bob_cookie)).await;
    assert_eq!(res.status(), StatusCode::OK);
    let page = body_text(res).await;
    assert!(page.contains("<p>Bring <em>water</em></p>"));
    assert!(!page.contains("<script>alert"));

    let roster = format!("/meets/{}/attendees/update/", meet.slug);
    let res = h.get(&roster, Some(&bob_cookie)).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let (first, second) = (slots[0].id.to_string(), slots[1].id.to_string());
    let rows = |p0: &str, p1: &str| {
        [
            ("form-TOTAL_FORMS", "2"),
            ("form-0-id", first.as_str()),
            ("form-0-player", p0),
            ("form-0-attendance", "--"),
            ("form-0-substitute", ""),
            ("form-1-id", second.as_str()),
            ("form-1-player", p1),
            ("form-1-attendance", "NS"),
            ("form-1-substitute", ""),
        ]
        .map(|(k, v)| (k.to_string(), v.to_string()))
    };

    let res = h
        .post_form(&roster, Some(&admin_cookie), &rows(&bob_id, &bob_id))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(res).await.contains("duped players."));

    let res = h
        .post_form(&roster, Some(&admin_cookie), &rows(&bob_id, &admin_id))
        .await;
    assert_eq!(location(&res), format!("/meets/{}/attendees/", meet.slug));

    let slots = {
        let mut conn = h.pool.get().unwrap();
        attendees::table
            .filter(attendees::meet_id.eq(meet.id))
            .select(Attendee::as_select())
            .order_by(attendees::id.asc())
            .load::<Attendee>(&mut conn)
            .unwrap()
    };
    assert_eq!(slots[0].player_id, Some(bob.id));
    // A filled slot is at least "assigned".
    assert_eq!(slots[0].attendance, "AS");
    assert_eq!(slots[1].attendance, "NS");

    let res = h
        .get(&format!("/meets/{}/attendees/", meet.slug), Some(&bob_cookie))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(body_text(res).await.contains("Attendees of Club night"));

    // The JSON api.
    let res = h.get("/meets/api/?q=club", Some(&bob_cookie)).await;
    assert_eq!(res.status(), StatusCode::OK);
    let page = body_json(res).await;
    assert_eq!(page["count"], 1);
    assert_eq!(page["results"][0]["slug"], meet.slug.as_str());
    let res = h.get("/meets/api/?q=%25", Some(&bob_cookie)).await;
    assert_eq!(body_json(res).await["count"], 0);

    let res = h
        .send_json(
            "PUT",
            &format!("/meets/api/{}/update/", meet.slug),
            Some(&bob_cookie),
            json!({ "name": "Hijacked" }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    // Attendance links need no login; the token changes after use.
    let token_url = format!("/meets/api/attendance/{}/update", slots[0].token);
    let res = h.get(&token_url, None).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["attendance"], "AS");
    let res = h
        .send_json("PUT", &token_url, None, json!({ "attendance": "OK" }))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["attendance"], "OK");
    let res = h.get(&token_url, None).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    // Calendar feeds.
    let res = h
        .get(&format!("/dashboard/api/{}/calendar/2030/1/", bob.id), None)
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let calendar = body_json(res).await;
    assert_eq!(calendar["monthly"].as_array().unwrap().len(), 1);
    assert_eq!(calendar["monthly"][0]["name"], "Club night");
    assert_eq!(calendar["monthly"][0]["enddate"], "2030-01-08T21:00:00");

    let res = h
        .get(&format!("/dashboard/api/{}/calendar.xml", bob.id), None)
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(
        res.headers()[CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("application/xml")
    );
    assert!(body_text(res).await.ends_with("</monthly>"));

    let res = h.get("/dashboard/api/9999/calendar/2030/1/", None).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    // Deleting the meet takes its roster with it.
    let res = h
        .send_json(
            "DELETE",
            &format!("/meets/api/{}/delete/", meet.slug),
            Some(&admin_cookie),
            json!({}),
        )
        .await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    drop(res);
    let mut conn = h.pool.get().unwrap();
    let left = attendees::table
        .count()
        .get_result::<i64>(&mut conn)
        .unwrap();
    assert_eq!(left, 0);
}

#[tokio::test]
async fn the_login_page_is_served() {
    let h = Harness::new();
    let server = axum_test::TestServer::new(h.app.clone()).unwrap();

    let res = server.get("/login").await;
    res.assert_status_ok();
    assert!(res.text().contains("Register"));

    let res = server
        .post("/login")
        .form(&[("id", "nobody"), ("password", "wrong")])
        .await;
    res.assert_status(StatusCode::BAD_REQUEST);
    assert!(res.text().contains("Incorrect username or password."));
}

#[tokio::test]
async fn expired_attendance_links_are_gone() {
    let h = Harness::new();
    let admin = h.user("admin", true);
    let (_, meet) = team_with_meet(&h, &admin, 1);

    let slot = {
        let mut conn = h.pool.get().unwrap();
        let slot = attendees::table
            .filter(attendees::meet_id.eq(meet.id))
            .select(Attendee::as_select())
            .first::<Attendee>(&mut conn)
            .unwrap();
        let yesterday = Utc::now().naive_utc() - Days::new(1);
        diesel::update(attendees::table.find(slot.id))
            .set(attendees::token_expiration.eq(yesterday))
            .execute(&mut conn)
            .unwrap();
        slot
    };

    let url = format!("/meets/api/attendance/{}/update", slot.token);
    let res = h.get(&url, None).await;
    assert_eq!(res.status(), StatusCode::GONE);
    assert_eq!(body_json(res).await["detail"], "This link has expired.");

    let res = h
        .send_json("PUT", &url, None, json!({ "attendance": "OK" }))
        .await;
    assert_eq!(res.status(), StatusCode::GONE);
    drop(res);
    let mut conn = h.pool.get().unwrap();
    let state = attendees::table
        .find(slot.id)
        .select(attendees::attendance)
        .first::<String>(&mut conn)
        .unwrap();
    assert_eq!(state, "--");
}

#[tokio::test]
async fn disabled_modules_answer_not_installed() {
    let h = Harness::with_disabled(&["locations"]);
    h.user("admin", true);
    let cookie = h.login("admin").await;

    for path in ["/locations/", "/locations/create/", "/locations/town-hall/"] {
        let res = h.get(path, Some(&cookie)).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND, "{path}");
        assert_eq!(body_text(res).await, "Module not installed");
    }

    let res = h.get("/meets/", Some(&cookie)).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(!body_text(res).await.contains("/locations/"));
}

#[tokio::test]
async fn schedules_out_of_range_are_refused() {
    let h = Harness::new();
    let admin = h.user("admin", true);
    let cookie = h.login("admin").await;
    let (team, _) = team_with_meet(&h, &admin, 1);

    let res = h
        .send_json(
            "POST",
            "/meets/api/create/",
            Some(&cookie),
            json!({
                "name": "Far away",
                "team": team.id,
                "starttime": "+260000-01-01T00:00:00",
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let detail = body_json(res).await["detail"].to_string();
    assert!(detail.contains("starttime"), "{detail}");

    let res = h
        .send_json(
            "POST",
            "/meets/api/create/",
            Some(&cookie),
            json!({
                "name": "Forever",
                "team": team.id,
                "starttime": "2030-01-09T19:30:00",
                "duration": i32::MAX,
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let detail = body_json(res).await["detail"].to_string();
    assert!(detail.contains("duration"), "{detail}");

    let team_id = team.id.to_string();
    let res = h
        .post_form(
            "/meets/create/",
            Some(&cookie),
            &[
                ("name", "Forever"),
                ("team", team_id.as_str()),
                ("starttime", "2030-01-09T19:30"),
                ("duration", "100000"),
                ("location", ""),
                ("manager", ""),
                ("min_attendees", "1"),
                ("max_attendees", "1"),
                ("comments", ""),
            ],
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    drop(res);

    let mut conn = h.pool.get().unwrap();
    let count = meets::table.count().get_result::<i64>(&mut conn).unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn roster_posts_cannot_outgrow_the_roster() {
    let h = Harness::new();
    let admin = h.user("admin", true);
    let cookie = h.login("admin").await;
    let (_, meet) = team_with_meet(&h, &admin, 2);

    let url = format!("/meets/{}/attendees/update/", meet.slug);
    for total in [usize::MAX.to_string(), "1000000000".to_string(), "3".to_string()] {
        let res = h
            .post_form(&url, Some(&cookie), &[("form-TOTAL_FORMS", total.as_str())])
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{total}");
        assert!(body_text(res).await.contains("Please submit at most 2 forms."));
    }
}

#[tokio::test]
async fn passwords_can_be_changed() {
    let h = Harness::new();
    h.user("bob", false);
    let cookie = h.login("bob").await;

    let res = h.get("/users/password_change/", Some(&cookie)).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(body_text(res).await.contains("new_password2"));

    let res = h
        .post_form(
            "/users/password_change/",
            Some(&cookie),
            &[
                ("old_password", "not-it"),
                ("new_password1", "racquet"),
                ("new_password2", "racquet"),
            ],
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(
        body_text(res)
            .await
            .contains("Your old password was entered incorrectly")
    );

    let res = h
        .post_form(
            "/users/password_change/",
            Some(&cookie),
            &[
                ("old_password", super::PASSWORD),
                ("new_password1", "racquet"),
                ("new_password2", "racquet"),
            ],
        )
        .await;
    assert_eq!(location(&res), "/users/");

    h.login_with("bob", "racquet").await;
    let res = h
        .post_form(
            "/login",
            None,
            &[("id", "bob"), ("password", super::PASSWORD)],
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn database_outages_are_server_errors() {
    let h = Harness::with_timeout(Duration::from_millis(200));
    h.user("bob", false);
    let cookie = h.login("bob").await;

    let held = h.pool.get().unwrap();
    let res = h.get("/", Some(&cookie)).await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let res = h.get("/users/", Some(&cookie)).await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    drop(held);

    let res = h.get("/users/", Some(&cookie)).await;
    assert!(res.status().is_redirection());
}

#[tokio::test]
async fn malformed_arguments_are_not_found() {
    let h = Harness::new();
    let admin = h.user("admin", true);
    let cookie = h.login("admin").await;
    let (_, meet) = team_with_meet(&h, &admin, 1);

    for path in [
        "/meets/?page=two".to_string(),
        "/meets/api/?page=two".to_string(),
        "/locations/?page=two".to_string(),
        format!("/dashboard/api/{}/calendar/20x0/1/", admin.id),
        format!("/dashboard/api/{}/calendar/2030/jan/", admin.id),
        "/dashboard/api/me/calendar.xml".to_string(),
        "/users/me/".to_string(),
        format!("/meets/{}/attendees/first/", meet.slug),
    ] {
        let res = h.get(&path, Some(&cookie)).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND, "{path}");
    }

    let res = h.get("/meets/api/?page=last", Some(&cookie)).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["count"], 1);
}
