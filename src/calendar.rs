//! Monthly calendar feeds of the meets of a user's teams.
//!
//! The same events are served as JSON (`{"monthly": [...]}`) for a given
//! month and as XML for the current month. Feeds are addressed by user id
//! so that calendar clients can subscribe without a session.

use axum::{
    Json,
    http::header::CONTENT_TYPE,
    response::{IntoResponse, Response},
};
use chrono::{Datelike, Local, NaiveDate, NaiveDateTime};
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use serde::Serialize;

use crate::{
    auth::User,
    meets::Meet,
    permission::team_ids_of,
    schema::meets,
    sitemodule::urls::Kwargs,
    state::Conn,
    util_resp::FailureResponse,
};

pub const EVENT_COLOR: &str = "tomato";

const XML_DATETIME: &str = "%Y-%m-%d %H:%M:%S";

/// `[first of the month, first of the next month)`.
pub fn month_range(year: i32, month: u32) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let end = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((start.and_hms_opt(0, 0, 0)?, end.and_hms_opt(0, 0, 0)?))
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct CalendarEvent {
    pub id: i32,
    pub name: String,
    pub date: NaiveDateTime,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub startdate: NaiveDateTime,
    pub enddate: NaiveDateTime,
    pub color: &'static str,
    pub url: String,
}

impl From<&Meet> for CalendarEvent {
    fn from(meet: &Meet) -> Self {
        Self {
            id: meet.id,
            name: meet.name.clone(),
            date: meet.starttime,
            kind: "meet",
            startdate: meet.starttime,
            enddate: meet.endtime().unwrap_or(meet.starttime),
            color: EVENT_COLOR,
            url: format!("meets/{}", meet.slug),
        }
    }
}

/// Meets of the teams of `user_id` starting in `range`, earliest first.
pub fn events(
    user_id: i32,
    (start, end): (NaiveDateTime, NaiveDateTime),
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> QueryResult<Vec<CalendarEvent>> {
    let teams = team_ids_of(user_id, conn)?;
    let rows = meets::table
        .filter(meets::team_id.eq_any(teams))
        .filter(meets::starttime.ge(start).and(meets::starttime.lt(end)))
        .select(Meet::as_select())
        .order_by(meets::starttime.asc())
        .load::<Meet>(conn)?;
    Ok(rows.iter().map(CalendarEvent::from).collect())
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

/// `<monthly><list-item><event>...</event></list-item>...</monthly>`
pub fn to_xml(events: &[CalendarEvent]) -> String {
    let mut xml =
        String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<monthly>");
    for e in events {
        let fields = [
            ("id", e.id.to_string()),
            ("name", escape(&e.name)),
            ("startdate", e.startdate.format(XML_DATETIME).to_string()),
            ("enddate", e.enddate.format(XML_DATETIME).to_string()),
            ("color", e.color.to_string()),
            ("url", escape(&e.url)),
        ];
        xml.push_str("<list-item><event>");
        for (tag, value) in fields {
            xml.push_str(&format!("<{tag}>{value}</{tag}>"));
        }
        xml.push_str("</event></list-item>");
    }
    xml.push_str("</monthly>");
    xml
}

#[tracing::instrument(skip_all)]
pub async fn calendar_xml(
    Kwargs(pk): Kwargs<i32>,
    mut conn: Conn<true>,
) -> Result<Response, FailureResponse> {
    let user = User::fetch(pk, &mut *conn)?;
    let today = Local::now().date_naive();
    let range = month_range(today.year(), today.month())
        .ok_or(FailureResponse::NotFound(()))?;
    let events = events(user.id, range, &mut *conn)?;
    Ok(([(CONTENT_TYPE, "application/xml; charset=utf-8")], to_xml(&events))
        .into_response())
}

#[derive(Serialize, Debug)]
pub struct Monthly {
    pub monthly: Vec<CalendarEvent>,
}

#[tracing::instrument(skip_all)]
pub async fn calendar_json(
    Kwargs((pk, year, month)): Kwargs<(i32, i32, u32)>,
    mut conn: Conn<true>,
) -> Result<Json<Monthly>, FailureResponse> {
    let user = User::fetch(pk, &mut *conn)?;
    let range = month_range(year, month).ok_or(FailureResponse::NotFound(()))?;
    Ok(Json(Monthly {
        monthly: events(user.id, range, &mut *conn)?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn december_rolls_over() {
        assert_eq!(
            month_range(2024, 12),
            Some((at(2024, 12, 1, 0), at(2025, 1, 1, 0)))
        );
        assert_eq!(
            month_range(2024, 2),
            Some((at(2024, 2, 1, 0), at(2024, 3, 1, 0)))
        );
        assert_eq!(month_range(2024, 13), None);
        assert_eq!(month_range(2024, 0), None);
    }

    fn meet() -> Meet {
        Meet {
            id: 7,
            slug: "bar-night".to_string(),
            name: "Bar & <Grill>".to_string(),
            team_id: Some(1),
            location_id: None,
            manager_id: None,
            starttime: at(2024, 5, 3, 19),
            duration_minutes: 90,
            min_attendees: 1,
            max_attendees: 1,
            comments: String::new(),
        }
    }

    #[test]
    fn event_fields() {
        let event = CalendarEvent::from(&meet());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "meet");
        assert_eq!(json["color"], "tomato");
        assert_eq!(json["url"], "meets/bar-night");
        assert_eq!(json["enddate"], "2024-05-03T20:30:00");
    }

    #[test]
    fn xml_is_escaped() {
        let xml = to_xml(&[CalendarEvent::from(&meet())]);
        assert!(xml.contains("<monthly><list-item><event><id>7</id>"));
        assert!(xml.contains("<name>Bar &amp; &lt;Grill&gt;</name>"));
        assert!(xml.contains("<startdate>2024-05-03 19:00:00</startdate>"));
        assert!(xml.ends_with("</event></list-item></monthly>"));
        assert!(to_xml(&[]).ends_with("<monthly></monthly>"));
    }
}
