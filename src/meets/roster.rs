//! Editing a whole roster at once.
//!
//! The page is a formset with one row per attendee slot. Every row posts
//! `form-<i>-id`, `form-<i>-player`, `form-<i>-attendance` and
//! `form-<i>-substitute`; `form-TOTAL_FORMS` tells how many rows there are.

use std::collections::{HashMap, HashSet};

use axum::{Form, extract::Path};

use crate::{
    meets::{
        AttendanceState, AttendeeData, Meet, RosterSlot,
        attendees_views::member_choices, load_roster, update_attendee,
    },
    msg::{Level, Msg},
    permission::{ModelPermissions, ensure},
    sitemodule::templates::TemplateCtx,
    state::Conn,
    util_resp::{FailureResponse, StandardResponse, bad_request, err_not_found, success},
    views::{
        FieldErrors, FormContext, Formset, ViewCtx,
        form::{
            Field, FieldKind, NON_FIELD, add_error, check_choice, formset_name,
            parse_optional_id,
        },
    },
};

/// One posted row, as strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterRow {
    pub id: String,
    pub player: String,
    pub attendance: String,
    pub substitute: String,
}

impl RosterRow {
    fn from_slot(slot: &RosterSlot) -> Self {
        let id = |v: Option<i32>| v.map(|v| v.to_string()).unwrap_or_default();
        Self {
            id: slot.attendee.id.to_string(),
            player: id(slot.attendee.player_id),
            attendance: slot.attendee.state().code().to_string(),
            substitute: id(slot.attendee.substitute_id),
        }
    }
}

/// Reads the rows of a posted formset, at most `max` of them. Missing
/// fields read as blank.
pub fn parse_rows(
    data: &HashMap<String, String>,
    max: usize,
) -> Result<Vec<RosterRow>, String> {
    let total = data
        .get("form-TOTAL_FORMS")
        .and_then(|v| v.trim().parse::<usize>().ok())
        .ok_or_else(|| {
            "ManagementForm data is missing or has been tampered with".to_string()
        })?;
    if total > max {
        return Err(format!("Please submit at most {max} forms."));
    }

    let field = |i: usize, name: &str| {
        data.get(&formset_name(i, name)).cloned().unwrap_or_default()
    };
    Ok((0..total)
        .map(|i| RosterRow {
            id: field(i, "id"),
            player: field(i, "player"),
            attendance: field(i, "attendance"),
            substitute: field(i, "substitute"),
        })
        .collect())
}

/// Checks every row against the roster of the meet and the members of its
/// team. Returns the new state of each slot, keyed by attendee id.
pub fn validate_rows(
    rows: &[RosterRow],
    roster: &[RosterSlot],
    members: &[(String, String)],
) -> Result<Vec<(i32, AttendeeData)>, FieldErrors> {
    let mut errors = FieldErrors::new();
    let mut cleaned = Vec::with_capacity(rows.len());
    let mut seen_slots = HashSet::new();

    for (i, row) in rows.iter().enumerate() {
        let name = |field: &str| formset_name(i, field);

        let slot = row
            .id
            .trim()
            .parse::<i32>()
            .ok()
            .filter(|id| roster.iter().any(|s| s.attendee.id == *id));
        let Some(slot) = slot.filter(|id| seen_slots.insert(*id)) else {
            add_error(
                &mut errors,
                NON_FIELD,
                format!("Row {} is not part of this roster.", i + 1),
            );
            continue;
        };

        let mut select = |field: &str, value: &str| match parse_optional_id(value) {
            Ok(id) => {
                check_choice(&mut errors, &name(field), id, members);
                id
            }
            Err(e) => {
                add_error(&mut errors, &name(field), e);
                None
            }
        };
        let player_id = select("player", &row.player);
        let substitute_id = select("substitute", &row.substitute);

        let Some(attendance) = AttendanceState::from_code(&row.attendance) else {
            add_error(&mut errors, &name("attendance"), "Select a valid choice.");
            continue;
        };
        if player_id.is_some() && player_id == substitute_id {
            add_error(
                &mut errors,
                &name("substitute"),
                "The substitute must be someone other than the player.",
            );
        }

        cleaned.push((
            slot,
            AttendeeData {
                player_id,
                attendance,
                substitute_id,
            },
        ));
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    let mut players = HashSet::new();
    if cleaned
        .iter()
        .filter_map(|(_, data)| data.player_id)
        .any(|player| !players.insert(player))
    {
        add_error(&mut errors, NON_FIELD, "duped players.");
        return Err(errors);
    }
    Ok(cleaned)
}

fn context(
    ctx: &ViewCtx,
    meet: &Meet,
    rows: &[RosterRow],
    members: &[(String, String)],
) -> FormContext {
    let rows = rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let substitutes = members
                .iter()
                .filter(|(id, _)| *id != row.player)
                .cloned()
                .collect();
            vec![
                Field::new(formset_name(i, "id"), "", FieldKind::Hidden).value(&row.id),
                Field::new(
                    formset_name(i, "player"),
                    "Player",
                    FieldKind::Select(members.to_vec()),
                )
                .value(&row.player),
                Field::new(
                    formset_name(i, "attendance"),
                    "Attendance",
                    FieldKind::Select(AttendanceState::choices()),
                )
                .value(&row.attendance)
                .required(),
                Field::new(
                    formset_name(i, "substitute"),
                    "Substitute",
                    FieldKind::Select(substitutes),
                )
                .value(&row.substitute),
            ]
        })
        .collect();

    FormContext::new(format!("Attendees of {}", meet.name), ctx.path.clone())
        .formset(Formset {
            headers: vec!["Player", "Attendance", "Substitute"],
            rows,
        })
        .cancel_url(ctx.object_url(meet, "detail"))
}

fn render(
    ctx: &ViewCtx,
    form: &FormContext,
) -> Result<hypertext::Rendered<String>, FailureResponse> {
    ctx.render::<RosterSlot>(
        &form.title,
        "_list_update",
        "common/views/form",
        TemplateCtx::Form(form),
    )
}

#[tracing::instrument(skip_all)]
pub async fn roster_page(
    ctx: ViewCtx,
    Path(slug): Path<String>,
    mut conn: Conn<true>,
) -> StandardResponse {
    let meet = Meet::fetch_by_slug(&slug, &mut *conn)?;
    ensure(meet.has_update_permission(&ctx.user, &mut *conn)?)?;

    let rows = load_roster(&meet, &mut *conn)?
        .iter()
        .map(RosterRow::from_slot)
        .collect::<Vec<_>>();
    let members = member_choices(&meet, &mut *conn)?;
    success(render(&ctx, &context(&ctx, &meet, &rows, &members))?)
}

#[tracing::instrument(skip_all)]
pub async fn do_update_roster(
    ctx: ViewCtx,
    Path(slug): Path<String>,
    mut conn: Conn<true>,
    Form(data): Form<HashMap<String, String>>,
) -> StandardResponse {
    let meet = Meet::fetch_by_slug(&slug, &mut *conn)?;
    ensure(meet.has_update_permission(&ctx.user, &mut *conn)?)?;

    let roster = load_roster(&meet, &mut *conn)?;
    let members = member_choices(&meet, &mut *conn)?;

    let rows = match parse_rows(&data, roster.len()) {
        Ok(rows) => rows,
        Err(e) => {
            let rows = roster.iter().map(RosterRow::from_slot).collect::<Vec<_>>();
            let mut errors = FieldErrors::new();
            add_error(&mut errors, NON_FIELD, e);
            let page = context(&ctx, &meet, &rows, &members).with_errors(&errors);
            return bad_request(render(&ctx, &page)?);
        }
    };

    let cleaned = match validate_rows(&rows, &roster, &members) {
        Ok(cleaned) => cleaned,
        Err(errors) => {
            let page = context(&ctx, &meet, &rows, &members).with_errors(&errors);
            return bad_request(render(&ctx, &page)?);
        }
    };

    for (id, data) in &cleaned {
        update_attendee(*id, *data, &mut *conn)?;
    }
    tracing::info!(meet = meet.id, rows = cleaned.len(), "updated roster");

    let Some(url) = ctx.reverse("meets:attendee_list", &[&meet.slug]) else {
        return err_not_found();
    };
    let msg = Msg::new(
        Level::Success,
        format!("The attendees of \"{}\" were updated successfully.", meet.name),
    );
    ctx.redirect_with(&url, msg)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDateTime;

    use super::*;
    use crate::meets::Attendee;

    fn slot(id: i32) -> RosterSlot {
        let meet = Meet {
            id: 1,
            slug: "friday".to_string(),
            name: "Friday".to_string(),
            team_id: Some(1),
            location_id: None,
            manager_id: None,
            starttime: NaiveDateTime::default(),
            duration_minutes: 90,
            min_attendees: 2,
            max_attendees: 2,
            comments: String::new(),
        };
        RosterSlot {
            attendee: Attendee {
                id,
                meet_id: 1,
                player_id: None,
                attendance: "--".to_string(),
                substitute_id: None,
                token: String::new(),
                token_expiration: NaiveDateTime::default(),
            },
            meet,
            player: None,
            substitute: None,
        }
    }

    fn members() -> Vec<(String, String)> {
        vec![
            ("7".to_string(), "Ann".to_string()),
            ("8".to_string(), "Bob".to_string()),
        ]
    }

    fn row(id: &str, player: &str, attendance: &str) -> RosterRow {
        RosterRow {
            id: id.to_string(),
            player: player.to_string(),
            attendance: attendance.to_string(),
            substitute: String::new(),
        }
    }

    #[test]
    fn rows_are_read_up_to_the_total() {
        let data = HashMap::from([
            ("form-TOTAL_FORMS".to_string(), "1".to_string()),
            ("form-0-id".to_string(), "3".to_string()),
            ("form-0-player".to_string(), "7".to_string()),
            ("form-1-id".to_string(), "4".to_string()),
        ]);
        let rows = parse_rows(&data, 2).unwrap();
        assert_eq!(rows, vec![row("3", "7", "")]);

        assert!(parse_rows(&HashMap::new(), 2).is_err());
    }

    #[test]
    fn row_count_is_bounded_by_the_roster() {
        let data = HashMap::from([(
            "form-TOTAL_FORMS".to_string(),
            usize::MAX.to_string(),
        )]);
        assert_eq!(
            parse_rows(&data, 2),
            Err("Please submit at most 2 forms.".to_string())
        );
    }

    #[test]
    fn duplicated_players_are_rejected() {
        let roster = [slot(3), slot(4)];
        let errors = validate_rows(
            &[row("3", "7", "AS"), row("4", "7", "OK")],
            &roster,
            &members(),
        )
        .unwrap_err();
        assert_eq!(errors[NON_FIELD], vec!["duped players.".to_string()]);
    }

    #[test]
    fn rows_of_other_meets_and_strangers_are_rejected() {
        let roster = [slot(3)];
        let errors =
            validate_rows(&[row("9", "7", "AS")], &roster, &members()).unwrap_err();
        assert!(errors.contains_key(NON_FIELD));

        let errors =
            validate_rows(&[row("3", "5", "AS")], &roster, &members()).unwrap_err();
        assert!(errors.contains_key("form-0-player"));
    }

    #[test]
    fn empty_slots_may_repeat() {
        let roster = [slot(3), slot(4)];
        let cleaned = validate_rows(
            &[row("3", "", "--"), row("4", "", "--")],
            &roster,
            &members(),
        )
        .unwrap();
        assert_eq!(cleaned.len(), 2);

        let cleaned = validate_rows(
            &[row("3", "7", "--"), row("4", "8", "NS")],
            &roster,
            &members(),
        )
        .unwrap();
        assert_eq!(
            cleaned[0],
            (
                3,
                AttendeeData {
                    player_id: Some(7),
                    attendance: AttendanceState::Unassigned,
                    substitute_id: None,
                }
            )
        );
    }
}
