use axum::{Form, extract::Path};
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use itertools::Itertools;
use serde::Deserialize;

use crate::{
    meets::{
        AttendanceState, AttendeeData, Meet, RosterSlot, load_roster, update_attendee,
        views::slot_url,
    },
    msg::Msg,
    permission::{ModelPermissions, ensure},
    sitemodule::{templates::TemplateCtx, urls::Kwargs},
    state::Conn,
    teams::{member_ids, views::profile_url},
    userprofile::people,
    util_resp::{FailureResponse, StandardResponse, bad_request, err_not_found, success},
    views::{
        Cell, FieldErrors, FormContext, ModelList, SiteModel, ViewCtx,
        detail::build_detail,
        form::{Field, FieldKind, Fieldset, add_error, check_choice, parse_optional_id},
        list::build_list,
    },
};

pub struct AttendeeRow(RosterSlot);

impl ModelList for AttendeeRow {
    type Model = RosterSlot;

    const LIST_DISPLAY: &'static [(&'static str, &'static str)] = &[
        ("player", "Player"),
        ("attendance", "Attendance"),
        ("substitute", "Substitute"),
    ];

    fn object(&self) -> &RosterSlot {
        &self.0
    }

    fn field_value(&self, field: &str) -> String {
        match field {
            "player" => self.0.display(),
            "attendance" => self.0.attendee.state().label().to_string(),
            "substitute" => self
                .0
                .substitute
                .as_ref()
                .map(|p| p.name.clone())
                .unwrap_or_default(),
            _ => String::new(),
        }
    }

    fn get_item_url(&self, ctx: &ViewCtx) -> Option<String> {
        slot_url(ctx, &self.0)
    }

    fn get_field_url(&self, field: &str, ctx: &ViewCtx) -> Option<String> {
        match field {
            "substitute" => profile_url(ctx, self.0.substitute.as_ref()),
            _ => None,
        }
    }
}

#[tracing::instrument(skip_all)]
pub async fn attendee_list(
    ctx: ViewCtx,
    Path(slug): Path<String>,
    mut conn: Conn<true>,
) -> StandardResponse {
    let meet = Meet::fetch_by_slug(&slug, &mut *conn)?;
    ensure(meet.has_view_permission(&ctx.user, &mut *conn)?)?;

    let rows = load_roster(&meet, &mut *conn)?
        .into_iter()
        .map(AttendeeRow)
        .collect::<Vec<_>>();

    let mut list = build_list(&ctx, &rows, None, None);
    list.title = format!("Attendees of {}", meet.name);
    if ctx.user.is_superuser || meet.manager_id == Some(ctx.user.id) {
        if let Some(url) = ctx.reverse("meets:attendee_list_update", &[&meet.slug]) {
            list.actions.push((url, "Manage attendees".to_string()));
        }
    }
    if let Some(url) = ctx.object_url(&meet, "detail") {
        list.actions.push((url, format!("Back to {}", meet.name)));
    }

    success(ctx.render::<RosterSlot>(
        &list.title,
        "_list",
        "site/model_list",
        TemplateCtx::List(&list),
    )?)
}

/// The slot `pk` of the meet `slug`; a slot of another meet is not found.
fn fetch_slot(
    slug: &str,
    pk: i32,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<RosterSlot, FailureResponse> {
    let meet = Meet::fetch_by_slug(slug, conn)?;
    load_roster(&meet, conn)?
        .into_iter()
        .find(|s| s.attendee.id == pk)
        .ok_or(FailureResponse::NotFound(()))
}

#[tracing::instrument(skip_all)]
pub async fn attendee_detail(
    ctx: ViewCtx,
    Kwargs((slug, pk)): Kwargs<(String, i32)>,
    mut conn: Conn<true>,
) -> StandardResponse {
    let slot = fetch_slot(&slug, pk, &mut *conn)?;
    ensure(slot.has_view_permission(&ctx.user, &mut *conn)?)?;

    let can_update = slot.has_update_permission(&ctx.user, &mut *conn)?;
    let detail = build_detail(
        &ctx,
        &slot,
        [
            (
                "Meet",
                Cell::link(&slot.meet.name, ctx.object_url(&slot.meet, "detail")),
            ),
            (
                "Player",
                Cell::link(slot.display(), profile_url(&ctx, slot.player.as_ref())),
            ),
            ("Attendance", Cell::new(slot.attendee.state().label())),
            (
                "Substitute",
                Cell::link(
                    slot.substitute
                        .as_ref()
                        .map(|p| p.name.clone())
                        .unwrap_or_default(),
                    profile_url(&ctx, slot.substitute.as_ref()),
                ),
            ),
        ],
        can_update,
        false,
    );

    success(ctx.render::<RosterSlot>(
        &detail.title,
        "_detail",
        "site/model_detail",
        TemplateCtx::Detail(&detail),
    )?)
}

/// Members of the meet's team as `(id, name)` choices.
pub fn member_choices(
    meet: &Meet,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> QueryResult<Vec<(String, String)>> {
    let Some(team) = meet.team_id else {
        return Ok(Vec::new());
    };
    Ok(people(member_ids(team, conn)?, conn)?
        .into_values()
        .map(|p| (p.user_id.to_string(), p.name))
        .sorted_by(|a, b| a.1.cmp(&b.1))
        .collect())
}

#[derive(Deserialize, Debug, Default)]
pub struct AttendeeForm {
    #[serde(default)]
    player: String,
    #[serde(default)]
    attendance: String,
    #[serde(default)]
    substitute: String,
}

impl AttendeeForm {
    fn from_slot(slot: &RosterSlot) -> Self {
        let id = |v: Option<i32>| v.map(|v| v.to_string()).unwrap_or_default();
        Self {
            player: id(slot.attendee.player_id),
            attendance: slot.attendee.state().code().to_string(),
            substitute: id(slot.attendee.substitute_id),
        }
    }

    fn validate(&self, members: &[(String, String)]) -> Result<AttendeeData, FieldErrors> {
        let mut errors = FieldErrors::new();
        let mut select = |field: &str, value: &str| match parse_optional_id(value) {
            Ok(id) => {
                check_choice(&mut errors, field, id, members);
                id
            }
            Err(e) => {
                add_error(&mut errors, field, e);
                None
            }
        };
        let player_id = select("player", &self.player);
        let substitute_id = select("substitute", &self.substitute);

        let attendance = AttendanceState::from_code(&self.attendance);
        if attendance.is_none() {
            add_error(&mut errors, "attendance", "Select a valid choice.");
        }
        if player_id.is_some() && player_id == substitute_id {
            add_error(
                &mut errors,
                "substitute",
                "The substitute must be someone other than the player.",
            );
        }

        match attendance {
            Some(attendance) if errors.is_empty() => Ok(AttendeeData {
                player_id,
                attendance,
                substitute_id,
            }),
            _ => Err(errors),
        }
    }

    fn context(
        &self,
        ctx: &ViewCtx,
        slot: &RosterSlot,
        members: Vec<(String, String)>,
    ) -> FormContext {
        let substitutes = members
            .iter()
            .filter(|(id, _)| *id != self.player)
            .cloned()
            .collect();
        FormContext::new(format!("Change attendee {}", slot.display()), ctx.path.clone())
            .fieldset(
                Fieldset::new(Some(slot.meet.name.as_str())).row(vec![
                    Field::new("player", "Player", FieldKind::Select(members))
                        .value(&self.player),
                    Field::new(
                        "attendance",
                        "Attendance",
                        FieldKind::Select(AttendanceState::choices()),
                    )
                    .value(&self.attendance)
                    .required(),
                    Field::new("substitute", "Substitute", FieldKind::Select(substitutes))
                        .value(&self.substitute),
                ]),
            )
            .cancel_url(ctx.reverse("meets:attendee_list", &[&slot.meet.slug]))
    }
}

fn form_page(
    ctx: &ViewCtx,
    form: &FormContext,
) -> Result<hypertext::Rendered<String>, FailureResponse> {
    ctx.render::<RosterSlot>(
        &form.title,
        "_form",
        "common/views/form",
        TemplateCtx::Form(form),
    )
}

#[tracing::instrument(skip_all)]
pub async fn update_attendee_page(
    ctx: ViewCtx,
    Kwargs((slug, pk)): Kwargs<(String, i32)>,
    mut conn: Conn<true>,
) -> StandardResponse {
    let slot = fetch_slot(&slug, pk, &mut *conn)?;
    ensure(slot.has_update_permission(&ctx.user, &mut *conn)?)?;

    let members = member_choices(&slot.meet, &mut *conn)?;
    let page = AttendeeForm::from_slot(&slot).context(&ctx, &slot, members);
    success(form_page(&ctx, &page)?)
}

#[tracing::instrument(skip_all)]
pub async fn do_update_attendee(
    ctx: ViewCtx,
    Kwargs((slug, pk)): Kwargs<(String, i32)>,
    mut conn: Conn<true>,
    Form(form): Form<AttendeeForm>,
) -> StandardResponse {
    let slot = fetch_slot(&slug, pk, &mut *conn)?;
    ensure(slot.has_update_permission(&ctx.user, &mut *conn)?)?;

    let members = member_choices(&slot.meet, &mut *conn)?;
    let data = match form.validate(&members) {
        Ok(data) => data,
        Err(errors) => {
            let page = form.context(&ctx, &slot, members).with_errors(&errors);
            return bad_request(form_page(&ctx, &page)?);
        }
    };

    update_attendee(slot.attendee.id, data, &mut *conn)?;
    tracing::info!(meet = slot.meet.id, attendee = slot.attendee.id, "updated attendee");

    let Some(url) = ctx.reverse("meets:attendee_list", &[&slot.meet.slug]) else {
        return err_not_found();
    };
    let Some(updated) = load_roster(&slot.meet, &mut *conn)?
        .into_iter()
        .find(|s| s.attendee.id == slot.attendee.id)
    else {
        return err_not_found();
    };
    let msg = Msg::saved(
        RosterSlot::VERBOSE_NAME,
        updated.display(),
        ctx.object_url(&updated, "detail"),
        "updated",
    );
    ctx.redirect_with(&url, msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members() -> Vec<(String, String)> {
        vec![
            ("1".to_string(), "Ann".to_string()),
            ("2".to_string(), "Bob".to_string()),
        ]
    }

    #[test]
    fn substitute_differs_from_player() {
        let form = AttendeeForm {
            player: "1".to_string(),
            attendance: "NS".to_string(),
            substitute: "1".to_string(),
        };
        assert!(form.validate(&members()).unwrap_err().contains_key("substitute"));
    }

    #[test]
    fn players_come_from_the_team() {
        let form = AttendeeForm {
            player: "3".to_string(),
            attendance: "AS".to_string(),
            substitute: String::new(),
        };
        assert!(form.validate(&members()).unwrap_err().contains_key("player"));
    }

    #[test]
    fn valid_slot() {
        let form = AttendeeForm {
            player: "2".to_string(),
            attendance: "OK".to_string(),
            substitute: "1".to_string(),
        };
        let data = form.validate(&members()).unwrap();
        assert_eq!(data.player_id, Some(2));
        assert_eq!(data.attendance, AttendanceState::Confirmed);
        assert_eq!(data.substitute_id, Some(1));

        let bad = AttendeeForm {
            attendance: "??".to_string(),
            ..form
        };
        assert!(bad.validate(&members()).unwrap_err().contains_key("attendance"));
    }
}
