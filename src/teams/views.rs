use std::collections::HashSet;

use axum::{Form, extract::Path};
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use serde::Deserialize;

use crate::{
    permission::{ModelPermissions, ensure, team_ids_of},
    schema::{team_members, teams},
    sitemodule::templates::TemplateCtx,
    state::Conn,
    teams::{Member, Team, TeamData, TeamMember, create_team, update_team},
    userprofile::{Person, people, user_choices},
    util_resp::{FailureResponse, StandardResponse, bad_request, success},
    validation::{max_length, required},
    views::{
        Cell, DetailSection, FieldErrors, FormContext, ModelList, ViewCtx,
        detail::{build_delete, build_detail},
        form::{Field, FieldKind, Fieldset, check, check_choice, parse_optional_id},
        list::build_list,
    },
};

pub struct TeamRow {
    team: Team,
    owner: Option<Person>,
    joined: bool,
}

impl ModelList for TeamRow {
    type Model = Team;

    const LIST_DISPLAY: &'static [(&'static str, &'static str)] = &[
        ("name", "Team"),
        ("owner", "Owner"),
        ("description", "Description"),
        ("joined", "Joined"),
    ];

    fn object(&self) -> &Team {
        &self.team
    }

    fn field_value(&self, field: &str) -> String {
        match field {
            "name" => self.team.name.clone(),
            "owner" => self
                .owner
                .as_ref()
                .map(|p| p.name.clone())
                .unwrap_or_default(),
            "description" => self.team.description.clone(),
            "joined" => if self.joined { "Yes" } else { "No" }.to_string(),
            _ => String::new(),
        }
    }

    fn get_field_url(&self, field: &str, ctx: &ViewCtx) -> Option<String> {
        match field {
            "owner" => profile_url(ctx, self.owner.as_ref()),
            _ => None,
        }
    }
}

pub(crate) fn profile_url(ctx: &ViewCtx, person: Option<&Person>) -> Option<String> {
    let profile = person?.profile_id?;
    ctx.reverse("users:user_detail", &[profile.to_string()])
}

#[tracing::instrument(skip_all)]
pub async fn team_list(ctx: ViewCtx, mut conn: Conn<true>) -> StandardResponse {
    let joined = team_ids_of(ctx.user.id, &mut *conn)?
        .into_iter()
        .collect::<HashSet<_>>();

    let teams = if ctx.user.is_superuser {
        teams::table
            .select(Team::as_select())
            .order_by(teams::name.asc())
            .load::<Team>(&mut *conn)?
    } else {
        teams::table
            .filter(teams::id.eq_any(joined.iter().copied().collect::<Vec<_>>()))
            .select(Team::as_select())
            .order_by(teams::name.asc())
            .load::<Team>(&mut *conn)?
    };

    let owners = people(teams.iter().filter_map(|t| t.owner_id), &mut *conn)?;
    let rows = teams
        .into_iter()
        .map(|team| TeamRow {
            owner: team.owner_id.and_then(|id| owners.get(&id).cloned()),
            joined: joined.contains(&team.id),
            team,
        })
        .collect::<Vec<_>>();

    let add_url = if Team::has_add_permission(&ctx.user, &mut *conn)? {
        ctx.model_url::<Team>("create")
    } else {
        None
    };

    let mut list = build_list(&ctx, &rows, add_url, None);
    if let Some(join) = ctx.model_url::<Team>("join") {
        list.actions.push((join, "Join a team".to_string()));
    }

    success(ctx.render::<Team>(
        &list.title,
        "_list",
        "site/model_list",
        TemplateCtx::List(&list),
    )?)
}

#[derive(Deserialize, Default, Debug)]
pub struct TeamForm {
    #[serde(default)]
    name: String,
    #[serde(default)]
    join_password: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    owner: String,
}

impl TeamForm {
    fn from_team(team: &Team) -> Self {
        Self {
            name: team.name.clone(),
            join_password: team.join_password.clone(),
            description: team.description.clone(),
            owner: team.owner_id.map(|id| id.to_string()).unwrap_or_default(),
        }
    }

    fn validate(
        &self,
        owners: &[(String, String)],
    ) -> Result<TeamData, FieldErrors> {
        let mut errors = FieldErrors::new();
        check(&mut errors, "name", required(&self.name));
        check(&mut errors, "name", max_length(&self.name, 100));
        check(&mut errors, "join_password", required(&self.join_password));
        check(&mut errors, "join_password", max_length(&self.join_password, 40));
        check(&mut errors, "description", max_length(&self.description, 200));
        let owner_id = match parse_optional_id(&self.owner) {
            Ok(id) => {
                check_choice(&mut errors, "owner", id, owners);
                id
            }
            Err(e) => {
                check(&mut errors, "owner", Err(e));
                None
            }
        };

        if !errors.is_empty() {
            return Err(errors);
        }
        Ok(TeamData {
            slug: String::new(),
            name: self.name.trim().to_string(),
            join_password: self.join_password.clone(),
            description: self.description.trim().to_string(),
            owner_id,
        })
    }

    fn context(
        &self,
        title: String,
        action: String,
        owners: Vec<(String, String)>,
        cancel_url: Option<String>,
    ) -> FormContext {
        FormContext::new(title, action)
            .fieldset(
                Fieldset::new(None)
                    .row(vec![Field::text("name", "Name").value(&self.name).required()])
                    .row(vec![
                        Field::new("join_password", "Join password", FieldKind::Password)
                            .value(&self.join_password)
                            .required()
                            .help("Members need this password to join the team"),
                        Field::new("owner", "Owner", FieldKind::Select(owners))
                            .value(&self.owner),
                    ])
                    .row(vec![
                        Field::new("description", "Description", FieldKind::TextArea)
                            .value(&self.description),
                    ]),
            )
            .cancel_url(cancel_url)
    }
}

fn form_page(
    ctx: &ViewCtx,
    form: &FormContext,
) -> Result<hypertext::Rendered<String>, FailureResponse> {
    ctx.render::<Team>(
        &form.title,
        "_form",
        "common/views/form",
        TemplateCtx::Form(form),
    )
}

#[tracing::instrument(skip_all)]
pub async fn create_team_page(ctx: ViewCtx, mut conn: Conn<true>) -> StandardResponse {
    ensure(Team::has_add_permission(&ctx.user, &mut *conn)?)?;

    let form = TeamForm {
        owner: ctx.user.id.to_string(),
        ..Default::default()
    };
    let page = form.context(
        "Add team".to_string(),
        ctx.path.clone(),
        user_choices(&mut *conn)?,
        ctx.model_url::<Team>("list"),
    );
    success(form_page(&ctx, &page)?)
}

#[tracing::instrument(skip_all)]
pub async fn do_create_team(
    ctx: ViewCtx,
    mut conn: Conn<true>,
    Form(form): Form<TeamForm>,
) -> StandardResponse {
    ensure(Team::has_add_permission(&ctx.user, &mut *conn)?)?;

    let owners = user_choices(&mut *conn)?;
    match form.validate(&owners) {
        Ok(data) => {
            let team = create_team(data, &ctx.user, &mut *conn)?;
            ctx.saved(&team, "added")
        }
        Err(errors) => {
            let page = form
                .context(
                    "Add team".to_string(),
                    ctx.path.clone(),
                    owners,
                    ctx.model_url::<Team>("list"),
                )
                .with_errors(&errors);
            bad_request(form_page(&ctx, &page)?)
        }
    }
}

/// The members of a team in the order they joined.
pub fn load_members(
    team: &Team,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> QueryResult<Vec<Member>> {
    let rows = team_members::table
        .filter(team_members::team_id.eq(team.id))
        .select(TeamMember::as_select())
        .order_by(team_members::id.asc())
        .load::<TeamMember>(conn)?;
    let mut persons = people(rows.iter().map(|r| r.user_id), conn)?;

    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let person = persons.remove(&row.user_id)?;
            Some(Member {
                row,
                team: team.clone(),
                person,
            })
        })
        .collect())
}

#[tracing::instrument(skip_all)]
pub async fn team_detail(
    ctx: ViewCtx,
    Path(slug): Path<String>,
    mut conn: Conn<true>,
) -> StandardResponse {
    let team = Team::fetch_by_slug(&slug, &mut *conn)?;
    ensure(team.has_view_permission(&ctx.user, &mut *conn)?)?;

    let owner = match team.owner_id {
        Some(id) => crate::userprofile::person(id, &mut *conn)?,
        None => None,
    };
    let can_update = team.has_update_permission(&ctx.user, &mut *conn)?;
    let can_delete = team.has_delete_permission(&ctx.user, &mut *conn)?;

    let mut detail = build_detail(
        &ctx,
        &team,
        [
            ("Name", Cell::new(&team.name)),
            (
                "Owner",
                Cell::link(
                    owner.as_ref().map(|p| p.name.clone()).unwrap_or_default(),
                    profile_url(&ctx, owner.as_ref()),
                ),
            ),
            ("Description", Cell::new(&team.description)),
            ("Created", Cell::new(team.created_at.format("%Y-%m-%d").to_string())),
        ],
        can_update,
        can_delete,
    );

    let members = load_members(&team, &mut *conn)?;
    detail.sections.push(DetailSection::Table {
        title: "Members".to_string(),
        headers: vec!["Member", "Rating", "Played", "Wins", "Losses"],
        rows: members
            .iter()
            .map(|m| {
                vec![
                    Cell::link(&m.person.name, ctx.object_url(m, "detail")),
                    Cell::new(m.row.rating.to_string()),
                    Cell::new(m.row.played.to_string()),
                    Cell::new(m.row.wins.to_string()),
                    Cell::new(m.row.losses.to_string()),
                ]
            })
            .collect(),
        actions: ctx
            .reverse("teams:member_list", &[&team.slug])
            .map(|url| vec![(url, "All members".to_string())])
            .unwrap_or_default(),
    });

    success(ctx.render::<Team>(
        &detail.title,
        "_detail",
        "site/model_detail",
        TemplateCtx::Detail(&detail),
    )?)
}

fn fetch_for_update(
    ctx: &ViewCtx,
    slug: &str,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<Team, FailureResponse> {
    let team = Team::fetch_by_slug(slug, conn)?;
    ensure(team.has_update_permission(&ctx.user, conn)?)?;
    Ok(team)
}

#[tracing::instrument(skip_all)]
pub async fn update_team_page(
    ctx: ViewCtx,
    Path(slug): Path<String>,
    mut conn: Conn<true>,
) -> StandardResponse {
    let team = fetch_for_update(&ctx, &slug, &mut *conn)?;
    let page = TeamForm::from_team(&team).context(
        format!("Change team {}", team.name),
        ctx.path.clone(),
        user_choices(&mut *conn)?,
        ctx.object_url(&team, "detail"),
    );
    success(form_page(&ctx, &page)?)
}

#[tracing::instrument(skip_all)]
pub async fn do_update_team(
    ctx: ViewCtx,
    Path(slug): Path<String>,
    mut conn: Conn<true>,
    Form(form): Form<TeamForm>,
) -> StandardResponse {
    let team = fetch_for_update(&ctx, &slug, &mut *conn)?;
    let owners = user_choices(&mut *conn)?;

    match form.validate(&owners) {
        Ok(mut data) => {
            data.slug = team.slug.clone();
            let team = update_team(team.id, data, &mut *conn)?;
            ctx.saved(&team, "updated")
        }
        Err(errors) => {
            let page = form
                .context(
                    format!("Change team {}", team.name),
                    ctx.path.clone(),
                    owners,
                    ctx.object_url(&team, "detail"),
                )
                .with_errors(&errors);
            bad_request(form_page(&ctx, &page)?)
        }
    }
}

fn fetch_for_delete(
    ctx: &ViewCtx,
    slug: &str,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<Team, FailureResponse> {
    let team = Team::fetch_by_slug(slug, conn)?;
    ensure(team.has_delete_permission(&ctx.user, conn)?)?;
    Ok(team)
}

#[tracing::instrument(skip_all)]
pub async fn delete_team_page(
    ctx: ViewCtx,
    Path(slug): Path<String>,
    mut conn: Conn<true>,
) -> StandardResponse {
    let team = fetch_for_delete(&ctx, &slug, &mut *conn)?;
    let members = team_members::table
        .filter(team_members::team_id.eq(team.id))
        .count()
        .get_result::<i64>(&mut *conn)?;

    let delete = build_delete(&ctx, &team, vec![("team members", members)]);
    success(ctx.render::<Team>(
        &delete.title,
        "_confirm_delete",
        "site/model_confirm_delete",
        TemplateCtx::Delete(&delete),
    )?)
}

#[tracing::instrument(skip_all)]
pub async fn do_delete_team(
    ctx: ViewCtx,
    Path(slug): Path<String>,
    mut conn: Conn<true>,
) -> StandardResponse {
    let team = fetch_for_delete(&ctx, &slug, &mut *conn)?;
    diesel::delete(teams::table.find(team.id)).execute(&mut *conn)?;
    tracing::info!(team = team.id, "deleted team");
    ctx.deleted(&team)
}
