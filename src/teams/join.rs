use axum::Form;
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use serde::Deserialize;

use crate::{
    msg::Msg,
    permission::team_ids_of,
    schema::teams,
    sitemodule::templates::TemplateCtx,
    state::Conn,
    teams::{DEFAULT_RATING, Member, Team, add_member},
    util_resp::{FailureResponse, StandardResponse, bad_request, success},
    views::{
        FieldErrors, FormContext, SiteModel, ViewCtx,
        form::{
            Field, FieldKind, Fieldset, add_error, check_choice, parse_int,
            parse_optional_id,
        },
    },
};

#[derive(Deserialize, Debug)]
pub struct JoinForm {
    #[serde(default)]
    team: String,
    #[serde(default)]
    password: String,
    #[serde(default = "default_rating")]
    rating: String,
}

fn default_rating() -> String {
    DEFAULT_RATING.to_string()
}

impl Default for JoinForm {
    fn default() -> Self {
        Self {
            team: String::new(),
            password: String::new(),
            rating: default_rating(),
        }
    }
}

impl JoinForm {
    fn context(&self, ctx: &ViewCtx, choices: Vec<(String, String)>) -> FormContext {
        FormContext::new("Join a team", ctx.path.clone())
            .submit_label("Join")
            .fieldset(
                Fieldset::new(None)
                    .row(vec![
                        Field::new("team", "Team", FieldKind::Select(choices))
                            .value(&self.team)
                            .required(),
                    ])
                    .row(vec![
                        Field::new("password", "Password", FieldKind::Password)
                            .required()
                            .help("Ask the team owner for the password"),
                        Field::new("rating", "Rating", FieldKind::Number)
                            .value(&self.rating),
                    ]),
            )
            .cancel_url(ctx.model_url::<Team>("list"))
    }
}

/// The teams `user_id` has not joined yet.
fn joinable(
    user_id: i32,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> QueryResult<Vec<Team>> {
    let joined = team_ids_of(user_id, conn)?;
    teams::table
        .filter(teams::id.ne_all(joined))
        .select(Team::as_select())
        .order_by(teams::name.asc())
        .load(conn)
}

fn choices(teams: &[Team]) -> Vec<(String, String)> {
    teams
        .iter()
        .map(|t| (t.id.to_string(), t.name.clone()))
        .collect()
}

fn render(
    ctx: &ViewCtx,
    form: &FormContext,
) -> Result<hypertext::Rendered<String>, FailureResponse> {
    ctx.render::<Member>(
        &form.title,
        "_join",
        "common/views/form",
        TemplateCtx::Form(form),
    )
}

#[tracing::instrument(skip_all)]
pub async fn join_team_page(ctx: ViewCtx, mut conn: Conn<true>) -> StandardResponse {
    let teams = joinable(ctx.user.id, &mut *conn)?;
    let page = JoinForm::default().context(&ctx, choices(&teams));
    success(render(&ctx, &page)?)
}

#[tracing::instrument(skip_all)]
pub async fn do_join_team(
    ctx: ViewCtx,
    mut conn: Conn<true>,
    Form(form): Form<JoinForm>,
) -> StandardResponse {
    let teams = joinable(ctx.user.id, &mut *conn)?;
    let choices = choices(&teams);

    let mut errors = FieldErrors::new();
    let team = match parse_optional_id(&form.team) {
        Ok(Some(id)) => {
            check_choice(&mut errors, "team", Some(id), &choices);
            teams.iter().find(|t| t.id == id)
        }
        Ok(None) => {
            add_error(&mut errors, "team", "This field is required.");
            None
        }
        Err(e) => {
            add_error(&mut errors, "team", e);
            None
        }
    };
    let rating = parse_int(&form.rating, 0);
    if let Err(e) = &rating {
        add_error(&mut errors, "rating", e.clone());
    }
    if let Some(team) = team {
        if team.join_password != form.password {
            add_error(
                &mut errors,
                "password",
                "Password to join the team is incorrect",
            );
        }
    }

    let (Some(team), Ok(rating), true) = (team, rating, errors.is_empty()) else {
        let page = form.context(&ctx, choices).with_errors(&errors);
        return bad_request(render(&ctx, &page)?);
    };

    add_member(team.id, ctx.user.id, rating, &mut *conn)?;
    tracing::info!(team = team.id, user = ctx.user.id, "joined team");

    let url = ctx
        .model_url::<Team>("list")
        .unwrap_or_else(|| "/".to_string());
    let msg = Msg::saved(
        Team::VERBOSE_NAME,
        team.name.clone(),
        ctx.object_url(team, "detail"),
        "joined",
    );
    ctx.redirect_with(&url, msg)
}
