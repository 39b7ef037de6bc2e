use axum::extract::Path;

use crate::{
    permission::{ModelPermissions, ensure},
    sitemodule::{templates::TemplateCtx, urls::Kwargs},
    state::Conn,
    teams::{Member, Team, views::load_members},
    util_resp::{StandardResponse, err_not_found, success},
    views::{Cell, ModelList, ViewCtx, detail::build_detail, list::build_list},
};

pub struct MemberRow(Member);

impl ModelList for MemberRow {
    type Model = Member;

    const LIST_DISPLAY: &'static [(&'static str, &'static str)] = &[
        ("member", "Member"),
        ("rating", "Rating"),
        ("played", "Played"),
        ("wins", "Wins"),
        ("losses", "Losses"),
    ];

    fn object(&self) -> &Member {
        &self.0
    }

    fn field_value(&self, field: &str) -> String {
        let row = &self.0.row;
        match field {
            "member" => self.0.person.name.clone(),
            "rating" => row.rating.to_string(),
            "played" => row.played.to_string(),
            "wins" => row.wins.to_string(),
            "losses" => row.losses.to_string(),
            _ => String::new(),
        }
    }
}

#[tracing::instrument(skip_all)]
pub async fn member_list(
    ctx: ViewCtx,
    Path(slug): Path<String>,
    mut conn: Conn<true>,
) -> StandardResponse {
    let team = Team::fetch_by_slug(&slug, &mut *conn)?;
    ensure(team.has_view_permission(&ctx.user, &mut *conn)?)?;

    let rows = load_members(&team, &mut *conn)?
        .into_iter()
        .map(MemberRow)
        .collect::<Vec<_>>();

    let mut list = build_list(&ctx, &rows, None, None);
    list.title = format!("Members of {}", team.name);
    if let Some(url) = ctx.object_url(&team, "detail") {
        list.actions.push((url, format!("Back to {}", team.name)));
    }

    success(ctx.render::<Member>(
        &list.title,
        "_list",
        "site/model_list",
        TemplateCtx::List(&list),
    )?)
}

#[tracing::instrument(skip_all)]
pub async fn member_detail(
    ctx: ViewCtx,
    Kwargs((slug, pk)): Kwargs<(String, i32)>,
    mut conn: Conn<true>,
) -> StandardResponse {
    let team = Team::fetch_by_slug(&slug, &mut *conn)?;
    let Some(member) = load_members(&team, &mut *conn)?
        .into_iter()
        .find(|m| m.row.id == pk)
    else {
        return err_not_found();
    };
    ensure(member.has_view_permission(&ctx.user, &mut *conn)?)?;

    let detail = build_detail(
        &ctx,
        &member,
        [
            ("Member", Cell::new(&member.person.name)),
            ("Team", Cell::link(&team.name, ctx.object_url(&team, "detail"))),
            ("Rating", Cell::new(member.row.rating.to_string())),
            ("Played", Cell::new(member.row.played.to_string())),
            ("Wins", Cell::new(member.row.wins.to_string())),
            ("Losses", Cell::new(member.row.losses.to_string())),
        ],
        false,
        false,
    );

    success(ctx.render::<Member>(
        &detail.title,
        "_detail",
        "site/model_detail",
        TemplateCtx::Detail(&detail),
    )?)
}
