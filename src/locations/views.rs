use axum::{
    Form,
    extract::{Path, Query},
};
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use serde::Deserialize;

use crate::{
    locations::{Location, LocationData, create_location, update_location},
    permission::{ModelPermissions, ensure},
    schema::locations,
    sitemodule::templates::TemplateCtx,
    state::Conn,
    util_resp::{FailureResponse, StandardResponse, bad_request, err_not_found, success},
    validation::{is_valid_url, max_length},
    views::{
        Cell, FieldErrors, FormContext, ModelList, Pagination, ViewCtx,
        detail::{build_delete, build_detail},
        form::{Field, FieldKind, Fieldset, check},
        list::{PageQuery, build_list},
    },
};

pub struct LocationRow(Location);

impl ModelList for LocationRow {
    type Model = Location;

    const LIST_DISPLAY: &'static [(&'static str, &'static str)] = &[
        ("name", "Name"),
        ("address", "Address"),
        ("googlemap_url", "Map"),
        ("phone", "Phone"),
        ("homepage", "Homepage"),
    ];
    const PAGINATE_BY: Option<i64> = Some(50);

    fn object(&self) -> &Location {
        &self.0
    }

    fn field_value(&self, field: &str) -> String {
        let l = &self.0;
        match field {
            "name" => l.name.clone(),
            "address" => l.address.clone(),
            "googlemap_url" => l.googlemap_url.clone(),
            "phone" => l.phone.clone(),
            "homepage" => l.homepage.clone(),
            _ => String::new(),
        }
    }

    fn get_field_url(&self, field: &str, _ctx: &ViewCtx) -> Option<String> {
        let url = match field {
            "googlemap_url" => &self.0.googlemap_url,
            "homepage" => &self.0.homepage,
            _ => return None,
        };
        (!url.is_empty()).then(|| url.clone())
    }
}

#[tracing::instrument(skip_all)]
pub async fn location_list(
    ctx: ViewCtx,
    Query(q): Query<PageQuery>,
    mut conn: Conn<true>,
) -> StandardResponse {
    ensure(Location::has_list_permission(&ctx.user, &mut *conn)?)?;

    let count = locations::table.count().get_result::<i64>(&mut *conn)?;
    let per_page = LocationRow::PAGINATE_BY.unwrap_or(count.max(1));
    let Some(pagination) =
        Pagination::new(&ctx.path, q.page.as_deref(), count, per_page)
    else {
        return err_not_found();
    };

    let rows = locations::table
        .select(Location::as_select())
        .order_by(locations::name.asc())
        .offset(pagination.offset())
        .limit(pagination.limit())
        .load::<Location>(&mut *conn)?
        .into_iter()
        .map(LocationRow)
        .collect::<Vec<_>>();

    let add_url = if Location::has_add_permission(&ctx.user, &mut *conn)? {
        ctx.model_url::<Location>("create")
    } else {
        None
    };

    let list = build_list(&ctx, &rows, add_url, Some(pagination));
    success(ctx.render::<Location>(
        &list.title,
        "_list",
        "site/model_list",
        TemplateCtx::List(&list),
    )?)
}

#[derive(Deserialize, Default, Debug)]
pub struct LocationForm {
    #[serde(default)]
    name: String,
    #[serde(default)]
    address: String,
    #[serde(default)]
    coordinates: String,
    #[serde(default)]
    googlemap_url: String,
    #[serde(default)]
    phone: String,
    #[serde(default)]
    homepage: String,
    #[serde(default)]
    description: String,
}

impl LocationForm {
    fn from_location(l: &Location) -> Self {
        Self {
            name: l.name.clone(),
            address: l.address.clone(),
            coordinates: l.coordinates.clone(),
            googlemap_url: l.googlemap_url.clone(),
            phone: l.phone.clone(),
            homepage: l.homepage.clone(),
            description: l.description.clone(),
        }
    }

    fn validate(&self) -> Result<LocationData, FieldErrors> {
        let mut errors = FieldErrors::new();
        check(&mut errors, "name", max_length(&self.name, 100));
        check(&mut errors, "address", max_length(&self.address, 200));
        check(&mut errors, "coordinates", max_length(&self.coordinates, 100));
        check(&mut errors, "googlemap_url", is_valid_url(self.googlemap_url.trim()));
        check(&mut errors, "phone", max_length(&self.phone, 20));
        check(&mut errors, "homepage", is_valid_url(self.homepage.trim()));
        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(LocationData {
            slug: String::new(),
            name: self.name.trim().to_string(),
            address: self.address.trim().to_string(),
            coordinates: self.coordinates.trim().to_string(),
            googlemap_url: self.googlemap_url.trim().to_string(),
            phone: self.phone.trim().to_string(),
            homepage: self.homepage.trim().to_string(),
            description: self.description.trim().to_string(),
        })
    }

    fn context(
        &self,
        title: String,
        action: String,
        cancel_url: Option<String>,
    ) -> FormContext {
        FormContext::new(title, action)
            .fieldset(
                Fieldset::new(None)
                    .row(vec![Field::text("name", "Name").value(&self.name)])
                    .row(vec![
                        Field::text("address", "Address").value(&self.address),
                        Field::text("coordinates", "Coordinates")
                            .value(&self.coordinates),
                    ]),
            )
            .fieldset(
                Fieldset::new(Some("Contact"))
                    .row(vec![
                        Field::new("googlemap_url", "Google map", FieldKind::Url)
                            .value(&self.googlemap_url),
                        Field::new("homepage", "Homepage", FieldKind::Url)
                            .value(&self.homepage),
                    ])
                    .row(vec![Field::text("phone", "Phone").value(&self.phone)])
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
    ctx.render::<Location>(
        &form.title,
        "_form",
        "common/views/form",
        TemplateCtx::Form(form),
    )
}

#[tracing::instrument(skip_all)]
pub async fn create_location_page(
    ctx: ViewCtx,
    mut conn: Conn<true>,
) -> StandardResponse {
    ensure(Location::has_add_permission(&ctx.user, &mut *conn)?)?;
    let page = LocationForm::default().context(
        "Add location".to_string(),
        ctx.path.clone(),
        ctx.model_url::<Location>("list"),
    );
    success(form_page(&ctx, &page)?)
}

#[tracing::instrument(skip_all)]
pub async fn do_create_location(
    ctx: ViewCtx,
    mut conn: Conn<true>,
    Form(form): Form<LocationForm>,
) -> StandardResponse {
    ensure(Location::has_add_permission(&ctx.user, &mut *conn)?)?;
    match form.validate() {
        Ok(data) => {
            let location = create_location(data, &mut *conn)?;
            ctx.saved(&location, "added")
        }
        Err(errors) => {
            let page = form
                .context(
                    "Add location".to_string(),
                    ctx.path.clone(),
                    ctx.model_url::<Location>("list"),
                )
                .with_errors(&errors);
            bad_request(form_page(&ctx, &page)?)
        }
    }
}

#[tracing::instrument(skip_all)]
pub async fn location_detail(
    ctx: ViewCtx,
    Path(slug): Path<String>,
    mut conn: Conn<true>,
) -> StandardResponse {
    let location = Location::fetch_by_slug(&slug, &mut *conn)?;
    ensure(location.has_view_permission(&ctx.user, &mut *conn)?)?;

    let can_update = location.has_update_permission(&ctx.user, &mut *conn)?;
    let can_delete = location.has_delete_permission(&ctx.user, &mut *conn)?;

    let link = |url: &str| {
        Cell::link(url, (!url.is_empty()).then(|| url.to_string()))
    };
    let detail = build_detail(
        &ctx,
        &location,
        [
            ("Name", Cell::new(&location.name)),
            ("Address", Cell::new(&location.address)),
            ("Coordinates", Cell::new(&location.coordinates)),
            ("Google map", link(&location.googlemap_url)),
            ("Phone", Cell::new(&location.phone)),
            ("Homepage", link(&location.homepage)),
            ("Description", Cell::new(&location.description)),
        ],
        can_update,
        can_delete,
    );

    success(ctx.render::<Location>(
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
) -> Result<Location, FailureResponse> {
    let location = Location::fetch_by_slug(slug, conn)?;
    let allowed = if delete {
        location.has_delete_permission(&ctx.user, conn)?
    } else {
        location.has_update_permission(&ctx.user, conn)?
    };
    ensure(allowed)?;
    Ok(location)
}

#[tracing::instrument(skip_all)]
pub async fn update_location_page(
    ctx: ViewCtx,
    Path(slug): Path<String>,
    mut conn: Conn<true>,
) -> StandardResponse {
    let location = fetch_with(&ctx, &slug, false, &mut *conn)?;
    let page = LocationForm::from_location(&location).context(
        format!("Change location {}", location.name),
        ctx.path.clone(),
        ctx.object_url(&location, "detail"),
    );
    success(form_page(&ctx, &page)?)
}

#[tracing::instrument(skip_all)]
pub async fn do_update_location(
    ctx: ViewCtx,
    Path(slug): Path<String>,
    mut conn: Conn<true>,
    Form(form): Form<LocationForm>,
) -> StandardResponse {
    let location = fetch_with(&ctx, &slug, false, &mut *conn)?;
    match form.validate() {
        Ok(mut data) => {
            data.slug = location.slug.clone();
            let location = update_location(location.id, data, &mut *conn)?;
            ctx.saved(&location, "updated")
        }
        Err(errors) => {
            let page = form
                .context(
                    format!("Change location {}", location.name),
                    ctx.path.clone(),
                    ctx.object_url(&location, "detail"),
                )
                .with_errors(&errors);
            bad_request(form_page(&ctx, &page)?)
        }
    }
}

#[tracing::instrument(skip_all)]
pub async fn delete_location_page(
    ctx: ViewCtx,
    Path(slug): Path<String>,
    mut conn: Conn<true>,
) -> StandardResponse {
    let location = fetch_with(&ctx, &slug, true, &mut *conn)?;
    // meets held there keep their row and lose the location
    let delete = build_delete(&ctx, &location, Vec::new());
    success(ctx.render::<Location>(
        &delete.title,
        "_confirm_delete",
        "site/model_confirm_delete",
        TemplateCtx::Delete(&delete),
    )?)
}

#[tracing::instrument(skip_all)]
pub async fn do_delete_location(
    ctx: ViewCtx,
    Path(slug): Path<String>,
    mut conn: Conn<true>,
) -> StandardResponse {
    let location = fetch_with(&ctx, &slug, true, &mut *conn)?;
    diesel::delete(locations::table.find(location.id)).execute(&mut *conn)?;
    tracing::info!(location = location.id, "deleted location");
    ctx.deleted(&location)
}
