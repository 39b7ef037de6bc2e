//! Places where meets happen.

use axum::routing::get;
use diesel::{connection::LoadConnection, insert_into, prelude::*, sqlite::Sqlite};
use serde::Serialize;

use crate::{
    auth::User,
    error::SaveError,
    permission::ModelPermissions,
    schema::locations,
    sitemodule::{SiteModule, path},
    slug::{allocate, slugify},
    views::SiteModel,
};

pub mod views;

pub const DEFAULT_NAME: &str = "Unknown location";

const RESERVED: &[&str] = &["location", "locations"];

#[derive(Queryable, Selectable, Serialize, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = locations)]
#[diesel(check_for_backend(Sqlite))]
pub struct Location {
    pub id: i32,
    pub slug: String,
    pub name: String,
    pub address: String,
    pub coordinates: String,
    pub googlemap_url: String,
    pub phone: String,
    pub homepage: String,
    pub description: String,
}

impl SiteModel for Location {
    const APP_LABEL: &'static str = "locations";
    const MODEL_NAME: &'static str = "location";
    const VERBOSE_NAME: &'static str = "location";
    const VERBOSE_NAME_PLURAL: &'static str = "locations";

    fn id(&self) -> i32 {
        self.id
    }

    fn display(&self) -> String {
        self.name.clone()
    }
}

impl ModelPermissions for Location {
    fn has_view_permission(
        &self,
        _user: &User,
        _conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> QueryResult<bool> {
        Ok(true)
    }

    fn has_update_permission(
        &self,
        user: &User,
        _conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> QueryResult<bool> {
        Ok(user.is_superuser || user.is_staff)
    }
}

impl Location {
    pub fn fetch_by_slug(
        slug: &str,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> QueryResult<Location> {
        locations::table
            .filter(locations::slug.eq(slug))
            .select(Location::as_select())
            .first(conn)
    }
}

#[derive(Debug, Clone, Default)]
pub struct LocationData {
    pub slug: String,
    pub name: String,
    pub address: String,
    pub coordinates: String,
    pub googlemap_url: String,
    pub phone: String,
    pub homepage: String,
    pub description: String,
}

impl LocationData {
    fn prepare(
        &mut self,
        id: Option<i32>,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Result<(), SaveError> {
        if self.name.trim().is_empty() {
            self.name = DEFAULT_NAME.to_string();
        }
        if self.slug.is_empty() {
            let this = id.unwrap_or(0);
            self.slug =
                allocate(&slugify(&self.name), "location", RESERVED, |slug| {
                    locations::table
                        .filter(
                            locations::slug.eq(slug).and(locations::id.ne(this)),
                        )
                        .select(locations::id)
                        .order_by(locations::id.desc())
                        .first::<i32>(conn)
                        .optional()
                })?;
        }
        Ok(())
    }
}

pub fn create_location(
    mut data: LocationData,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<Location, SaveError> {
    data.prepare(None, conn)?;
    let location = insert_into(locations::table)
        .values((
            locations::slug.eq(&data.slug),
            locations::name.eq(&data.name),
            locations::address.eq(&data.address),
            locations::coordinates.eq(&data.coordinates),
            locations::googlemap_url.eq(&data.googlemap_url),
            locations::phone.eq(&data.phone),
            locations::homepage.eq(&data.homepage),
            locations::description.eq(&data.description),
        ))
        .returning(Location::as_returning())
        .get_result(conn)?;

    tracing::info!(location = location.id, slug = %location.slug, "created location");
    Ok(location)
}

pub fn update_location(
    id: i32,
    mut data: LocationData,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<Location, SaveError> {
    data.prepare(Some(id), conn)?;
    Ok(diesel::update(locations::table.find(id))
        .set((
            locations::slug.eq(&data.slug),
            locations::name.eq(&data.name),
            locations::address.eq(&data.address),
            locations::coordinates.eq(&data.coordinates),
            locations::googlemap_url.eq(&data.googlemap_url),
            locations::phone.eq(&data.phone),
            locations::homepage.eq(&data.homepage),
            locations::description.eq(&data.description),
        ))
        .returning(Location::as_returning())
        .get_result(conn)?)
}

/// `(id, name)` select choices of every location.
pub fn location_choices(
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> QueryResult<Vec<(String, String)>> {
    Ok(locations::table
        .select((locations::id, locations::name))
        .order_by(locations::name.asc())
        .load::<(i32, String)>(conn)?
        .into_iter()
        .map(|(id, name)| (id.to_string(), name))
        .collect())
}

pub fn module() -> SiteModule {
    SiteModule::new("locations")
        .verbose_name("Location", "Locations")
        .icon("place")
        .order(80)
        .description("Where meets take place")
        .model_alias("locations", "location")
        .model_key("location", |o| {
            o.downcast_ref::<Location>().map(|l| vec![l.slug.clone()])
        })
        .index("location_list")
        .menu_item("All locations", "location_list")
        .urls(vec![
            path("", get(views::location_list), "location_list"),
            path(
                "create/",
                get(views::create_location_page).post(views::do_create_location),
                "location_create",
            ),
            path(
                "<slug:slug>/update/",
                get(views::update_location_page).post(views::do_update_location),
                "location_update",
            ),
            path(
                "<slug:slug>/delete/",
                get(views::delete_location_page).post(views::do_delete_location),
                "location_delete",
            ),
            path("<slug:slug>/", get(views::location_detail), "location_detail"),
        ])
}

#[cfg(test)]
mod tests {
    use diesel::{Connection, SqliteConnection};
    use diesel_migrations::MigrationHarness;

    use super::*;
    use crate::MIGRATIONS;

    fn conn() -> SqliteConnection {
        let mut conn = SqliteConnection::establish(":memory:").unwrap();
        conn.run_pending_migrations(MIGRATIONS).unwrap();
        conn
    }

    #[test]
    fn reserved_and_taken_slugs_are_suffixed() {
        let mut conn = conn();
        let first = create_location(
            LocationData {
                name: "Locations".to_string(),
                ..Default::default()
            },
            &mut conn,
        )
        .unwrap();
        assert_eq!(first.slug, "locations-1");

        let a = create_location(
            LocationData {
                name: "Town Hall".to_string(),
                ..Default::default()
            },
            &mut conn,
        )
        .unwrap();
        let b = create_location(
            LocationData {
                name: "Town hall".to_string(),
                ..Default::default()
            },
            &mut conn,
        )
        .unwrap();
        assert_eq!(a.slug, "town-hall");
        assert_eq!(b.slug, format!("town-hall-{}", a.id));
    }

    #[test]
    fn blank_name_gets_the_default() {
        let mut conn = conn();
        let l = create_location(LocationData::default(), &mut conn).unwrap();
        assert_eq!(l.name, DEFAULT_NAME);
        assert_eq!(l.slug, "unknown-location");
    }

    #[test]
    fn update_keeps_own_slug() {
        let mut conn = conn();
        let l = create_location(
            LocationData {
                name: "Pitch".to_string(),
                ..Default::default()
            },
            &mut conn,
        )
        .unwrap();
        let updated = update_location(
            l.id,
            LocationData {
                name: "Pitch".to_string(),
                phone: "555".to_string(),
                ..Default::default()
            },
            &mut conn,
        )
        .unwrap();
        assert_eq!(updated.slug, "pitch");
        assert_eq!(updated.phone, "555");
    }
}
