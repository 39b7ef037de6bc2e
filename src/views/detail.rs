use crate::views::{Cell, SiteModel, ViewCtx};

#[derive(Debug, Clone)]
pub enum DetailSection {
    /// A related table, e.g. the roster of a meet.
    Table {
        title: String,
        headers: Vec<&'static str>,
        rows: Vec<Vec<Cell>>,
        /// (url, text)
        actions: Vec<(String, String)>,
    },
    /// Sanitised html.
    Html { title: String, html: String },
}

#[derive(Debug, Clone)]
pub struct DetailContext {
    pub title: String,
    pub object_data: Vec<(&'static str, Cell)>,
    pub update_url: Option<String>,
    pub delete_url: Option<String>,
    pub list_url: Option<String>,
    pub sections: Vec<DetailSection>,
}

/// Labelled field values for a detail page. Identifiers are never shown and
/// empty values are skipped.
pub fn get_object_data(
    fields: impl IntoIterator<Item = (&'static str, Cell)>,
) -> Vec<(&'static str, Cell)> {
    fields
        .into_iter()
        .filter(|(label, _)| !matches!(label.to_ascii_lowercase().as_str(), "id" | "slug"))
        .filter(|(_, cell)| !cell.text.trim().is_empty())
        .collect()
}

/// The detail context of `object`; update and delete links are only present
/// when permitted (and when the module serves them).
pub fn build_detail<T: SiteModel>(
    ctx: &ViewCtx,
    object: &T,
    fields: impl IntoIterator<Item = (&'static str, Cell)>,
    can_update: bool,
    can_delete: bool,
) -> DetailContext {
    DetailContext {
        title: object.display(),
        object_data: get_object_data(fields),
        update_url: can_update
            .then(|| ctx.object_url(object, "update"))
            .flatten(),
        delete_url: can_delete
            .then(|| ctx.object_url(object, "delete"))
            .flatten(),
        list_url: ctx.model_url::<T>("list"),
        sections: Vec::new(),
    }
}

#[derive(Debug, Clone)]
pub struct DeleteContext {
    pub title: String,
    pub verbose_name: &'static str,
    pub object: String,
    pub action: String,
    pub cancel_url: Option<String>,
    /// Rows removed along with the object, as (verbose name plural, count).
    pub cascades: Vec<(&'static str, i64)>,
}

pub fn build_delete<T: SiteModel>(
    ctx: &ViewCtx,
    object: &T,
    cascades: Vec<(&'static str, i64)>,
) -> DeleteContext {
    DeleteContext {
        title: format!("Delete {}", T::VERBOSE_NAME),
        verbose_name: T::VERBOSE_NAME,
        object: object.display(),
        action: ctx.path.clone(),
        cancel_url: ctx.object_url(object, "detail"),
        cascades,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_data_skips_ids_and_blanks() {
        let data = get_object_data([
            ("Id", Cell::new("3")),
            ("Slug", Cell::new("friday")),
            ("Name", Cell::new("Friday")),
            ("Comments", Cell::new("  ")),
            ("Team", Cell::link("Reds", Some("/teams/reds/".to_string()))),
        ]);
        assert_eq!(
            data.iter().map(|(l, _)| *l).collect::<Vec<_>>(),
            vec!["Name", "Team"]
        );
    }
}
