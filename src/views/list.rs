use serde::Deserialize;

use crate::views::{SiteModel, ViewCtx};

#[derive(Debug, Deserialize, Default)]
pub struct PageQuery {
    pub page: Option<String>,
    pub q: Option<String>,
}

/// A table cell: text, optionally linked.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Cell {
    pub text: String,
    pub url: Option<String>,
}

impl Cell {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            url: None,
        }
    }

    pub fn link(text: impl Into<String>, url: Option<String>) -> Self {
        Self {
            text: text.into(),
            url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pagination {
    pub number: i64,
    pub num_pages: i64,
    pub count: i64,
    pub per_page: i64,
    pub prev_url: Option<String>,
    pub next_url: Option<String>,
}

impl Pagination {
    /// `page` is a number or `last`. `None` when it is neither or is past
    /// the last page (an empty first page is always valid).
    pub fn new(path: &str, page: Option<&str>, count: i64, per_page: i64) -> Option<Self> {
        let per_page = per_page.max(1);
        let num_pages = ((count + per_page - 1) / per_page).max(1);
        let number = match page.map(str::trim) {
            None => 1,
            Some("last") => num_pages,
            Some(page) => page.parse::<i64>().ok()?,
        };
        if number < 1 || number > num_pages {
            return None;
        }

        let url = |n: i64| format!("{path}?page={n}");
        Some(Self {
            number,
            num_pages,
            count,
            per_page,
            prev_url: (number > 1).then(|| url(number - 1)),
            next_url: (number < num_pages).then(|| url(number + 1)),
        })
    }

    pub fn offset(&self) -> i64 {
        (self.number - 1) * self.per_page
    }

    pub fn limit(&self) -> i64 {
        self.per_page
    }
}

#[derive(Debug, Clone)]
pub struct ListContext {
    pub title: String,
    pub headers: Vec<&'static str>,
    pub rows: Vec<Vec<Cell>>,
    /// Link to `<model>_create`, present only with add permission.
    pub add_url: Option<String>,
    /// Further page-level links, as (url, text).
    pub actions: Vec<(String, String)>,
    pub pagination: Option<Pagination>,
}

/// A row of a model list page.
pub trait ModelList {
    type Model: SiteModel;

    /// `(field, header)` pairs, in column order.
    const LIST_DISPLAY: &'static [(&'static str, &'static str)];
    /// Columns linking to the item url; the first column when empty.
    const LIST_DISPLAY_LINKS: &'static [&'static str] = &[];
    const PAGINATE_BY: Option<i64> = None;

    fn object(&self) -> &Self::Model;

    fn field_value(&self, field: &str) -> String;

    fn get_item_url(&self, ctx: &ViewCtx) -> Option<String> {
        ctx.object_url(self.object(), "detail")
    }

    /// A link for a non-link column (e.g. to a related object).
    fn get_field_url(&self, _field: &str, _ctx: &ViewCtx) -> Option<String> {
        None
    }
}

fn is_link_column<R: ModelList>(i: usize, field: &str) -> bool {
    if R::LIST_DISPLAY_LINKS.is_empty() {
        i == 0
    } else {
        R::LIST_DISPLAY_LINKS.contains(&field)
    }
}

pub fn build_list<R: ModelList>(
    ctx: &ViewCtx,
    rows: &[R],
    add_url: Option<String>,
    pagination: Option<Pagination>,
) -> ListContext {
    let rows = rows
        .iter()
        .map(|row| {
            R::LIST_DISPLAY
                .iter()
                .enumerate()
                .map(|(i, (field, _))| {
                    let url = if is_link_column::<R>(i, field) {
                        row.get_item_url(ctx)
                    } else {
                        row.get_field_url(field, ctx)
                    };
                    Cell::link(row.field_value(field), url)
                })
                .collect()
        })
        .collect();

    ListContext {
        title: <R::Model as SiteModel>::VERBOSE_NAME_PLURAL.to_string(),
        headers: R::LIST_DISPLAY.iter().map(|(_, h)| *h).collect(),
        rows,
        add_url,
        actions: Vec::new(),
        pagination,
    }
}

#[cfg(test)]
mod tests {
    use super::Pagination;

    #[test]
    fn pagination_bounds() {
        let p = Pagination::new("/meets/", Some("2"), 45, 20).unwrap();
        assert_eq!(p.num_pages, 3);
        assert_eq!(p.offset(), 20);
        assert_eq!(p.prev_url.as_deref(), Some("/meets/?page=1"));
        assert_eq!(p.next_url.as_deref(), Some("/meets/?page=3"));

        assert!(Pagination::new("/meets/", Some("4"), 45, 20).is_none());
        assert!(Pagination::new("/meets/", Some("0"), 45, 20).is_none());
        assert!(Pagination::new("/meets/", Some("two"), 45, 20).is_none());
        assert_eq!(
            Pagination::new("/meets/", Some("last"), 45, 20).unwrap().number,
            3
        );

        let empty = Pagination::new("/meets/", None, 0, 20).unwrap();
        assert_eq!(empty.num_pages, 1);
        assert!(empty.next_url.is_none());
    }
}
