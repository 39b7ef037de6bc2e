//! Pluggable site modules.
//!
//! Every feature area of the site (meets, teams, ...) is described by a
//! [`SiteModule`]: a label which doubles as URL namespace and path prefix, a
//! set of named routes, an entry in the navigation menu and a map from the
//! names of its models to the url names under which they are served.
//! Modules are collected into a [`ModuleRegistry`] when the application is
//! built.

use std::any::Any;

use indexmap::IndexMap;

use crate::{auth::User, sitemodule::templates::TemplateFn};

pub mod registry;
pub mod templates;
pub mod urls;

pub use registry::{MenuModule, ModuleRegistry, SiteContext};
pub use urls::{ResolverMatch, UrlConf, UrlPattern, path};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("reverse for '{name}' with arguments {args:?} not found")]
    NoReverseMatch { name: String, args: Vec<String> },
    #[error("no site module is registered as '{0}'")]
    ModuleNotRegistered(String),
    #[error("a site module labelled '{0}' is already registered")]
    DuplicateModule(String),
    #[error("'{path}' could not be resolved: {reason}")]
    Resolver404 { path: String, reason: &'static str },
    #[error("invalid url pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: &'static str },
    #[error("none of the templates {0:?} exist")]
    TemplateDoesNotExist(Vec<String>),
}

/// Anything that can be linked to through a module's named urls.
pub trait ModelObject {
    fn pk(&self) -> i32;
    fn as_any(&self) -> &dyn Any;
}

/// Produces the reverse arguments for an object. Returning `None` (the object
/// is not of the expected type) falls back to `[pk]`.
pub type KeyFn = fn(&dyn Any) -> Option<Vec<String>>;

pub type PermFn = fn(Option<&User>) -> bool;

#[derive(Debug, Clone, Copy)]
pub struct MenuItem {
    pub title: &'static str,
    pub url_name: &'static str,
}

/// A resolved menu link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuEntry {
    pub title: &'static str,
    pub url: String,
}

pub struct SiteModule {
    pub name: &'static str,
    pub label: &'static str,
    pub verbose_name: String,
    pub verbose_name_plural: String,
    /// Material icon name.
    pub icon: &'static str,
    pub order: i32,
    pub enabled: bool,
    pub description: &'static str,
    model_map: IndexMap<&'static str, &'static str>,
    model_key_map: IndexMap<&'static str, KeyFn>,
    index: &'static str,
    perm: PermFn,
    menu: Vec<MenuItem>,
    templates: IndexMap<&'static str, TemplateFn>,
    routes: Vec<UrlConf>,
    patterns: IndexMap<&'static str, UrlPattern>,
}

fn title_case(s: &str) -> String {
    s.split(|c: char| c == '_' || c == ' ')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().chain(chars).collect::<String>()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

impl SiteModule {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            label: name,
            verbose_name: title_case(name),
            verbose_name_plural: title_case(name),
            icon: "receipt",
            order: 10,
            enabled: true,
            description: "",
            model_map: IndexMap::new(),
            model_key_map: IndexMap::new(),
            index: "index",
            perm: |_| true,
            menu: Vec::new(),
            templates: IndexMap::new(),
            routes: Vec::new(),
            patterns: IndexMap::new(),
        }
    }

    pub fn label(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }

    pub fn verbose_name(
        mut self,
        singular: &'static str,
        plural: &'static str,
    ) -> Self {
        self.verbose_name = singular.to_string();
        self.verbose_name_plural = plural.to_string();
        self
    }

    pub fn icon(mut self, icon: &'static str) -> Self {
        self.icon = icon;
        self
    }

    pub fn order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub fn model_alias(
        mut self,
        alias: &'static str,
        path: &'static str,
    ) -> Self {
        self.model_map.insert(alias, path);
        self
    }

    pub fn model_key(mut self, path: &'static str, key: KeyFn) -> Self {
        self.model_key_map.insert(path, key);
        self
    }

    /// Sets the url name (within this module) of the module's entry page.
    pub fn index(mut self, url_name: &'static str) -> Self {
        self.index = url_name;
        self
    }

    pub fn has_perm_with(mut self, perm: PermFn) -> Self {
        self.perm = perm;
        self
    }

    pub fn menu_item(
        mut self,
        title: &'static str,
        url_name: &'static str,
    ) -> Self {
        self.menu.push(MenuItem { title, url_name });
        self
    }

    pub fn template(mut self, name: &'static str, template: TemplateFn) -> Self {
        self.templates.insert(name, template);
        self
    }

    pub fn urls(mut self, routes: Vec<UrlConf>) -> Self {
        self.routes.extend(routes);
        self
    }

    /// Parses the module's route patterns. Called once by the registry.
    pub(crate) fn compile(&mut self) -> Result<(), RegistryError> {
        let mut patterns = IndexMap::new();
        for conf in &self.routes {
            let pattern = UrlPattern::parse(conf.route)?;
            if patterns.insert(conf.name, pattern).is_some() {
                return Err(RegistryError::InvalidPattern {
                    pattern: conf.route.to_string(),
                    reason: "duplicate url name",
                });
            }
        }
        self.patterns = patterns;
        Ok(())
    }

    pub(crate) fn routes(&self) -> &[UrlConf] {
        &self.routes
    }

    pub(crate) fn patterns(
        &self,
    ) -> impl Iterator<Item = (&'static str, &UrlPattern)> {
        self.patterns.iter().map(|(name, p)| (*name, p))
    }

    pub(crate) fn local_template(&self, name: &str) -> Option<TemplateFn> {
        self.templates.get(name).copied()
    }

    pub fn has_perm(&self, user: Option<&User>) -> bool {
        (self.perm)(user)
    }

    /// Reverses a url name belonging to this module (without the
    /// `<label>:` namespace).
    pub fn reverse<S: AsRef<str>>(
        &self,
        url_name: &str,
        args: &[S],
    ) -> Result<String, RegistryError> {
        self.patterns
            .get(url_name)
            .and_then(|p| p.reverse(self.label, args))
            .ok_or_else(|| RegistryError::NoReverseMatch {
                name: format!("{}:{}", self.label, url_name),
                args: args.iter().map(|a| a.as_ref().to_string()).collect(),
            })
    }

    pub fn index_url(&self) -> Result<String, RegistryError> {
        self.reverse::<&str>(self.index, &[]).inspect_err(|_| {
            tracing::error!(
                "the module {} does not have the named url '{}:{}'",
                self.name,
                self.label,
                self.index
            );
        })
    }

    /// Canonicalises a model name into the path used in this module's url
    /// names (e.g. `attendees` into `attendee`).
    pub fn get_model_path<'a>(&'a self, model_name: &'a str) -> &'a str {
        self.model_map.get(model_name).copied().unwrap_or(model_name)
    }

    pub fn get_named_url(&self, model_name: &str, url_name: &str) -> String {
        format!(
            "{}:{}_{}",
            self.label,
            self.get_model_path(model_name),
            url_name
        )
    }

    pub fn get_model_key(
        &self,
        object: &dyn ModelObject,
        model_path: &str,
    ) -> Vec<String> {
        self.model_key_map
            .get(model_path)
            .and_then(|key| key(object.as_any()))
            .unwrap_or_else(|| vec![object.pk().to_string()])
    }

    pub fn get_absolute_url(
        &self,
        object: &dyn ModelObject,
        model_name: &str,
        url_name: &str,
    ) -> Result<String, RegistryError> {
        let model_path = self.get_model_path(model_name);
        let key = self.get_model_key(object, model_path);
        let local = format!("{model_path}_{url_name}");
        self.reverse(&local, &key).inspect_err(|_| {
            tracing::debug!(
                "no reverse for url {} with keys {:?}",
                self.get_named_url(model_name, url_name),
                key
            );
        })
    }

    /// The module's menu with every entry reversed. Entries which do not
    /// reverse are left out.
    pub fn menu(&self) -> Vec<MenuEntry> {
        self.menu
            .iter()
            .filter_map(|item| match self.reverse::<&str>(item.url_name, &[]) {
                Ok(url) => Some(MenuEntry {
                    title: item.title,
                    url,
                }),
                Err(e) => {
                    tracing::debug!("skipping menu item {}: {e}", item.title);
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::any::Any;

    use axum::routing::get;

    use super::*;

    struct Thing {
        id: i32,
        slug: &'static str,
    }

    impl ModelObject for Thing {
        fn pk(&self) -> i32 {
            self.id
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct Other;

    impl ModelObject for Other {
        fn pk(&self) -> i32 {
            9
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn things() -> SiteModule {
        let mut module = SiteModule::new("things")
            .model_alias("things", "thing")
            .model_key("thing", |o| {
                o.downcast_ref::<Thing>().map(|t| vec![t.slug.to_string()])
            })
            .index("thing_list")
            .menu_item("All things", "thing_list")
            .menu_item("Broken", "does_not_exist")
            .urls(vec![
                path("", get(|| async { "" }), "thing_list"),
                path("<slug:slug>/", get(|| async { "" }), "thing_detail"),
                path("by-id/<int:pk>/", get(|| async { "" }), "other_detail"),
            ]);
        module.compile().unwrap();
        module
    }

    #[test]
    fn model_path_falls_back_to_identity() {
        let m = things();
        assert_eq!(m.get_model_path("things"), "thing");
        assert_eq!(m.get_model_path("widget"), "widget");
        assert_eq!(m.get_named_url("things", "detail"), "things:thing_detail");
    }

    #[test]
    fn model_key_uses_key_function_or_pk() {
        let m = things();
        let t = Thing { id: 4, slug: "blue" };
        assert_eq!(m.get_model_key(&t, "thing"), vec!["blue".to_string()]);
        assert_eq!(m.get_model_key(&Other, "thing"), vec!["9".to_string()]);
        assert_eq!(m.get_model_key(&t, "other"), vec!["4".to_string()]);
    }

    #[test]
    fn absolute_url_reverses_module_url() {
        let m = things();
        let t = Thing { id: 4, slug: "blue" };
        assert_eq!(
            m.get_absolute_url(&t, "things", "detail").unwrap(),
            "/things/blue/"
        );
        assert_eq!(
            m.get_absolute_url(&Other, "other", "detail").unwrap(),
            "/things/by-id/9/"
        );
        assert!(matches!(
            m.get_absolute_url(&t, "thing", "update"),
            Err(RegistryError::NoReverseMatch { .. })
        ));
    }

    #[test]
    fn index_and_menu() {
        let m = things();
        assert_eq!(m.index_url().unwrap(), "/things/");
        assert_eq!(
            m.menu(),
            vec![MenuEntry {
                title: "All things",
                url: "/things/".to_string()
            }]
        );
        assert!(SiteModule::new("empty").index_url().is_err());
    }

    #[test]
    fn duplicate_url_names_are_rejected() {
        let mut m = SiteModule::new("dupes").urls(vec![
            path("", get(|| async { "" }), "index"),
            path("x/", get(|| async { "" }), "index"),
        ]);
        assert!(m.compile().is_err());
    }
}
