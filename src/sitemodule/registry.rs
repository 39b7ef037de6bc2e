use std::collections::HashMap;

use axum::{Router, http::StatusCode, response::IntoResponse, routing::any};
use indexmap::IndexMap;

use crate::{
    auth::User,
    sitemodule::{
        MenuEntry, RegistryError, ResolverMatch, SiteModule,
        templates::TemplateFn,
    },
    state::AppState,
    views::templates as site_templates,
};

/// The collection of site modules making up the application.
pub struct ModuleRegistry {
    registry: IndexMap<&'static str, SiteModule>,
    /// module name -> label
    names: HashMap<&'static str, &'static str>,
    templates: IndexMap<&'static str, TemplateFn>,
}

/// One entry of the navigation menu.
#[derive(Debug, Clone)]
pub struct MenuModule {
    pub label: &'static str,
    pub verbose_name: String,
    pub icon: &'static str,
    pub url: Option<String>,
    pub active: bool,
    pub entries: Vec<MenuEntry>,
}

/// The modules a user may see, and the module the current request belongs
/// to.
#[derive(Debug, Clone, Default)]
pub struct SiteContext {
    pub modules: Vec<MenuModule>,
    pub current: Option<&'static str>,
}

impl SiteContext {
    pub fn current_module(&self) -> Option<&MenuModule> {
        self.modules.iter().find(|m| m.active)
    }
}

async fn not_installed() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Module not installed")
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleRegistry {
    /// An empty registry which knows the site-wide fallback templates.
    pub fn new() -> Self {
        let mut templates: IndexMap<&'static str, TemplateFn> = IndexMap::new();
        templates.insert("site/model_list", site_templates::model_list);
        templates.insert("site/model_detail", site_templates::model_detail);
        templates.insert("common/views/form", site_templates::model_form);
        templates.insert(
            "site/model_confirm_delete",
            site_templates::model_confirm_delete,
        );
        templates.insert("site/base_module", site_templates::base_module);

        Self {
            registry: IndexMap::new(),
            names: HashMap::new(),
            templates,
        }
    }

    pub fn register(
        &mut self,
        mut module: SiteModule,
    ) -> Result<(), RegistryError> {
        if self.registry.contains_key(module.label) {
            return Err(RegistryError::DuplicateModule(module.label.to_string()));
        }
        module.compile()?;

        tracing::debug!(
            label = module.label,
            name = module.name,
            order = module.order,
            enabled = module.enabled,
            routes = module.routes().len(),
            "module {} registered",
            module.label
        );

        self.names.insert(module.name, module.label);
        self.registry.insert(module.label, module);
        Ok(())
    }

    /// All modules, ordered by `(order, label)`.
    pub fn modules(&self) -> Vec<&SiteModule> {
        let mut modules = self.registry.values().collect::<Vec<_>>();
        modules.sort_by(|a, b| (a.order, a.label).cmp(&(b.order, b.label)));
        modules
    }

    pub fn enabled_modules(&self) -> Vec<&SiteModule> {
        self.modules().into_iter().filter(|m| m.enabled).collect()
    }

    pub fn available_modules(&self, user: Option<&User>) -> Vec<&SiteModule> {
        self.enabled_modules()
            .into_iter()
            .filter(|m| m.has_perm(user))
            .collect()
    }

    /// Looks a module up by label, then by name.
    pub fn get_module(&self, label: &str) -> Option<&SiteModule> {
        self.registry.get(label).or_else(|| {
            self.names
                .get(label)
                .and_then(|label| self.registry.get(label))
        })
    }

    pub fn module(&self, label: &str) -> Result<&SiteModule, RegistryError> {
        self.get_module(label)
            .ok_or_else(|| RegistryError::ModuleNotRegistered(label.to_string()))
    }

    /// The routes of every module, each under `/<label>/`. Disabled modules
    /// keep their routes, which all answer 404.
    pub fn urls(&self) -> Router<AppState> {
        let mut router = Router::new();
        for module in self.modules() {
            for ((_, pattern), conf) in module.patterns().zip(module.routes()) {
                let route = pattern.axum_route(module.label);
                router = if module.enabled {
                    router.route(&route, conf.view.clone())
                } else {
                    router.route(&route, any(not_installed))
                };
            }
        }
        router
    }

    /// Finds the module and named url which serve `path`.
    pub fn resolve(&self, path: &str) -> Result<ResolverMatch, RegistryError> {
        let not_found = |reason| RegistryError::Resolver404 {
            path: path.to_string(),
            reason,
        };

        let (label, rest) = path
            .strip_prefix('/')
            .and_then(|p| p.split_once('/'))
            .ok_or_else(|| not_found("no module prefix"))?;
        let module = self
            .registry
            .get(label)
            .ok_or_else(|| not_found("no module is mounted here"))?;

        for (url_name, pattern) in module.patterns() {
            if let Some(kwargs) = pattern.matches(rest) {
                if !module.enabled {
                    return Err(not_found("Module not installed"));
                }
                return Ok(ResolverMatch {
                    module: module.label,
                    url_name,
                    kwargs,
                });
            }
        }

        Err(not_found("no pattern matched"))
    }

    /// Reverses a fully qualified url name, `<label>:<url_name>`.
    pub fn reverse<S: AsRef<str>>(
        &self,
        name: &str,
        args: &[S],
    ) -> Result<String, RegistryError> {
        let no_match = || RegistryError::NoReverseMatch {
            name: name.to_string(),
            args: args.iter().map(|a| a.as_ref().to_string()).collect(),
        };

        let (label, url_name) = name.split_once(':').ok_or_else(no_match)?;
        let module = self.get_module(label).ok_or_else(no_match)?;
        module.reverse(url_name, args)
    }

    /// Returns the first of `candidates` which exists. Names are
    /// `<label>/<template>` for module templates or one of the site-wide
    /// templates.
    pub fn select_template<S: AsRef<str>>(
        &self,
        candidates: &[S],
    ) -> Result<TemplateFn, RegistryError> {
        for name in candidates {
            let name = name.as_ref();
            if let Some((label, local)) = name.split_once('/') {
                if let Some(t) = self
                    .get_module(label)
                    .and_then(|m| m.local_template(local))
                {
                    return Ok(t);
                }
            }
            if let Some(t) = self.templates.get(name) {
                return Ok(*t);
            }
        }

        Err(RegistryError::TemplateDoesNotExist(
            candidates.iter().map(|c| c.as_ref().to_string()).collect(),
        ))
    }

    /// The frame a module's pages are rendered in:
    /// `<label>/base_module` when the module provides one.
    pub fn base_template(
        &self,
        module: &SiteModule,
    ) -> Result<TemplateFn, RegistryError> {
        self.select_template(&[
            format!("{}/base_module", module.label),
            "site/base_module".to_string(),
        ])
    }

    pub fn context(&self, user: Option<&User>, path: &str) -> SiteContext {
        let current = match self.resolve(path) {
            Ok(m) => Some(m.module),
            Err(e) => {
                tracing::trace!("{e}");
                None
            }
        };

        let modules = self
            .available_modules(user)
            .into_iter()
            .map(|m| MenuModule {
                label: m.label,
                verbose_name: m.verbose_name_plural.clone(),
                icon: m.icon,
                url: m.index_url().ok(),
                active: current == Some(m.label),
                entries: m.menu(),
            })
            .collect();

        SiteContext { modules, current }
    }
}

#[cfg(test)]
mod tests {
    use axum::routing::get;

    use super::*;
    use crate::sitemodule::path;

    fn module(name: &'static str, order: i32) -> SiteModule {
        SiteModule::new(name).order(order).urls(vec![
            path("", get(|| async { "" }), "index"),
            path("<slug:slug>/", get(|| async { "" }), "item_detail"),
        ])
    }

    fn registry() -> ModuleRegistry {
        let mut registry = ModuleRegistry::new();
        registry.register(module("teams", 70)).unwrap();
        registry.register(module("meets", 30)).unwrap();
        registry.register(module("alpha", 30)).unwrap();
        registry
            .register(module("userprofile", 100).label("users"))
            .unwrap();
        registry
            .register(module("hidden", 5).enabled(false))
            .unwrap();
        registry
            .register(
                module("private", 40)
                    .has_perm_with(|user| user.is_some_and(|u| u.is_staff)),
            )
            .unwrap();
        registry
    }

    fn labels(modules: Vec<&SiteModule>) -> Vec<&'static str> {
        modules.into_iter().map(|m| m.label).collect()
    }

    #[test]
    fn modules_are_ordered_by_order_then_label() {
        let r = registry();
        assert_eq!(
            labels(r.modules()),
            vec!["hidden", "alpha", "meets", "private", "teams", "users"]
        );
        assert_eq!(
            labels(r.enabled_modules()),
            vec!["alpha", "meets", "private", "teams", "users"]
        );
        assert_eq!(
            labels(r.available_modules(None)),
            vec!["alpha", "meets", "teams", "users"]
        );
    }

    #[test]
    fn duplicate_labels_are_rejected() {
        let mut r = registry();
        assert!(matches!(
            r.register(module("teams", 1)),
            Err(RegistryError::DuplicateModule(_))
        ));
    }

    #[test]
    fn get_module_by_label_or_name() {
        let r = registry();
        assert_eq!(r.get_module("users").unwrap().name, "userprofile");
        assert_eq!(r.get_module("userprofile").unwrap().label, "users");
        assert!(r.get_module("nope").is_none());
        assert!(matches!(
            r.module("nope"),
            Err(RegistryError::ModuleNotRegistered(_))
        ));
    }

    #[test]
    fn reverse_and_resolve() {
        let r = registry();
        assert_eq!(
            r.reverse("meets:item_detail", &["friday"]).unwrap(),
            "/meets/friday/"
        );
        assert_eq!(r.reverse::<&str>("users:index", &[]).unwrap(), "/users/");
        assert!(r.reverse::<&str>("meets:item_detail", &[]).is_err());
        assert!(r.reverse::<&str>("meets", &[]).is_err());
        assert!(r.reverse::<&str>("nowhere:index", &[]).is_err());

        let m = r.resolve("/meets/friday/").unwrap();
        assert_eq!(m.view_name(), "meets:item_detail");
        assert_eq!(m.kwargs["slug"], "friday");

        assert!(matches!(
            r.resolve("/hidden/"),
            Err(RegistryError::Resolver404 {
                reason: "Module not installed",
                ..
            })
        ));
        assert!(r.resolve("/nowhere/").is_err());
        assert!(r.resolve("/meets/a/b/").is_err());
    }

    #[test]
    fn select_template_falls_back_to_site_templates() {
        let r = registry();
        assert!(
            r.select_template(&["meets/item_detail", "site/model_detail"])
                .is_ok()
        );
        assert!(matches!(
            r.select_template(&["meets/item_detail"]),
            Err(RegistryError::TemplateDoesNotExist(_))
        ));
        assert!(r.base_template(r.module("meets").unwrap()).is_ok());
    }

    #[test]
    fn context_marks_the_current_module() {
        let r = registry();
        let ctx = r.context(None, "/teams/red/");
        assert_eq!(ctx.current, Some("teams"));
        assert_eq!(ctx.current_module().unwrap().label, "teams");
        assert_eq!(
            ctx.modules.iter().map(|m| m.label).collect::<Vec<_>>(),
            vec!["alpha", "meets", "teams", "users"]
        );
        assert_eq!(ctx.modules[1].url.as_deref(), Some("/meets/"));
        assert_eq!(r.context(None, "/login").current, None);
    }
}
