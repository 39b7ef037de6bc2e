//! Generic model views.
//!
//! The list, detail, create, update and delete pages of every model are built
//! from the same parts: a [`SiteModel`] describing how the model is named and
//! addressed, the permission predicates from [`crate::permission`], and one
//! of the view contexts below which is handed to a template chosen through
//! the module registry.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    response::Redirect,
};
use axum_extra::extract::PrivateCookieJar;
use hypertext::prelude::*;

use crate::{
    auth::{AuthError, User},
    msg::{self, Msg},
    sitemodule::{
        ModelObject, ModuleRegistry, RegistryError, SiteModule,
        templates::{Template, TemplateCtx},
    },
    state::AppState,
    template::Page,
    util_resp::{FailureResponse, StandardResponse, SuccessResponse},
};

pub mod detail;
pub mod form;
pub mod list;
pub mod templates;

pub use detail::{DeleteContext, DetailContext, DetailSection};
pub use form::{Field, FieldErrors, FieldKind, FormContext, Formset};
pub use list::{Cell, ListContext, ModelList, Pagination};

/// How a model is named and addressed by the generic views.
pub trait SiteModel: 'static {
    /// The label or name of the module serving the model.
    const APP_LABEL: &'static str;
    const MODEL_NAME: &'static str;
    const VERBOSE_NAME: &'static str;
    const VERBOSE_NAME_PLURAL: &'static str;

    fn id(&self) -> i32;

    fn display(&self) -> String;
}

impl<T: SiteModel> ModelObject for T {
    fn pk(&self) -> i32 {
        self.id()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Everything a module page needs besides the database: the logged-in user,
/// the registry (for links and templates), the request path (for the menu)
/// and the pending flash messages.
pub struct ViewCtx {
    pub user: User,
    pub registry: Arc<ModuleRegistry>,
    pub path: String,
    pub messages: Vec<Msg>,
    pub jar: PrivateCookieJar,
}

#[async_trait]
impl FromRequestParts<AppState> for ViewCtx {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = User::from_request_parts(parts, state).await?;
        let jar = match PrivateCookieJar::from_request_parts(parts, state).await
        {
            Ok(jar) => jar,
            Err(never) => match never {},
        };
        Ok(ViewCtx {
            user,
            registry: state.registry.clone(),
            path: parts.uri.path().to_string(),
            messages: msg::take(&jar),
            jar,
        })
    }
}

pub fn module_of<T: SiteModel>(
    registry: &ModuleRegistry,
) -> Result<&SiteModule, RegistryError> {
    registry.module(T::APP_LABEL)
}

/// `<model>_<url_name>` reversed for `object`, or `None` when the route does
/// not exist.
pub fn object_url<T: SiteModel>(
    registry: &ModuleRegistry,
    object: &T,
    url_name: &str,
) -> Option<String> {
    module_of::<T>(registry)
        .and_then(|m| m.get_absolute_url(object, T::MODEL_NAME, url_name))
        .ok()
}

/// A model url without arguments (`<model>_list`, `<model>_create`).
pub fn model_url<T: SiteModel>(
    registry: &ModuleRegistry,
    url_name: &str,
) -> Option<String> {
    module_of::<T>(registry)
        .and_then(|m| {
            registry.reverse::<&str>(&m.get_named_url(T::MODEL_NAME, url_name), &[])
        })
        .ok()
}

/// `<app_label>/<model_path><suffix>`, `<app_label>/<model_path>_form` and
/// the given fallback.
pub fn template_names<T: SiteModel>(
    registry: &ModuleRegistry,
    suffix: &str,
    fallback: &str,
) -> Vec<String> {
    let model_path = registry
        .get_module(T::APP_LABEL)
        .map(|m| m.get_model_path(T::MODEL_NAME).to_string())
        .unwrap_or_else(|| T::MODEL_NAME.to_string());
    vec![
        format!("{}/{}{}", T::APP_LABEL, model_path, suffix),
        format!("{}/{}_form", T::APP_LABEL, model_path),
        fallback.to_string(),
    ]
}

impl ViewCtx {
    pub fn page<R: Renderable>(&self) -> Page<R> {
        Page::new()
            .user(self.user.clone())
            .site(self.registry.context(Some(&self.user), &self.path))
            .messages(self.messages.clone())
    }

    pub fn reverse<S: AsRef<str>>(&self, name: &str, args: &[S]) -> Option<String> {
        self.registry.reverse(name, args).ok()
    }

    pub fn object_url<T: SiteModel>(&self, object: &T, url_name: &str) -> Option<String> {
        object_url(&self.registry, object, url_name)
    }

    pub fn model_url<T: SiteModel>(&self, url_name: &str) -> Option<String> {
        model_url::<T>(&self.registry, url_name)
    }

    /// Renders the first existing template of
    /// [`template_names`]`(suffix, fallback)` inside the site frame.
    pub fn render<T: SiteModel>(
        &self,
        title: &str,
        suffix: &str,
        fallback: &str,
        ctx: TemplateCtx<'_>,
    ) -> Result<hypertext::Rendered<String>, FailureResponse> {
        let names = template_names::<T>(&self.registry, suffix, fallback);
        let template = self.registry.select_template(&names).map_err(|e| {
            tracing::error!("{e}");
            FailureResponse::ServerError(())
        })?;

        Ok(self
            .page()
            .title(title)
            .body(Template { template, ctx })
            .render())
    }

    /// Redirects to `to`, queueing `msg` for the next page.
    pub fn redirect_with(self, to: &str, msg: Msg) -> StandardResponse {
        Ok(SuccessResponse::SeeOtherWithCookies(
            msg::push(self.jar, msg),
            Box::new(Redirect::to(to)),
        ))
    }

    /// After a create or update: to the object's detail page (or the list
    /// when there is none), announcing `The <model> "<object>" was <verb>
    /// successfully.`
    pub fn saved<T: SiteModel>(self, object: &T, verb: &str) -> StandardResponse {
        let url = self
            .object_url(object, "detail")
            .or_else(|| self.model_url::<T>("list"))
            .unwrap_or_else(|| "/".to_string());
        let msg =
            Msg::saved(T::VERBOSE_NAME, object.display(), Some(url.clone()), verb);
        self.redirect_with(&url, msg)
    }

    /// After a delete: back to the model's list.
    pub fn deleted<T: SiteModel>(self, object: &T) -> StandardResponse {
        let url = self
            .model_url::<T>("list")
            .unwrap_or_else(|| "/".to_string());
        let msg = Msg::saved(T::VERBOSE_NAME, object.display(), None, "deleted");
        self.redirect_with(&url, msg)
    }
}
