//! Named templates.
//!
//! Templates are plain functions rendering one of the generic view contexts.
//! Modules may provide their own under `<label>/<name>`; lookups go through
//! [`crate::sitemodule::ModuleRegistry::select_template`] so that a module
//! template shadows the site-wide fallback.

use hypertext::prelude::*;

use crate::{
    sitemodule::registry::MenuModule,
    views::{DeleteContext, DetailContext, FormContext, ListContext},
};

pub type TemplateFn =
    fn(&TemplateCtx<'_>, &mut hypertext::Buffer<hypertext::context::Node>);

pub enum TemplateCtx<'a> {
    List(&'a ListContext),
    Detail(&'a DetailContext),
    Form(&'a FormContext),
    Delete(&'a DeleteContext),
    Module(&'a MenuModule),
}

/// A template bound to its context, ready to be placed in a page.
pub struct Template<'a> {
    pub template: TemplateFn,
    pub ctx: TemplateCtx<'a>,
}

impl Renderable for Template<'_> {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        (self.template)(&self.ctx, buffer)
    }
}
