//! The site-wide fallback templates of the generic views.

use hypertext::{Raw, prelude::*};

use crate::{
    sitemodule::templates::TemplateCtx,
    views::{
        DeleteContext, DetailContext, DetailSection, Field, FieldKind,
        FormContext, ListContext,
    },
    widgets::{
        actions::Actions,
        alert::ErrorList,
        table::{CellView, Table},
    },
};

type Buffer = hypertext::Buffer<hypertext::context::Node>;

fn mismatch(template: &str) {
    tracing::error!("template {template} was given the wrong context");
}

pub fn model_list(ctx: &TemplateCtx<'_>, buffer: &mut Buffer) {
    let TemplateCtx::List(list) = ctx else {
        return mismatch("site/model_list");
    };
    ListPage { list }.render_to(buffer)
}

pub fn model_detail(ctx: &TemplateCtx<'_>, buffer: &mut Buffer) {
    let TemplateCtx::Detail(detail) = ctx else {
        return mismatch("site/model_detail");
    };
    DetailPage { detail }.render_to(buffer)
}

pub fn model_form(ctx: &TemplateCtx<'_>, buffer: &mut Buffer) {
    let TemplateCtx::Form(form) = ctx else {
        return mismatch("common/views/form");
    };
    FormPage { form }.render_to(buffer)
}

pub fn model_confirm_delete(ctx: &TemplateCtx<'_>, buffer: &mut Buffer) {
    let TemplateCtx::Delete(delete) = ctx else {
        return mismatch("site/model_confirm_delete");
    };
    DeletePage { delete }.render_to(buffer)
}

/// The landing page of a module without its own index view: the module's
/// menu as a list of links.
pub fn base_module(ctx: &TemplateCtx<'_>, buffer: &mut Buffer) {
    let TemplateCtx::Module(module) = ctx else {
        return mismatch("site/base_module");
    };
    maud! {
        h1 {
            span class="material-icons" { (module.icon) }
            " " (module.verbose_name)
        }
        div class="list-group mt-3" {
            @for entry in &module.entries {
                a class="list-group-item list-group-item-action" href=(entry.url) {
                    (entry.title)
                }
            }
        }
    }
    .render_to(buffer)
}

struct ListPage<'a> {
    list: &'a ListContext,
}

impl Renderable for ListPage<'_> {
    fn render_to(&self, buffer: &mut Buffer) {
        let list = self.list;
        maud! {
            div class="d-flex justify-content-between align-items-center" {
                h1 { (list.title) }
                @if let Some(add_url) = &list.add_url {
                    a class="btn btn-success" href=(add_url) {
                        span class="material-icons align-middle" { "add" }
                        " Add"
                    }
                }
            }
            Actions options=(&list.actions);
            Table headers=(&list.headers) rows=(&list.rows);
            @if let Some(page) = &list.pagination {
                nav {
                    ul class="pagination" {
                        @if let Some(prev) = &page.prev_url {
                            li class="page-item" {
                                a class="page-link" href=(prev) { "Previous" }
                            }
                        }
                        li class="page-item disabled" {
                            span class="page-link" {
                                "Page " (page.number.to_string()) " of " (page.num_pages.to_string())
                            }
                        }
                        @if let Some(next) = &page.next_url {
                            li class="page-item" {
                                a class="page-link" href=(next) { "Next" }
                            }
                        }
                    }
                }
            }
        }
        .render_to(buffer)
    }
}

struct DetailPage<'a> {
    detail: &'a DetailContext,
}

impl Renderable for DetailPage<'_> {
    fn render_to(&self, buffer: &mut Buffer) {
        let detail = self.detail;
        maud! {
            h1 { (detail.title) }
            dl class="row mt-3" {
                @for (label, cell) in &detail.object_data {
                    dt class="col-sm-3" { (label) }
                    dd class="col-sm-9" { CellView cell=(cell); }
                }
            }
            div class="d-flex gap-2 mb-4" {
                @if let Some(url) = &detail.update_url {
                    a class="btn btn-primary" href=(url) { "Edit" }
                }
                @if let Some(url) = &detail.delete_url {
                    a class="btn btn-outline-danger" href=(url) { "Delete" }
                }
                @if let Some(url) = &detail.list_url {
                    a class="btn btn-link" href=(url) { "Back to list" }
                }
            }
            @for section in &detail.sections {
                @match section {
                    DetailSection::Table { title, headers, rows, actions } => {
                        h2 class="h4" { (title) }
                        Actions options=(actions);
                        Table headers=(headers) rows=(rows);
                    }
                    DetailSection::Html { title, html } => {
                        h2 class="h4" { (title) }
                        div { (Raw::dangerously_create(html)) }
                    }
                }
            }
        }
        .render_to(buffer)
    }
}

struct FieldInput<'a> {
    field: &'a Field,
}

impl Renderable for FieldInput<'_> {
    fn render_to(&self, buffer: &mut Buffer) {
        let field = self.field;
        let class = if field.errors.is_empty() {
            "form-control"
        } else {
            "form-control is-invalid"
        };
        let input_type = match field.kind {
            FieldKind::Password => "password",
            FieldKind::Number => "number",
            FieldKind::DateTime => "datetime-local",
            FieldKind::Email => "email",
            FieldKind::Url => "url",
            FieldKind::Hidden => "hidden",
            _ => "text",
        };
        maud! {
            @match &field.kind {
                FieldKind::TextArea => {
                    textarea class=(class) id=(field.name) name=(field.name) rows="4" {
                        (field.value)
                    }
                }
                FieldKind::Select(choices) => {
                    select class=(if field.errors.is_empty() { "form-select" } else { "form-select is-invalid" })
                        id=(field.name) name=(field.name) {
                        @if !field.required {
                            option value="" selected[field.value.is_empty()] { "---------" }
                        }
                        @for (value, label) in choices {
                            option value=(value) selected[*value == field.value] { (label) }
                        }
                    }
                }
                _ => {
                    input type=(input_type) class=(class) id=(field.name)
                        name=(field.name) value=(field.value) required[field.required];
                }
            }
            @for error in &field.errors {
                div class="invalid-feedback" { (error) }
            }
        }
        .render_to(buffer)
    }
}

struct FormPage<'a> {
    form: &'a FormContext,
}

impl Renderable for FormPage<'_> {
    fn render_to(&self, buffer: &mut Buffer) {
        let form = self.form;
        maud! {
            h1 { (form.title) }
            ErrorList errors=(&form.non_field_errors);
            form method="post" action=(form.action) class="mt-4" {
                @for fieldset in &form.fieldsets {
                    fieldset class="mb-3" {
                        @if let Some(legend) = &fieldset.legend {
                            legend { (legend) }
                        }
                        @for row in &fieldset.rows {
                            div class="row" {
                                @for field in row {
                                    @if field.kind == FieldKind::Hidden {
                                        FieldInput field=(field);
                                    } @else {
                                        div class="mb-3 col" {
                                            label for=(field.name) class="form-label" {
                                                (field.label)
                                                @if field.required { " *" }
                                            }
                                            FieldInput field=(field);
                                            @if let Some(help) = &field.help {
                                                div class="form-text" { (help) }
                                            }
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
                @if let Some(formset) = &form.formset {
                    input type="hidden" name="form-TOTAL_FORMS" value=(formset.rows.len().to_string());
                    table class="table" {
                        thead {
                            tr {
                                @for header in &formset.headers {
                                    th scope="col" { (header) }
                                }
                            }
                        }
                        tbody {
                            @for row in &formset.rows {
                                tr {
                                    @for field in row {
                                        @if field.kind == FieldKind::Hidden {
                                            FieldInput field=(field);
                                        } @else {
                                            td { FieldInput field=(field); }
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
                div class="d-flex gap-2" {
                    button type="submit" class="btn btn-primary" { (form.submit_label) }
                    @if let Some(cancel) = &form.cancel_url {
                        a class="btn btn-link" href=(cancel) { "Cancel" }
                    }
                }
            }
        }
        .render_to(buffer)
    }
}

struct DeletePage<'a> {
    delete: &'a DeleteContext,
}

impl Renderable for DeletePage<'_> {
    fn render_to(&self, buffer: &mut Buffer) {
        let delete = self.delete;
        maud! {
            h1 { (delete.title) }
            p {
                "Are you sure you want to delete the " (delete.verbose_name)
                " \"" (delete.object) "\"?"
            }
            @if !delete.cascades.is_empty() {
                p { "The following will be deleted as well:" }
                ul {
                    @for (name, count) in &delete.cascades {
                        li { (name) ": " (count.to_string()) }
                    }
                }
            }
            form method="post" action=(delete.action) {
                div class="d-flex gap-2" {
                    button type="submit" class="btn btn-danger" { "Yes, I'm sure" }
                    @if let Some(cancel) = &delete.cancel_url {
                        a class="btn btn-link" href=(cancel) { "No, take me back" }
                    }
                }
            }
        }
        .render_to(buffer)
    }
}
