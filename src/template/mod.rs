//! Templating code.
//!
//! This defines the [`Page`] item, the frame every html response is rendered
//! in: navigation menu built from the site modules, flash messages and the
//! page body.

use hypertext::{Raw, prelude::*};

use crate::{auth::User, msg::Msg, sitemodule::SiteContext};

const STYLE: &str = r#"
.sidebar { min-width: 14rem; background-color: #243b53; }
.sidebar .nav-link { color: #d9e2ec; }
.sidebar .nav-link.active { background-color: #486581; color: #fff; }
.sidebar .material-icons { vertical-align: middle; margin-right: .5rem; }
.submenu .nav-link { padding-left: 2.75rem; font-size: .9rem; }
"#;

pub struct Page<R: Renderable> {
    title: Option<String>,
    body: Option<R>,
    user: Option<User>,
    site: SiteContext,
    messages: Vec<Msg>,
}

impl<R: Renderable> Page<R> {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn body(mut self, body: R) -> Self {
        self.body = Some(body);
        self
    }

    pub fn user(mut self, user: User) -> Self {
        self.user = Some(user);
        self
    }

    pub fn site(mut self, site: SiteContext) -> Self {
        self.site = site;
        self
    }

    pub fn messages(mut self, messages: Vec<Msg>) -> Self {
        self.messages = messages;
        self
    }
}

struct Messages<'a>(&'a [Msg]);

impl Renderable for Messages<'_> {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        maud! {
            @for msg in self.0 {
                div class=(format!("alert {} alert-dismissible", msg.level.css_class())) role="alert" {
                    (msg.prefix)
                    @if let Some(link) = &msg.link {
                        "\""
                        @if link.href.is_empty() {
                            (link.text)
                        } @else {
                            a href=(link.href) class="alert-link" { (link.text) }
                        }
                        "\""
                    }
                    (msg.suffix)
                }
            }
        }
        .render_to(buffer)
    }
}

struct Menu<'a>(&'a SiteContext);

impl Renderable for Menu<'_> {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        maud! {
            nav class="sidebar d-flex flex-column p-2" {
                ul class="nav nav-pills flex-column" {
                    @for module in &self.0.modules {
                        li class="nav-item" {
                            a class=(if module.active { "nav-link active" } else { "nav-link" })
                              href=(module.url.as_deref().unwrap_or("#")) {
                                span class="material-icons" { (module.icon) }
                                (module.verbose_name)
                            }
                            @if module.active && !module.entries.is_empty() {
                                ul class="nav flex-column submenu" {
                                    @for entry in &module.entries {
                                        li class="nav-item" {
                                            a class="nav-link" href=(entry.url) {
                                                (entry.title)
                                            }
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
        .render_to(buffer)
    }
}

impl<R: Renderable> Renderable for Page<R> {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        let title = match &self.title {
            Some(title) => format!("{title} | cworg"),
            None => "cworg".to_string(),
        };

        maud! {
            html {
                head {
                    title { (title) }
                    meta charset="utf-8";
                    meta
                        name="viewport"
                        content="width=device-width, initial-scale=1";
                    link href="https://cdn.jsdelivr.net/npm/bootstrap@5.3.3/dist/css/bootstrap.min.css" rel="stylesheet";
                    link href="https://fonts.googleapis.com/icon?family=Material+Icons" rel="stylesheet";
                    style { (Raw::dangerously_create(STYLE)) }
                }
                body class="d-flex flex-column vh-100" {
                    nav class="navbar navbar-expand"
                        style="background-color: #102a43;"
                        data-bs-theme="dark" {
                        div class="container-fluid" {
                            a class="navbar-brand text-white" href="/" {
                                "cworg"
                            }
                            ul class="navbar-nav" style="display: flex; gap: 1rem;" {
                                @if let Some(user) = &self.user {
                                    li class="nav-item" {
                                        a class="nav-link text-white" href="/users/" {
                                            (user.full_name())
                                        }
                                    }
                                    li class="nav-item" {
                                        form method="post" action="/logout" class="d-inline" {
                                            button type="submit" class="btn btn-link nav-link text-white" {
                                                "Logout"
                                            }
                                        }
                                    }
                                } @else {
                                    li class="nav-item" {
                                        a class="nav-link text-white" href="/login" {
                                            "Login"
                                        }
                                    }
                                    li class="nav-item" {
                                        a class="nav-link text-white" href="/register" {
                                            "Register"
                                        }
                                    }
                                }
                            }
                        }
                    }
                    div class="d-flex flex-grow-1" {
                        @if !self.site.modules.is_empty() {
                            (Menu(&self.site))
                        }
                        main class="flex-grow-1 p-4" {
                            (Messages(&self.messages))
                            @if let Some(body) = &self.body {
                                (body)
                            }
                        }
                    }
                }
            }
        }
        .render_to(buffer)
    }
}

impl<R: Renderable> Default for Page<R> {
    fn default() -> Self {
        Self {
            title: None,
            body: None,
            user: None,
            site: SiteContext::default(),
            messages: Vec::new(),
        }
    }
}
