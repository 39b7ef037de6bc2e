//! One-shot ("flash") messages shown on the next page a user sees.
//!
//! Messages are stored in a private cookie. Handlers queue them with [`push`]
//! before redirecting; the page which renders them is the one after the
//! redirect, and [`clear_flashed`] expires the cookie once that page has been
//! served.

use axum::{
    extract::Request,
    http::{HeaderValue, header::SET_COOKIE},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::{
    CookieJar, PrivateCookieJar,
    cookie::{Cookie, Key},
};
use serde::{Deserialize, Serialize};

pub const FLASH_COOKIE: &str = "cworg_flash";

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum Level {
    Success,
    Info,
    Warning,
    Error,
}

impl Level {
    pub fn css_class(&self) -> &'static str {
        match self {
            Level::Success => "alert-success",
            Level::Info => "alert-info",
            Level::Warning => "alert-warning",
            Level::Error => "alert-danger",
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct Link {
    pub href: String,
    pub text: String,
}

/// `prefix "<link>" suffix`, or just `prefix` when there is no link.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct Msg {
    pub level: Level,
    pub prefix: String,
    pub link: Option<Link>,
    pub suffix: String,
}

impl Msg {
    pub fn new(level: Level, text: impl Into<String>) -> Self {
        Self {
            level,
            prefix: text.into(),
            link: None,
            suffix: String::new(),
        }
    }

    /// `The {verbose_name} "{object}" was {verb} successfully.`
    pub fn saved(
        verbose_name: &str,
        object: String,
        href: Option<String>,
        verb: &str,
    ) -> Self {
        Self {
            level: Level::Success,
            prefix: format!("The {verbose_name} "),
            link: Some(Link {
                href: href.unwrap_or_default(),
                text: object,
            }),
            suffix: format!(" was {verb} successfully."),
        }
    }

    pub fn text(&self) -> String {
        match &self.link {
            Some(link) => {
                format!("{}\"{}\"{}", self.prefix, link.text, self.suffix)
            }
            None => format!("{}{}", self.prefix, self.suffix),
        }
    }
}

pub fn take(jar: &PrivateCookieJar<Key>) -> Vec<Msg> {
    jar.get(FLASH_COOKIE)
        .and_then(|c| serde_json::from_str(c.value()).ok())
        .unwrap_or_default()
}

pub fn push(jar: PrivateCookieJar<Key>, msg: Msg) -> PrivateCookieJar<Key> {
    let mut messages = take(&jar);
    messages.push(msg);
    match serde_json::to_string(&messages) {
        Ok(value) => {
            jar.add(Cookie::build((FLASH_COOKIE, value)).path("/").build())
        }
        Err(e) => {
            tracing::error!("failed to serialize flash messages: {e}");
            jar
        }
    }
}

/// Expires the flash cookie once a page (rather than a redirect) has been
/// served, unless the handler queued new messages itself.
pub async fn clear_flashed(req: Request, next: Next) -> Response {
    let had_flash = CookieJar::from_headers(req.headers())
        .get(FLASH_COOKIE)
        .is_some();

    let mut res = next.run(req).await;

    let status = res.status();
    let sets_flash = res
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .any(|v| v.to_str().is_ok_and(|v| v.starts_with(FLASH_COOKIE)));

    if had_flash && !sets_flash && !status.is_redirection() {
        let mut removal = Cookie::new(FLASH_COOKIE, "");
        removal.set_path("/");
        removal.make_removal();
        match HeaderValue::from_str(&removal.to_string()) {
            Ok(v) => {
                res.headers_mut().append(SET_COOKIE, v);
            }
            Err(e) => tracing::error!("invalid removal cookie: {e}"),
        }
    }

    res
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saved_message_text() {
        let msg = Msg::saved(
            "meet",
            "Friday game".to_string(),
            Some("/meets/friday-game/".to_string()),
            "added",
        );
        assert_eq!(msg.text(), "The meet \"Friday game\" was added successfully.");
        assert_eq!(Msg::new(Level::Info, "Hi").text(), "Hi");
    }
}
