//! The process-wide template store.
//!
//! Built once during the preprocessing pass over the dump, then
//! shared read-only by every extraction worker. Holds raw template
//! bodies keyed by normalized title, plus the redirect map resolved
//! (once, without chaining) at lookup time by the expander.

use crate::{common, title::Namespaces};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    io::{BufRead, Write},
    sync::LazyLock,
};

/// An error while persisting or loading a preprocessed store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The store file could not be read or written.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// A store record could not be encoded or decoded.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// One persisted store entry.
#[derive(Deserialize, Serialize)]
struct Record {
    /// The normalized template title.
    title: String,
    /// The cleaned template body, for template records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    body: Option<String>,
    /// The redirect target, for redirect records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    redirect: Option<String>,
}

/// The template and redirect maps.
///
/// Invariant: no title is ever both a template key and a redirect
/// key; whichever definition arrives last wins and evicts the other.
#[derive(Debug, Default)]
pub struct TemplateStore {
    /// Raw template bodies by normalized title.
    templates: HashMap<String, String>,
    /// Redirect targets by normalized title.
    redirects: HashMap<String, String>,
}

/// `#REDIRECT [[target]]` on the first body line.
static REDIRECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^#REDIRECT.*?\[\[([^\]]*)\]\]").unwrap());

/// HTML comments inside template bodies.
static COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());

/// Balanced `<noinclude>` elements, content included.
static NOINCLUDE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<noinclude>.*?</noinclude>").unwrap());

/// An unterminated `<noinclude>` swallows the rest of the body.
static NOINCLUDE_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<noinclude\s*>.*$").unwrap());

/// Self-closing `<noinclude/>` markers.
static NOINCLUDE_EMPTY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<noinclude/>").unwrap());

/// `<includeonly>` markers, kept content.
static INCLUDEONLY_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"</?includeonly>").unwrap());

/// `<onlyinclude>` elements; when present their contents replace the
/// whole body.
static ONLYINCLUDE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<onlyinclude>(.*?)</onlyinclude>").unwrap());

impl TemplateStore {
    /// Ingests one template-namespace page from the preprocessing
    /// pass.
    pub fn define(&mut self, namespaces: &Namespaces, title: &str, body: &str) {
        let title = namespaces.normalize_title(title);
        if body.is_empty() {
            return;
        }

        let first_line = body.lines().next().unwrap_or_default();
        if let Some(captures) = REDIRECT.captures(first_line) {
            let target = namespaces.normalize_title(&captures[1]);
            self.insert_redirect(title, target);
            return;
        }

        // Inclusion-control rules: remove <noinclude> text, keep
        // <includeonly> text without the tags, and when any
        // <onlyinclude> parts exist they alone make up the stored
        // body
        let text = common::unescape(body);
        let text = COMMENT.replace_all(&text, "");
        let text = NOINCLUDE.replace_all(&text, "");
        let text = NOINCLUDE_OPEN.replace_all(&text, "");
        let text = NOINCLUDE_EMPTY.replace_all(&text, "");

        let mut only = String::new();
        for captures in ONLYINCLUDE.captures_iter(&text) {
            only.push_str(&captures[1]);
        }
        let text = if only.is_empty() {
            INCLUDEONLY_TAG.replace_all(&text, "").into_owned()
        } else {
            only
        };

        if !text.is_empty() {
            if self
                .templates
                .get(&title)
                .is_some_and(|previous| *previous != text)
            {
                log::debug!("Redefining: {title}");
            }
            self.insert_template(title, text);
        }
    }

    /// Inserts a template body, evicting any redirect under the same
    /// title.
    pub fn insert_template(&mut self, title: impl Into<String>, body: impl Into<String>) {
        let title = title.into();
        self.redirects.remove(&title);
        self.templates.insert(title, body.into());
    }

    /// Inserts a redirect, evicting any template under the same
    /// title.
    pub fn insert_redirect(&mut self, title: impl Into<String>, target: impl Into<String>) {
        let title = title.into();
        self.templates.remove(&title);
        self.redirects.insert(title, target.into());
    }

    /// Returns the raw body of the template `title`.
    pub fn body(&self, title: &str) -> Option<&str> {
        self.templates.get(title).map(String::as_str)
    }

    /// Returns the redirect target of `title`, if it is a redirect.
    pub fn redirect(&self, title: &str) -> Option<&str> {
        self.redirects.get(title).map(String::as_str)
    }

    /// The number of stored template bodies.
    pub fn template_count(&self) -> usize {
        self.templates.len()
    }

    /// The number of stored redirects.
    pub fn redirect_count(&self) -> usize {
        self.redirects.len()
    }

    /// Writes the store as JSON lines.
    pub fn save(&self, mut out: impl Write) -> Result<(), Error> {
        for (title, body) in &self.templates {
            let record = Record {
                title: title.clone(),
                body: Some(body.clone()),
                redirect: None,
            };
            serde_json::to_writer(&mut out, &record)?;
            out.write_all(b"\n")?;
        }
        for (title, target) in &self.redirects {
            let record = Record {
                title: title.clone(),
                body: None,
                redirect: Some(target.clone()),
            };
            serde_json::to_writer(&mut out, &record)?;
            out.write_all(b"\n")?;
        }
        Ok(())
    }

    /// Reads a store previously written by [`TemplateStore::save`].
    pub fn load(input: impl BufRead) -> Result<Self, Error> {
        let mut store = Self::default();
        for line in input.lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let record: Record = serde_json::from_str(&line)?;
            match (record.body, record.redirect) {
                (Some(body), _) => store.insert_template(record.title, body),
                (None, Some(target)) => store.insert_redirect(record.title, target),
                (None, None) => {}
            }
        }
        Ok(store)
    }
}
