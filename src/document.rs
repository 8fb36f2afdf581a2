//! Output document rendering: the `<doc>` container and the JSON
//! line form.

use serde::Serialize;

/// The canonical article URL for an id.
pub fn page_url(url_base: &str, id: u64) -> String {
    format!("{url_base}?curid={id}")
}

/// One extracted document ready for serialization.
#[derive(Debug, Serialize)]
pub struct Document {
    /// The article id.
    pub id: u64,
    /// The revision id, when the dump provided one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revid: Option<u64>,
    /// The canonical article URL.
    pub url: String,
    /// The article title.
    pub title: String,
    /// The cleaned body paragraphs, joined with newlines.
    pub text: String,
}

impl Document {
    /// Assembles a document from cleaned paragraphs.
    pub fn new(
        id: u64,
        revid: Option<u64>,
        url_base: &str,
        title: &str,
        paragraphs: &[String],
    ) -> Self {
        Self {
            id,
            revid,
            url: page_url(url_base, id),
            title: title.to_string(),
            text: paragraphs.join("\n"),
        }
    }

    /// Renders the default `<doc>` text form, trailing newline
    /// included.
    pub fn to_text(&self) -> String {
        format!(
            "<doc id=\"{}\" url=\"{}\" title=\"{}\">\n{}\n\n{}\n</doc>\n",
            self.id, self.url, self.title, self.title, self.text
        )
    }

    /// Renders the one-line JSON form, trailing newline included.
    pub fn to_json(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_default();
        line.push('\n');
        line
    }
}
