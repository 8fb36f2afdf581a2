//! Magic words: page-contextual variables and behavioral switches.

use std::collections::HashMap;
use time::OffsetDateTime;
use unicase::UniCase;

/// Double-underscore behavioral switch names, stripped from article
/// text by the cleaner.
pub static SWITCH_WORDS: phf::Set<&'static str> = phf::phf_set! {
    "notoc", "forcetoc", "toc", "noeditsection", "newsectionlink",
    "nonewsectionlink", "nogallery", "hiddencat", "nocontentconvert",
    "nocc", "notitleconvert", "notc", "index", "noindex",
    "staticredirect", "disambig",
};

/// The per-page magic-word variable table.
///
/// Keys are matched case-insensitively; `{{PAGENAME}}` and
/// `{{pagename}}` are the same variable.
pub struct MagicWords {
    /// The variable bindings.
    values: HashMap<UniCase<String>, String>,
}

impl MagicWords {
    /// Builds the table for one page.
    pub fn for_page(title: &str) -> Self {
        let mut values = HashMap::new();
        let mut set = |name: &str, value: String| {
            values.insert(UniCase::new(name.to_string()), value);
        };

        // The only way to write a literal `|` inside a parameter
        set("!", "|".to_string());

        let namespace = title
            .split_once(':')
            .map(|(ns, _)| ns)
            .unwrap_or_default();
        set("namespace", namespace.to_string());
        set("pagename", title.to_string());
        set("fullpagename", title.to_string());
        let base = title.rsplit_once('/').map_or(title, |(base, _)| base);
        set("basepagename", base.to_string());
        let sub = title.rsplit_once('/').map_or(title, |(_, sub)| sub);
        set("subpagename", sub.to_string());

        let now = OffsetDateTime::now_utc();
        set("currentyear", format!("{:04}", now.year()));
        set("currentmonth", format!("{:02}", u8::from(now.month())));
        set("currentday", format!("{}", now.day()));
        set("currentday2", format!("{:02}", now.day()));
        set("currenthour", format!("{:02}", now.hour()));
        set(
            "currenttime",
            format!("{:02}:{:02}", now.hour(), now.minute()),
        );
        set(
            "currenttimestamp",
            format!(
                "{:04}{:02}{:02}{:02}{:02}{:02}",
                now.year(),
                u8::from(now.month()),
                now.day(),
                now.hour(),
                now.minute(),
                now.second()
            ),
        );

        Self { values }
    }

    /// Looks up a variable, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .get(&UniCase::new(name.to_string()))
            .map(String::as_str)
    }
}
