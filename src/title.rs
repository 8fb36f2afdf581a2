//! Types and functions for normalizing MediaWiki title strings and
//! resolving namespace prefixes.

use regex::Regex;
use std::{collections::HashSet, sync::LazyLock};

/// Upper-cases the first code point of `s`, leaving the rest untouched.
pub fn ucfirst(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Lower-cases the first code point of `s`, leaving the rest untouched.
pub fn lcfirst(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// The set of namespaces known to a wiki installation.
///
/// Namespace names are discovered from the `<siteinfo>` element of the
/// dump; only the template namespace is assumed up front. Names are
/// stored in canonical (first-letter-capitalised) form.
#[derive(Clone, Debug)]
pub struct Namespaces {
    /// Canonical names of all known namespaces.
    known: HashSet<String>,
    /// The name of the template namespace, canonically `Template`.
    template: String,
    /// The name of the module namespace, canonically `Module`.
    module: String,
}

impl Default for Namespaces {
    fn default() -> Self {
        Self {
            known: HashSet::from(["Template".to_string()]),
            template: "Template".to_string(),
            module: "Module".to_string(),
        }
    }
}

/// Canonicalizes a namespace prefix for lookup.
fn normalize_namespace(ns: &str) -> String {
    ucfirst(ns)
}

impl Namespaces {
    /// Records a namespace name discovered from the dump.
    pub fn insert(&mut self, name: &str) {
        self.known.insert(normalize_namespace(name));
    }

    /// Sets the template namespace name (siteinfo `key="10"`).
    pub fn set_template(&mut self, name: &str) {
        self.template = normalize_namespace(name);
        self.known.insert(self.template.clone());
    }

    /// Sets the module namespace name (siteinfo `key="828"`).
    pub fn set_module(&mut self, name: &str) {
        self.module = normalize_namespace(name);
        self.known.insert(self.module.clone());
    }

    /// Returns true if `prefix` names a known namespace.
    pub fn is_known(&self, prefix: &str) -> bool {
        self.known.contains(&normalize_namespace(prefix))
    }

    /// Returns true if `prefix` names the template namespace.
    pub fn is_template(&self, prefix: &str) -> bool {
        normalize_namespace(prefix) == self.template
    }

    /// Returns true if `prefix` names the module namespace.
    pub fn is_module(&self, prefix: &str) -> bool {
        normalize_namespace(prefix) == self.module
    }

    /// The template namespace prefix, colon included (`Template:`).
    pub fn template_prefix(&self) -> String {
        let mut prefix = self.template.clone();
        prefix.push(':');
        prefix
    }

    /// Normalizes a title to its canonical page-name form.
    ///
    /// Leading and trailing spaces and underscores are stripped, runs
    /// of whitespace and underscores collapse to a single space, and
    /// the first letter after a known namespace prefix is capitalised
    /// with the optional space after the colon removed. An unknown
    /// prefix keeps its post-colon spacing: `3001: The Final Odyssey`
    /// is not the same page as `3001:The Final Odyssey`.
    pub fn normalize_title(&self, title: &str) -> String {
        static NS_SPLIT: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"^([^:]*):(\s*)(\S.*)$").unwrap());

        let title = title.trim_matches([' ', '_']);
        let mut collapsed = String::with_capacity(title.len());
        let mut in_gap = false;
        for c in title.chars() {
            if c == '_' || c.is_whitespace() {
                if !in_gap {
                    collapsed.push(' ');
                    in_gap = true;
                }
            } else {
                collapsed.push(c);
                in_gap = false;
            }
        }

        if let Some(captures) = NS_SPLIT.captures(&collapsed) {
            let (_, [prefix, gap, rest]) = captures.extract();
            let ns = normalize_namespace(prefix);
            if self.is_known(&ns) {
                format!("{ns}:{}", ucfirst(rest))
            } else {
                let gap = if gap.is_empty() { "" } else { " " };
                format!("{}:{gap}{}", ucfirst(prefix), ucfirst(rest))
            }
        } else {
            ucfirst(&collapsed)
        }
    }

    /// Resolves a template invocation target to a fully-qualified
    /// title.
    ///
    /// A leading `:` selects the main namespace; a known namespace
    /// prefix is kept; anything else is placed in the template
    /// namespace. Returns `None` for an empty target (the caller
    /// counts and logs it).
    pub fn fully_qualified_template_title(&self, title: &str) -> Option<String> {
        static NS_SPLIT: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"^([^:]*)(:.*)$").unwrap());

        if let Some(main) = title.strip_prefix(':') {
            return Some(ucfirst(main));
        }
        if let Some(captures) = NS_SPLIT.captures(title) {
            let (_, [prefix, rest]) = captures.extract();
            let ns = normalize_namespace(prefix);
            if self.is_known(&ns) {
                return Some(format!("{ns}{rest}"));
            }
        }
        if title.is_empty() {
            None
        } else {
            Some(format!("{}{}", self.template_prefix(), ucfirst(title)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ucfirst_lcfirst() {
        assert_eq!(ucfirst("python"), "Python");
        assert_eq!(lcfirst("Python"), "python");
        assert_eq!(ucfirst(""), "");
        for s in ["python", "Python", "x", "3001"] {
            assert_eq!(ucfirst(&lcfirst(s)), ucfirst(s));
            assert_eq!(lcfirst(&ucfirst(s)), lcfirst(s));
        }
    }

    #[test]
    fn test_known_namespace() {
        let ns = Namespaces::default();
        assert_eq!(ns.normalize_title("Template:  Births"), "Template:Births");
        assert_eq!(ns.normalize_title(" template:  births_"), "Template:Births");
    }

    #[test]
    fn test_not_known_namespace() {
        let ns = Namespaces::default();
        assert_eq!(ns.normalize_title("Category:  Births"), "Category: Births");
        assert_eq!(
            ns.normalize_title("_category:  births___"),
            "Category: Births"
        );
    }

    #[test]
    fn test_no_namespace() {
        let ns = Namespaces::default();
        assert_eq!(ns.normalize_title("python"), "Python");
        assert_eq!(ns.normalize_title("python 3"), "Python 3");
        assert_eq!(ns.normalize_title("python__3"), "Python 3");
    }

    #[test]
    fn test_normalize_idempotent() {
        let ns = Namespaces::default();
        for title in [
            "Template:  Births",
            "_category:  births___",
            "python__3",
            "3001:   The_Final_Odyssey",
            "",
        ] {
            let once = ns.normalize_title(title);
            assert_eq!(ns.normalize_title(&once), once);
        }
    }

    #[test]
    fn test_fully_qualified() {
        let ns = Namespaces::default();
        assert_eq!(
            ns.fully_qualified_template_title(":Python").as_deref(),
            Some("Python")
        );
        assert_eq!(
            ns.fully_qualified_template_title(":python").as_deref(),
            Some("Python")
        );
        assert_eq!(
            ns.fully_qualified_template_title("sandbox").as_deref(),
            Some("Template:Sandbox")
        );
        assert_eq!(ns.fully_qualified_template_title(""), None);
    }

    #[test]
    fn test_fully_qualified_other_namespace() {
        let mut ns = Namespaces::default();
        ns.insert("User");
        assert_eq!(
            ns.fully_qualified_template_title("User:Orange").as_deref(),
            Some("User:Orange")
        );
    }
}
