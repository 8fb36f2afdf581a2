//! The wiki-markup extraction engine.
//!
//! An [`Extractor`] lives for one page. It borrows the shared
//! read-only template store and the owning worker's parse cache, and
//! carries the per-page frame stack, magic-word table, and error
//! counters. Template expansion is best-effort over adversarial
//! input: a missing template, an exhausted recursion budget, or a
//! failed parser function all substitute an empty string and count
//! the event rather than failing the page.

pub mod braces;
pub mod clean;
pub mod functions;
pub mod magic;
pub mod template;

use crate::{store::TemplateStore, title::Namespaces};
use magic::MagicWords;
use regex::Regex;
use std::{
    collections::HashMap,
    sync::{Arc, LazyLock},
};
use template::Template;

/// The hard limit on template invocation nesting.
///
/// Parsing mistakes can make template insertion enter an infinite
/// loop, for instance `{{country_{{{1}}}|…}}` repeatedly resolving an
/// empty argument back to the same template.
pub const MAX_TEMPLATE_RECURSION: usize = 30;

/// The hard limit on recursive parameter substitution.
pub const MAX_PARAMETER_RECURSION: usize = 16;

/// Parameter bindings for one template instantiation.
///
/// Unnamed parameters are keyed `"1"`, `"2"`, …; later assignments to
/// the same key win.
pub type Params = HashMap<String, String>;

/// A worker-local cache of parsed template bodies, keyed by
/// fully-qualified title.
pub type ParseCache = HashMap<String, Arc<Template>>;

/// Extraction options shared by every page of a run.
// Clippy: These are independent CLI switches, not a state machine.
#[allow(clippy::struct_excessive_bools)]
#[derive(Clone, Debug)]
pub struct Options {
    /// Whether to expand templates at all (`--no-templates` clears
    /// this).
    pub expand_templates: bool,
    /// Whether to keep internal and external links as `<a>` elements.
    pub keep_links: bool,
    /// Whether to keep section headings in the output.
    pub keep_sections: bool,
    /// Whether to emit HTML formatting instead of plain text.
    pub html: bool,
    /// Link namespace prefixes whose internal links are kept.
    pub accepted_namespaces: Vec<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            expand_templates: true,
            keep_links: false,
            keep_sections: false,
            html: false,
            accepted_namespaces: ["w", "wiktionary", "wikt"]
                .map(str::to_string)
                .to_vec(),
        }
    }
}

/// Per-page error counters, surfaced as one warning at end of page.
#[derive(Clone, Copy, Debug, Default)]
pub struct Counters {
    /// Template invocations whose expanded title was empty.
    pub empty_title: u32,
    /// Calls of [`Extractor::expand`] refused at the frame cap.
    pub outer_recursion: u32,
    /// Template invocations refused at the frame cap.
    pub invocation_recursion: u32,
    /// Parameter substitutions refused at the substitution cap.
    pub parameter_recursion: u32,
}

impl Counters {
    /// Returns true if any counter fired.
    fn any(self) -> bool {
        self.empty_title != 0
            || self.outer_recursion != 0
            || self.invocation_recursion != 0
            || self.parameter_recursion != 0
    }
}

/// A per-page template expander.
pub struct Extractor<'a> {
    /// The shared template store.
    store: &'a TemplateStore,
    /// The worker's parsed-template cache.
    cache: &'a mut ParseCache,
    /// The namespace table discovered from the dump.
    namespaces: &'a Namespaces,
    /// The run options.
    pub(crate) options: &'a Options,
    /// The page's magic-word table.
    magic: MagicWords,
    /// The stack of in-flight template invocations.
    frame: Vec<(String, Params)>,
    /// The page's error counters.
    pub(crate) counters: Counters,
}

impl<'a> Extractor<'a> {
    /// Creates an extractor for the page `title`.
    pub fn new(
        store: &'a TemplateStore,
        cache: &'a mut ParseCache,
        namespaces: &'a Namespaces,
        options: &'a Options,
        title: &str,
    ) -> Self {
        Self {
            store,
            cache,
            namespaces,
            options,
            magic: MagicWords::for_page(title),
            frame: vec![],
            counters: Counters::default(),
        }
    }

    /// Expands every top-level `{{…}}` span of `text`, copying the
    /// text between spans verbatim.
    pub fn expand(&mut self, text: &str) -> String {
        if self.frame.len() >= MAX_TEMPLATE_RECURSION {
            self.counters.outer_recursion += 1;
            return String::new();
        }

        let mut out = String::new();
        let mut cur = 0;
        for span in braces::find_matching_braces(text, 2) {
            out.push_str(&text[cur..span.start]);
            let body = &text[span.start + 2..span.end - 2];
            out.push_str(&self.expand_invocation(body));
            cur = span.end;
        }
        out.push_str(&text[cur..]);
        out
    }

    /// Expands one `{{…}}` invocation body.
    fn expand_invocation(&mut self, body: &str) -> String {
        static SUBST: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"(?i)^(?:subst|safesubst):").unwrap());

        if self.frame.len() >= MAX_TEMPLATE_RECURSION {
            self.counters.invocation_recursion += 1;
            return String::new();
        }

        let parts = braces::split_parts(body);
        let title = self.expand(parts.first().map(String::as_str).unwrap_or_default().trim());

        let (title, subst) = match SUBST.find(&title) {
            Some(prefix) => (title[prefix.end()..].to_string(), true),
            None => (title, false),
        };

        if let Some(value) = self.magic.get(&title) {
            return value.to_string();
        }

        // A colon at position > 1 marks a parser function; the suffix
        // after the colon is its first argument
        if let Some(colon) = title.find(':')
            && colon > 1
        {
            let name = title[..colon].to_string();
            let mut args = vec![title[colon + 1..].trim().to_string()];
            for part in &parts[1..] {
                args.push(self.expand(part));
            }
            let produced = functions::call_parser_function(self, &name, &args);
            return self.expand(&produced);
        }

        let Some(title) = self.namespaces.fully_qualified_template_title(&title) else {
            self.counters.empty_title += 1;
            return String::new();
        };

        // Follow a redirect once; the store does not chain them
        let title = match self.store.redirect(&title) {
            Some(target) => target.to_string(),
            None => title,
        };

        let template = if let Some(template) = self.cache.get(&title) {
            Arc::clone(template)
        } else if let Some(raw) = self.store.body(&title) {
            let template = Arc::new(Template::parse(raw));
            self.cache.insert(title.clone(), Arc::clone(&template));
            template
        } else {
            // The page being transcluded could not be identified
            return String::new();
        };

        // With subst the parameters stay textual; otherwise they are
        // expanded before binding
        let values: Vec<String> = if subst {
            parts[1..].to_vec()
        } else {
            parts[1..].iter().map(|part| self.expand(part)).collect()
        };
        let params = Self::template_params(values);

        // The frame must stay pushed through the final expansion of
        // the instantiated body: the recursion cap is the frame depth,
        // and self-referential templates only terminate because each
        // re-entry sees one more level
        self.frame.push((title, params.clone()));
        let instantiated = template.subst(&params, self, 0);
        let value = self.expand(&instantiated);
        self.frame.pop();
        value
    }

    /// Builds the parameter binding map from split invocation parts.
    fn template_params(values: Vec<String>) -> Params {
        static NAMED: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"(?s)^\s*([^=\s]*?)\s*=(.*)$").unwrap());

        let mut params = Params::new();
        let mut unnamed = 0;
        for param in values {
            if let Some(captures) = NAMED.captures(&param) {
                let (_, [name, value]) = captures.extract();
                // A value containing a link keeps its surrounding
                // whitespace
                let value = if value.contains("]]") {
                    value
                } else {
                    value.trim()
                };
                params.insert(name.to_string(), value.to_string());
            } else {
                unnamed += 1;
                let value = if param.contains("]]") {
                    param
                } else {
                    param.trim().to_string()
                };
                params.insert(unnamed.to_string(), value);
            }
        }
        params
    }

    /// Extracts the positional arguments of the enclosing frame
    /// binding whose title matches the fully-qualified title of
    /// `function`, for `#invoke` calls with no explicit arguments.
    pub(crate) fn frame_args(&self, function: &str) -> Vec<String> {
        let Some(title) = self.namespaces.fully_qualified_template_title(function.trim()) else {
            return vec![];
        };
        let Some((_, params)) = self.frame.iter().find(|(name, _)| *name == title) else {
            return vec![];
        };
        let mut args = vec![];
        for index in 1usize.. {
            match params.get(&index.to_string()) {
                Some(value) => args.push(value.clone()),
                None => break,
            }
        }
        args
    }

    /// Emits the per-page counter warning, if anything went wrong.
    pub fn warn_if_errors(&self, id: u64, title: &str) {
        if self.counters.any() {
            let Counters {
                empty_title,
                outer_recursion,
                invocation_recursion,
                parameter_recursion,
            } = self.counters;
            log::warn!(
                "Template errors in article '{title}' ({id}): \
                 title({empty_title}) recursion({outer_recursion}, \
                 {invocation_recursion}, {parameter_recursion})"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Expands `text` against the given `(title, body)` template
    /// definitions.
    fn expand_with(templates: &[(&str, &str)], text: &str) -> (String, Counters) {
        let mut store = TemplateStore::default();
        for (title, body) in templates {
            store.insert_template(*title, *body);
        }
        let namespaces = Namespaces::default();
        let options = Options::default();
        let mut cache = ParseCache::new();
        let mut extractor = Extractor::new(&store, &mut cache, &namespaces, &options, "Test");
        let out = extractor.expand(text);
        (out, extractor.counters)
    }

    #[test]
    fn test_simple_expansion() {
        let (out, _) = expand_with(&[("Template:Greet", "Hello {{{1}}}!")], "{{Greet|world}}");
        assert_eq!(out, "Hello world!");
    }

    #[test]
    fn test_named_over_positional() {
        let (out, _) = expand_with(
            &[("Template:Greet", "Hello {{{1}}}!")],
            "{{Greet|1=all|nothing}}",
        );
        // Last assignment to the same key wins
        assert_eq!(out, "Hello nothing!");
    }

    #[test]
    fn test_nested_parameter_default() {
        let templates = [("Template:P", "{{{x|{{{y|def}}}}}}")];
        assert_eq!(expand_with(&templates, "{{P}}").0, "def");
        assert_eq!(expand_with(&templates, "{{P|y=alt}}").0, "alt");
        assert_eq!(expand_with(&templates, "{{P|x=v}}").0, "v");
    }

    #[test]
    fn test_missing_template_is_empty() {
        let (out, _) = expand_with(&[], "a {{NoSuch|1}} b");
        assert_eq!(out, "a  b");
    }

    #[test]
    fn test_redirect_followed_once() {
        let mut store = TemplateStore::default();
        store.insert_template("Template:Real", "body");
        store.insert_redirect("Template:Alias", "Template:Real");
        let namespaces = Namespaces::default();
        let options = Options::default();
        let mut cache = ParseCache::new();
        let mut extractor = Extractor::new(&store, &mut cache, &namespaces, &options, "Test");
        assert_eq!(extractor.expand("{{Alias}}"), "body");
    }

    #[test]
    fn test_self_recursion_terminates() {
        let (out, counters) = expand_with(&[("Template:A", "{{a}}")], "{{a}}");
        assert_eq!(out, "");
        assert!(counters.invocation_recursion > 0 || counters.outer_recursion > 0);
    }

    #[test]
    fn test_mutual_recursion_terminates() {
        let (out, counters) =
            expand_with(&[("Template:A", "x{{b}}"), ("Template:B", "{{a}}")], "{{a}}");
        // Every level contributes its literal prefix until the cap
        assert!(out.starts_with('x'));
        assert!(counters.any());
    }

    #[test]
    fn test_parser_function_through_template() {
        let (out, _) = expand_with(
            &[("Template:Pick", "{{#if:{{{1|}}}|yes|no}}")],
            "{{Pick|x}} {{Pick}}",
        );
        assert_eq!(out, "yes no");
    }

    #[test]
    fn test_magic_word() {
        let (out, _) = expand_with(&[], "{{PAGENAME}}");
        assert_eq!(out, "Test");
        let (out, _) = expand_with(&[], "{{!}}");
        assert_eq!(out, "|");
    }

    #[test]
    fn test_subst_stripped() {
        let (out, _) = expand_with(&[("Template:Greet", "Hello {{{1}}}!")], "{{subst:Greet|hi}}");
        assert_eq!(out, "Hello hi!");
    }

    #[test]
    fn test_empty_title_counted() {
        let (out, counters) = expand_with(&[], "{{ }}");
        assert_eq!(out, "");
        assert_eq!(counters.empty_title, 1);
    }

    #[test]
    fn test_quad_brace_ambiguity() {
        // {{{{ x }}}} reads as { {{{ x }}} }; the unbound tplarg
        // drops, the stray braces stay literal
        let (out, _) = expand_with(&[], "{{{{ x }}}}");
        assert_eq!(out, "{}");
    }

    #[test]
    fn test_invoke_convert_stub() {
        let (out, _) = expand_with(&[], "{{#invoke:convert|convert|10|km}}");
        assert_eq!(out, "10 km");
    }
}
