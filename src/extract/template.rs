//! Parsed template bodies.
//!
//! A raw template body is parsed once into an alternating sequence of
//! literal text and parameter references, then cached and shared
//! between instantiations. Parameter references nest: both the name
//! and the default of `{{{name|default}}}` are themselves parsed
//! bodies (`{{{italics|{{{italic|}}}}}}` is routine).

use super::{Extractor, MAX_PARAMETER_RECURSION, Params, braces};

/// One node of a parsed template body.
#[derive(Debug)]
pub enum Node {
    /// A literal text run, emitted verbatim.
    Text(String),
    /// A `{{{…}}}` parameter reference.
    Arg(ArgRef),
}

/// A `{{{name|default}}}` parameter reference.
#[derive(Debug)]
pub struct ArgRef {
    /// The name template. Names are frequently computed, e.g.
    /// `appointe{{#if:{{{appointer14|}}}|r|d}}14`.
    name: Template,
    /// The default value template, if a `|` part was present.
    default: Option<Template>,
}

/// A parsed template body.
#[derive(Debug, Default)]
pub struct Template {
    /// The alternating literal/reference sequence.
    nodes: Vec<Node>,
}

/// Slices the interior of a tplarg span, tolerating the degenerate
/// spans the scanner emits for ambiguous runs.
fn inner(body: &str, start: usize, end: usize) -> &str {
    let inner_start = (start + 3).min(end);
    let inner_end = (end - 3).max(inner_start);
    &body[inner_start..inner_end]
}

impl Template {
    /// Parses a raw body into its node sequence.
    pub fn parse(body: &str) -> Self {
        let mut nodes = vec![];
        let mut cur = 0;
        for span in braces::find_matching_braces(body, 3) {
            nodes.push(Node::Text(body[cur..span.start].to_string()));
            nodes.push(Node::Arg(ArgRef::parse(inner(body, span.start, span.end))));
            cur = span.end;
        }
        nodes.push(Node::Text(body[cur..].to_string()));
        Self { nodes }
    }

    /// Substitutes `params` into the body, producing the instantiated
    /// text.
    ///
    /// Substitution recurses through computed names and defaults;
    /// `depth` carries the parameter-recursion budget, separate from
    /// the template invocation budget.
    pub(crate) fn subst(
        &self,
        params: &Params,
        extractor: &mut Extractor<'_>,
        depth: usize,
    ) -> String {
        if depth > MAX_PARAMETER_RECURSION {
            extractor.counters.parameter_recursion += 1;
            return String::new();
        }

        let mut out = String::new();
        for node in &self.nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Arg(arg) => out.push_str(&arg.subst(params, extractor, depth)),
            }
        }
        out
    }
}

impl ArgRef {
    /// Parses the interior of a `{{{…}}}` span.
    ///
    /// Any parts after the default are ignored, and an equals sign in
    /// the name part is plain text.
    fn parse(parameter: &str) -> Self {
        let parts = braces::split_parts(parameter);
        let mut parts = parts.into_iter();
        let name = Template::parse(&parts.next().unwrap_or_default());
        let default = parts.next().map(|default| Template::parse(&default));
        Self { name, default }
    }

    /// Resolves this reference against `params`.
    ///
    /// An unbound reference with no default is dropped, not preserved.
    fn subst(&self, params: &Params, extractor: &mut Extractor<'_>, depth: usize) -> String {
        let name = self.name.subst(params, extractor, depth + 1);
        let name = extractor.expand(&name);
        if let Some(value) = params.get(&name) {
            value.clone()
        } else if let Some(default) = &self.default {
            let value = default.subst(params, extractor, depth + 1);
            extractor.expand(&value)
        } else {
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counts the argument references in a parsed body.
    fn arg_count(template: &Template) -> usize {
        template
            .nodes
            .iter()
            .filter(|node| matches!(node, Node::Arg(_)))
            .count()
    }

    #[test]
    fn test_parse_plain() {
        let tpl = Template::parse("just text");
        assert_eq!(arg_count(&tpl), 0);
    }

    #[test]
    fn test_parse_args() {
        let tpl = Template::parse("Hello {{{1}}}!");
        assert_eq!(arg_count(&tpl), 1);
        let tpl = Template::parse("{{{x|{{{y|def}}}}}}");
        assert_eq!(arg_count(&tpl), 1);
    }

    #[test]
    fn test_parse_nested_name() {
        // The tplarg buried in a computed name splits out at parse
        // time; the surrounding #if braces stay literal text until
        // expansion
        let tpl = Template::parse("appointe{{#if:{{{appointer14|}}}|r|d}}14");
        assert_eq!(arg_count(&tpl), 1);
    }
}
