//! The markup cleaner: a pipeline of deterministic passes that strip
//! expanded wikitext and HTML down to plain text (or light HTML).

use super::{Extractor, braces, magic};
use crate::common;
use regex::{Match, Regex};
use std::{borrow::Cow, sync::LazyLock};

/// Tags dropped together with their content, nesting-aware.
const DISCARD_ELEMENTS: &[&str] = &[
    "gallery", "timeline", "noinclude", "pre", "table", "tr", "td", "th", "caption", "form",
    "input", "select", "option", "textarea", "ul", "li", "ol", "dl", "dt", "dd", "menu", "dir",
    "ref", "references", "img", "imagemap", "source", "small",
];

/// Tags whose markers are dropped but whose content is kept.
const IGNORED_TAGS: &[&str] = &[
    "b", "big", "blockquote", "center", "cite", "div", "em", "font", "h1", "h2", "h3", "h4",
    "hiero", "i", "kbd", "nowiki", "p", "plaintext", "s", "span", "strike", "strong", "sub",
    "sup", "tt", "u", "var",
];

/// Tags which are normally written self-closing.
const SELF_CLOSING_TAGS: &[&str] = &["br", "hr", "nobr", "ref", "references", "nowiki"];

/// Tags replaced by numbered placeholders.
const PLACEHOLDER_TAGS: &[(&str, &str)] = &[("math", "formula"), ("code", "codice")];

/// URL protocols recognized in external links.
const URL_PROTOCOLS: &str = "bitcoin:|ftp://|ftps://|geo:|git://|gopher://|http://|https://|\
     irc://|ircs://|magnet:|mailto:|mms://|news:|nntp://|redis://|sftp://|sip:|sips:|sms:|\
     ssh://|svn://|tel:|telnet://|urn:|worldwind://|xmpp:";

/// `[url label]` external links.
static EXT_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r#"\[((?i:{URL_PROTOCOLS})[^\]\[<>"\x00-\x20\x7F]+)\s*([^\]\x00-\x08\x0A-\x1F]*?)\]"#
    ))
    .unwrap()
});

/// External link labels which are themselves image URLs.
static EXT_IMAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^(?:http://|https://)[^\]\[<>"\x00-\x20\x7F\s]+/[A-Za-z0-9_.,~%\-+&;#*?!=()@\x80-\xFF]+\.(?i:gif|png|jpg|jpeg)$"#,
    )
    .unwrap()
});

/// Word characters trailing a `[[…]]` link, absorbed into the label.
static TAIL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\w+").unwrap());

/// Double-underscore behavioral switches.
static SWITCHES: LazyLock<Regex> = LazyLock::new(|| {
    let names = magic::SWITCH_WORDS
        .iter()
        .copied()
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!("__(?i:{names})__")).unwrap()
});

/// `<syntaxhighlight>` bodies, exempt from entity decoding.
static SYNTAXHIGHLIGHT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)&lt;syntaxhighlight .*?&gt;(.*?)&lt;/syntaxhighlight&gt;").unwrap()
});

/// Bold italics: `'''''text'''''`.
static BOLD_ITALIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"'''''(.*?)'''''").unwrap());
/// Bold: `'''text'''`.
static BOLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"'''(.*?)'''").unwrap());
/// Italic quote: `''"text"''`.
static ITALIC_QUOTE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"''"([^"]*?)"''"#).unwrap());
/// Italics: `''text''`.
static ITALIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"''(.*?)''").unwrap());
/// Doubled quotes: `""text""`.
static QUOTE_QUOTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("\"\"([^\"]*?)\"\"").unwrap());

/// HTML comments, possibly spanning lines.
static COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());

/// Runs of two or more spaces.
static SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" {2,}").unwrap());
/// Runs of four or more dots.
static DOTS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.{4,}").unwrap());
/// A space preceding closing punctuation.
static SPACE_BEFORE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" ([,:.\)\]»])").unwrap());
/// A space following opening punctuation.
static SPACE_AFTER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"([\(\[«]) ").unwrap());
/// Lines holding only non-word characters.
static PUNCT_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\W+?\n").unwrap());

/// Tag-pair patterns for the ignored tags.
static IGNORED_TAG_PATTERNS: LazyLock<Vec<(Regex, Regex)>> = LazyLock::new(|| {
    IGNORED_TAGS.iter().map(|tag| tag_patterns(tag)).collect()
});

/// Tag-pair patterns for `<a>`, applied when links are not kept.
static ANCHOR_TAG_PATTERNS: LazyLock<(Regex, Regex)> = LazyLock::new(|| tag_patterns("a"));

/// Self-closing tag patterns.
static SELF_CLOSING_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    SELF_CLOSING_TAGS
        .iter()
        .map(|tag| Regex::new(&format!(r"(?is)<\s*{tag}\b[^>]*/\s*>")).unwrap())
        .collect()
});

/// Open/close patterns for the discarded elements.
static DISCARD_PATTERNS: LazyLock<Vec<(Regex, Regex)>> = LazyLock::new(|| {
    DISCARD_ELEMENTS
        .iter()
        .map(|tag| {
            (
                Regex::new(&format!(r"(?i)<\s*{tag}\b[^>/]*>")).unwrap(),
                Regex::new(&format!(r"(?i)<\s*/\s*{tag}>")).unwrap(),
            )
        })
        .collect()
});

/// Placeholder element patterns.
static PLACEHOLDER_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    PLACEHOLDER_TAGS
        .iter()
        .map(|(tag, placeholder)| {
            (
                Regex::new(&format!(
                    r"(?is)<\s*{tag}(\s*| [^>]+?)>.*?<\s*/\s*{tag}\s*>"
                ))
                .unwrap(),
                *placeholder,
            )
        })
        .collect()
});

/// Nested `{{…}}` openers/closers, for the no-template path.
static TEMPLATE_OPEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\{").unwrap());
/// See [`TEMPLATE_OPEN`].
static TEMPLATE_CLOSE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\}\}").unwrap());
/// Nested `{|…|}` table openers/closers.
static TABLE_OPEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\|").unwrap());
/// See [`TABLE_OPEN`].
static TABLE_CLOSE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\|\}").unwrap());

/// Section headings: `== Title ==`.
static SECTION: LazyLock<fancy_regex::Regex> =
    LazyLock::new(|| fancy_regex::Regex::new(r"^(==+)\s*(.*?)\s*\1").unwrap());

/// Builds the begin/end patterns of an ignored tag.
fn tag_patterns(tag: &str) -> (Regex, Regex) {
    (
        Regex::new(&format!(r"(?is)<{tag}\b.*?>")).unwrap(),
        Regex::new(&format!(r"(?i)</\s*{tag}>")).unwrap(),
    )
}

/// Removes the blocks identified by `spans` from `text`, tolerating
/// nested and overlapping spans.
fn drop_spans(spans: &mut Vec<(usize, usize)>, text: &str) -> String {
    spans.sort_unstable();
    let mut out = String::with_capacity(text.len());
    let mut offset = 0;
    for &(start, end) in spans.iter() {
        if offset <= start {
            out.push_str(&text[offset..start]);
            offset = end;
        } else if offset < end {
            offset = end;
        }
    }
    out.push_str(&text[offset..]);
    out
}

/// Removes matched blocks of possibly-nested open/close delimiter
/// patterns, e.g. tables and transclusions.
fn drop_nested(text: &str, open_re: &Regex, close_re: &Regex) -> String {
    let mut spans: Vec<(usize, usize)> = vec![];
    let mut nest = 0usize;
    let Some(mut start) = open_re.find(text) else {
        return text.to_string();
    };
    let mut end = close_re.find_at(text, start.end());
    let mut next = start;
    while let Some(end_m) = end {
        let Some(next_m) = open_re.find_at(text, next.end()) else {
            // No more openings: close all pending and finish
            let mut end_m = end_m;
            while nest > 0 {
                nest -= 1;
                match close_re.find_at(text, end_m.end()) {
                    Some(further) => end_m = further,
                    None => break,
                }
            }
            spans.push((start.start(), end_m.end()));
            break;
        };
        next = next_m;
        let mut end_opt: Option<Match<'_>> = Some(end_m);
        while let Some(e) = end_opt
            && e.end() < next.start()
        {
            if nest > 0 {
                nest -= 1;
                let last = e.end();
                end_opt = close_re.find_at(text, e.end());
                if end_opt.is_none() {
                    // Unbalanced: drop from the first opening to the
                    // last seen closing
                    let span = spans
                        .first()
                        .map_or((start.start(), last), |&(first, _)| (first, last));
                    spans = vec![span];
                }
            } else {
                spans.push((start.start(), e.end()));
                start = next;
                end_opt = close_re.find_at(text, next.end());
                break;
            }
        }
        end = end_opt;
        if end.is_some() && next.start() != start.start() {
            nest += 1;
        }
    }
    drop_spans(&mut spans, text)
}

/// Replaces `[url label]` external links with their label (or an
/// anchor element), and strips bare `[url]` links.
fn replace_external_links(text: &str, keep_links: bool, html: bool) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cur = 0;
    for captures in EXT_LINK.captures_iter(text) {
        let all = captures.get(0).unwrap();
        let url = &captures[1];
        let label = &captures[2];
        out.push_str(&text[cur..all.start()]);
        cur = all.end();

        // A label that is itself an image URL renders as an image,
        // not as text
        let label: Cow<'_, str> = if EXT_IMAGE.is_match(label) {
            if keep_links || html {
                format!(r#"<img src="{label}" alt="">"#).into()
            } else {
                "".into()
            }
        } else {
            label.into()
        };

        if keep_links {
            out.push_str(&format!(
                r#"<a href="{}">{label}</a>"#,
                common::url_encode(url)
            ));
        } else {
            out.push_str(&label);
        }
    }
    out.push_str(&text[cur..]);
    out
}

/// Resolves one internal link target/label pair to output text.
fn make_internal_link(
    title: &str,
    label: &str,
    keep_links: bool,
    accepted: &[String],
) -> String {
    let in_accepted = |ns: &str| accepted.iter().any(|a| a == ns);
    if let Some(colon) = title.find(':') {
        if colon > 0 && !in_accepted(&title[..colon]) {
            return String::new();
        }
        if colon == 0 {
            // A leading colon escapes the namespace; drop the
            // `:File:` form too
            if let Some(colon2) = title[1..].find(':')
                && colon2 > 1
                && !in_accepted(&title[1..1 + colon2])
            {
                return String::new();
            }
        }
    }
    if keep_links {
        format!(r#"<a href="{}">{label}</a>"#, common::url_encode(title))
    } else {
        label.to_string()
    }
}

/// Replaces `[[title|…|label]]trail` internal links.
///
/// Called after external link removal, so stray `]]]` need no special
/// care. The rightmost top-level `|` bounds the label; trailing word
/// characters are absorbed.
fn replace_internal_links(text: &str, keep_links: bool, accepted: &[String]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cur = 0;
    for span in braces::find_balanced(text, &["[["], &["]]"]) {
        let (trail, end) = match TAIL.find(&text[span.end..]) {
            Some(tail) => (tail.as_str(), span.end + tail.end()),
            None => ("", span.end),
        };
        let inner = &text[span.start + 2..span.end - 2];
        let (title, label) = match inner.find('|') {
            None => (inner, inner),
            Some(mut pipe) => {
                let title = inner[..pipe].trim_end();
                // The label starts at the rightmost | outside nested
                // links
                let mut curp = pipe + 1;
                for nested in braces::find_balanced(inner, &["[["], &["]]"]) {
                    if let Some(last) = inner[curp..nested.start.max(curp)].rfind('|') {
                        pipe = curp + last;
                    }
                    curp = nested.end;
                }
                if let Some(last) = inner[curp.min(inner.len())..].rfind('|') {
                    pipe = curp + last;
                }
                (title, inner[pipe + 1..].trim())
            }
        };
        out.push_str(&text[cur..span.start]);
        out.push_str(&make_internal_link(title, label, keep_links, accepted));
        out.push_str(trail);
        cur = end;
    }
    out.push_str(&text[cur..]);
    out
}

/// Decodes HTML entities, leaving `<syntaxhighlight>` bodies intact.
fn unescape_outside_syntaxhighlight(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cur = 0;
    for captures in SYNTAXHIGHLIGHT.captures_iter(text) {
        let all = captures.get(0).unwrap();
        out.push_str(&common::unescape(&text[cur..all.start()]));
        out.push_str(&captures[1]);
        cur = all.end();
    }
    out.push_str(&common::unescape(&text[cur..]));
    out
}

/// Applies the full cleaning pipeline to one page's wikitext.
///
/// Every pass is total; adversarial markup degrades to dropped or
/// literal text, never an error.
// Clippy: The pass sequence is deliberately one straight line.
#[allow(clippy::too_many_lines)]
pub fn clean(extractor: &mut Extractor<'_>, text: &str) -> String {
    let options = extractor.options;

    // Transclusions: expanded, or dropped wholesale
    let text = if options.expand_templates {
        extractor.expand(text)
    } else {
        drop_nested(text, &TEMPLATE_OPEN, &TEMPLATE_CLOSE)
    };

    // Tables may nest
    let text = drop_nested(&text, &TABLE_OPEN, &TABLE_CLOSE);

    let text = replace_external_links(&text, options.keep_links, options.html);
    let text = replace_internal_links(&text, options.keep_links, &options.accepted_namespaces);

    let text = SWITCHES.replace_all(&text, "");

    let text = unescape_outside_syntaxhighlight(&text);

    // Bold/italic/quotes
    let text = if options.html {
        let text = BOLD_ITALIC.replace_all(&text, "<b>$1</b>");
        let text = BOLD.replace_all(&text, "<b>$1</b>");
        ITALIC.replace_all(&text, "<i>$1</i>").into_owned()
    } else {
        let text = BOLD_ITALIC.replace_all(&text, "$1");
        let text = BOLD.replace_all(&text, "$1");
        let text = ITALIC_QUOTE.replace_all(&text, "\"$1\"");
        let text = ITALIC.replace_all(&text, "\"$1\"");
        QUOTE_QUOTE.replace_all(&text, "\"$1\"").into_owned()
    };
    // Residuals of unbalanced quotes
    let text = text.replace("'''", "").replace("''", "\"");

    // Collect droppable spans: comments, self-closing tags, ignored
    // tag markers
    let mut spans: Vec<(usize, usize)> = vec![];
    for m in COMMENT.find_iter(&text) {
        spans.push((m.start(), m.end()));
    }
    for pattern in SELF_CLOSING_PATTERNS.iter() {
        for m in pattern.find_iter(&text) {
            spans.push((m.start(), m.end()));
        }
    }
    let anchors = (!options.keep_links).then_some(&*ANCHOR_TAG_PATTERNS);
    for (left, right) in IGNORED_TAG_PATTERNS.iter().chain(anchors) {
        for m in left.find_iter(&text) {
            spans.push((m.start(), m.end()));
        }
        for m in right.find_iter(&text) {
            spans.push((m.start(), m.end()));
        }
    }
    let text = drop_spans(&mut spans, &text);

    // Discarded elements go with their content
    let mut text = text;
    for (open, close) in DISCARD_PATTERNS.iter() {
        text = drop_nested(&text, open, close);
    }

    // What is left becomes text (&amp;nbsp; and friends)
    if !options.html {
        text = common::unescape(&text).into_owned();
    }

    // Placeholders, numbered per article
    for (pattern, placeholder) in PLACEHOLDER_PATTERNS.iter() {
        let mut index = 0;
        text = pattern
            .replace_all(&text, |_: &regex::Captures<'_>| {
                index += 1;
                format!("{placeholder}_{index}")
            })
            .into_owned();
    }

    let text = text.replace("<<", "\u{ab}").replace(">>", "\u{bb}");

    // Typographic cleanup
    let text = text.replace('\t', " ");
    let text = SPACES.replace_all(&text, " ");
    let text = DOTS.replace_all(&text, "...");
    let text = SPACE_BEFORE.replace_all(&text, "$1");
    let text = SPACE_AFTER.replace_all(&text, "$1");
    let text = PUNCT_LINE.replace_all(&text, "\n");
    let text = text.replace(",,", ",").replace(",.", ".");

    if options.html || options.keep_links {
        text
    } else {
        // Keep the <doc> container well formed
        html_escape::encode_text(&text).into_owned()
    }
}

/// The opening element for one list bullet kind.
fn list_open(bullet: u8) -> &'static str {
    match bullet {
        b'*' => "<ul>",
        b'#' => "<ol>",
        _ => "<dl>",
    }
}

/// The closing element for one list bullet kind.
fn list_close(bullet: u8) -> &'static str {
    match bullet {
        b'*' => "</ul>",
        b'#' => "</ol>",
        _ => "</dl>",
    }
}

/// The item element for one list bullet kind.
fn list_item(bullet: u8, content: &str) -> String {
    match bullet {
        b';' => format!("<dt>{content}</dt>"),
        b':' => format!("<dd>{content}</dd>"),
        _ => format!("<li>{content}</li>"),
    }
}

/// Compacts cleaned text into output paragraphs.
///
/// Deals with section headings, lists, empty sections, and residuals
/// of tables. Headings are deferred and only emitted when a content
/// paragraph follows; empty sections disappear.
// Clippy: The paragraph policy is one flat decision list and reads
// best in one place.
#[allow(clippy::too_many_lines)]
pub fn compact(text: &str, options: &super::Options) -> Vec<String> {
    let mut page: Vec<String> = vec![];
    // Pending headings by level
    let mut headers: Vec<(usize, String)> = vec![];
    // Open list bullets, innermost last
    let mut lists: Vec<u8> = vec![];
    let mut empty_section = false;

    for line in text.split('\n') {
        if line.is_empty() {
            if !lists.is_empty() {
                page.push(String::new());
                if options.html {
                    for &bullet in lists.iter().rev() {
                        page.push(list_close(bullet).to_string());
                    }
                }
                lists.clear();
                empty_section = false;
            } else if page.last().is_some_and(|last| !last.is_empty()) {
                page.push(String::new());
            }
            continue;
        }

        // Section headings
        if let Ok(Some(captures)) = SECTION.captures(line) {
            let level = captures[1].len();
            let mut title = captures[2].to_string();
            if options.html {
                page.push(format!("<h{level}>{title}</h{level}>"));
            }
            if !title.is_empty() && !title.ends_with(['!', '?']) {
                title.push('.');
            }
            headers.retain(|&(l, _)| l < level);
            headers.push((level, title));
            empty_section = true;
            if options.html {
                for &bullet in lists.iter().rev() {
                    page.push(list_close(bullet).to_string());
                }
            }
            lists.clear();
            continue;
        }

        let first = line.as_bytes()[0];
        let last = *line.as_bytes().last().unwrap();

        if first == b':' {
            // Indent continuations are dropped
            continue;
        }
        if matches!(first, b'*' | b'#' | b';') {
            if options.html {
                let bullets: Vec<u8> = line
                    .bytes()
                    .take_while(|b| matches!(b, b'*' | b'#' | b';' | b':'))
                    .collect();
                // Close the levels that no longer apply, open the new
                // ones
                let common = lists
                    .iter()
                    .zip(&bullets)
                    .take_while(|(a, b)| a == b)
                    .count();
                for &bullet in lists[common..].iter().rev() {
                    page.push(list_close(bullet).to_string());
                }
                lists.truncate(common);
                for &bullet in &bullets[common..] {
                    page.push(list_open(bullet).to_string());
                    lists.push(bullet);
                }
                let content = line[bullets.len()..].trim();
                if !content.is_empty() {
                    page.push(list_item(*bullets.last().unwrap(), content));
                }
            }
            continue;
        }
        if matches!(first, b'{' | b'|') || last == b'}' {
            // Residuals of tables
            continue;
        }
        if (first == b'(' && last == b')') || line.trim_matches(['.', '-']).is_empty() {
            continue;
        }

        if !headers.is_empty() {
            if options.keep_sections {
                headers.sort_by_key(|&(level, _)| level);
                for (_, title) in headers.drain(..) {
                    page.push(title);
                }
            } else {
                headers.clear();
            }
            page.push(line.to_string());
            empty_section = false;
        } else if !empty_section {
            page.push(line.to_string());
        }
    }

    if options.html {
        for &bullet in lists.iter().rev() {
            page.push(list_close(bullet).to_string());
        }
    }

    page
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        extract::{Options, ParseCache},
        store::TemplateStore,
        title::Namespaces,
    };

    /// Runs the full cleaner over `text` with the given store and
    /// options.
    fn run(templates: &[(&str, &str)], options: &Options, text: &str) -> String {
        let mut store = TemplateStore::default();
        for (title, body) in templates {
            store.insert_template(*title, *body);
        }
        let namespaces = Namespaces::default();
        let mut cache = ParseCache::new();
        let mut extractor = Extractor::new(&store, &mut cache, &namespaces, options, "Test");
        clean(&mut extractor, text)
    }

    #[test]
    fn test_template_expansion() {
        let out = run(
            &[("Template:Greet", "Hello {{{1}}}!")],
            &Options::default(),
            "{{Greet|world}}",
        );
        assert!(out.contains("Hello world!"), "{out:?}");
    }

    #[test]
    fn test_no_templates_drops_braces() {
        let options = Options {
            expand_templates: false,
            ..Options::default()
        };
        let out = run(&[], &options, "a {{box|{{inner}}}} b {|\n|cell\n|} c");
        assert!(!out.contains("{{"), "{out:?}");
        assert!(!out.contains("{|"), "{out:?}");
        assert_eq!(out.trim(), "a b c");
    }

    #[test]
    fn test_quad_brace_ambiguity_cleans_to_nothing() {
        let out = run(&[], &Options::default(), "{{{{ x }}}}");
        let paragraphs = compact(&out, &Options::default());
        assert!(paragraphs.iter().all(String::is_empty), "{paragraphs:?}");
    }

    #[test]
    fn test_internal_link_namespace_filtering() {
        let out = run(
            &[],
            &Options::default(),
            "see [[Python (programming language)|Python]] and [[File:logo.png]]",
        );
        assert_eq!(out.trim_end(), "see Python and");
    }

    #[test]
    fn test_internal_link_trail() {
        let out = run(&[], &Options::default(), "[[dog]]s bark");
        assert_eq!(out, "dogs bark");
    }

    #[test]
    fn test_kept_links() {
        let options = Options {
            keep_links: true,
            ..Options::default()
        };
        let out = run(&[], &options, "[[Python (langage)|Python]]");
        assert_eq!(
            out,
            r#"<a href="Python%20(langage)">Python</a>"#
        );
    }

    #[test]
    fn test_no_anchor_without_keep_links() {
        let out = run(
            &[],
            &Options::default(),
            r#"x [https://example.com/ site] y <a href="z">link</a>"#,
        );
        assert!(!out.contains("<a"), "{out:?}");
        assert!(out.contains("site"));
    }

    #[test]
    fn test_external_links() {
        let options = Options::default();
        let out = run(&[], &options, "a [http://example.com label text] b");
        assert_eq!(out, "a label text b");
        let out = run(&[], &options, "a [http://example.com] b");
        assert_eq!(out, "a b");
    }

    #[test]
    fn test_bold_italic() {
        let options = Options::default();
        assert_eq!(run(&[], &options, "'''''x'''''"), "x");
        assert_eq!(run(&[], &options, "'''bold'''"), "bold");
        assert_eq!(run(&[], &options, "''italic''"), "\"italic\"");
        assert_eq!(run(&[], &options, "a ''b'' '' c"), "a \"b\" \" c");
    }

    #[test]
    fn test_comments_and_tags() {
        let options = Options::default();
        assert_eq!(run(&[], &options, "a<!-- hidden\ntext -->b"), "ab");
        assert_eq!(run(&[], &options, "a<br/>b<span>c</span>"), "abc");
        assert_eq!(
            run(&[], &options, "keep<ref name=x>citation</ref> this"),
            "keep this"
        );
        assert_eq!(run(&[], &options, "a<table><tr><td>x</td></tr></table>b"), "ab");
    }

    #[test]
    fn test_placeholders() {
        let options = Options::default();
        let out = run(&[], &options, "<math>x^2</math> and <code>ls</code> and <math>y</math>");
        assert_eq!(out, "formula_1 and codice_1 and formula_2");
    }

    #[test]
    fn test_entities_decode_twice() {
        let options = Options::default();
        let out = run(&[], &options, "A&amp;nbsp;B");
        assert_eq!(out, "A\u{a0}B");
    }

    #[test]
    fn test_glyphs_and_spacing() {
        let options = Options::default();
        assert_eq!(run(&[], &options, "<<quoted>>"), "\u{ab}quoted\u{bb}");
        assert_eq!(run(&[], &options, "a \t b"), "a b");
        assert_eq!(run(&[], &options, "wait ...... done"), "wait ... done");
        assert_eq!(run(&[], &options, "a , b"), "a, b");
    }

    #[test]
    fn test_output_escaped() {
        let options = Options::default();
        assert_eq!(run(&[], &options, "AT&T <3"), "AT&amp;T &lt;3");
    }

    #[test]
    fn test_behavioral_switches_stripped() {
        let options = Options::default();
        assert_eq!(run(&[], &options, "__NOTOC__text__FORCETOC__"), "text");
    }

    #[test]
    fn test_compact_headings_deferred() {
        let options = Options {
            keep_sections: true,
            ..Options::default()
        };
        let text = "== Head ==\nBody line.\n== Empty ==";
        assert_eq!(compact(text, &options), ["Head.", "Body line."]);
    }

    #[test]
    fn test_compact_headings_dropped_without_sections() {
        let options = Options::default();
        let text = "== Head ==\nBody line.";
        assert_eq!(compact(text, &options), ["Body line."]);
    }

    #[test]
    fn test_compact_deeper_headings_replaced() {
        let options = Options {
            keep_sections: true,
            ..Options::default()
        };
        let text = "== A ==\n=== B ===\n== C ==\ncontent";
        assert_eq!(compact(text, &options), ["C.", "content"]);
    }

    #[test]
    fn test_compact_drops_residue() {
        let options = Options::default();
        let text = "good\n:indent\n* item\n|cell\n{row\n(paren)\n----\n...\nalso good";
        assert_eq!(compact(text, &options), ["good", "also good"]);
    }

    #[test]
    fn test_compact_html_lists() {
        let options = Options {
            html: true,
            ..Options::default()
        };
        let text = "* a\n* b\n";
        let out = compact(text, &options);
        assert_eq!(out, ["<ul>", "<li>a</li>", "<li>b</li>", "", "</ul>"]);
    }

    #[test]
    fn test_heading_with_exclamation_keeps_mark() {
        let options = Options {
            keep_sections: true,
            ..Options::default()
        };
        let text = "== Wow! ==\ncontent";
        assert_eq!(compact(text, &options), ["Wow!", "content"]);
    }
}
