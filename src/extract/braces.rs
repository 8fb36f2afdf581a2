//! Balanced-delimiter scanning over raw wikitext.
//!
//! Parsing is done with respect to pairs of double braces `{{…}}`
//! delimiting a template and triple braces `{{{…}}}` delimiting a
//! template argument. For any pattern of braces this defines a set of
//! templates and tplargs such that any two are either separate or
//! nested, never overlapping. Runs of three or more opening braces
//! prefer the tplarg reading, with the excess acting as stray text;
//! when the closing side cannot supply a triple, the last two braces
//! act as a template instead and one stray remains.
//!
//! Unmatched `]]` inside braces is plain text; unmatched `[[` cannot
//! be inside a template and is discarded from matching.

use std::ops::Range;

/// A pending opening run.
struct Entry {
    /// Unmatched delimiter count. Positive counts are `{`, negative
    /// counts are `[`.
    count: isize,
    /// Byte offset of the first delimiter of the run.
    start: usize,
}

/// An iterator over top-level balanced spans of a text.
///
/// Yields half-open byte ranges in increasing order; the ranges never
/// overlap. On unbalanced input the iterator simply ends.
pub struct Spans<'a> {
    /// The text being scanned.
    text: &'a [u8],
    /// The minimum opening-brace run length that starts a span.
    min_open: usize,
    /// Whether `[[…]]` runs participate in matching and may start
    /// spans of their own.
    links: bool,
    /// The scan position.
    cur: usize,
}

/// Returns the spans of balanced `{{…}}` and `{{{…}}}` constructs.
///
/// `min_open` is 2 to find both templates and tplargs, or 3 to find
/// tplargs only.
pub fn find_matching_braces(text: &str, min_open: usize) -> Spans<'_> {
    Spans {
        text: text.as_bytes(),
        min_open,
        links: false,
        cur: 0,
    }
}

/// Returns the spans of balanced `{{…}}`, `{{{…}}}`, and `[[…]]`
/// constructs, used to protect `|` separators when splitting template
/// parameter lists.
pub(crate) fn find_braces_and_links(text: &str) -> Spans<'_> {
    Spans {
        text: text.as_bytes(),
        min_open: 2,
        links: true,
        cur: 0,
    }
}

impl Spans<'_> {
    /// Returns the length of the run of `byte` starting at `at`.
    fn run_len(&self, at: usize, byte: u8) -> usize {
        let mut end = at;
        while end < self.text.len() && self.text[end] == byte {
            end += 1;
        }
        end - at
    }

    /// Finds the next opening run at or after `from`.
    fn next_open(&self, mut from: usize) -> Option<(usize, usize, u8)> {
        while from < self.text.len() {
            let at = if self.links {
                memchr::memchr2(b'{', b'[', &self.text[from..])
            } else {
                memchr::memchr(b'{', &self.text[from..])
            }
            .map(|offset| from + offset)?;
            let byte = self.text[at];
            let len = self.run_len(at, byte);
            let need = if byte == b'{' { self.min_open } else { 2 };
            if len >= need {
                return Some((at, len, byte));
            }
            from = at + len;
        }
        None
    }

    /// Finds the next opening or closing run of length two or more at
    /// or after `from`.
    fn next_run(&self, mut from: usize) -> Option<(usize, usize, u8)> {
        while from < self.text.len() {
            let at = if self.links {
                let braces = memchr::memchr2(b'{', b'}', &self.text[from..]);
                let brackets = memchr::memchr2(b'[', b']', &self.text[from..]);
                match (braces, brackets) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                }
            } else {
                memchr::memchr2(b'{', b'}', &self.text[from..])
            }
            .map(|offset| from + offset)?;
            let byte = self.text[at];
            let len = self.run_len(at, byte);
            if len >= 2 {
                return Some((at, len, byte));
            }
            from = at + len;
        }
        None
    }
}

impl Iterator for Spans<'_> {
    type Item = Range<usize>;

    // Clippy: The scanner is one state machine; splitting it obscures
    // the stack discipline.
    #[allow(clippy::too_many_lines, clippy::cast_possible_wrap)]
    fn next(&mut self) -> Option<Range<usize>> {
        'open: loop {
            let (open_start, open_len, open_byte) = self.next_open(self.cur)?;
            let mut stack = vec![Entry {
                count: if open_byte == b'{' {
                    open_len as isize
                } else {
                    -(open_len as isize)
                },
                start: open_start,
            }];
            let mut end = open_start + open_len;

            loop {
                let (run_start, run_len, byte) = match self.next_run(end) {
                    Some(run) => run,
                    // Unbalanced: yield nothing further
                    None => return None,
                };
                end = run_start + run_len;

                match byte {
                    b'{' => stack.push(Entry {
                        count: run_len as isize,
                        start: run_start,
                    }),
                    b'[' => stack.push(Entry {
                        count: -(run_len as isize),
                        start: run_start,
                    }),
                    b'}' => {
                        let mut m = run_len;
                        let mut consumed = 0;
                        while m >= 2 {
                            let Some(&Entry { count, .. }) = stack.last() else {
                                // Stray closing braces are plain text
                                break;
                            };
                            if count < 0 {
                                // Unmatched [[ cannot be inside a
                                // template
                                stack.pop();
                                continue;
                            }
                            let open = count.unsigned_abs();
                            let need = if stack.len() == 1 { self.min_open } else { 2 };
                            if open < need {
                                // Leftover opens too short to ever
                                // match at this arity
                                let entry = stack.pop().unwrap();
                                if stack.is_empty() {
                                    self.cur = end;
                                    if consumed > 0 {
                                        return Some(
                                            entry.start + open..run_start + consumed,
                                        );
                                    }
                                    continue 'open;
                                }
                                continue;
                            }
                            // A triple close makes a tplarg; otherwise
                            // the last two braces make a template
                            let take = open.min(m).min(3);
                            m -= take;
                            consumed += take;
                            let top = stack.last_mut().unwrap();
                            top.count -= take as isize;
                            if top.count == 0 {
                                let entry = stack.pop().unwrap();
                                if stack.is_empty() {
                                    self.cur = end;
                                    return Some(entry.start..run_start + consumed);
                                }
                            }
                        }
                        // A single remaining opening brace below the
                        // arity can never match: the balanced part
                        // just closed is complete, with the remainder
                        // stray on the outside
                        if let [entry] = &stack[..]
                            && consumed > 0
                            && entry.count > 0
                            && entry.count.unsigned_abs() < self.min_open
                        {
                            let stray = entry.count.unsigned_abs();
                            self.cur = end;
                            return Some(entry.start + stray..run_start + consumed);
                        }
                    }
                    _ => {
                        let mut m = run_len;
                        let mut consumed = 0;
                        while m >= 2 {
                            let Some(&Entry { count, .. }) = stack.last() else {
                                break;
                            };
                            if count > 0 {
                                // Stray ]] inside braces is plain text
                                break;
                            }
                            let open = count.unsigned_abs();
                            if open <= m {
                                m -= open;
                                consumed += open;
                                let entry = stack.pop().unwrap();
                                if stack.is_empty() {
                                    self.cur = end;
                                    return Some(entry.start..run_start + consumed);
                                }
                                if m <= 1 {
                                    break;
                                }
                            } else {
                                stack.last_mut().unwrap().count = -((open - m) as isize);
                                consumed += m;
                                m = 0;
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Finds balanced spans of the given explicit delimiter pairs.
///
/// `opens` and `closes` are parallel lists; nesting across pairs is
/// tracked with a plain push/pop stack. Yields outermost spans only;
/// stops at the first unbalanced close.
pub fn find_balanced<'a>(
    text: &'a str,
    opens: &'a [&'a str],
    closes: &'a [&'a str],
) -> impl Iterator<Item = Range<usize>> + 'a {
    let mut cur = 0;
    let mut stack: Vec<usize> = vec![];
    let mut start = 0;
    std::iter::from_fn(move || {
        loop {
            // Next open or close delimiter at or after cur
            let next_open = opens
                .iter()
                .enumerate()
                .filter_map(|(which, open)| text[cur..].find(open).map(|at| (cur + at, which)))
                .min();
            let matching = stack.last().map(|&which| closes[which]);
            let next_close =
                matching.and_then(|close| text[cur..].find(close).map(|at| cur + at));
            match (next_open, next_close) {
                (Some((at, which)), close) if close.is_none_or(|close_at| at < close_at) => {
                    if stack.is_empty() {
                        start = at;
                    }
                    stack.push(which);
                    cur = at + opens[which].len();
                }
                (_, Some(at)) => {
                    let which = stack.pop().unwrap();
                    cur = at + closes[which].len();
                    if stack.is_empty() {
                        return Some(start..cur);
                    }
                }
                (None, None) => return None,
                (Some((_, _)), None) => unreachable!(),
            }
        }
    })
}

/// Splits a template invocation body at top-level `|` separators.
///
/// A `|` inside `{{…}}`, `{{{…}}}`, or `[[…]]` belongs to the nested
/// construct and does not split. The pieces are returned verbatim, no
/// trimming.
pub fn split_parts(body: &str) -> Vec<String> {
    let mut parameters: Vec<String> = vec![];

    /// Splits the interstitial text between two balanced spans and
    /// merges the first piece into the last open parameter.
    fn split_interstitial(parameters: &mut Vec<String>, text: &str) {
        let mut pieces = text.split('|');
        if let Some(first) = pieces.next() {
            if let Some(last) = parameters.last_mut() {
                // The portion before the first separator belongs to
                // the previous parameter
                last.push_str(first);
            } else {
                parameters.push(first.to_string());
            }
            parameters.extend(pieces.map(str::to_string));
        }
    }

    let mut cur = 0;
    for span in find_braces_and_links(body) {
        split_interstitial(&mut parameters, &body[cur..span.start]);
        if parameters.is_empty() {
            parameters.push(String::new());
        }
        // The balanced span is appended whole to the open parameter
        parameters
            .last_mut()
            .unwrap()
            .push_str(&body[span.clone()]);
        cur = span.end;
    }
    split_interstitial(&mut parameters, &body[cur..]);

    parameters
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Collects spans as `(start, end)` pairs.
    fn braces(text: &str, min_open: usize) -> Vec<(usize, usize)> {
        find_matching_braces(text, min_open)
            .map(|r| (r.start, r.end))
            .collect()
    }

    #[test]
    fn test_simple_template() {
        assert_eq!(braces("a {{b}} c", 2), vec![(2, 7)]);
        assert_eq!(braces("{{a}} {{b}}", 2), vec![(0, 5), (6, 11)]);
    }

    #[test]
    fn test_nested_is_one_span() {
        assert_eq!(braces("{{a|{{b}}}}", 2), vec![(0, 11)]);
    }

    #[test]
    fn test_tplarg_only_arity() {
        assert_eq!(braces("{{a}} {{{b}}}", 3), vec![(6, 13)]);
    }

    #[test]
    fn test_quad_braces_prefer_inner_tplarg() {
        // {{{{ x }}}} reads as { {{{ x }}} }
        let text = "{{{{ x }}}}";
        assert_eq!(braces(text, 2), vec![(1, 10)]);
        assert_eq!(&text[1..10], "{{{ x }}}");
    }

    #[test]
    fn test_quint_braces_prefer_outer_template() {
        // {{{{{ x }}}}} reads as {{ {{{ x }}} }}
        let text = "{{{{{ x }}}}}";
        assert_eq!(braces(text, 2), vec![(0, 13)]);
    }

    #[test]
    fn test_triple_open_double_close_is_template() {
        // The last two braces act as a template-open; one stray stays
        let text = "{{{a}}";
        assert_eq!(braces(text, 2), vec![(1, 6)]);
        assert_eq!(&text[1..6], "{{a}}");
    }

    #[test]
    fn test_unbalanced_yields_nothing_further() {
        assert_eq!(braces("{{a}} {{b", 2), vec![(0, 5)]);
        assert_eq!(braces("{{a", 2), vec![]);
    }

    #[test]
    fn test_stray_brackets_inside_braces() {
        // Unmatched ]] inside a template is plain text
        assert_eq!(braces("{{a]]b}}", 2), vec![(0, 8)]);
    }

    #[test]
    fn test_spans_increasing_non_overlapping() {
        for text in [
            "{{a}}{{b}}{{{c}}}",
            "x{{a|{{b}}|{{{c|}}}}}y{{d}}",
            "{{{{ x }}}} {{y}}",
            "{{a}} }} {{b}}",
        ] {
            let spans = braces(text, 2);
            for pair in spans.windows(2) {
                assert!(pair[0].1 <= pair[1].0, "{text}: {spans:?}");
            }
        }
    }

    #[test]
    fn test_find_balanced() {
        let spans: Vec<_> = find_balanced("a [[b [[c]] d]] e", &["[["], &["]]"]).collect();
        assert_eq!(spans, vec![2..15]);
        let spans: Vec<_> = find_balanced("[[a]] [[b]]", &["[["], &["]]"]).collect();
        assert_eq!(spans, vec![0..5, 6..11]);
    }

    #[test]
    fn test_split_simple() {
        assert_eq!(split_parts("p=q|q=r|r=s"), ["p=q", "q=r", "r=s"]);
    }

    #[test]
    fn test_split_protects_nested() {
        assert_eq!(
            split_parts("{{#if: {{{1}}} | {{lc:{{{1}}} | \"parameter missing\"}}"),
            [
                "{{#if: {{{1}}} ",
                " {{lc:{{{1}}} ",
                " \"parameter missing\"}}"
            ]
        );
    }

    #[test]
    fn test_split_one_balanced_whole() {
        let body = "{{if:|\n      |{{#if:the president|\n           |{{#if:|\n               [[Category:Hatnote templates|A{{PAGENAME}}]]\n            }}\n       }}\n     }}";
        assert_eq!(split_parts(body), [body]);
    }

    #[test]
    fn test_split_protects_links() {
        assert_eq!(
            split_parts("a|[[b|c]]|d"),
            ["a", "[[b|c]]", "d"]
        );
    }
}
