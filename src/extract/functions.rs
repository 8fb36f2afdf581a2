//! Parser function implementations.
//!
//! <https://www.mediawiki.org/wiki/Help:Extension:ParserFunctions>

// Clippy: Function signatures all conform to a specific API; inline
// modules are clearer with wildcard imports.
#![allow(clippy::unnecessary_wraps, clippy::wildcard_imports)]

use super::Extractor;
use crate::expr;
use regex::Regex;
use std::sync::LazyLock;

/// The function signature of a parser function.
///
/// Arguments arrive already expanded; the first is the text after the
/// colon of the invocation, trimmed. Parser functions are total: any
/// internal failure produces an empty string, never an error.
type ParserFn = fn(&mut Extractor<'_>, &[String]) -> String;

/// Returns the argument at `index`, trimmed, or the empty string.
fn arg(args: &[String], index: usize) -> &str {
    args.get(index).map(String::as_str).unwrap_or_default().trim()
}

mod cond {
    //! Flow control parser functions.

    use super::*;

    /// `{{#expr: expression}}`
    pub fn expr(_: &mut Extractor<'_>, args: &[String]) -> String {
        match expr::do_expression(arg(args, 0)) {
            Ok(Some(result)) => format!("{result}"),
            Ok(None) => String::new(),
            Err(_) => r#"<span class="error"></span>"#.to_string(),
        }
    }

    /// `{{#if: condition | consequent | alternate }}`
    pub fn r#if(_: &mut Extractor<'_>, args: &[String]) -> String {
        let index = if arg(args, 0).is_empty() { 2 } else { 1 };
        arg(args, index).to_string()
    }

    /// `{{#ifeq: lhs | rhs | consequent | alternate }}`
    ///
    /// Plain string equality after trimming; there is no numeric
    /// coercion.
    pub fn if_eq(_: &mut Extractor<'_>, args: &[String]) -> String {
        let index = if arg(args, 0) == arg(args, 1) { 2 } else { 3 };
        arg(args, index).to_string()
    }

    /// `{{#iferror: test | consequent (error) | alternate }}`
    pub fn if_error(_: &mut Extractor<'_>, args: &[String]) -> String {
        static I_AM_BAD: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r#"<(?:strong|span|p|div)\s(?:[^\s>]*\s+)*?class="(?:[^"\s>]*\s+)*?error(?:\s[^">]*)?""#).unwrap()
        });

        let test = arg(args, 0);
        if I_AM_BAD.is_match(test) {
            arg(args, 1).to_string()
        } else if args.len() > 2 {
            arg(args, 2).to_string()
        } else {
            test.to_string()
        }
    }

    /// `{{#switch: match | case [| case ...] = value | default }}`
    pub fn switch(_: &mut Extractor<'_>, args: &[String]) -> String {
        let primary = arg(args, 0);
        let mut found = false;
        let mut default = None;
        let mut dangling = None;

        let cases = args.get(1..).unwrap_or_default();
        for (index, case) in cases.iter().enumerate() {
            if let Some((labels, value)) = case.split_once('=') {
                let value = value.trim();
                // Multiple pipe-separated labels on one left side each
                // match; a preceding bare case falls through into the
                // first valued case after it
                if found || labels.split('|').any(|label| label.trim() == primary) {
                    return value.to_string();
                }
                if labels.trim() == "#default" {
                    default = Some(value);
                }
            } else {
                let label = case.trim();
                if label == primary {
                    found = true;
                } else if index + 1 == cases.len() && !found {
                    // A dangling unvalued final case is a fallback
                    // default, losing to an explicit #default
                    dangling = Some(label);
                }
            }
        }

        default.or(dangling).unwrap_or_default().to_string()
    }
}

mod module {
    //! Scribunto module calls.

    use super::*;

    /// `{{#invoke: module | function [| argument ...] }}`
    ///
    /// No Lua runs here. The only module stub provided is
    /// `convert:convert`, which joins its first two arguments with a
    /// space. With no explicit arguments, positional arguments are
    /// pulled from the enclosing frame binding whose title matches
    /// the fully-qualified title of the function name.
    pub fn invoke(extractor: &mut Extractor<'_>, args: &[String]) -> String {
        let module = arg(args, 0);
        let function = arg(args, 1);

        let params: Vec<String> = if args.len() > 2 {
            args[2..].to_vec()
        } else {
            extractor.frame_args(function)
        };

        call_stub(module, function, &params)
    }

    /// Dispatches to a known module stub.
    fn call_stub(module: &str, function: &str, params: &[String]) -> String {
        match (module, function) {
            ("convert", "convert") => {
                let value = params.first().map(String::as_str).unwrap_or_default();
                let unit = params.get(1).map(String::as_str).unwrap_or_default();
                format!("{value} {unit}")
            }
            _ => String::new(),
        }
    }
}

mod string {
    //! String manipulation parser functions.

    use super::*;
    use crate::{common, title};

    /// `{{lc: text}}`
    pub fn lc(_: &mut Extractor<'_>, args: &[String]) -> String {
        arg(args, 0).to_lowercase()
    }

    /// `{{uc: text}}`
    pub fn uc(_: &mut Extractor<'_>, args: &[String]) -> String {
        arg(args, 0).to_uppercase()
    }

    /// `{{lcfirst: text}}`
    pub fn lc_first(_: &mut Extractor<'_>, args: &[String]) -> String {
        title::lcfirst(arg(args, 0))
    }

    /// `{{ucfirst: text}}`
    pub fn uc_first(_: &mut Extractor<'_>, args: &[String]) -> String {
        title::ucfirst(arg(args, 0))
    }

    /// `{{int: message}}`
    ///
    /// There is no interface message dictionary; the key passes
    /// through unchanged.
    pub fn interface_message(_: &mut Extractor<'_>, args: &[String]) -> String {
        arg(args, 0).to_string()
    }

    /// `{{urlencode: text}}`
    pub fn url_encode(_: &mut Extractor<'_>, args: &[String]) -> String {
        common::url_encode(arg(args, 0)).to_string()
    }
}

/// The shared implementation of all unsupported parser functions.
fn unsupported(_: &mut Extractor<'_>, _: &[String]) -> String {
    String::new()
}

/// Known parser functions. Dispatch is by exact name.
static PARSER_FUNCTIONS: phf::Map<&'static str, ParserFn> = phf::phf_map! {
    "#expr" => cond::expr,
    "#if" => cond::r#if,
    "#ifeq" => cond::if_eq,
    "#iferror" => cond::if_error,
    "#switch" => cond::switch,

    "#invoke" => module::invoke,

    "#ifexpr" => unsupported,
    "#ifexist" => unsupported,
    "#rel2abs" => unsupported,
    "#time" => unsupported,
    "#timel" => unsupported,
    "#titleparts" => unsupported,
    "#language" => unsupported,

    "int" => string::interface_message,
    "lc" => string::lc,
    "lcfirst" => string::lc_first,
    "uc" => string::uc,
    "ucfirst" => string::uc_first,
    "urlencode" => string::url_encode,
};

/// Calls the parser function `name`, returning its production or the
/// empty string for an unknown name.
pub fn call_parser_function(
    extractor: &mut Extractor<'_>,
    name: &str,
    args: &[String],
) -> String {
    PARSER_FUNCTIONS
        .get(name)
        .map_or_else(String::new, |parser_fn| parser_fn(extractor, args))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{extract::Options, store::TemplateStore, title::Namespaces};
    use std::collections::HashMap;

    /// Runs one parser function against an empty page context.
    fn call(name: &str, args: &[&str]) -> String {
        let store = TemplateStore::default();
        let namespaces = Namespaces::default();
        let options = Options::default();
        let mut cache = HashMap::new();
        let mut extractor = Extractor::new(&store, &mut cache, &namespaces, &options, "Test");
        let args: Vec<String> = args.iter().map(ToString::to_string).collect();
        call_parser_function(&mut extractor, name, &args)
    }

    #[test]
    fn test_if() {
        assert_eq!(call("#if", &["x", "yes", "no"]), "yes");
        assert_eq!(call("#if", &["  ", "yes", "no"]), "no");
        assert_eq!(call("#if", &["", "yes"]), "");
    }

    #[test]
    fn test_ifeq() {
        assert_eq!(call("#ifeq", &["a", " a ", "same", "diff"]), "same");
        assert_eq!(call("#ifeq", &["a", "b", "same", "diff"]), "diff");
        // No numeric coercion
        assert_eq!(call("#ifeq", &["1.0", "1", "same", "diff"]), "diff");
    }

    #[test]
    fn test_iferror() {
        assert_eq!(
            call("#iferror", &[r#"<strong class="error">x</strong>"#, "bad", "ok"]),
            "bad"
        );
        assert_eq!(call("#iferror", &["fine", "bad", "ok"]), "ok");
        assert_eq!(call("#iferror", &["fine", "bad"]), "fine");
    }

    #[test]
    fn test_switch() {
        let cases = ["b", "a", "b=match", "c=other", "#default=none"];
        assert_eq!(call("#switch", &cases), "match");
        let cases = ["z", "a", "b=match", "c=other", "#default=none"];
        assert_eq!(call("#switch", &cases), "none");
        let cases = ["z", "a", "b=match", "c=other", "finalcase"];
        assert_eq!(call("#switch", &cases), "finalcase");
        // An explicit #default beats the trailing bare label
        let cases = ["z", "b=match", "#default=none", "extra"];
        assert_eq!(call("#switch", &cases), "none");
        // Fall-through label pipes into the next valued case
        let cases = ["a", "a", "b=match", "c=other"];
        assert_eq!(call("#switch", &cases), "match");
        // Multiple labels on one left side
        let cases = ["y", "x|y|z=many", "#default=none"];
        assert_eq!(call("#switch", &cases), "many");
        assert_eq!(call("#switch", &["q"]), "");
    }

    #[test]
    fn test_expr() {
        assert_eq!(call("#expr", &["2 + 3 * 4"]), "14");
        assert_eq!(call("#expr", &["1 / 4"]), "0.25");
        assert_eq!(call("#expr", &["1 / 0"]), r#"<span class="error"></span>"#);
        assert_eq!(call("#expr", &[""]), "");
    }

    #[test]
    fn test_strings() {
        assert_eq!(call("lc", &["ABC def"]), "abc def");
        assert_eq!(call("uc", &["abc DEF"]), "ABC DEF");
        assert_eq!(call("lcfirst", &["Python"]), "python");
        assert_eq!(call("ucfirst", &["python"]), "Python");
        assert_eq!(call("int", &["size"]), "size");
        assert_eq!(call("urlencode", &["x y&z"]), "x%20y%26z");
    }

    #[test]
    fn test_unsupported_and_unknown() {
        assert_eq!(call("#time", &["Y-m-d"]), "");
        assert_eq!(call("#ifexist", &["Page", "yes", "no"]), "");
        assert_eq!(call("#nosuch", &["x"]), "");
    }

    #[test]
    fn test_invoke_stub() {
        assert_eq!(call("#invoke", &["convert", "convert", "10", "km"]), "10 km");
        assert_eq!(call("#invoke", &["frobnicate", "run", "x"]), "");
    }
}
