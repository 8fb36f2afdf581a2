//! Streaming reader for MediaWiki XML dumps.
//!
//! The dump format is line-oriented enough that a tag regex over
//! lines is sufficient; no XML parser is involved. Entities inside
//! `<text>` are NOT decoded here, that happens in the cleaner.
//! Input compression is chosen by filename suffix.

use crate::title::Namespaces;
use bzip2::read::MultiBzDecoder;
use flate2::read::GzDecoder;
use regex::Regex;
use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    sync::LazyLock,
};

/// Opens a dump for reading, decompressing by suffix. `-` reads
/// standard input.
pub fn open_input(path: &str) -> io::Result<Box<dyn BufRead + Send>> {
    Ok(if path == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let file = File::open(path)?;
        if path.ends_with(".bz2") {
            Box::new(BufReader::new(MultiBzDecoder::new(file)))
        } else if path.ends_with(".gz") {
            Box::new(BufReader::new(GzDecoder::new(file)))
        } else {
            Box::new(BufReader::new(file))
        }
    })
}

/// A tag event on one line: leading text, tag name, immediate
/// content, and an optional closing tag on the same line.
static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(.*?)<(/?\w+)[^>]*?>(?:([^<]*)(<.*?>)?)?").unwrap());

/// The `key="N"` attribute of a `<namespace>` element.
static NAMESPACE_KEY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"key="(-?\d+)""#).unwrap());

/// Configuration discovered from the `<siteinfo>` element.
#[derive(Debug, Default)]
pub struct SiteInfo {
    /// The URL base for generated article URLs, derived from
    /// `<base>`.
    pub url_base: String,
    /// The namespace names, with the template and module namespaces
    /// identified by their well-known keys.
    pub namespaces: Namespaces,
}

/// One `<page>` record from the dump.
#[derive(Debug)]
pub struct RawPage {
    /// The article id (the first `<id>` of the page).
    pub id: u64,
    /// The revision id, when present.
    pub revid: Option<u64>,
    /// The page title, verbatim.
    pub title: String,
    /// Whether the page carries a `<redirect/>` tag.
    ///
    /// Redirects are not dropped here: the template-collection pass
    /// needs them (a Template-namespace redirect carries the tag like
    /// any other page), and the extraction pipeline filters its own.
    pub redirect: bool,
    /// The raw `<text>` content, lines joined, entities intact.
    pub text: String,
}

/// An iterator of the `<page>` records of a dump.
pub struct DumpPages<R> {
    /// The dump stream.
    input: R,
    /// A line read ahead by [`DumpPages::site_info`].
    pending: Option<String>,
    /// The id of the last yielded page; duplicated ids are skipped.
    last_id: Option<u64>,
}

impl<R: BufRead> DumpPages<R> {
    /// Creates a reader over `input`.
    pub fn new(input: R) -> Self {
        Self {
            input,
            pending: None,
            last_id: None,
        }
    }

    /// Reads one line, keeping its newline. Returns `None` at end of
    /// input or on a read error (which is logged).
    fn next_line(&mut self) -> Option<String> {
        if let Some(line) = self.pending.take() {
            return Some(line);
        }
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line),
            Err(err) => {
                log::error!("dump read failed: {err}");
                None
            }
        }
    }

    /// Consumes the `<siteinfo>` element, if the stream is positioned
    /// before one, and returns the discovered configuration.
    pub fn site_info(&mut self) -> SiteInfo {
        let mut info = SiteInfo::default();
        while let Some(line) = self.next_line() {
            let Some(captures) = TAG.captures(&line) else {
                continue;
            };
            let tag = &captures[2];
            if tag == "page" {
                // Dump without a siteinfo header; hand the line back
                self.pending = Some(line.clone());
                break;
            } else if tag == "base" {
                let base = captures.get(3).map_or("", |m| m.as_str());
                info.url_base = base[..base.rfind('/').unwrap_or(0)].to_string();
            } else if tag == "namespace" {
                let name = captures.get(3).map_or("", |m| m.as_str()).trim();
                if !name.is_empty() {
                    info.namespaces.insert(name);
                }
                match NAMESPACE_KEY
                    .captures(&line)
                    .map(|key| key[1].to_string())
                    .as_deref()
                {
                    Some("10") if !name.is_empty() => info.namespaces.set_template(name),
                    Some("828") if !name.is_empty() => info.namespaces.set_module(name),
                    _ => {}
                }
            } else if tag == "/siteinfo" {
                break;
            }
        }
        info
    }
}

impl<R: BufRead> Iterator for DumpPages<R> {
    type Item = RawPage;

    fn next(&mut self) -> Option<RawPage> {
        let mut page: Vec<String> = vec![];
        let mut id: Option<u64> = None;
        let mut revid: Option<u64> = None;
        let mut title = String::new();
        let mut redirect = false;
        let mut in_text = false;

        while let Some(line) = self.next_line() {
            if !line.contains('<') {
                if in_text {
                    page.push(line);
                }
                continue;
            }
            let Some(captures) = TAG.captures(&line) else {
                continue;
            };
            let tag = captures.get(2).unwrap().as_str();
            if in_text && tag != "/text" {
                page.push(line.clone());
                continue;
            }
            match tag {
                "page" => {
                    page.clear();
                    redirect = false;
                }
                "id" if id.is_none() => {
                    id = captures.get(3).and_then(|m| m.as_str().trim().parse().ok());
                }
                "id" if revid.is_none() => {
                    revid = captures.get(3).and_then(|m| m.as_str().trim().parse().ok());
                }
                "title" => {
                    title = captures.get(3).map_or("", |m| m.as_str()).to_string();
                }
                "redirect" => {
                    redirect = true;
                }
                "text" => {
                    // `<text xml:space="preserve" />` carries no body
                    if let Some(content) = captures.get(3) {
                        let self_closing = captures.get(4).is_none()
                            && content.start() >= 2
                            && line.as_bytes()[content.start() - 2] == b'/';
                        if self_closing {
                            continue;
                        }
                        in_text = captures.get(4).is_none();
                        page.push(line[content.range()].to_string());
                    }
                }
                "/text" => {
                    let leading = captures.get(1).map_or("", |m| m.as_str());
                    if !leading.is_empty() {
                        page.push(leading.to_string());
                    }
                    in_text = false;
                }
                "/page" => {
                    if let Some(id) = id
                        && Some(id) != self.last_id
                    {
                        self.last_id = Some(id);
                        return Some(RawPage {
                            id,
                            revid,
                            title: std::mem::take(&mut title),
                            redirect,
                            text: page.concat(),
                        });
                    }
                    id = None;
                    revid = None;
                    title.clear();
                    redirect = false;
                    page.clear();
                }
                _ => {}
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    const DUMP: &str = r#"<mediawiki>
  <siteinfo>
    <sitename>Wikipedia</sitename>
    <base>https://en.wikipedia.org/wiki/Main_Page</base>
    <namespaces>
      <namespace key="0" />
      <namespace key="10" case="first-letter">Template</namespace>
      <namespace key="828" case="first-letter">Module</namespace>
    </namespaces>
  </siteinfo>
  <page>
    <title>First article</title>
    <ns>0</ns>
    <id>1</id>
    <revision>
      <id>100</id>
      <text xml:space="preserve">Body one &amp; more.
Second line.</text>
    </revision>
  </page>
  <page>
    <title>Pointer</title>
    <ns>0</ns>
    <id>2</id>
    <redirect title="First article" />
    <revision>
      <id>101</id>
      <text xml:space="preserve">#REDIRECT [[First article]]</text>
    </revision>
  </page>
  <page>
    <title>Template:Greet</title>
    <ns>10</ns>
    <id>3</id>
    <revision>
      <id>102</id>
      <text xml:space="preserve">Hello {{{1}}}!</text>
    </revision>
  </page>
  <page>
    <title>Empty text</title>
    <ns>0</ns>
    <id>4</id>
    <revision>
      <id>103</id>
      <text xml:space="preserve" />
    </revision>
  </page>
</mediawiki>
"#;

    #[test]
    fn test_site_info() {
        let mut pages = DumpPages::new(DUMP.as_bytes());
        let info = pages.site_info();
        assert_eq!(info.url_base, "https://en.wikipedia.org/wiki");
        assert!(info.namespaces.is_known("Template"));
        assert!(info.namespaces.is_known("Module"));
        assert_eq!(info.namespaces.template_prefix(), "Template:");
    }

    #[test]
    fn test_pages() {
        let mut pages = DumpPages::new(DUMP.as_bytes());
        let _ = pages.site_info();
        let all: Vec<RawPage> = pages.collect();
        // The redirect is yielded with its flag set; the empty text
        // page survives with no body
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].id, 1);
        assert_eq!(all[0].revid, Some(100));
        assert_eq!(all[0].title, "First article");
        assert!(!all[0].redirect);
        assert_eq!(all[0].text, "Body one &amp; more.\nSecond line.");
        assert_eq!(all[1].id, 2);
        assert_eq!(all[1].title, "Pointer");
        assert!(all[1].redirect);
        assert_eq!(all[1].text, "#REDIRECT [[First article]]");
        assert_eq!(all[2].id, 3);
        assert_eq!(all[2].title, "Template:Greet");
        assert_eq!(all[2].text, "Hello {{{1}}}!");
        assert_eq!(all[3].id, 4);
        assert_eq!(all[3].text, "");
    }

    #[test]
    fn test_entities_not_decoded() {
        let mut pages = DumpPages::new(DUMP.as_bytes());
        let _ = pages.site_info();
        let first = pages.next().unwrap();
        assert!(first.text.contains("&amp;"));
    }

    #[test]
    fn test_pages_without_site_info_call() {
        let pages = DumpPages::new(DUMP.as_bytes());
        assert_eq!(pages.count(), 4);
    }

    #[test]
    fn test_open_input_gz() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.xml.gz");
        let mut encoder = flate2::write::GzEncoder::new(
            File::create(&path).unwrap(),
            flate2::Compression::default(),
        );
        encoder.write_all(DUMP.as_bytes()).unwrap();
        encoder.finish().unwrap();

        let input = open_input(path.to_str().unwrap()).unwrap();
        let pages = DumpPages::new(input);
        assert_eq!(pages.count(), 4);
    }

    #[test]
    fn test_open_input_bz2() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.xml.bz2");
        let mut encoder = bzip2::write::BzEncoder::new(
            File::create(&path).unwrap(),
            bzip2::Compression::default(),
        );
        encoder.write_all(DUMP.as_bytes()).unwrap();
        encoder.finish().unwrap();

        let input = open_input(path.to_str().unwrap()).unwrap();
        let pages = DumpPages::new(input);
        assert_eq!(pages.count(), 4);
    }
}
