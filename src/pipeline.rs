//! The parallel page-processing pipeline.
//!
//! One reader (the calling thread) streams pages into a bounded job
//! channel; N worker threads clean pages and push `(ordinal, text)`
//! pairs into a bounded output channel; one reducer thread restores
//! dump order and feeds the splitter sink. Backpressure is the
//! bounded channels; termination is sender-side channel closure.

use crate::{
    document::Document,
    dump::{DumpPages, RawPage, SiteInfo},
    extract::{self, Extractor, Options, ParseCache},
    splitter::Sink,
    store::TemplateStore,
    title::Namespaces,
};
use crossbeam_channel::{Receiver, Sender, bounded};
use std::{
    collections::HashMap,
    io::{self, BufRead},
    panic::{AssertUnwindSafe, catch_unwind},
    thread,
};

/// One page queued for extraction.
struct Job {
    /// The article id.
    id: u64,
    /// The revision id, when present.
    revid: Option<u64>,
    /// The article title.
    title: String,
    /// The raw wikitext.
    text: String,
    /// The page's position in the dump, which fixes output order.
    ordinal: usize,
}

/// Serialization settings shared by the workers.
#[derive(Clone, Copy)]
pub struct OutputFormat<'a> {
    /// The URL base for document URLs.
    pub url_base: &'a str,
    /// Whether documents render as JSON lines instead of `<doc>`
    /// blocks.
    pub json: bool,
}

/// Returns true if the page `title` belongs to the extraction set:
/// an accepted namespace prefix (or none), and not the template or
/// module namespace.
pub fn accepted_page(title: &str, namespaces: &Namespaces, options: &Options) -> bool {
    let Some((prefix, _)) = title.split_once(':') else {
        return true;
    };
    if namespaces.is_template(prefix) || namespaces.is_module(prefix) {
        return false;
    }
    options
        .accepted_namespaces
        .iter()
        .any(|accepted| accepted.eq_ignore_ascii_case(prefix))
}

/// Cleans one page and renders its output document.
// Clippy: The page fields arrive from two different source types;
// threading them through flat keeps both call sites simple.
#[allow(clippy::too_many_arguments)]
pub fn extract_page(
    store: &TemplateStore,
    namespaces: &Namespaces,
    options: &Options,
    cache: &mut ParseCache,
    format: OutputFormat<'_>,
    id: u64,
    revid: Option<u64>,
    title: &str,
    text: &str,
) -> String {
    let mut extractor = Extractor::new(store, cache, namespaces, options, title);
    let cleaned = extract::clean::clean(&mut extractor, text);
    let paragraphs = extract::clean::compact(&cleaned, options);
    extractor.warn_if_errors(id, title);

    let document = Document::new(id, revid, format.url_base, title, &paragraphs);
    if format.json {
        document.to_json()
    } else {
        document.to_text()
    }
}

/// The worker loop: pull jobs, extract, push ordered results.
fn worker(
    jobs: &Receiver<Job>,
    results: &Sender<(usize, String)>,
    store: &TemplateStore,
    namespaces: &Namespaces,
    options: &Options,
    format: OutputFormat<'_>,
) {
    let mut cache = ParseCache::new();
    for job in jobs {
        let text = catch_unwind(AssertUnwindSafe(|| {
            extract_page(
                store,
                namespaces,
                options,
                &mut cache,
                format,
                job.id,
                job.revid,
                &job.title,
                &job.text,
            )
        }))
        .unwrap_or_else(|_| {
            // One bad page must not corrupt the pipeline; it is
            // emitted empty so the reducer never stalls
            log::error!("extraction panicked on '{}' ({})", job.title, job.id);
            let empty = Document::new(job.id, job.revid, format.url_base, &job.title, &[]);
            if format.json {
                empty.to_json()
            } else {
                empty.to_text()
            }
        });
        if results.send((job.ordinal, text)).is_err() {
            break;
        }
    }
}

/// The reducer loop: restore strict ordinal order and write to the
/// sink.
fn reduce(results: &Receiver<(usize, String)>, sink: &mut Sink) -> io::Result<()> {
    let mut next = 0usize;
    let mut reorder: HashMap<usize, String> = HashMap::new();
    for (ordinal, text) in results {
        reorder.insert(ordinal, text);
        while let Some(text) = reorder.remove(&next) {
            sink.write_doc(&text)?;
            next += 1;
        }
    }
    // With contiguous ordinals nothing is left; drain just in case
    let mut rest: Vec<(usize, String)> = reorder.into_iter().collect();
    rest.sort_unstable_by_key(|&(ordinal, _)| ordinal);
    for (_, text) in rest {
        sink.write_doc(&text)?;
    }
    Ok(())
}

/// Streams the dump through `workers` extraction threads into
/// `sink`, preserving dump order.
///
/// Returns the number of articles extracted.
pub fn run(
    pages: DumpPages<impl BufRead>,
    site: &SiteInfo,
    store: &TemplateStore,
    options: &Options,
    json: bool,
    workers: usize,
    sink: &mut Sink,
) -> io::Result<usize> {
    let workers = workers.max(1);
    let format = OutputFormat {
        url_base: &site.url_base,
        json,
    };
    let (job_tx, job_rx) = bounded::<Job>(10 * workers);
    let (result_tx, result_rx) = bounded::<(usize, String)>(10 * workers);

    thread::scope(|scope| {
        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move || {
                worker(&job_rx, &result_tx, store, &site.namespaces, options, format);
            });
        }
        // Workers hold the only live clones now; the channels close
        // when the reader and the workers are done
        drop(job_rx);
        drop(result_tx);

        let reducer = scope.spawn(move || reduce(&result_rx, sink));

        let mut ordinal = 0usize;
        for page in pages {
            if page.redirect || !accepted_page(&page.title, &site.namespaces, options) {
                continue;
            }
            let RawPage {
                id,
                revid,
                title,
                text,
                ..
            } = page;
            if job_tx
                .send(Job {
                    id,
                    revid,
                    title,
                    text,
                    ordinal,
                })
                .is_err()
            {
                break;
            }
            ordinal += 1;
            if ordinal % 100_000 == 0 {
                log::info!("queued {ordinal} articles");
            }
        }
        drop(job_tx);

        match reducer.join() {
            Ok(result) => result.map(|()| ordinal),
            Err(_) => Err(io::Error::other("reducer thread panicked")),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// A dump with three articles and one template.
    const DUMP: &str = r#"<mediawiki>
  <siteinfo>
    <base>https://en.wikipedia.org/wiki/Main_Page</base>
    <namespaces>
      <namespace key="10">Template</namespace>
    </namespaces>
  </siteinfo>
  <page>
    <title>Alpha</title>
    <ns>0</ns>
    <id>1</id>
    <revision>
      <id>11</id>
      <text xml:space="preserve">{{Greet|Alpha}} article one.</text>
    </revision>
  </page>
  <page>
    <title>Beta</title>
    <ns>0</ns>
    <id>2</id>
    <revision>
      <id>12</id>
      <text xml:space="preserve">Article two body.</text>
    </revision>
  </page>
  <page>
    <title>Gamma</title>
    <ns>0</ns>
    <id>3</id>
    <revision>
      <id>13</id>
      <text xml:space="preserve">Article three body.</text>
    </revision>
  </page>
  <page>
    <title>Template:Greet</title>
    <ns>10</ns>
    <id>4</id>
    <revision>
      <id>14</id>
      <text xml:space="preserve">Hello {{{1}}}.</text>
    </revision>
  </page>
  <page>
    <title>Pointer</title>
    <ns>0</ns>
    <id>5</id>
    <redirect title="Alpha" />
    <revision>
      <id>15</id>
      <text xml:space="preserve">#REDIRECT [[Alpha]]</text>
    </revision>
  </page>
</mediawiki>
"#;

    /// Runs the full pipeline over [`DUMP`] and returns the
    /// concatenated output.
    fn run_dump(workers: usize) -> String {
        let mut store = TemplateStore::default();
        let namespaces = Namespaces::default();
        store.define(&namespaces, "Template:Greet", "Hello {{{1}}}.");

        let mut pages = DumpPages::new(DUMP.as_bytes());
        let site = pages.site_info();
        let options = Options::default();

        let dir = tempfile::tempdir().unwrap();
        let mut sink = Sink::new(dir.path().to_str().unwrap(), 1 << 20, false).unwrap();
        let count = run(pages, &site, &store, &options, false, workers, &mut sink).unwrap();
        assert_eq!(count, 3);
        sink.finish().unwrap();
        fs::read_to_string(dir.path().join("AA/wiki_00")).unwrap()
    }

    #[test]
    fn test_output_order_is_dump_order() {
        for workers in [1, 2, 4] {
            let out = run_dump(workers);
            let alpha = out.find("title=\"Alpha\"").unwrap();
            let beta = out.find("title=\"Beta\"").unwrap();
            let gamma = out.find("title=\"Gamma\"").unwrap();
            assert!(alpha < beta && beta < gamma, "workers={workers}:\n{out}");
            assert!(!out.contains("Template:Greet"), "template pages are not articles");
            assert!(!out.contains("Pointer"), "redirect pages are not articles");
        }
    }

    #[test]
    fn test_worker_count_does_not_change_output() {
        assert_eq!(run_dump(1), run_dump(4));
    }

    #[test]
    fn test_template_expanded_in_pipeline() {
        let out = run_dump(2);
        assert!(out.contains("Hello Alpha. article one."), "{out}");
    }

    #[test]
    fn test_docs_well_formed() {
        let out = run_dump(2);
        assert_eq!(out.matches("<doc ").count(), 3);
        assert_eq!(out.matches("</doc>").count(), 3);
        for doc in out.split_inclusive("</doc>\n") {
            if doc.trim().is_empty() {
                continue;
            }
            assert!(doc.trim_start().starts_with("<doc "));
            assert!(doc.ends_with("</doc>") || doc.ends_with("</doc>\n"));
        }
    }

    #[test]
    fn test_accepted_page() {
        let namespaces = Namespaces::default();
        let options = Options::default();
        assert!(accepted_page("Plain title", &namespaces, &options));
        assert!(accepted_page("w:Interlinked", &namespaces, &options));
        assert!(!accepted_page("Help:Contents", &namespaces, &options));
        assert!(!accepted_page("Template:Greet", &namespaces, &options));
    }
}
