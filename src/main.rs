#![doc = include_str!("../README.md")]
#![warn(
    clippy::pedantic,
    clippy::missing_docs_in_private_items,
    missing_docs,
    rust_2018_idioms
)]

use extract::Options;
use pipeline::OutputFormat;
use splitter::Sink;
use std::{
    ffi::OsStr,
    fs::File,
    io::{BufReader, BufWriter, Write as _},
    path::Path,
};
use store::TemplateStore;

mod common;
mod document;
mod dump;
mod expr;
mod extract;
mod pipeline;
mod splitter;
mod store;
mod title;

/// The default output file rotation size.
const DEFAULT_FILE_SIZE: u64 = 1024 * 1024;

/// The smallest permitted output file rotation size.
const MIN_FILE_SIZE: u64 = 200 * 1024;

/// Errors that may occur when parsing arguments.
#[derive(Debug, thiserror::Error)]
enum ArgsError {
    /// Byte size conversion error.
    #[error(
        "unknown byte size unit '{0}' (should be '', 'b', 'B', 'k', 'K', 'm', 'M', 'g', or 'G')"
    )]
    ByteSize(String),
    /// Missing the dump argument.
    #[error("missing dump file argument")]
    Input,
    /// The rotation size is below the minimum.
    #[error("bytes per file must be at least 200K")]
    FileSizeTooSmall,
    /// Extra unknown junk on the command line.
    #[error("unknown arguments: {}", _0.display())]
    Extra(std::ffi::OsString),
    /// Float parsing error.
    #[error(transparent)]
    ParseFloat(#[from] core::num::ParseFloatError),
    /// Some other parsing error.
    #[error(transparent)]
    Pico(#[from] pico_args::Error),
}

/// Errors in the top-level run beyond argument and I/O failures.
#[derive(Debug, thiserror::Error)]
enum RunError {
    /// Template expansion requires two passes, which stdin cannot do.
    #[error("to expand templates from a stdin dump, preload them with --templates PATH")]
    StdinTemplates,
    /// The `--article` target does not exist.
    #[error("article '{0}' not found in the dump")]
    ArticleNotFound(String),
}

/// Command-line arguments.
struct Args {
    /// The dump file, or `-` for standard input.
    input: String,
    /// The output directory, or `-` for standard output.
    output: String,
    /// Bytes per output file before rotation.
    bytes_per_file: u64,
    /// Whether to bzip2-compress output files.
    compress: bool,
    /// Where to load or save the preprocessed template store.
    templates_path: Option<String>,
    /// Extraction options derived from the flags.
    options: Options,
    /// Whether documents render as JSON lines.
    json: bool,
    /// The worker thread count.
    processes: usize,
    /// A single article title to extract, for debugging.
    article: Option<String>,
    /// The log filter chosen by the verbosity flags.
    log_filter: &'static str,
}

impl Args {
    /// Parses a number in the format `\d+(\.\d+)?` and returns the
    /// remainder as a unit to be processed by the caller.
    fn parse_number_with_unit(value: &str) -> Result<(f64, &str), ArgsError> {
        let value = value.trim_ascii();
        let end = value
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(value.len());
        let number = value[..end].parse::<f64>()?;
        let unit = value[end..].trim_ascii_start();
        Ok((number, unit))
    }

    /// Parses a byte size in the format `\d+(\.\d+)?\s*[BbKkMmGg]?`.
    fn parse_size(value: &str) -> Result<u64, ArgsError> {
        let (number, unit) = Self::parse_number_with_unit(value)?;
        // Clippy: Truncation is desirable and the number is
        // guaranteed to not have a sign.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Ok(match unit {
            "" | "b" | "B" => number,
            "k" | "K" => number * 1024.0,
            "m" | "M" => number * 1024.0 * 1024.0,
            "g" | "G" => number * 1024.0 * 1024.0 * 1024.0,
            _ => return Err(ArgsError::ByteSize(unit.to_string())),
        } as u64)
    }

    /// Splits a `-ns a,b,c` list into lower-cased prefixes.
    fn parse_namespaces(value: &str) -> Result<Vec<String>, ArgsError> {
        Ok(value
            .split(',')
            .map(|ns| ns.trim().to_lowercase())
            .filter(|ns| !ns.is_empty())
            .collect())
    }

    /// Tries to create an [`Args`] from the command line.
    fn new() -> Result<Args, ArgsError> {
        let mut args = pico_args::Arguments::from_env();

        if args.contains(["-h", "--help"]) {
            usage();
            std::process::exit(0);
        }
        if args.contains("--version") {
            println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
            std::process::exit(0);
        }

        let quiet = args.contains("-q");
        let debug = args.contains("--debug");
        let verbose = args.contains("-v");
        let log_filter = if verbose {
            "trace"
        } else if debug {
            "debug"
        } else if quiet {
            "warn"
        } else {
            "info"
        };

        let mut options = Options {
            expand_templates: !args.contains("--no-templates"),
            keep_links: args.contains(["-l", "--links"]),
            keep_sections: args.contains(["-s", "--sections"]),
            html: args.contains("--html"),
            ..Options::default()
        };
        if let Some(namespaces) = args.opt_value_from_fn("-ns", Self::parse_namespaces)? {
            options.accepted_namespaces = namespaces;
        }

        let output = args
            .opt_value_from_str("-o")?
            .unwrap_or_else(|| "text".to_string());
        let bytes_per_file = args
            .opt_value_from_fn("-b", Self::parse_size)?
            .unwrap_or(DEFAULT_FILE_SIZE);
        if bytes_per_file < MIN_FILE_SIZE {
            return Err(ArgsError::FileSizeTooSmall);
        }
        let compress = args.contains("-c");
        let json = args.contains("--json");
        let templates_path = args.opt_value_from_str("--templates")?;
        let article = args.opt_value_from_str(["-a", "--article"])?;
        let processes = args
            .opt_value_from_str("--processes")?
            .unwrap_or_else(default_processes);

        let Some(input) = args.opt_free_from_str::<String>()? else {
            return Err(ArgsError::Input);
        };

        let rest = args.finish();
        if !rest.is_empty() {
            return Err(ArgsError::Extra(rest.join(OsStr::new(" "))));
        }

        Ok(Self {
            input,
            output,
            bytes_per_file,
            compress,
            templates_path,
            options,
            json,
            processes,
            article,
            log_filter,
        })
    }
}

/// The default worker count: one less than the CPU count.
fn default_processes() -> usize {
    std::thread::available_parallelism().map_or(1, |cpus| cpus.get().saturating_sub(1).max(1))
}

/// Command line usage instructions.
fn usage() {
    let exe = std::env::args().next().unwrap_or_default();
    eprintln!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    eprintln!("Usage: {exe} [options] <dump.xml[.bz2|.gz] | ->\n");
    eprintln!("Options:");
    eprintln!("  Output:");
    eprintln!("    -o DIR: output directory, or '-' for stdout (default: text)");
    eprintln!("    -b N[KMG]: bytes per output file (default: 1M, minimum 200K)");
    eprintln!("    -c: compress output files with bzip2");
    eprintln!("    --json: write one JSON document per line instead of <doc> blocks");
    eprintln!("    --html: emit HTML formatting instead of plain text");
    eprintln!("  Content:");
    eprintln!("    --templates PATH: load preprocessed templates, or save them after");
    eprintln!("      the preprocessing pass");
    eprintln!("    --no-templates: skip template expansion entirely");
    eprintln!("    -l, --links: keep links as <a> elements");
    eprintln!("    -s, --sections: keep section headings");
    eprintln!("    -ns a,b,c: accepted link namespace prefixes (default: w,wiktionary,wikt)");
    eprintln!("  CPU:");
    eprintln!("    --processes N: worker count (default: CPU count - 1)");
    eprintln!("  Debugging:");
    eprintln!("    -a, --article TITLE: extract a single article to stdout");
    eprintln!("    -q: warnings only; --debug: debug logging; -v: trace logging");
}

/// Collects template definitions from the first pass over the dump.
fn preprocess(args: &Args, site: &dump::SiteInfo) -> Result<TemplateStore, DisplayError> {
    let mut pages = dump::DumpPages::new(dump::open_input(&args.input)?);
    let _ = pages.site_info();

    let prefix = site.namespaces.template_prefix();
    let mut store = TemplateStore::default();
    let mut seen = 0u64;
    for page in pages {
        seen += 1;
        if seen % 100_000 == 0 {
            log::info!("preprocessed {seen} pages");
        }
        if page.title.starts_with(&prefix) {
            store.define(&site.namespaces, &page.title, &page.text);
        }
    }
    log::info!(
        "collected {} templates and {} redirects",
        store.template_count(),
        store.redirect_count()
    );
    Ok(store)
}

/// Loads the template store from `--templates`, or builds it with a
/// preprocessing pass (saving it to `--templates` afterwards).
fn load_or_build_store(args: &Args, site: &dump::SiteInfo) -> Result<TemplateStore, DisplayError> {
    if !args.options.expand_templates {
        return Ok(TemplateStore::default());
    }

    if let Some(path) = &args.templates_path
        && Path::new(path).exists()
    {
        let store = TemplateStore::load(BufReader::new(File::open(path)?))?;
        log::info!(
            "loaded {} templates and {} redirects from {path}",
            store.template_count(),
            store.redirect_count()
        );
        return Ok(store);
    }

    if args.input == "-" {
        return Err(RunError::StdinTemplates.into());
    }

    let store = preprocess(args, site)?;
    if let Some(path) = &args.templates_path {
        store.save(BufWriter::new(File::create(path)?))?;
        log::info!("saved templates to {path}");
    }
    Ok(store)
}

/// Extracts the single `--article` target to standard output.
fn extract_single(
    args: &Args,
    site: &dump::SiteInfo,
    store: &TemplateStore,
    target: &str,
) -> Result<(), DisplayError> {
    let mut pages = dump::DumpPages::new(dump::open_input(&args.input)?);
    let _ = pages.site_info();

    let wanted = site.namespaces.normalize_title(target);
    let mut cache = extract::ParseCache::new();
    for page in pages {
        if page.title != target && site.namespaces.normalize_title(&page.title) != wanted {
            continue;
        }
        let text = pipeline::extract_page(
            store,
            &site.namespaces,
            &args.options,
            &mut cache,
            OutputFormat {
                url_base: &site.url_base,
                json: args.json,
            },
            page.id,
            page.revid,
            &page.title,
            &page.text,
        );
        std::io::stdout().write_all(text.as_bytes())?;
        return Ok(());
    }
    Err(RunError::ArticleNotFound(target.to_string()).into())
}

/// Parses arguments and drives the preprocessing pass and the
/// extraction pipeline.
fn run() -> Result<(), DisplayError> {
    let args = match Args::new() {
        Ok(args) => args,
        Err(err) => {
            usage();
            return Err(err.into());
        }
    };

    env_logger::init_from_env(env_logger::Env::default().default_filter_or(args.log_filter));

    // The siteinfo header configures both passes
    let mut pages = dump::DumpPages::new(dump::open_input(&args.input)?);
    let site = pages.site_info();
    log::info!(
        "dump URL base: {}",
        if site.url_base.is_empty() {
            "(none)"
        } else {
            site.url_base.as_str()
        }
    );

    let store = load_or_build_store(&args, &site)?;

    if let Some(target) = &args.article {
        return extract_single(&args, &site, &store, target);
    }

    // The first opened stream is still positioned right after the
    // siteinfo header; the preprocessing pass used its own handle
    let mut sink = Sink::new(&args.output, args.bytes_per_file, args.compress)?;
    let extracted = pipeline::run(
        pages,
        &site,
        &store,
        &args.options,
        args.json,
        args.processes,
        &mut sink,
    )?;
    sink.finish()?;
    log::info!("finished: {extracted} articles extracted");
    Ok(())
}

/// Uses the [`Display`](core::fmt::Display) formatter for an error
/// even when the [`Debug`](core::fmt::Debug) formatter is requested.
struct DisplayError(Box<dyn std::error::Error>);

impl core::fmt::Debug for DisplayError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl<E: Into<Box<dyn std::error::Error>>> From<E> for DisplayError {
    fn from(e: E) -> Self {
        Self(e.into())
    }
}

fn main() -> Result<(), DisplayError> {
    run().map_err(Into::into)
}
