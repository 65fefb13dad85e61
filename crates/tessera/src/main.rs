mod db;

use std::io::Write as _;
use std::time::Duration;

use anyhow::Context;
use camino::Utf8PathBuf;
use clap::Parser;
use db::{Document, check_file, parse_file};
use salsa::DatabaseImpl;
use tessera_errors::{Diagnostic, Renderer};
use tessera_grammar::{FieldId, Language, Symbol};
use tessera_inputs::File;
use tessera_parse::ParseOptions;
use tessera_query::{Query, QueryCursor};
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
enum Options {
    /// Parse a file, print its tree and report syntax errors.
    Parse {
        path: Utf8PathBuf,
        #[command(flatten)]
        grammar: GrammarArgs,
        #[command(flatten)]
        limits: LimitArgs,
        /// Only report syntax errors.
        #[arg(short, long)]
        quiet: bool,
    },
    /// Run the patterns in a query file over a file and print every capture.
    Query {
        query: Utf8PathBuf,
        path: Utf8PathBuf,
        #[command(flatten)]
        grammar: GrammarArgs,
        #[command(flatten)]
        limits: LimitArgs,
    },
    /// Print the symbols and fields of a grammar.
    DumpGrammar {
        #[command(flatten)]
        grammar: GrammarArgs,
    },
}

#[derive(clap::Args)]
struct GrammarArgs {
    /// Grammar blob to use instead of the bundled Object Text grammar.
    #[arg(long, value_name = "BLOB")]
    grammar: Option<Utf8PathBuf>,
}

impl GrammarArgs {
    fn language(&self) -> anyhow::Result<Language> {
        match &self.grammar {
            Some(path) => {
                let blob = std::fs::read(path).with_context(|| format!("failed to read `{path}`"))?;
                Language::load(&blob).with_context(|| format!("failed to load grammar `{path}`"))
            }
            None => tessera_objecttext::language().context("failed to load the Object Text grammar"),
        }
    }
}

#[derive(clap::Args)]
struct LimitArgs {
    /// Give up after this many parser operations.
    #[arg(long)]
    max_operations: Option<u64>,
    /// Give up after this many milliseconds.
    #[arg(long, value_name = "MS")]
    timeout: Option<u64>,
}

impl LimitArgs {
    fn options(&self) -> ParseOptions {
        ParseOptions {
            max_operations: self.max_operations,
            timeout: self.timeout.map(Duration::from_millis),
            ..ParseOptions::default()
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("TESSERA_LOG").unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let db = DatabaseImpl::default();
    match Options::parse() {
        Options::Parse { path, grammar, limits, quiet } => {
            let document = open(&db, &grammar, &limits, path)?;
            if let Some(tree) = parse_file(&db, document).as_ref().filter(|_| !quiet) {
                println!("{}", tree.to_sexp());
            }
            report(&db, document)
        }
        Options::Query { query: query_path, path, grammar, limits } => {
            let document = open(&db, &grammar, &limits, path)?;
            let source = std::fs::read_to_string(&query_path)
                .with_context(|| format!("failed to read `{query_path}`"))?;
            let query = Query::new(document.language(&db), &source)
                .with_context(|| format!("invalid query `{query_path}`"))?;
            let Some(tree) = parse_file(&db, document) else {
                return report(&db, document);
            };

            let file = document.file(&db);
            let text = file.text(&db);
            let mut stdout = std::io::stdout().lock();
            for found in QueryCursor::new().matches(&query, &tree.root_node(), text.as_bytes()) {
                for capture in &found.captures {
                    let name = &query.capture_names()[capture.index as usize];
                    let node = &capture.node;
                    writeln!(
                        stdout,
                        "{}: pattern {} @{name} {} {:?}",
                        file.location(&db, node.start_byte()),
                        found.pattern_index,
                        node.kind(),
                        node.utf8_text(text.as_bytes()).unwrap_or_default(),
                    )?;
                }
            }
            Ok(())
        }
        Options::DumpGrammar { grammar } => {
            let language = grammar.language()?;
            let mut stdout = std::io::stdout().lock();
            writeln!(
                stdout,
                "{} (table format {}, {} states)",
                language.name(),
                language.version(),
                language.state_count()
            )?;
            for index in 0..language.symbol_count() {
                let info = language.symbol_info(Symbol(index as u16));
                let kind = format!("{:?}", info.kind);
                let named = if info.named { "named" } else { "anonymous" };
                let hidden = if info.visible { "" } else { " hidden" };
                writeln!(stdout, "{index:>5}  {kind:<12} {named}{hidden}  {:?}", info.name)?;
            }
            for index in 0..language.field_count() {
                writeln!(stdout, "field {index:>3}  {}", language.field_name(FieldId(index as u16)))?;
            }
            Ok(())
        }
    }
}

fn open(
    db: &DatabaseImpl,
    grammar: &GrammarArgs,
    limits: &LimitArgs,
    path: Utf8PathBuf,
) -> anyhow::Result<Document> {
    let language = grammar.language()?;
    let text = std::fs::read_to_string(&path).with_context(|| format!("failed to read `{path}`"))?;
    tracing::debug!(%path, bytes = text.len(), language = language.name(), "loaded file");
    let file = File::new(db, path, text);
    Ok(Document::new(db, file, language, limits.options()))
}

/// Prints the diagnostics of `document`; fails when there are any.
fn report(db: &DatabaseImpl, document: Document) -> anyhow::Result<()> {
    let diagnostics = check_file::accumulated::<Diagnostic>(db, document);
    let file = document.file(db);
    let path = file.path(db).as_str();
    let text = file.text(db);

    let renderer = Renderer::styled();
    for diagnostic in &diagnostics {
        eprintln!("{}", diagnostic.render(&renderer, path, text));
    }

    if diagnostics.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("{} syntax error(s) in `{path}`", diagnostics.len())
    }
}
