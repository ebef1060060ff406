//! CLI binary for aozora-tokenize.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `PipelineConfig`, runs the batch drivers and reports results.

use anyhow::{Context, Result};
use aozora_tokenize::pipeline::input::{collect_inputs, read_source};
use aozora_tokenize::{
    convert_files, process_batch, Analyzer, BatchProgressCallback, FileOutcome, GaijiTable,
    LexiconAnalyzer, OutputDocument, PipelineConfig, ProgressCallback, ScriptAnalyzer,
    SourceEncoding,
};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus one log line per document.
/// Documents finish out of order when `--concurrency` is above one.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Per-document start times, keyed by input index.
    start_times: Mutex<HashMap<usize, Instant>>,
    names: Mutex<HashMap<usize, String>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>4}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Converting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            names: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    /// Remove the bookkeeping for `index`, returning its name and elapsed seconds.
    fn finish(&self, index: usize) -> (String, f64) {
        let elapsed = self
            .start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&index))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        let name = self
            .names
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&index))
            .unwrap_or_default();
        (name, elapsed)
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {total} file(s)…"))
        ));
    }

    fn on_document_start(&self, index: usize, _total: usize, name: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(index, Instant::now());
        }
        if let Ok(mut m) = self.names.lock() {
            m.insert(index, name.to_string());
        }
        self.bar.set_message(name.to_string());
    }

    fn on_document_complete(&self, index: usize, total: usize, output_len: usize) {
        let (name, secs) = self.finish(index);
        self.bar.println(format!(
            "  {} {:>4}/{:<4}  {}  {}  {}",
            green("✓"),
            index + 1,
            total,
            name,
            dim(&format!("{output_len:>8} bytes")),
            dim(&format!("{secs:.2}s")),
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, index: usize, total: usize, error: &str) {
        let (name, secs) = self.finish(index);
        self.errors.fetch_add(1, Ordering::SeqCst);

        // Keep one line per document.
        let msg: String = if error.chars().count() > 80 {
            let mut s: String = error.chars().take(79).collect();
            s.push('…');
            s
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} {:>4}/{:<4}  {}  {}  {}",
            red("✗"),
            index + 1,
            total,
            name,
            red(&msg),
            dim(&format!("{secs:.2}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, success_count: usize) {
        let failed = total.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} file(s) converted successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} file(s) converted  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Strip one work, output next to the input as 127_15260_workonly.txt
  aozora2txt 127_15260.html

  # Convert a whole mirror directory into ./out, 8 files at a time
  aozora2txt --concurrency 8 -o out aozora/cards/

  # Word-segment with a lexicon (one word per line, tab-separated columns allowed)
  aozora2txt --lexicon ipadic-words.txt 127_15260.html

  # Coarse segmentation by script runs, printed to stdout
  aozora2txt --script-runs --stdout 127_15260.html

  # Resolve gaiji through a description → character table
  aozora2txt --gaiji-table gaiji.json 127_15260.html

  # JSON with per-document statistics
  aozora2txt --json --stdout 127_15260.html > out.json

OUTPUT NAMES:
  <stem>_tokenized.txt   an analyzer was configured (--lexicon, --script-runs)
  <stem>_workonly.txt    pass-through segmentation

  Existing outputs are skipped unless --overwrite is given.

ENVIRONMENT VARIABLES:
  Every option has an AOZORA_* override, e.g. AOZORA_ENCODING,
  AOZORA_LEXICON, AOZORA_CONCURRENCY. RUST_LOG overrides the log filter.
"#;

/// Convert Aozora Bunko HTML into clean, word-segmented plain text.
#[derive(Parser, Debug)]
#[command(
    name = "aozora2txt",
    version,
    about = "Convert Aozora Bunko HTML into clean, word-segmented plain text",
    long_about = "Decode Aozora Bunko HTML (Shift_JIS by default), remove markup, ruby glosses, \
gaiji references and editorial notes, and optionally split the text into words. Inputs may be \
files or directories; directories are searched recursively for .html/.htm files.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Input HTML files or directories.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Fallback source encoding when no BOM or <meta charset> is found.
    #[arg(long, env = "AOZORA_ENCODING", default_value = "Shift_JIS")]
    encoding: String,

    /// Turn block-level tags into line breaks.
    #[arg(long, env = "AOZORA_PARAGRAPH_BREAKS")]
    paragraph_breaks: bool,

    /// Keep the bibliographic header and footer (don't restrict to the work body).
    #[arg(long, env = "AOZORA_FULL_TEXT")]
    full_text: bool,

    /// Decode HTML character references such as &amp; and &#x3042;.
    #[arg(long, env = "AOZORA_DECODE_ENTITIES")]
    decode_entities: bool,

    /// JSON object mapping gaiji descriptions to substitute characters.
    #[arg(long, env = "AOZORA_GAIJI_TABLE")]
    gaiji_table: Option<PathBuf>,

    /// Word list for the lexicon analyzer (first tab-separated column per line).
    #[arg(long, env = "AOZORA_LEXICON", conflicts_with = "script_runs")]
    lexicon: Option<PathBuf>,

    /// Segment at script changes (kanji / hiragana / katakana / latin / digits).
    #[arg(long, env = "AOZORA_SCRIPT_RUNS")]
    script_runs: bool,

    /// Per-document analyzer timeout in seconds.
    #[arg(long, env = "AOZORA_ANALYZER_TIMEOUT", default_value_t = 30)]
    analyzer_timeout: u64,

    /// Trim whitespace from every output line and the whole text.
    #[arg(long, env = "AOZORA_TRIM")]
    trim: bool,

    /// Number of documents processed at once.
    #[arg(short, long, env = "AOZORA_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Replace existing output files instead of skipping them.
    #[arg(long, env = "AOZORA_OVERWRITE")]
    overwrite: bool,

    /// Write outputs into this directory instead of next to each input.
    #[arg(short, long, env = "AOZORA_OUTPUT_DIR", conflicts_with = "stdout")]
    output_dir: Option<PathBuf>,

    /// Print converted text to stdout instead of writing files.
    #[arg(long, env = "AOZORA_STDOUT")]
    stdout: bool,

    /// Print structured JSON (documents or file outcomes) to stdout.
    #[arg(long, env = "AOZORA_JSON")]
    json: bool,

    /// Disable the progress bar.
    #[arg(long, env = "AOZORA_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "AOZORA_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "AOZORA_QUIET")]
    quiet: bool,
}

#[derive(Serialize)]
struct JsonFailure<'a> {
    source: String,
    stage: &'a str,
    error: String,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.stdout;
    let filter = if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    let filter = if cli.verbose { "debug" } else { filter };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    let inputs = collect_inputs(&cli.inputs).context("Failed to collect inputs")?;
    if inputs.is_empty() {
        anyhow::bail!("No .html/.htm files found in the given inputs");
    }

    // ── Run ──────────────────────────────────────────────────────────────
    let failed = if cli.stdout {
        run_to_stdout(&cli, &inputs, &config).await?
    } else {
        run_to_files(&cli, &inputs, &config).await?
    };

    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let encoding: SourceEncoding = cli.encoding.parse().context("Invalid --encoding")?;

    let mut builder = PipelineConfig::builder()
        .source_encoding(encoding)
        .preserve_paragraph_breaks(cli.paragraph_breaks)
        .work_only(!cli.full_text)
        .decode_entities(cli.decode_entities)
        .analyzer_timeout(Duration::from_secs(cli.analyzer_timeout))
        .trim_whitespace(cli.trim)
        .concurrency(cli.concurrency)
        .overwrite(cli.overwrite);

    if let Some(ref path) = cli.gaiji_table {
        let table = GaijiTable::load(path)
            .with_context(|| format!("Failed to load gaiji table from {}", path.display()))?;
        builder = builder.gaiji_table(table);
    }

    // Analyzers are loaded once here and shared by every document.
    if let Some(ref path) = cli.lexicon {
        let lexicon = LexiconAnalyzer::load(path)
            .with_context(|| format!("Failed to load lexicon from {}", path.display()))?;
        builder = builder.analyzer(Arc::new(lexicon) as Arc<dyn Analyzer>);
    } else if cli.script_runs {
        builder = builder.analyzer(Arc::new(ScriptAnalyzer::new()) as Arc<dyn Analyzer>);
    }

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Convert every input in memory and print the results. Returns the failure count.
async fn run_to_stdout(cli: &Cli, inputs: &[PathBuf], config: &PipelineConfig) -> Result<usize> {
    let mut docs = Vec::with_capacity(inputs.len());
    let mut read_failures = Vec::new();
    for path in inputs {
        match read_source(path).await {
            Ok(doc) => docs.push(doc),
            Err(e) => read_failures.push((path.display().to_string(), e)),
        }
    }

    let names: Vec<String> = docs.iter().map(|d| d.name.clone()).collect();
    let results = process_batch(docs, config).await;

    let mut outputs: Vec<&OutputDocument> = Vec::new();
    let mut failures: Vec<JsonFailure<'_>> = Vec::new();
    for (source, e) in &read_failures {
        failures.push(JsonFailure {
            source: source.clone(),
            stage: e.stage().as_str(),
            error: e.to_string(),
        });
    }
    for (name, result) in names.into_iter().zip(&results) {
        match result {
            Ok(out) => outputs.push(out),
            Err(e) => failures.push(JsonFailure {
                source: name,
                stage: e.stage().as_str(),
                error: e.to_string(),
            }),
        }
    }

    if cli.json {
        let json = serde_json::json!({ "documents": &outputs, "failures": &failures });
        println!(
            "{}",
            serde_json::to_string_pretty(&json).context("Failed to serialise output")?
        );
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        for out in &outputs {
            handle
                .write_all(out.text.as_bytes())
                .context("Failed to write to stdout")?;
            if !out.text.ends_with('\n') {
                handle.write_all(b"\n").context("Failed to write to stdout")?;
            }
        }
        for f in &failures {
            eprintln!("{} {} [{}] {}", red("✗"), f.source, f.stage, f.error);
        }
    }

    if !cli.quiet && !cli.json {
        eprintln!(
            "Converted {}/{} file(s)",
            outputs.len(),
            outputs.len() + failures.len()
        );
    }

    Ok(failures.len())
}

/// Convert every input to an output file. Returns the failure count.
async fn run_to_files(cli: &Cli, inputs: &[PathBuf], config: &PipelineConfig) -> Result<usize> {
    let results = convert_files(inputs, cli.output_dir.as_deref(), config).await;
    let failed = results.iter().filter(|(_, r)| r.is_err()).count();

    if cli.json {
        let report: Vec<serde_json::Value> = results
            .iter()
            .map(|(input, result)| match result {
                Ok(outcome) => serde_json::json!({ "input": input, "outcome": outcome }),
                Err(e) => serde_json::json!({
                    "input": input,
                    "outcome": { "status": "failed", "stage": e.stage().as_str(), "error": e.to_string() },
                }),
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
        return Ok(failed);
    }

    if cli.quiet {
        return Ok(failed);
    }

    let skipped = results
        .iter()
        .filter(|(_, r)| matches!(r, Ok(FileOutcome::Skipped { .. })))
        .count();

    // Without the bar the per-document lines were never printed.
    if config.progress_callback.is_none() {
        for (input, result) in &results {
            match result {
                Ok(FileOutcome::Written { path, stats }) => eprintln!(
                    "{} {}  →  {}  {}",
                    green("✓"),
                    input.display(),
                    bold(&path.display().to_string()),
                    dim(&format!("{} tokens, {} bytes", stats.token_count, stats.output_bytes)),
                ),
                Ok(FileOutcome::Skipped { path }) => eprintln!(
                    "{} {}  {}",
                    dim("–"),
                    input.display(),
                    dim(&format!("exists: {}", path.display())),
                ),
                Err(e) => eprintln!("{} {}  {}", red("✗"), input.display(), red(&e.to_string())),
            }
        }
    }

    if skipped > 0 {
        eprintln!(
            "   {} existing output(s) skipped; pass --overwrite to replace them",
            dim(&skipped.to_string())
        );
    }

    Ok(failed)
}
