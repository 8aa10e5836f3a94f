//! CLI binary for edgequake-drawing2json.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig`, writes the result file and prints the JSON.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_drawing2json::{
    prompt_for, CropRegion, ErrorKind, ExtractError, ExtractionConfig, ExtractionOutput,
    ExtractionProgressCallback, Extractor, Pass, PassState, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner with one log line per finished pass.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, input: &str) {
        self.bar.set_message(input.to_string());
    }

    fn on_pass_start(&self, _input: &str, pass: Pass) {
        self.bar.set_prefix(match pass {
            Pass::Full => "Full pass",
            Pass::TechnicalParams => "Refining",
        });
    }

    fn on_pass_complete(&self, _input: &str, pass: Pass, duration_ms: u64) {
        self.bar.println(format!(
            "  {} {:<18} {}",
            green("✓"),
            pass.to_string(),
            dim(&format!("{:.1}s", duration_ms as f64 / 1000.0)),
        ));
    }

    fn on_refinement_skipped(&self, _input: &str, reason: &str) {
        // Truncate very long error messages to keep output tidy.
        let msg: String = if reason.chars().count() > 80 {
            let mut s: String = reason.chars().take(79).collect();
            s.push('\u{2026}');
            s
        } else {
            reason.to_string()
        };
        self.bar
            .println(format!("  {} {:<18} {}", yellow("⚠"), "technical-params", yellow(&msg)));
    }

    fn on_extraction_complete(&self, _input: &str, _state: PassState) {
        self.bar.finish_and_clear();
    }

    fn on_extraction_failed(&self, _input: &str, _error: &ExtractError) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract to parsed_result.json (and stdout)
  drawing2json drawing.pdf

  # Custom output path, skip the refinement pass
  drawing2json drawing.pdf -o out/valve.json --no-refine

  # Remarks block sits in the bottom-right corner on this sheet format
  drawing2json --crop 0.65,0.65,1.0,1.0 drawing.pdf

  # Use a specific model
  drawing2json --provider openai --model gpt-4.1 drawing.pdf

  # Inspect or override the instructions
  drawing2json --print-prompt technical-params
  drawing2json --technical-prompt my_prompt.txt drawing.pdf

ENVIRONMENT VARIABLES:
  ANTHROPIC_API_KEY       Anthropic API key (default provider)
  OPENAI_API_KEY          OpenAI API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Provider used when --provider is not given
  EDGEQUAKE_MODEL         Model used with EDGEQUAKE_LLM_PROVIDER
  RUST_LOG                tracing filter, overrides -v / -q
  DRAWING2JSON_*          every flag, e.g. DRAWING2JSON_DPI=400

EXIT STATUS:
  0  result written
  1  any failure; for an unparseable model reply the raw text is printed
"#;

/// Extract engineering-drawing title-block tables to JSON using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "drawing2json",
    version,
    about = "Extract engineering-drawing tables to JSON using Vision LLMs",
    long_about = "Read page 1 of an engineering drawing PDF (local file or URL) with a Vision \
Language Model and emit the drawing fields, the bill of materials and the general information \
block as JSON. A second high-resolution pass over the technical-remarks zone refines the design \
temperature, design pressure and test pressures.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    #[arg(required_unless_present = "print_prompt")]
    input: Option<String>,

    /// Write the result JSON to this file.
    #[arg(short, long, env = "DRAWING2JSON_OUTPUT", default_value = "parsed_result.json")]
    output: PathBuf,

    /// LLM model ID (e.g. claude-sonnet-4-20250514, gpt-4.1).
    #[arg(long, env = "DRAWING2JSON_MODEL")]
    model: Option<String>,

    /// LLM provider: anthropic, openai, gemini, ollama, azure.
    #[arg(
        long,
        env = "DRAWING2JSON_PROVIDER",
        long_help = "LLM provider. Resolved from EDGEQUAKE_LLM_PROVIDER / ANTHROPIC_API_KEY / \
          other API key env vars if not set."
    )]
    provider: Option<String>,

    /// Full-pass rendering DPI.
    #[arg(long, env = "DRAWING2JSON_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=1200))]
    dpi: u32,

    /// Refinement-pass rendering DPI.
    #[arg(long, env = "DRAWING2JSON_REFINE_DPI", default_value_t = 600,
          value_parser = clap::value_parser!(u32).range(72..=1200))]
    refine_dpi: u32,

    /// Technical-remarks zone as page fractions: left,top,right,bottom.
    #[arg(long, env = "DRAWING2JSON_CROP", default_value = "0,0.65,0.35,1")]
    crop: CropRegion,

    /// Skip the refinement pass.
    #[arg(long, env = "DRAWING2JSON_NO_REFINE")]
    no_refine: bool,

    /// Max LLM output tokens for the full pass.
    #[arg(long, env = "DRAWING2JSON_MAX_TOKENS", default_value_t = 4000)]
    max_tokens: usize,

    /// Max LLM output tokens for the refinement pass.
    #[arg(long, env = "DRAWING2JSON_REFINE_MAX_TOKENS", default_value_t = 1000)]
    refine_max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "DRAWING2JSON_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Retries per model call on transient failures.
    #[arg(long, env = "DRAWING2JSON_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "DRAWING2JSON_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "DRAWING2JSON_PASSWORD")]
    password: Option<String>,

    /// Text file replacing the full-pass instruction.
    #[arg(long, env = "DRAWING2JSON_FULL_PROMPT")]
    full_prompt: Option<PathBuf>,

    /// Text file replacing the refinement-pass instruction.
    #[arg(long, env = "DRAWING2JSON_TECHNICAL_PROMPT")]
    technical_prompt: Option<PathBuf>,

    /// Print the built-in instruction for a pass (full, technical-params) and exit.
    #[arg(long, value_name = "PASS")]
    print_prompt: Option<Pass>,

    /// Disable the progress spinner.
    #[arg(long, env = "DRAWING2JSON_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DRAWING2JSON_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and the JSON.
    #[arg(short, long, env = "DRAWING2JSON_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(pass) = cli.print_prompt {
        println!("{}", prompt_for(pass));
        return Ok(());
    }

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives the feedback that matters; keep INFO logs out of its way.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.verbose;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let Some(ref input) = cli.input else {
        anyhow::bail!("an INPUT path or URL is required");
    };

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;
    let extractor = Extractor::new(config).context("Failed to initialise extractor")?;

    // ── Run extraction ───────────────────────────────────────────────────
    let output = match extractor.extract_to_file(input, &cli.output).await {
        Ok(output) => output,
        Err(e) => {
            report_failure(&e);
            std::process::exit(1);
        }
    };

    let json = serde_json::to_string_pretty(&output.result).context("Failed to serialise result")?;
    println!("{json}");

    if !cli.quiet {
        print_summary(&output, &cli.output);
    }
    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .full_pass_dpi(cli.dpi)
        .refinement_dpi(cli.refine_dpi)
        .crop(cli.crop)
        .refine(!cli.no_refine)
        .full_pass_max_tokens(cli.max_tokens)
        .refinement_max_tokens(cli.refine_max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password);
    }
    if let Some(ref path) = cli.full_prompt {
        builder = builder.full_prompt(read_prompt(path).await?);
    }
    if let Some(ref path) = cli.technical_prompt {
        builder = builder.technical_prompt(read_prompt(path).await?);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

async fn read_prompt(path: &std::path::Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read prompt from {:?}", path))
}

fn print_summary(output: &ExtractionOutput, path: &std::path::Path) {
    let r = &output.result;
    let (mark, state) = match output.final_state {
        PassState::Merged => (
            green("✔"),
            format!("refined ({} fields updated)", output.stats.fields_refined),
        ),
        PassState::MergedWithWarning => (yellow("⚠"), "refinement skipped".to_string()),
        _ => (green("✔"), "full pass only".to_string()),
    };
    eprintln!(
        "{}  table1: {}  table2: {}  table3: {}  {}  {}ms  →  {}",
        mark,
        r.table1.len(),
        r.table2.len(),
        r.table3.len(),
        dim(&state),
        output.stats.total_duration_ms,
        bold(&path.display().to_string()),
    );
    if let Some(ref w) = output.warning {
        eprintln!("   {}", yellow(w));
    }

    let refine = output.stats.refinement_pass.as_ref();
    eprintln!(
        "   {} tokens in  /  {} tokens out",
        dim(&(output.stats.full_pass.input_tokens + refine.map_or(0, |p| p.input_tokens)).to_string()),
        dim(&(output.stats.full_pass.output_tokens + refine.map_or(0, |p| p.output_tokens)).to_string()),
    );
}

fn report_failure(e: &ExtractError) {
    let heading = match e.kind() {
        ErrorKind::DocumentRead => "Could not read the document",
        ErrorKind::ExtractionService => "Model service failed",
        ErrorKind::MalformedResponse => "Model reply is not valid JSON",
        ErrorKind::CropGeometry | ErrorKind::Configuration => "Invalid configuration",
        ErrorKind::Output => "Could not write the result",
        ErrorKind::Internal => "Internal error",
    };
    eprintln!("{} {}: {}", red("✘"), bold(heading), e);
    if let Some(raw) = e.raw_response() {
        eprintln!("{}", dim("── raw reply ──"));
        eprintln!("{raw}");
    }
}
