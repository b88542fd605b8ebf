//! # CLI Module
//!
//! Command-line interface for the animal matcher.
//!
//! ## Usage
//! ```bash
//! # Register an animal from several photos
//! animal-match register rex_front.jpg rex_side.jpg
//!
//! # Identify an animal
//! animal-match search found_dog.jpg
//!
//! # Stricter matching, JSON output
//! animal-match search found_dog.jpg --threshold 0.85 --top-k 3 --output json
//!
//! # Inspect the registry
//! animal-match list
//! animal-match show ANI0001
//! ```

use animal_matcher::config::MatcherConfig;
use animal_matcher::core::decode::ImagePayload;
use animal_matcher::core::registry::{AnimalId, AnimalRecord, AnimalRegistry, SqliteRegistry};
use animal_matcher::core::service::{
    AnimalMatcher, RegisterRequest, RegisterResponse, RegistrationOutcome, SearchOutcome,
    SearchRequest, SearchResponse,
};
use animal_matcher::core::storage::DirectoryMediaStore;
use animal_matcher::error::{AnimalMatcherError, Result, ServiceError, SkippedImage};
use animal_matcher::events::{
    Event, EventChannel, EventReceiver, ImageEvent, RegisterEvent, SearchEvent,
};
use clap::{Parser, Subcommand, ValueEnum};
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;

/// Animal Matcher - Register animals and find them again from photos
#[derive(Parser, Debug)]
#[command(name = "animal-match")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Registry database path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Directory registered photos are copied into
    #[arg(long, global = true)]
    media_dir: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Minimum similarity a match must exceed (-1.0 to 1.0)
    #[arg(short, long, global = true)]
    threshold: Option<f32>,

    /// Maximum number of matches to show
    #[arg(short = 'k', long, global = true)]
    top_k: Option<usize>,

    /// Output format
    #[arg(short, long, global = true, default_value = "pretty")]
    output: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Register a new animal from one or more photos
    Register {
        /// Photos of the animal
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Find registered animals matching one or more photos
    Search {
        /// Photos of the animal to identify
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// List registered animals
    List,
    /// Show one registered animal
    Show {
        /// Animal id, e.g. ANI0001
        id: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Human-readable output with colors
    Pretty,
    /// JSON output for scripting
    Json,
}

/// Run the CLI
pub fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    animal_matcher::init_tracing(cli.verbose);

    let config = load_config(&cli)?;
    let term = Term::stderr();

    match &cli.command {
        Commands::Register { images } => run_register(&term, &config, images, cli.output),
        Commands::Search { images } => run_search(&term, &config, images, cli.output),
        Commands::List => run_list(&config, cli.output),
        Commands::Show { id } => run_show(&config, id, cli.output),
    }
}

/// Defaults, then the config file, then flags
fn load_config(cli: &Cli) -> Result<MatcherConfig> {
    let mut config = match &cli.config {
        Some(path) => MatcherConfig::from_json_file(path)?,
        None => MatcherConfig::default(),
    };

    if let Some(threshold) = cli.threshold {
        config = config.similarity_threshold(threshold);
    }
    if let Some(top_k) = cli.top_k {
        config = config.top_k(top_k);
    }
    if let Some(db) = &cli.db {
        config = config.db_path(db.clone());
    }
    if let Some(media_dir) = &cli.media_dir {
        config = config.media_dir(media_dir.clone());
    }

    config.validate()?;
    Ok(config)
}

fn open_registry(config: &MatcherConfig) -> Result<Arc<SqliteRegistry>> {
    Ok(Arc::new(SqliteRegistry::open(&config.resolved_db_path())?))
}

fn build_matcher(config: &MatcherConfig) -> Result<AnimalMatcher> {
    let registry = open_registry(config)?;
    let media = DirectoryMediaStore::open(&config.resolved_media_dir())?;

    AnimalMatcher::builder()
        .registry(registry)
        .media_store(Arc::new(media))
        .match_config(config.matching)
        .build()
}

fn read_payloads(paths: &[PathBuf]) -> Result<Vec<ImagePayload>> {
    paths.iter().map(|p| ImagePayload::from_path(p)).collect()
}

fn run_register(
    term: &Term,
    config: &MatcherConfig,
    paths: &[PathBuf],
    output: OutputFormat,
) -> Result<ExitCode> {
    let matcher = build_matcher(config)?;
    let request = RegisterRequest::new(read_payloads(paths)?);

    let (sender, receiver) = EventChannel::new();
    let event_thread = spawn_progress(receiver, output);

    let result = matcher.register_with_events(&request, &sender);

    drop(sender);
    event_thread.join().ok();

    let success = result.is_ok();
    match output {
        OutputFormat::Pretty => print_register_pretty(term, &result),
        OutputFormat::Json => print_json(&RegisterResponse::from(result))?,
    }

    Ok(exit_code(success))
}

fn run_search(
    term: &Term,
    config: &MatcherConfig,
    paths: &[PathBuf],
    output: OutputFormat,
) -> Result<ExitCode> {
    let matcher = build_matcher(config)?;
    let request = SearchRequest::new(read_payloads(paths)?);

    let (sender, receiver) = EventChannel::new();
    let event_thread = spawn_progress(receiver, output);

    let result = matcher.search_with_events(&request, &sender);

    drop(sender);
    event_thread.join().ok();

    let success = result.is_ok();
    match output {
        OutputFormat::Pretty => print_search_pretty(term, config, &result),
        OutputFormat::Json => print_json(&SearchResponse::from(result))?,
    }

    Ok(exit_code(success))
}

fn run_list(config: &MatcherConfig, output: OutputFormat) -> Result<ExitCode> {
    let registry = open_registry(config)?;
    let mut records = registry.all_records()?;
    records.sort_by_key(|r| r.id());

    match output {
        OutputFormat::Pretty => {
            let term = Term::stdout();
            if records.is_empty() {
                term.write_line(&format!("  {}", style("No animals registered yet").dim()))
                    .ok();
            }
            for record in &records {
                term.write_line(&format!(
                    "  {}  {}  {} photo(s)",
                    style(record.id()).bold().cyan(),
                    record.registered_at().format("%Y-%m-%d %H:%M:%S"),
                    record.images().len()
                ))
                .ok();
            }
        }
        OutputFormat::Json => {
            let summaries: Vec<_> = records.iter().map(record_summary).collect();
            print_json(&summaries)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn run_show(config: &MatcherConfig, id: &str, output: OutputFormat) -> Result<ExitCode> {
    let id = AnimalId::parse(id).ok_or_else(|| {
        AnimalMatcherError::Config(format!("Invalid animal id '{}' (expected e.g. ANI0001)", id))
    })?;
    let registry = open_registry(config)?;

    let Some(record) = registry.get(id)? else {
        match output {
            OutputFormat::Pretty => {
                Term::stderr()
                    .write_line(&format!("{} Animal {} not found", style("✗").red().bold(), id))
                    .ok();
            }
            OutputFormat::Json => print_json(&serde_json::json!({
                "success": false,
                "error": format!("Animal {} not found", id),
            }))?,
        }
        return Ok(ExitCode::FAILURE);
    };

    match output {
        OutputFormat::Pretty => {
            let term = Term::stdout();
            let media_dir = config.resolved_media_dir();
            term.write_line(&format!("{}", style(record.id()).bold().cyan()))
                .ok();
            term.write_line(&format!(
                "  Registered: {}",
                record.registered_at().format("%Y-%m-%d %H:%M:%S UTC")
            ))
            .ok();
            for image in record.images() {
                term.write_line(&format!(
                    "  {} {}",
                    style("○").dim(),
                    media_dir.join(image).display()
                ))
                .ok();
            }
        }
        OutputFormat::Json => print_json(&record_summary(&record))?,
    }

    Ok(ExitCode::SUCCESS)
}

/// Drive a progress bar from service events
fn spawn_progress(receiver: EventReceiver, output: OutputFormat) -> thread::JoinHandle<()> {
    let progress = (output == OutputFormat::Pretty).then(|| {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓░"),
        );
        pb
    });

    thread::spawn(move || {
        for event in receiver.iter() {
            let Some(pb) = &progress else { continue };
            match event {
                Event::Register(RegisterEvent::Started {
                    animal_id,
                    total_images,
                    ..
                }) => {
                    pb.set_length(total_images as u64);
                    pb.set_message(format!("registering {}", animal_id));
                }
                Event::Search(SearchEvent::Started { total_images, .. }) => {
                    pb.set_length(total_images as u64);
                    pb.set_message("processing query photos");
                }
                Event::Search(SearchEvent::Matching { records, .. }) => {
                    pb.set_message(format!("comparing against {} animals", records));
                }
                Event::Image(ImageEvent::Processed(p)) => {
                    pb.set_position(p.completed as u64);
                }
                Event::Image(ImageEvent::Skipped { .. }) => {
                    pb.inc(1);
                }
                Event::Register(RegisterEvent::Completed { .. })
                | Event::Register(RegisterEvent::Failed { .. })
                | Event::Search(SearchEvent::Completed { .. })
                | Event::Search(SearchEvent::Failed { .. }) => {
                    pb.finish_and_clear();
                }
            }
        }
    })
}

fn print_register_pretty(
    term: &Term,
    result: &std::result::Result<RegistrationOutcome, ServiceError>,
) {
    match result {
        Ok(outcome) => {
            term.write_line(&format!(
                "{} Registered {} with {} photo(s)",
                style("✓").green().bold(),
                style(outcome.animal_id).bold().cyan(),
                outcome.images_stored
            ))
            .ok();
            print_skipped(term, &outcome.skipped);
        }
        Err(e) => print_failure(term, e),
    }
}

fn print_search_pretty(
    term: &Term,
    config: &MatcherConfig,
    result: &std::result::Result<SearchOutcome, ServiceError>,
) {
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            print_failure(term, e);
            return;
        }
    };

    if outcome.matches.is_empty() {
        term.write_line(&format!(
            "  {} No registered animal scored above {:.2}",
            style("○").dim(),
            config.matching.similarity_threshold
        ))
        .ok();
    } else {
        term.write_line(&format!("{}", style("Matches:").bold().underlined()))
            .ok();
        let media_dir = config.resolved_media_dir();
        for (rank, m) in outcome.matches.iter().enumerate() {
            term.write_line(&format!(
                "  {} {} {} (registered {})",
                style(format!("#{}", rank + 1)).bold(),
                style(m.animal_id).cyan(),
                style(format!("{:.1}%", m.similarity * 100.0)).yellow(),
                m.registered_at.format("%Y-%m-%d")
            ))
            .ok();
            for image in &m.images {
                term.write_line(&format!("      {}", display_path(&media_dir.join(image))))
                    .ok();
            }
        }
    }
    print_skipped(term, &outcome.skipped);
}

fn print_skipped(term: &Term, skipped: &[SkippedImage]) {
    for item in skipped {
        term.write_line(&format!(
            "  {} skipped {}: {}",
            style("!").yellow(),
            item.file_name,
            style(&item.reason).dim()
        ))
        .ok();
    }
}

fn print_failure(term: &Term, error: &ServiceError) {
    term.write_line(&format!("{} {}", style("✗").red().bold(), error))
        .ok();
    match error {
        ServiceError::NoValidImages { skipped } | ServiceError::NoValidFeatures { skipped } => {
            print_skipped(term, skipped)
        }
        _ => {}
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| AnimalMatcherError::Config(format!("Failed to serialize output: {}", e)))?;
    println!("{}", json);
    Ok(())
}

fn record_summary(record: &AnimalRecord) -> serde_json::Value {
    serde_json::json!({
        "animalId": record.id(),
        "registeredAt": record.registered_at(),
        "images": record.images(),
    })
}

fn display_path(path: &Path) -> String {
    let home = dirs::home_dir().unwrap_or_default();
    match path.strip_prefix(&home) {
        Ok(relative) if !home.as_os_str().is_empty() => format!("~/{}", relative.display()),
        _ => path.display().to_string(),
    }
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
