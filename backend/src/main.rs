//! Datamend CLI - map, validate and export spreadsheet data
//!
//! # Main Commands
//!
//! ```bash
//! datamend serve                                  # Start HTTP server (port 3000)
//! datamend validate input.csv -e contacts         # Validate rows against an entity
//! datamend export input.csv -e contacts -o out.csv
//! datamend entities list                          # Manage target entities
//! ```
//!
//! # Helper Commands
//!
//! ```bash
//! datamend parse input.csv                        # Just parse CSV to JSON
//! datamend map input.csv -e contacts --ai         # Propose a mapping
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use datamend::{
    ai::AiClient,
    config::{self, ConfigStore, Settings},
    decode_content, detect_encoding, parse_file_auto, parse_str, ApiExporter, ExportSession,
    FieldMapping, ValidationOptions,
};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "datamend")]
#[command(about = "Map, validate and export cleaned spreadsheet data", long_about = None)]
struct Cli {
    /// Export configuration file (default: $DATAMEND_CONFIG or .datamend/export-config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a CSV file and output JSON rows
    Parse {
        /// Input CSV file
        input: PathBuf,

        /// CSV delimiter (auto-detect if not specified)
        #[arg(short, long)]
        delimiter: Option<char>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Manage target entities
    Entities {
        #[command(subcommand)]
        action: EntityAction,
    },

    /// Propose a field mapping for a CSV file
    Map {
        /// Input CSV file
        input: PathBuf,

        /// Target entity id
        #[arg(short, long)]
        entity: String,

        /// Ask the AI for suggestions instead of name matching
        #[arg(long)]
        ai: bool,

        /// Ignore AI suggestions scoring below this (0-100)
        #[arg(long, default_value = "70")]
        min_confidence: u8,

        /// Write the mapping JSON here (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a CSV file against a target entity
    Validate {
        /// Input CSV file
        input: PathBuf,

        /// Target entity id
        #[arg(short, long)]
        entity: String,

        /// Mapping JSON file (default: name-based auto-mapping)
        #[arg(short, long)]
        mapping: Option<PathBuf>,

        /// Maximum number of errors to collect
        #[arg(long)]
        max_errors: Option<usize>,

        /// Print the full report as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Validate, transform and export a CSV file
    Export {
        /// Input CSV file
        input: PathBuf,

        /// Target entity id
        #[arg(short, long)]
        entity: String,

        /// Mapping JSON file (default: name-based auto-mapping)
        #[arg(short, long)]
        mapping: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Csv)]
        format: Format,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// POST the records to the entity endpoint instead of writing them
        #[arg(long)]
        submit: bool,

        /// With --submit: log the request without sending it
        #[arg(long)]
        dry_run: bool,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
}

#[derive(Subcommand)]
enum EntityAction {
    /// List configured entities
    List,

    /// Show one entity and its fields
    Show {
        /// Entity id
        id: String,
    },

    /// Import an entity, or a whole configuration, from a JSON file
    Import {
        /// JSON file
        file: PathBuf,
    },

    /// Remove an entity
    Remove {
        /// Entity id
        id: String,
    },

    /// Set the API base URL entity paths are appended to
    SetBaseUrl {
        url: String,
    },

    /// Report configuration problems
    Lint,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Csv,
    Json,
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Initialize the tracing subscriber. Logs go to stderr; stdout carries data.
fn init_logging(level: &str, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.quiet);

    let mut settings = Settings::from_env();
    if let Some(path) = cli.config {
        settings.config_path = path;
    }

    let result = match cli.command {
        Commands::Parse { input, delimiter, output } => cmd_parse(&input, delimiter, output.as_deref()),

        Commands::Entities { action } => cmd_entities(&settings, action),

        Commands::Map { input, entity, ai, min_confidence, output } => {
            cmd_map(&settings, &input, &entity, ai, min_confidence, output.as_deref()).await
        }

        Commands::Validate { input, entity, mapping, max_errors, json } => {
            cmd_validate(&settings, &input, &entity, mapping.as_deref(), max_errors, json)
        }

        Commands::Export { input, entity, mapping, format, output, submit, dry_run } => {
            cmd_export(
                &settings,
                &input,
                &entity,
                mapping.as_deref(),
                format,
                output.as_deref(),
                submit,
                dry_run,
            )
            .await
        }

        Commands::Serve { port } => datamend::server::start_server(port, settings).await,
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_parse(input: &Path, delimiter: Option<char>, output: Option<&Path>) -> CliResult<()> {
    eprintln!("📄 Parsing CSV: {}", input.display());

    let (dataset, encoding, used_delimiter) = match delimiter {
        Some(d) => {
            let bytes = fs::read(input)?;
            let encoding = detect_encoding(&bytes);
            let content = decode_content(&bytes, &encoding)?;
            (parse_str(&content, d)?, encoding, d)
        }
        None => {
            let parsed = parse_file_auto(input)?;
            (parsed.dataset, parsed.encoding, parsed.delimiter)
        }
    };

    eprintln!("   Encoding: {}", encoding);
    eprintln!(
        "   Delimiter: '{}'{}",
        format_delimiter(used_delimiter),
        if delimiter.is_none() { " (auto-detected)" } else { "" }
    );
    eprintln!("   Columns: {}", dataset.headers.join(", "));
    eprintln!("✅ Parsed {} rows", dataset.len());

    let json = serde_json::to_string_pretty(&dataset.rows)?;
    write_output(&json, output)
}

fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

fn cmd_entities(settings: &Settings, action: EntityAction) -> CliResult<()> {
    let mut store = ConfigStore::open(&settings.config_path);
    if let Some(notice) = store.notice() {
        eprintln!("⚠️  {}", notice);
    }

    match action {
        EntityAction::List => {
            if store.entities().is_empty() {
                eprintln!("📋 No entities configured yet.");
                eprintln!("   Use 'datamend entities import <file>' to add one.");
                return Ok(());
            }

            let base_url = &store.config().base_url;
            eprintln!("📋 Entities ({}) at {}:\n", store.entities().len(), store.path().display());
            for entity in store.entities() {
                println!("  📄 {} ({})", entity.name, entity.id);
                println!("     Endpoint: {}", datamend::export::endpoint_url(base_url, &entity.url));
                println!("     Fields: {}", entity.field_names().join(", "));
                println!();
            }
        }

        EntityAction::Show { id } => {
            let entity = store.entity(&id)?;
            println!("📄 Entity: {} ({})\n", entity.name, entity.id);
            println!("URL: {}", entity.url);
            println!("\nFields:");
            for field in &entity.fields {
                println!(
                    "  - {}: {}{}",
                    field.name,
                    field.field_type().as_str(),
                    if field.required { " (required)" } else { "" }
                );
            }
            println!("\n{}", serde_json::to_string_pretty(entity)?);
        }

        EntityAction::Import { file } => {
            eprintln!("📥 Importing from: {}", file.display());
            let warnings = store.import(&file)?;
            print_warnings(&warnings);
            eprintln!("✅ Saved {} entities to {}", store.entities().len(), store.path().display());
        }

        EntityAction::Remove { id } => {
            store.remove_entity(&id)?;
            eprintln!("🗑️  Entity removed: {}", id);
        }

        EntityAction::SetBaseUrl { url } => {
            store.set_base_url(url.trim())?;
            eprintln!("✅ Base URL set to {}", store.config().base_url);
        }

        EntityAction::Lint => {
            let warnings = config::lint(store.config());
            if warnings.is_empty() {
                eprintln!("✅ No problems found");
            } else {
                print_warnings(&warnings);
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn print_warnings(warnings: &[String]) {
    for warning in warnings {
        eprintln!("⚠️  {}", warning);
    }
}

/// Parse the input and select the entity (auto-mapped, or from a file).
fn open_session(
    settings: &Settings,
    input: &Path,
    entity_id: &str,
    mapping: Option<&Path>,
    max_errors: Option<usize>,
) -> CliResult<ExportSession> {
    let store = ConfigStore::open(&settings.config_path);
    if let Some(notice) = store.notice() {
        eprintln!("⚠️  {}", notice);
    }
    let entity = store.entity(entity_id)?.clone();

    eprintln!("📄 Processing: {}", input.display());
    let parsed = parse_file_auto(input)?;
    eprintln!("   {} rows, {} columns", parsed.dataset.len(), parsed.dataset.headers.len());

    let options = ValidationOptions { max_errors: max_errors.unwrap_or(settings.max_errors) };
    let mut session = ExportSession::new(parsed.dataset, options);
    session.select_entity(entity);

    if let Some(path) = mapping {
        let loaded: FieldMapping = serde_json::from_str(&fs::read_to_string(path)?)?;
        session.set_mapping(loaded)?;
        eprintln!("   Mapping loaded from {}", path.display());
    }

    Ok(session)
}

async fn cmd_map(
    settings: &Settings,
    input: &Path,
    entity_id: &str,
    ai: bool,
    min_confidence: u8,
    output: Option<&Path>,
) -> CliResult<()> {
    let mut session = open_session(settings, input, entity_id, None, None)?;
    let entity = session.entity().cloned().ok_or("no entity selected")?;

    if ai {
        let client = AiClient::from_env()?;
        let suggestions = client.suggest_mapping(&session.dataset().headers, &entity.fields).await?;
        for s in &suggestions {
            eprintln!(
                "   {} ← {} ({}%) {}",
                s.target_field_name,
                s.suggested_source_column.as_deref().unwrap_or("-"),
                s.confidence_score,
                s.reasoning
            );
        }
        session.apply_suggestions(&suggestions, min_confidence)?;
    }

    eprintln!("\n🔗 Mapping for '{}':", entity.name);
    for (field, column) in session.mapping().entries(&entity.fields) {
        eprintln!("   {:<24} ← {}", field, column.unwrap_or("(unmapped)"));
    }
    let missing = session.mapping().missing_required(&entity.fields);
    if !missing.is_empty() {
        eprintln!("⚠️  Required fields unmapped: {}", missing.join(", "));
    }

    let json = serde_json::to_string_pretty(session.mapping())?;
    write_output(&json, output)
}

fn cmd_validate(
    settings: &Settings,
    input: &Path,
    entity_id: &str,
    mapping: Option<&Path>,
    max_errors: Option<usize>,
    json: bool,
) -> CliResult<()> {
    let mut session = open_session(settings, input, entity_id, mapping, max_errors)?;
    let report = session.validate()?;

    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        for error in &report.errors {
            eprintln!("   - {}", error.message);
        }
        if report.truncated() {
            eprintln!("   ... {} more", report.total_errors - report.errors.len());
        }
        eprintln!("\n📊 {}", report.summary());
    }

    if !report.is_valid() {
        std::process::exit(1);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_export(
    settings: &Settings,
    input: &Path,
    entity_id: &str,
    mapping: Option<&Path>,
    format: Format,
    output: Option<&Path>,
    submit: bool,
    dry_run: bool,
) -> CliResult<()> {
    let mut session = open_session(settings, input, entity_id, mapping, None)?;

    let report = session.validate()?;
    if !report.is_valid() {
        for error in report.errors.iter().take(10) {
            eprintln!("   - {}", error.message);
        }
        return Err(format!("Export blocked: {}", report.summary()).into());
    }

    if submit {
        let entity = session.entity().ok_or("no entity selected")?;
        let base_url = ConfigStore::open(&settings.config_path).config().base_url.clone();
        let records = session.payload()?;

        let receipt = ApiExporter::new(base_url)
            .with_token(settings.api_token.clone())
            .with_dry_run(dry_run || settings.dry_run)
            .submit(entity, &records)
            .await?;

        eprintln!("✨ {} records → {}", receipt.records, receipt.url);
        return Ok(());
    }

    let content = match format {
        Format::Csv => session.export_csv()?,
        Format::Json => session.export_json()?,
    };
    write_output(&content, output)?;

    eprintln!("\n✨ Done!");
    Ok(())
}

fn write_output(content: &str, path: Option<&Path>) -> CliResult<()> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            print!("{}", content);
            if !content.ends_with('\n') {
                println!();
            }
        }
    }
    Ok(())
}
