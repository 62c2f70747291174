use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use ormagic_core::{
    FieldType, FilterValue, ModelSchema, Operator, Query, RESERVED_KEYS, Registry, Value,
    create_junction_sql, create_table_sql, split_lookup,
};
use ormagic_sqlite::{Database, StoreConfig};
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Parser)]
#[command(name = "ormagic")]
#[command(version)]
#[command(about = "Map YAML model definitions onto SQLite tables")]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the DDL for the models.
    Sql(SqlArgs),
    /// Create or alter tables to match the models.
    Migrate(DbArgs),
    /// Show how each table differs from its model.
    Status(DbArgs),
    /// Drop a model's table.
    Drop(DropArgs),
    /// Print matching records as JSON.
    Query(QueryArgs),
}

#[derive(Debug, Args)]
struct SqlArgs {
    /// YAML file with the model definitions.
    #[arg(long)]
    models: PathBuf,
    /// Only print the DDL of this model.
    #[arg(long)]
    model: Option<String>,
}

#[derive(Debug, Args)]
struct DbArgs {
    /// YAML file with the model definitions.
    #[arg(long)]
    models: PathBuf,
    /// Database file path.
    #[arg(long)]
    db: PathBuf,
    /// Store configuration YAML; `--db` overrides its path.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct DropArgs {
    #[command(flatten)]
    db: DbArgs,
    /// Model whose table is dropped.
    model: String,
}

#[derive(Debug, Args)]
struct QueryArgs {
    #[command(flatten)]
    db: DbArgs,
    /// Model to query.
    model: String,
    /// Lookup as key=value, e.g. age__gte=18, name__in=a,b or order_by=-age.
    #[arg(long = "where", value_name = "KEY=VALUE")]
    conditions: Vec<String>,
}

/// Layout of a model file.
#[derive(Debug, Deserialize)]
struct ModelFile {
    models: Vec<ModelSchema>,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Command::Sql(args) => run_sql(args),
        Command::Migrate(args) => run_migrate(args),
        Command::Status(args) => run_status(args),
        Command::Drop(args) => run_drop(args),
        Command::Query(args) => run_query(args),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn run_sql(args: SqlArgs) -> Result<(), String> {
    let registry = load_registry(&args.models)?;
    let models: Vec<&ModelSchema> = match &args.model {
        Some(name) => vec![registry.get(name).map_err(|e| e.to_string())?.as_ref()],
        None => registry.models().map(|model| model.as_ref()).collect(),
    };

    let mut junctions = BTreeSet::new();
    for model in models {
        let sql = create_table_sql(model, &registry).map_err(|e| e.to_string())?;
        println!("{sql};");
        for field in model.reference_lists() {
            let FieldType::ReferenceList(target) = &field.field_type else {
                continue;
            };
            let target = registry.get(target).map_err(|e| e.to_string())?;
            let pair = if model.table() < target.table() {
                (model.table().to_string(), target.table().to_string())
            } else {
                (target.table().to_string(), model.table().to_string())
            };
            if junctions.insert(pair) {
                println!("{};", create_junction_sql(model, target));
            }
        }
    }
    Ok(())
}

fn run_migrate(args: DbArgs) -> Result<(), String> {
    let db = open_database(&args)?;
    let applied = db
        .transaction(|store| {
            let mut applied = Vec::new();
            for model in store.registry().models() {
                let steps = store.update_table(model.name())?;
                applied.push((model.name().to_string(), steps));
            }
            Ok(applied)
        })
        .map_err(|e| format!("Migration failed: {e}"))?;

    for (model, steps) in applied {
        if steps.is_empty() {
            println!("{model}: up to date");
        }
        for step in steps {
            println!("{model}: {step}");
        }
    }
    Ok(())
}

fn run_status(args: DbArgs) -> Result<(), String> {
    let db = open_database(&args)?;
    let store = db.store();
    let statuses = db
        .registry()
        .models()
        .map(|model| store.migration_status(model.name()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("Failed to get migration status: {e}"))?;
    print_json(&statuses)
}

fn run_drop(args: DropArgs) -> Result<(), String> {
    let db = open_database(&args.db)?;
    db.store()
        .drop_table(&args.model)
        .map_err(|e| format!("Failed to drop table of '{}': {e}", args.model))?;
    println!("Dropped table of {}.", args.model);
    Ok(())
}

fn run_query(args: QueryArgs) -> Result<(), String> {
    let db = open_database(&args.db)?;
    let store = db.store();
    let model = store.model(&args.model).map_err(|e| e.to_string())?;

    let pairs = args
        .conditions
        .iter()
        .map(|condition| parse_condition(model, condition))
        .collect::<Result<Vec<_>, _>>()?;
    let query = Query::from_pairs(pairs).map_err(|e| format!("Invalid query: {e}"))?;

    let records = store
        .filter(&args.model, &query)
        .map_err(|e| format!("Query failed: {e}"))?;
    let json: Vec<serde_json::Value> = records.iter().map(|r| r.to_json()).collect();
    print_json(&json)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn load_registry(path: &Path) -> Result<Registry, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read models '{}': {e}", path.display()))?;
    let file: ModelFile = serde_yaml::from_str(&content)
        .map_err(|e| format!("Failed to parse models '{}': {e}", path.display()))?;
    let registry = Registry::from_models(file.models).map_err(|e| e.to_string())?;
    info!(models = registry.len(), "loaded models");
    Ok(registry)
}

fn open_database(args: &DbArgs) -> Result<Database, String> {
    let registry = load_registry(&args.models)?;
    let mut config = match &args.config {
        Some(path) => StoreConfig::load(path)
            .map_err(|e| format!("Failed to load config '{}': {e}", path.display()))?,
        None => StoreConfig::default(),
    };
    config.path = Some(args.db.clone());
    Database::open(&config, registry)
        .map_err(|e| format!("Failed to open database '{}': {e}", args.db.display()))
}

/// Parses `key=value`, typing the value after the field the key names.
fn parse_condition(model: &ModelSchema, condition: &str) -> Result<(String, FilterValue), String> {
    let (key, raw) = condition
        .split_once('=')
        .ok_or_else(|| format!("Invalid condition '{condition}': expected KEY=VALUE"))?;
    if RESERVED_KEYS.contains(&key) {
        return Ok((key.to_string(), FilterValue::from(raw)));
    }

    let (field, operator) = split_lookup(key).map_err(|e| e.to_string())?;
    let integer = model
        .field(field)
        .is_some_and(|f| !matches!(f.field_type, FieldType::Text));
    let parse = |text: &str| -> Result<Value, String> {
        if integer {
            text.trim()
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| format!("Invalid condition '{condition}': '{text}' is not an integer"))
        } else {
            Ok(Value::from(text))
        }
    };

    let value = match operator {
        Operator::In | Operator::NotIn | Operator::Between | Operator::NotBetween => {
            FilterValue::List(raw.split(',').map(parse).collect::<Result<_, _>>()?)
        }
        _ => FilterValue::Single(parse(raw)?),
    };
    Ok((key.to_string(), value))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), String> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| format!("JSON serialization failed: {e}"))?;
    println!("{json}");
    Ok(())
}
