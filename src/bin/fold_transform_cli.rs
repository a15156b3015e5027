use clap::{Parser, Subcommand};
use fold_transform::constants::SYSTEM_ACTOR;
use fold_transform::{
    load_engine_config, logging, FilterDefinition, FilterGate, RecordId, TransformConfig,
    TransformConfigEntry, TransformEngine,
};
use log::{error, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the engine configuration file (JSON or TOML)
    #[arg(short, long, default_value = "config/engine_config.json")]
    config: String,

    /// Path to a logging configuration TOML file
    #[arg(long)]
    log_config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register an entity schema from a JSON file
    LoadSchema {
        #[arg(required = true)]
        path: PathBuf,
    },
    /// List registered entities
    ListSchemas {},
    /// Store a named transform configuration
    SaveConfig {
        /// Config id
        #[arg(long, required = true)]
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, required = true)]
        source: String,
        #[arg(long, required = true)]
        target: String,
        /// Path to the transform config JSON
        #[arg(long, required = true)]
        file: PathBuf,
        #[arg(long)]
        disabled: bool,
    },
    /// List stored transform configurations
    ListConfigs {},
    /// Transform a source record
    Transform {
        /// Source record id
        #[arg(required = true)]
        record: String,
        /// Stored config id
        #[arg(long, conflicts_with_all = ["file", "target"])]
        config_id: Option<String>,
        /// Ad-hoc transform config JSON
        #[arg(long, requires = "target")]
        file: Option<PathBuf>,
        /// Target entity for an ad-hoc config
        #[arg(long)]
        target: Option<String>,
        /// Acting user recorded in audit fields
        #[arg(long, default_value = SYSTEM_ACTOR)]
        actor: String,
        /// Skip the filter check
        #[arg(long)]
        force: bool,
    },
    /// Evaluate a filter JSON file against a record
    CheckFilter {
        #[arg(required = true)]
        record: String,
        #[arg(long, required = true)]
        file: PathBuf,
    },
}

fn read_config(path: &Path) -> Result<TransformConfig, Box<dyn std::error::Error>> {
    let contents =
        fs::read_to_string(path).map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    Ok(TransformConfig::from_json(&contents)?)
}

fn handle_load_schema(path: PathBuf, engine: &TransformEngine) -> Result<(), Box<dyn std::error::Error>> {
    info!("Loading schema from: {}", path.display());
    let schema = fold_transform::schema::load_schema_from_file(&path)?;
    let schema = engine.registry().register(schema)?;
    info!("Entity {} registered with code {:03}", schema.name, schema.code);
    Ok(())
}

fn handle_list_schemas(engine: &TransformEngine) -> Result<(), Box<dyn std::error::Error>> {
    info!("Registered entities:");
    for name in engine.registry().list()? {
        info!("  - {}", name);
    }
    Ok(())
}

fn handle_list_configs(engine: &TransformEngine) -> Result<(), Box<dyn std::error::Error>> {
    info!("Transform configs:");
    for id in engine.configs().list()? {
        if let Some(entry) = engine.configs().get(&id)? {
            info!(
                "  - {} ({}: {} -> {}){}",
                entry.id,
                entry.name,
                entry.source_entity,
                entry.target_entity,
                if entry.disabled { " [disabled]" } else { "" }
            );
        }
    }
    Ok(())
}

fn handle_transform(
    engine: &TransformEngine,
    record: String,
    config_id: Option<String>,
    file: Option<PathBuf>,
    target: Option<String>,
    actor: String,
    force: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let source_id: RecordId = record.parse()?;
    let transformer = match (config_id, file, target) {
        (Some(id), _, _) => engine.transformer_for(&id, &actor)?,
        (None, Some(file), Some(target)) => engine.transformer(&target, read_config(&file)?, &actor)?,
        _ => return Err("Pass either --config-id or --file with --target".into()),
    };

    if !force && !transformer.check_filter(source_id)? {
        warn!("Record {} does not pass the transform filter", source_id);
        return Err(format!("Record {} was rejected by the filter", source_id).into());
    }

    let report = transformer.transform_with_report(source_id)?;
    for warning in &report.warnings {
        warn!("{}", warning);
    }
    info!("Created {} {}", transformer.target_entity(), report.record_id);
    for detail in &report.detail_ids {
        info!("  detail {}", detail);
    }
    if report.filled_back {
        info!("Wrote {} back onto {}", report.record_id, source_id);
    }
    println!("{}", report.record_id);
    Ok(())
}

fn handle_check_filter(
    engine: &TransformEngine,
    record: String,
    file: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let source_id: RecordId = record.parse()?;
    let contents = fs::read_to_string(&file)?;
    let filter: FilterDefinition = serde_json::from_str(&contents)?;
    let allowed = engine
        .context()
        .filter_gate
        .evaluate(Some(&filter), &source_id)?;
    info!("Record {} {} the filter", source_id, if allowed { "passes" } else { "fails" });
    println!("{}", allowed);
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_engine_config(Some(cli.config.as_str()))?;
    match (&cli.log_config, &config.logging) {
        (Some(path), _) => logging::init(Some(path.as_str()))?,
        (None, Some(log_config)) => logging::LoggingSystem::init_with_config(log_config.clone())?,
        (None, None) => logging::init(None)?,
    }
    info!("Loaded config from: {}", cli.config);

    let engine = TransformEngine::open(&config)?;

    let result = match cli.command {
        Commands::LoadSchema { path } => handle_load_schema(path, &engine),
        Commands::ListSchemas {} => handle_list_schemas(&engine),
        Commands::SaveConfig {
            id,
            name,
            source,
            target,
            file,
            disabled,
        } => read_config(&file).and_then(|transform_config| {
            let mut entry = TransformConfigEntry::new(
                &id,
                name.as_deref().unwrap_or(&id),
                &source,
                &target,
                transform_config,
            );
            entry.disabled = disabled;
            engine.save_config(&entry)?;
            info!("Transform config {} saved", id);
            Ok(())
        }),
        Commands::ListConfigs {} => handle_list_configs(&engine),
        Commands::Transform {
            record,
            config_id,
            file,
            target,
            actor,
            force,
        } => handle_transform(&engine, record, config_id, file, target, actor, force),
        Commands::CheckFilter { record, file } => handle_check_filter(&engine, record, file),
    };

    if let Err(e) = &result {
        error!("{}", e);
    }
    engine.flush()?;
    result
}
