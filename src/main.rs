// Copyright 2023 Remi Bernotavicius

use chrono::Utc;
use clap::Parser;
use clap::Subcommand;
use diy_recipes_admin::config::{self, Config};
use diy_recipes_admin::database::models::{RecipeId, UserId};
use diy_recipes_admin::database::{self, query};
use diy_recipes_admin::iterations::{self, NewIterationInput};
use diy_recipes_admin::preferences::{self, PreferencesUpdate};
use diy_recipes_admin::provision::{self, ProvisionOutcome};
use diy_recipes_admin::quantity::Quantity;
use diy_recipes_admin::report::{Report as _, ReportWriter};
use diy_recipes_admin::{dedup, diagnose, inspect, seed, smoke};
use diy_recipes_admin::{Error, Result};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(version, about = "Administration tool for the DIY recipes database")]
struct Args {
    /// Loaded before .env.local and .env
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    commands: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show which variables are set, with secrets masked
    Env,
    /// Check keys, tables and the exec_sql helper, and write a report
    Diagnose {
        #[arg(long)]
        no_report: bool,
    },
    /// Create any missing tables
    Migrate,
    /// List tables with row counts
    Tables,
    /// Load the built-in recipe catalogue
    Seed {
        #[arg(long)]
        with_iterations: bool,
    },
    /// Copy ingredient names from the legacy capitalised table into ingredients
    MigrateIngredients {
        #[arg(long, default_value = seed::legacy::LEGACY_INGREDIENTS)]
        from: String,
    },
    /// Remove recipes that share a title
    Dedup {
        #[arg(long)]
        yes: bool,
        #[arg(long)]
        dry_run: bool,
    },
    #[command(subcommand)]
    Recipe(RecipeCommands),
    #[command(subcommand)]
    Iteration(IterationCommands),
    #[command(subcommand)]
    Prefs(PrefsCommands),
    /// Check the running web app renders its key pages
    Smoke {
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        recipe: Option<RecipeId>,
        #[arg(long, default_value_t = smoke::DEFAULT_TIMEOUT.as_secs())]
        timeout_secs: u64,
        #[arg(long)]
        no_report: bool,
    },
}

#[derive(Debug, Subcommand)]
enum RecipeCommands {
    /// Show a recipe by id or title
    Show { recipe: String },
}

#[derive(Debug, Subcommand)]
enum IterationCommands {
    /// Record a new version of a recipe, snapshotting its current ingredients
    Create {
        recipe: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        /// A JSON object, e.g. '{"absorption": 8}'
        #[arg(long)]
        metrics: Option<String>,
    },
    List {
        recipe: String,
    },
}

#[derive(Debug, Subcommand)]
enum PrefsCommands {
    Get {
        user: UserId,
    },
    Set {
        user: UserId,
        #[arg(long)]
        theme: Option<String>,
        #[arg(long, value_parser = parse_on_off)]
        audio: Option<bool>,
        #[arg(long)]
        volume: Option<f32>,
        #[arg(long)]
        display_name: Option<String>,
    },
}

fn parse_on_off(s: &str) -> std::result::Result<bool, String> {
    match s.to_lowercase().as_str() {
        "on" | "true" | "yes" => Ok(true),
        "off" | "false" | "no" => Ok(false),
        other => Err(format!("expected on or off, got {other:?}")),
    }
}

fn connect(config: &Config) -> Result<database::Connection> {
    database::establish_connection(config.require_database_url()?)
}

fn show_env(config: &Config, loaded: &[PathBuf]) {
    for path in loaded {
        println!("loaded {}", path.display());
    }
    for variable in config.presence() {
        println!(
            "{:32} {}",
            variable.name,
            variable.value.as_deref().unwrap_or("(not set)")
        );
    }
}

fn run_diagnose(config: &Config, no_report: bool) -> Result<ExitCode> {
    let report = diagnose::run(config, Utc::now());
    let summary = report.summary();
    for line in &summary.lines {
        println!("{line}");
    }
    if !no_report {
        ReportWriter::new(&config.artifacts_dir).write(&report, report.generated_at)?;
    }
    Ok(if report.has_critical() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn run_migrate(config: &Config) -> Result<ExitCode> {
    let outcome = provision::ensure_schema(config)?;
    match &outcome {
        ProvisionOutcome::Migrated { applied, .. } if applied.is_empty() => {
            println!("schema is up to date")
        }
        ProvisionOutcome::Migrated { applied, .. } => {
            println!("applied {} migration(s)", applied.len())
        }
        ProvisionOutcome::AlreadyProvisioned { .. } => println!("all tables already exist"),
        ProvisionOutcome::ProvisionedViaRpc { provisioned, .. } => println!(
            "provisioned {} through {}",
            provisioned.join(", "),
            provision::EXEC_SQL
        ),
        ProvisionOutcome::ManualSqlRequired { missing, sql } => {
            log::warn!(
                "missing or incomplete tables {} and no way to fix them; run this SQL in the SQL editor",
                missing.join(", ")
            );
            println!("{sql}");
            return Ok(ExitCode::FAILURE);
        }
    }
    for table in outcome.tables() {
        if !table.status.exists() {
            log::error!("{} is still not usable: {:?}", table.table, table.status);
            return Ok(ExitCode::FAILURE);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn run_dedup(config: &Config, yes: bool, dry_run: bool) -> Result<()> {
    let mut conn = connect(config)?;
    let plan = dedup::plan(dedup::candidates(&mut conn)?);
    if plan.is_empty() {
        println!("no duplicate titles");
        return Ok(());
    }
    print!("{}", dedup::describe(&plan));
    if dry_run {
        return Ok(());
    }
    let count = plan.doomed().count();
    if !yes && !dedup::confirm(count)? {
        return Err(Error::Aborted);
    }
    let deleted = dedup::apply(&mut conn, &plan)?;
    println!("deleted {deleted} duplicate recipe(s)");
    Ok(())
}

fn run_iteration(config: &Config, command: IterationCommands) -> Result<()> {
    let mut conn = connect(config)?;
    match command {
        IterationCommands::Create {
            recipe,
            title,
            description,
            notes,
            metrics,
        } => {
            let recipe = query::find_recipe(&mut conn, &recipe)?;
            let metrics = metrics
                .map(|m| serde_json::from_str::<serde_json::Value>(&m))
                .transpose()?;
            let input = NewIterationInput {
                title,
                description,
                notes,
                metrics,
            };
            let iteration = iterations::create_iteration(&mut conn, recipe.id, &input)?;
            println!(
                "created version {} of {} ({})",
                iteration.version_number, recipe.title, iteration.id
            );
        }
        IterationCommands::List { recipe } => {
            let recipe = query::find_recipe(&mut conn, &recipe)?;
            for iteration in iterations::list_iterations(&mut conn, recipe.id)? {
                println!(
                    "v{:<3} {}  {}  {}",
                    iteration.version_number,
                    iteration.created_at.format("%Y-%m-%d %H:%M"),
                    iteration.title,
                    iteration.notes.as_deref().unwrap_or("")
                );
                for (line, ingredient) in iterations::iteration_ingredients(&mut conn, iteration.id)? {
                    let quantity = Quantity::new(&line.quantity, &line.unit);
                    println!("       {quantity} {}", ingredient.name);
                }
            }
        }
    }
    Ok(())
}

fn run_prefs(config: &Config, command: PrefsCommands) -> Result<()> {
    let mut conn = connect(config)?;
    let prefs = match command {
        PrefsCommands::Get { user } => preferences::get(&mut conn, user)?,
        PrefsCommands::Set {
            user,
            theme,
            audio,
            volume,
            display_name,
        } => {
            let update = PreferencesUpdate {
                theme,
                audio_enabled: audio,
                volume,
                display_name,
            };
            preferences::update(&mut conn, user, &update)?
        }
    };
    println!("{}", serde_json::to_string_pretty(&prefs)?);
    Ok(())
}

/// A recipe to point the detail checks at when none was given.
fn any_recipe(config: &Config) -> Option<RecipeId> {
    let url = config.database_url.as_deref()?;
    let found = database::connect(url).and_then(|mut conn| query::all_recipes(&mut conn));
    match found {
        Ok(recipes) => recipes.first().map(|r| r.id),
        Err(e) => {
            log::warn!("could not look up a recipe for the detail checks: {e}");
            None
        }
    }
}

fn run_smoke(
    config: &Config,
    url: Option<String>,
    recipe: Option<RecipeId>,
    timeout: Duration,
    no_report: bool,
) -> Result<ExitCode> {
    let base_url = url
        .or_else(|| config.app_url.clone())
        .or_else(|| smoke::detect_app_url(&smoke::DEFAULT_PORTS, Duration::from_millis(500)))
        .ok_or_else(|| {
            Error::Config(format!(
                "no app answering on ports 3000 or 3001; start it or pass --url or set {}",
                config::APP_URL
            ))
        })?;
    let recipe = recipe.or_else(|| any_recipe(config));

    let runner = smoke::SmokeRunner::new(&base_url, timeout)?;
    let report = runner.run_suite(&smoke::default_suite(recipe));
    println!(
        "{} passed, {} failed, {} skipped",
        report.passed(),
        report.failed(),
        report.skipped()
    );
    if !no_report {
        ReportWriter::new(&config.artifacts_dir).write(&report, report.started_at)?;
    }
    Ok(if report.has_failures() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn run(args: Args) -> Result<ExitCode> {
    let loaded = config::load_env_files(args.env_file.as_deref());
    let config = Config::from_env();

    match args.commands {
        Commands::Env => show_env(&config, &loaded),
        Commands::Diagnose { no_report } => return run_diagnose(&config, no_report),
        Commands::Migrate => return run_migrate(&config),
        Commands::Tables => {
            let mut conn = database::connect(config.require_database_url()?)?;
            print!("{}", inspect::render_tables(&inspect::tables(&mut conn)?));
        }
        Commands::Seed { with_iterations } => {
            let mut conn = connect(&config)?;
            let report = seed::seed_catalog(&mut conn, with_iterations)?;
            println!("{report}");
            if report.recipes_failed + report.iterations_failed > 0 {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::MigrateIngredients { from } => {
            let mut conn = connect(&config)?;
            let report = seed::legacy::migrate_legacy_ingredients(&mut conn, &from)?;
            println!("{report}");
            if report.failed > 0 {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Dedup { yes, dry_run } => run_dedup(&config, yes, dry_run)?,
        Commands::Recipe(RecipeCommands::Show { recipe }) => {
            let mut conn = connect(&config)?;
            print!("{}", inspect::recipe_view(&mut conn, &recipe)?);
        }
        Commands::Iteration(command) => run_iteration(&config, command)?,
        Commands::Prefs(command) => run_prefs(&config, command)?,
        Commands::Smoke {
            url,
            recipe,
            timeout_secs,
            no_report,
        } => {
            return run_smoke(
                &config,
                url,
                recipe,
                Duration::from_secs(timeout_secs),
                no_report,
            )
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    let args = Args::parse();
    let level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    if let Err(e) = simple_logger::SimpleLogger::new().with_level(level).env().init() {
        eprintln!("could not set up logging: {e}");
    }

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
