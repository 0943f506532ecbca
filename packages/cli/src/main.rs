mod backend;

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use state::format::{format_date_time, local_date, relative_day};
use state::{FlushOutcome, FluidIntake, ProfilePatch, StoreConfig, Theme, WeightReading};

use backend::{default_data_dir, open_store, SessionSlot, Store};

#[derive(Debug, Parser)]
#[command(name = "renalcare", version, about = "Inspect and log RenalCare data on this machine")]
struct Cli {
    /// Directory holding the persisted state
    /// (default: $RENALCARE_DATA_DIR or the platform data dir)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Config file (default: <data-dir>/renalcare.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the profile
    Show,
    /// List weight readings, newest first
    Weights,
    AddWeight {
        /// Kilograms
        kg: f64,
        #[arg(long, default_value = "")]
        note: String,
    },
    AddFluid {
        /// Millilitres
        ml: u32,
        #[arg(long, default_value = "water")]
        beverage: String,
    },
    SetTheme {
        theme: Theme,
    },
    /// Fill in the profile and finish onboarding
    Onboard {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        timezone: Option<String>,
        /// Millilitres per day
        #[arg(long)]
        fluid_limit: Option<u32>,
        /// Kilograms
        #[arg(long)]
        dry_weight: Option<f64>,
    },
    /// Today's fluid budget and weight
    Today,
    /// Print the whole state as JSON
    Export,
    /// Delete all local data and the session key
    Reset {
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);
    let config_path = cli
        .config
        .unwrap_or_else(|| data_dir.join(StoreConfig::filename()));
    let config = StoreConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let store = open_store(&data_dir, SessionSlot::detect(), config).await;
    let mut out = io::stdout().lock();
    run(cli.command, &store, &mut out, Utc::now()).await?;

    if let FlushOutcome::Failed = store.flush().await {
        bail!("failed to save state to {}", data_dir.display());
    }
    Ok(())
}

async fn run(
    command: Commands,
    store: &Store,
    out: &mut impl Write,
    now: DateTime<Utc>,
) -> Result<()> {
    match command {
        Commands::Show => {
            let profile = store.profile();
            let name = if profile.name.is_empty() {
                "(not set)"
            } else {
                profile.name.as_str()
            };
            writeln!(out, "Name:         {}", name)?;
            writeln!(out, "Email:        {}", profile.email)?;
            writeln!(out, "Timezone:     {}", profile.timezone)?;
            writeln!(out, "Fluid limit:  {} ml/day", profile.daily_fluid_limit)?;
            if let Some(goal) = profile.dry_weight_goal {
                writeln!(out, "Dry weight:   {:.1} kg", goal)?;
            }
            writeln!(out, "Plan:         {}", profile.subscription.plan.as_str())?;
            writeln!(out, "Theme:        {}", profile.settings.display.theme)?;
            let onboarded = if profile.onboarding_complete {
                "yes"
            } else {
                "no"
            };
            writeln!(out, "Onboarded:    {}", onboarded)?;
            writeln!(out, "Medications:  {}", store.medications().len())?;
        }
        Commands::Weights => {
            let tz = store.timezone();
            let unit = store.profile().settings.units.weight;
            for reading in store.weights() {
                writeln!(
                    out,
                    "{}  {:.1} {}  {}",
                    format_date_time(reading.timestamp, tz),
                    unit.from_kg(reading.weight),
                    unit.label(),
                    reading.notes
                )?;
            }
        }
        Commands::AddWeight { kg, note } => {
            if !kg.is_finite() || kg <= 0.0 {
                bail!("weight must be a positive number of kilograms");
            }
            store.add_weight(WeightReading {
                id: uuid::Uuid::new_v4().to_string(),
                timestamp: now,
                weight: kg,
                notes: note,
            });
            writeln!(out, "Logged {:.1} kg", kg)?;
        }
        Commands::AddFluid { ml, beverage } => {
            store.add_fluid(FluidIntake {
                id: uuid::Uuid::new_v4().to_string(),
                timestamp: now,
                amount: ml,
                beverage,
            });
            let today = local_date(now, store.timezone());
            writeln!(out, "Logged {} ml, {} ml left today", ml, store.fluid_remaining_on(today))?;
        }
        Commands::SetTheme { theme } => {
            store.set_theme(theme).await;
            writeln!(out, "Theme set to {}", theme)?;
        }
        Commands::Onboard {
            name,
            email,
            timezone,
            fluid_limit,
            dry_weight,
        } => {
            store.complete_onboarding(ProfilePatch {
                name: Some(name),
                email: Some(email),
                timezone,
                daily_fluid_limit: fluid_limit,
                dry_weight_goal: dry_weight,
                preferred_modality: None,
            });
            writeln!(out, "Welcome, {}", store.profile().name)?;
        }
        Commands::Today => {
            let tz = store.timezone();
            let today = local_date(now, tz);
            let limit = store.profile().daily_fluid_limit;
            writeln!(
                out,
                "Fluids: {} / {} ml ({} ml left)",
                store.fluid_total_on(today),
                limit,
                store.fluid_remaining_on(today)
            )?;
            match store.latest_weight() {
                Some(latest) => {
                    write!(
                        out,
                        "Weight: {:.1} kg ({})",
                        latest.weight,
                        relative_day(latest.timestamp, now, tz)
                    )?;
                    if let Some(above) = store.weight_above_dry() {
                        write!(out, ", {:+.1} kg vs dry weight", above)?;
                    }
                    writeln!(out)?;
                }
                None => writeln!(out, "Weight: no readings")?,
            }
        }
        Commands::Export => {
            writeln!(out, "{}", serde_json::to_string_pretty(&store.snapshot())?)?;
        }
        Commands::Reset { yes } => {
            if !yes {
                bail!("refusing to delete local data without --yes");
            }
            store.reset().await;
            writeln!(out, "Local data deleted")?;
        }
    }
    Ok(())
}
