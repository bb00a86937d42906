use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{ArgGroup, Args, Parser, Subcommand};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use clinical_hours_compliance::db::{self, PgStore};
use clinical_hours_compliance::intake::IntakeBatch;
use clinical_hours_compliance::models::ReviewTarget;
use clinical_hours_compliance::{report, ComplianceEngine, EngineConfig, RecordStore};

#[derive(Parser)]
#[command(name = "clinical-compliance")]
#[command(about = "Clinical hours compliance tracker for nursing cohorts", long_about = None)]
struct Cli {
    /// TOML file with engine thresholds
    #[arg(long, global = true, env = "COMPLIANCE_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    thresholds: ThresholdArgs,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ThresholdArgs {
    #[arg(long, global = true, env = "HOURS_REQUIRED")]
    hours_required: Option<f64>,
    #[arg(long, global = true, env = "SIM_CAP_HOURS")]
    sim_cap_hours: Option<f64>,
    #[arg(long, global = true, env = "SIM_CAP_PERCENT")]
    sim_cap_percent: Option<f64>,
    #[arg(long, global = true, env = "ATTENDANCE_ABSENCE_THRESHOLD")]
    absence_threshold: Option<usize>,
    #[arg(long, global = true, env = "ATTENDANCE_TARDY_THRESHOLD")]
    tardy_threshold: Option<usize>,
    /// Only count attendance from the last N days
    #[arg(long, global = true)]
    since_days: Option<i64>,
}

impl ThresholdArgs {
    fn apply(&self, config: &mut EngineConfig) {
        if let Some(value) = self.hours_required {
            config.hours_required = value;
        }
        if let Some(value) = self.sim_cap_hours {
            config.sim_cap_hours = value;
        }
        if let Some(value) = self.sim_cap_percent {
            config.sim_cap_percent = value;
        }
        if let Some(value) = self.absence_threshold {
            config.attendance_absence_threshold = value;
        }
        if let Some(value) = self.tardy_threshold {
            config.attendance_tardy_threshold = value;
        }
        if self.since_days.is_some() {
            config.attendance_window_days = self.since_days;
        }
    }
}

#[derive(Args)]
#[command(group(
    ArgGroup::new("target")
        .args(["log", "submission"])
        .required(true)
        .multiple(false)
))]
struct TargetArgs {
    /// Clinical log id
    #[arg(long)]
    log: Option<Uuid>,
    /// Hour submission id
    #[arg(long)]
    submission: Option<Uuid>,
}

impl TargetArgs {
    fn target(&self) -> anyhow::Result<ReviewTarget> {
        match (self.log, self.submission) {
            (Some(id), None) => Ok(ReviewTarget::ClinicalLog(id)),
            (None, Some(id)) => Ok(ReviewTarget::HourSubmission(id)),
            _ => anyhow::bail!("pass exactly one of --log or --submission"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Validate and store a JSON batch of records
    Ingest {
        #[arg(long)]
        file: PathBuf,
    },
    /// Create make-up obligations for clinical absences without one
    SyncMakeup,
    /// Compliance summary for one student
    Summary {
        #[arg(long)]
        student: Uuid,
    },
    /// Flags for one student
    Flags {
        #[arg(long)]
        student: Uuid,
    },
    /// Make-up hours balance for one student
    Makeup {
        #[arg(long)]
        student: Uuid,
    },
    /// Attendance totals for one student
    Attendance {
        #[arg(long)]
        student: Uuid,
    },
    /// VR scenario progress for one student
    Vr {
        #[arg(long)]
        student: Uuid,
    },
    /// Aggregate a whole cohort
    Cohort {
        #[arg(long)]
        cohort: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Records awaiting review
    Pending,
    /// Approve a pending clinical log or hour submission
    Approve {
        #[command(flatten)]
        target: TargetArgs,
        #[arg(long)]
        feedback: Option<String>,
        #[arg(long)]
        reviewer: Option<String>,
    },
    /// Reject a pending clinical log or hour submission
    Reject {
        #[command(flatten)]
        target: TargetArgs,
        #[arg(long)]
        feedback: String,
        #[arg(long)]
        reviewer: Option<String>,
    },
    /// Record completed make-up hours
    MakeupProgress {
        #[arg(long)]
        id: Uuid,
        #[arg(long)]
        hours: f64,
    },
    /// Mark a make-up obligation completed
    MakeupComplete {
        #[arg(long)]
        id: Uuid,
    },
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("clinical_hours_compliance=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => EngineConfig::default(),
    };
    cli.thresholds.apply(&mut config);

    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    let engine = ComplianceEngine::new(Arc::new(PgStore::new(pool.clone())), config)?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Ingest { file } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let batch: IntakeBatch = serde_json::from_str(&content)?;
            let known = db::known_student_ids(&pool).await?;
            let scenarios = db::vr_scenario_defaults(&pool).await?;
            let accepted = batch.validate(&known, &scenarios, chrono::Utc::now());
            for rejection in accepted.rejections.iter() {
                println!(
                    "Rejected record {} (student {}): {}",
                    rejection.index, rejection.student_id, rejection.error
                );
            }
            let inserted = db::ingest(&pool, &accepted).await?;
            println!("Inserted {inserted} records from {}.", file.display());
        }
        Commands::SyncMakeup => {
            let created = db::sync_makeup_from_attendance(&pool, engine.config()).await?;
            println!("Created {created} make-up obligations.");
        }
        Commands::Summary { student } => {
            let summary = engine.compute_compliance_summary(student).await?;
            if cli.json {
                return print_json(&summary);
            }
            println!(
                "{:.1}h total ({:.1}h direct, {:.1}h simulation) of {:.0}h required: {}",
                summary.total_hours,
                summary.direct_hours,
                summary.sim_hours,
                summary.hours_required,
                summary.progress_band.label()
            );
            println!(
                "Simulation share {:.1}% ({})",
                summary.sim_cap_display,
                if summary.is_sim_compliant { "within cap" } else { "OVER CAP" }
            );
            for (site, hours) in summary.sites.iter() {
                println!(
                    "- {site}: {:.1}h direct, {:.1}h simulation",
                    hours.direct_hours, hours.sim_hours
                );
            }
            if !summary.heuristic_entries.is_empty() {
                println!(
                    "{} logs were classified by site name and need review.",
                    summary.heuristic_entries.len()
                );
            }
            if summary.estimated_entries > 0 {
                println!(
                    "{} logs had no hours and were credited with an estimate.",
                    summary.estimated_entries
                );
            }
        }
        Commands::Flags { student } => {
            let flags = engine.compute_flags(student).await?;
            if cli.json {
                return print_json(&flags);
            }
            if flags.is_empty() {
                println!("No flags.");
            }
            for flag in flags.iter() {
                println!(
                    "[{:?}] {}: {}{}",
                    flag.severity,
                    flag.kind.as_str(),
                    flag.message,
                    flag.details.as_deref().map(|d| format!(" ({d})")).unwrap_or_default()
                );
            }
        }
        Commands::Makeup { student } => {
            let reconciliation = engine.reconcile_makeup_hours(student).await?;
            if cli.json {
                return print_json(&reconciliation);
            }
            println!(
                "Owed {:.1}h, completed {:.1}h, balance {:.1}h",
                reconciliation.total_owed, reconciliation.total_completed, reconciliation.balance
            );
            for obligation in reconciliation.obligations.iter() {
                println!(
                    "- {} {:.1}/{:.1}h due {}",
                    obligation.id,
                    obligation.hours_completed,
                    obligation.hours_owed,
                    obligation
                        .due_date
                        .map(|d| d.to_string())
                        .unwrap_or_else(|| "unscheduled".to_string())
                );
            }
        }
        Commands::Attendance { student } => {
            let summary = engine.attendance_summary(student).await?;
            if cli.json {
                return print_json(&summary);
            }
            println!(
                "{} present, {} absences ({} clinical), {} tardies ({} clinical), {} excused",
                summary.total_present,
                summary.total_absences,
                summary.clinical_absences,
                summary.total_tardies,
                summary.clinical_tardies,
                summary.total_excused
            );
            if summary.total_partial > 0 {
                println!(
                    "{} partial days, {:.1}h missed",
                    summary.total_partial, summary.partial_hours_missed
                );
            }
        }
        Commands::Vr { student } => {
            let summary = engine.vr_summary(student).await?;
            if cli.json {
                return print_json(&summary);
            }
            println!(
                "{:.1}h VR of {:.0}h allowed ({:.1}% used); {} required scenarios done",
                summary.total_vr_hours,
                summary.max_allowed_hours,
                summary.percentage_used,
                summary.required_completed
            );
            for name in summary.required_outstanding.iter() {
                println!("- outstanding: {name}");
            }
        }
        Commands::Cohort { cohort, limit } => {
            let ids = engine.store().cohort_student_ids(&cohort).await?;
            if ids.is_empty() {
                println!("No students found for cohort {cohort}.");
                return Ok(());
            }
            let results = engine.aggregate_cohort(&ids).await;
            if cli.json {
                let view: BTreeMap<String, serde_json::Value> = results
                    .iter()
                    .map(|(id, result)| -> anyhow::Result<(String, serde_json::Value)> {
                        let value = match result {
                            Ok(summary) => serde_json::to_value(summary)?,
                            Err(e) => serde_json::json!({ "error": e.to_string() }),
                        };
                        Ok((id.to_string(), value))
                    })
                    .collect::<anyhow::Result<_>>()?;
                return print_json(&view);
            }
            let mut students = BTreeMap::new();
            for id in ids.iter() {
                if let Some(student) = engine.store().fetch_student(*id).await? {
                    students.insert(*id, student);
                }
            }
            print!("{}", report::build_digest(&cohort, &students, &results, limit));
        }
        Commands::Pending => {
            let pending = engine.pending_reviews().await?;
            if cli.json {
                return print_json(&pending);
            }
            if pending.is_empty() {
                println!("Nothing awaiting review.");
            }
            for item in pending.iter() {
                println!(
                    "- {:?} {} on {} at {} ({})",
                    item.target,
                    item.student_name,
                    item.date,
                    item.site_name,
                    item.hours
                        .map(|h| format!("{h:.1}h"))
                        .unwrap_or_else(|| "no hours".to_string())
                );
            }
        }
        Commands::Approve {
            target,
            feedback,
            reviewer,
        } => {
            let receipt = engine
                .workflow()
                .approve(target.target()?, feedback.as_deref(), reviewer.as_deref())
                .await?;
            if cli.json {
                return print_json(&receipt);
            }
            println!(
                "Approved. Student {} now has {:.1} approved hours.",
                receipt.student_id,
                receipt.clinical_hours_completed.unwrap_or_default()
            );
        }
        Commands::Reject {
            target,
            feedback,
            reviewer,
        } => {
            let receipt = engine
                .workflow()
                .reject(target.target()?, &feedback, reviewer.as_deref())
                .await?;
            if cli.json {
                return print_json(&receipt);
            }
            println!("Rejected record for student {}.", receipt.student_id);
        }
        Commands::MakeupProgress { id, hours } => {
            let obligation = engine.workflow().record_makeup_hours(id, hours).await?;
            if cli.json {
                return print_json(&obligation);
            }
            println!(
                "Recorded {hours:.1}h; {:.1}h remaining.",
                obligation.balance().max(0.0)
            );
        }
        Commands::MakeupComplete { id } => {
            let obligation = engine.workflow().complete_makeup(id).await?;
            if cli.json {
                return print_json(&obligation);
            }
            println!("Make-up obligation {} completed.", obligation.id);
        }
    }

    Ok(())
}
