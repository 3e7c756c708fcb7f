use clap::{Args, Parser, Subcommand};
use core_jobs::{get_db_pool, setup_logging};
use data_model_jobs::{
    lifecycle::Stage,
    models::{JobKey, JobSource, JobStatus},
};
use store_jobs::{
    ClaimOutcome, CreateStubOutcome, DeleteOutcome, UpdateOutcome, claim_next, claim_stage, count_by_status,
    create_stub, delete_stub, get_details, get_form_fields, get_stub, update_status,
};

#[derive(Parser)]
#[command(name = "jobs")]
#[command(about = "Inspect the job pipeline and move jobs by hand", long_about = None)]
struct JobsCli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a newly discovered job.
    CreateStub(Key),

    /// Claim the oldest job in one status, moving it to another.
    Claim(ClaimTarget),

    /// Set a job's status unconditionally. Used to requeue jobs stuck in an in-progress status.
    SetStatus {
        #[command(flatten)]
        key: Key,
        /// The status to move the job to.
        #[arg(value_parser = parse_status)]
        status: JobStatus,
    },

    /// Print a job with its details and form fields as JSON.
    Show(Key),

    /// Number of jobs in each status.
    Counts,

    /// Delete a job together with its details and form fields.
    Delete(Key),
}

#[derive(Args)]
struct Key {
    /// The job's id on its source site.
    external_id: i64,
    /// Site the job was discovered on.
    #[arg(short, long, default_value = "djinni", value_parser = parse_source)]
    source: JobSource,
}

impl Key {
    fn job_key(&self) -> JobKey {
        JobKey::new(self.source, self.external_id)
    }
}

#[derive(Args)]
#[group(required = true, multiple = true)]
struct ClaimTarget {
    /// Claim for a pipeline stage: from its ready status to its in-progress status.
    #[arg(long, value_parser = parse_stage, conflicts_with_all = ["from", "to"])]
    stage: Option<Stage>,
    /// Status to claim from.
    #[arg(long, value_parser = parse_status, requires = "to")]
    from: Option<JobStatus>,
    /// Status to move the claimed job to.
    #[arg(long, value_parser = parse_status, requires = "from")]
    to: Option<JobStatus>,
}

fn parse_status(s: &str) -> Result<JobStatus, String> {
    s.parse::<JobStatus>().map_err(|e| {
        let valid: Vec<&str> = JobStatus::ALL.iter().map(|status| status.as_str()).collect();
        format!("{}. Valid statuses: {}", e, valid.join(", "))
    })
}

fn parse_stage(s: &str) -> Result<Stage, String> {
    s.parse::<Stage>().map_err(|e| {
        let valid: Vec<&str> = Stage::ALL.iter().map(|stage| stage.as_str()).collect();
        format!("{}. Valid stages: {}", e, valid.join(", "))
    })
}

fn parse_source(s: &str) -> Result<JobSource, String> {
    s.parse::<JobSource>().map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = JobsCli::parse();

    // Load environment variables from .env file., if it exists
    dotenvy::dotenv().ok();
    setup_logging("jobs=info,store_jobs=info");

    let pool = get_db_pool().await?;

    match cli.command {
        Commands::CreateStub(key) => match create_stub(&pool, key.job_key()).await? {
            CreateStubOutcome::Created { id, key } => println!("Created {} ({})", key, id),
            CreateStubOutcome::Duplicate { key } => println!("Job {} already exists", key),
        },

        Commands::Claim(target) => {
            let outcome = match (target.stage, target.from, target.to) {
                (Some(stage), _, _) => claim_stage(&pool, stage).await?,
                (None, Some(from), Some(to)) => claim_next(&pool, from, to).await?,
                _ => anyhow::bail!("Either --stage or both --from and --to are required"),
            };
            match outcome {
                ClaimOutcome::Claimed(job) => println!("Claimed {} ({}) -> {}", job.key, job.id, job.status),
                ClaimOutcome::NotFound => println!("No job available to claim"),
            }
        }

        Commands::SetStatus { key, status } => {
            if let Some(current) = get_stub(&pool, key.job_key()).await?
                && !current.status.can_transition_to(status)
            {
                tracing::warn!(
                    "Job {} moved {} -> {} outside the normal lifecycle",
                    key.job_key(),
                    current.status,
                    status
                );
            }
            match update_status(&pool, key.job_key(), status).await? {
                UpdateOutcome::Updated { key, .. } => println!("Job {} -> {}", key, status),
                UpdateOutcome::NotFound { key } => {
                    println!("Job {} does not exist", key);
                    std::process::exit(1)
                }
            }
        }

        Commands::Show(key) => {
            let Some(stub) = get_stub(&pool, key.job_key()).await? else {
                println!("Job {} does not exist", key.job_key());
                std::process::exit(1)
            };
            let details = get_details(&pool, stub.id).await?;
            let form_fields = get_form_fields(&pool, stub.id).await?;
            let shown = serde_json::json!({
                "stub": stub,
                "details": details,
                "form_fields": form_fields,
            });
            println!("{}", serde_json::to_string_pretty(&shown)?);
        }

        Commands::Counts => {
            let counts = count_by_status(&pool).await?;
            if counts.is_empty() {
                println!("No jobs");
            }
            for (status, count) in counts {
                println!("{:<28}{}", status, count);
            }
        }

        Commands::Delete(key) => match delete_stub(&pool, key.job_key()).await? {
            DeleteOutcome::Deleted { id, key } => println!("Deleted {} ({})", key, id),
            DeleteOutcome::NotFound { key } => {
                println!("Job {} does not exist", key);
                std::process::exit(1)
            }
        },
    }

    tracing::debug!("Done");
    Ok(())
}
