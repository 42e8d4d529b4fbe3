use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::info;

use distribution_planner::api::{self, AppState};
use distribution_planner::cache::InMemoryGeocodeCache;
use distribution_planner::directory::InMemoryClientDirectory;
use distribution_planner::geocoding::{GeocodingConfig, GeocodingGateway};
use distribution_planner::haversine::HaversineMatrix;
use distribution_planner::jobs::{DeferredConfig, DeferredPlanner, LocalTaskQueue};
use distribution_planner::nominatim::{NominatimClient, NominatimConfig};
use distribution_planner::osrm::{OsrmClient, OsrmConfig};
use distribution_planner::planner::{DistributionPlanner, PlanRequest, PlannerOptions};
use distribution_planner::sequencer::{RouteSequencer, SequenceOptions};
use distribution_planner::traits::RoutingService;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the plan API.
    Serve {
        #[arg(long, env = "PLANNER_BIND", default_value = "127.0.0.1:8080")]
        bind: String,

        /// JSON array of client records served by id.
        #[arg(long, env = "PLANNER_CLIENTS")]
        clients: PathBuf,

        #[arg(long, env = "PLANNER_WORKERS", default_value_t = 2)]
        workers: usize,

        #[arg(long, env = "PLANNER_JOB_ATTEMPTS", default_value_t = 3)]
        job_attempts: u32,

        #[arg(long, env = "PLANNER_JOB_RETRY_DELAY_SECS", default_value_t = 2)]
        job_retry_delay_secs: u64,

        /// Finished job statuses kept for polling; older ones are dropped.
        #[arg(long, env = "PLANNER_RETAIN_JOBS", default_value_t = 1024)]
        retain_jobs: usize,

        #[command(flatten)]
        services: ServiceArgs,
    },
    /// Build one plan from a request file and print it as JSON.
    Plan {
        #[arg(short, long)]
        input: PathBuf,

        #[command(flatten)]
        services: ServiceArgs,
    },
}

#[derive(Args)]
struct ServiceArgs {
    #[arg(long, env = "NOMINATIM_URL", default_value = "https://nominatim.openstreetmap.org")]
    nominatim_url: String,

    #[arg(long, env = "NOMINATIM_USER_AGENT")]
    user_agent: Option<String>,

    /// Routing is local-only when unset.
    #[arg(long, env = "OSRM_URL")]
    osrm_url: Option<String>,

    #[arg(long, env = "OSRM_PROFILE", default_value = "car")]
    osrm_profile: String,

    #[arg(long, env = "GEOCODE_REQUESTS_PER_SEC", default_value_t = 50.0, value_parser = positive_f64)]
    geocode_rps: f64,

    #[arg(long, env = "GEOCODE_MAX_IN_FLIGHT", default_value_t = 8)]
    geocode_max_in_flight: usize,

    #[arg(long, env = "PLANNER_TWO_OPT_PASSES", default_value_t = 4)]
    two_opt_passes: usize,

    #[arg(long, env = "PLANNER_SPEED_KMH", default_value_t = 40.0, value_parser = positive_f64)]
    speed_kmh: f64,

    #[arg(long, env = "PLANNER_DEADLINE_SECS")]
    deadline_secs: Option<u64>,
}

fn positive_f64(value: &str) -> Result<f64, String> {
    match value.parse::<f64>() {
        Ok(parsed) if parsed.is_finite() && parsed > 0.0 => Ok(parsed),
        Ok(_) => Err(format!("{value} is not a positive number")),
        Err(err) => Err(err.to_string()),
    }
}

fn build_planner(args: &ServiceArgs) -> anyhow::Result<Arc<DistributionPlanner>> {
    let mut nominatim = NominatimConfig {
        base_url: args.nominatim_url.clone(),
        ..NominatimConfig::default()
    };
    if let Some(user_agent) = &args.user_agent {
        nominatim.user_agent = user_agent.clone();
    }
    let geocoder = NominatimClient::new(nominatim).context("building geocoding client")?;

    let config = GeocodingConfig {
        requests_per_sec: args.geocode_rps,
        max_in_flight: args.geocode_max_in_flight,
        ..GeocodingConfig::default()
    };
    let gateway = GeocodingGateway::new(
        Arc::new(geocoder),
        Arc::new(InMemoryGeocodeCache::new()),
        config.limiter()?,
        &config,
    )?;

    let routing = match &args.osrm_url {
        Some(base_url) => {
            let client = OsrmClient::new(OsrmConfig {
                base_url: base_url.clone(),
                profile: args.osrm_profile.clone(),
                ..OsrmConfig::default()
            })
            .context("building routing client")?;
            Some(Arc::new(client) as Arc<dyn RoutingService>)
        }
        None => None,
    };

    let sequencer = RouteSequencer::new(
        routing,
        HaversineMatrix::new(args.speed_kmh)?,
        SequenceOptions {
            max_two_opt_passes: args.two_opt_passes,
            ..SequenceOptions::default()
        },
    );

    let options = PlannerOptions {
        deadline: args.deadline_secs.map(Duration::from_secs),
    };

    Ok(Arc::new(DistributionPlanner::new(Arc::new(gateway), sequencer, options)))
}

async fn serve(bind: String, state: Arc<AppState>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    info!(%bind, "plan API listening");
    axum::serve(listener, api::router(state)).await?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    dotenvy::from_filename(".env.local").ok();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(if cli.debug {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    match cli.command {
        Commands::Serve {
            bind,
            clients,
            workers,
            job_attempts,
            job_retry_delay_secs,
            retain_jobs,
            services,
        } => {
            // blocking HTTP clients must be built outside the async runtime
            let planner = build_planner(&services)?;
            let directory = InMemoryClientDirectory::from_json_file(&clients)?;

            let deferred_config = DeferredConfig {
                workers,
                max_attempts: job_attempts,
                retry_delay: Duration::from_secs(job_retry_delay_secs),
                retain_finished: retain_jobs,
            };
            let queue = LocalTaskQueue::with_retention(deferred_config.workers, deferred_config.retain_finished)?;
            let deferred = DeferredPlanner::new(
                Arc::clone(&planner),
                Arc::new(queue),
                deferred_config.retry_policy(),
            );

            let state = Arc::new(AppState {
                directory: Arc::new(directory),
                planner,
                deferred,
            });

            tokio::runtime::Runtime::new()?.block_on(serve(bind, state))
        }
        Commands::Plan { input, services } => {
            let raw = fs::read_to_string(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let request: PlanRequest = serde_json::from_str(&raw).context("parsing plan request")?;

            let planner = build_planner(&services)?;
            let plan = planner.build_plan(&request)?;
            println!("{}", serde_json::to_string_pretty(&plan)?);
            Ok(())
        }
    }
}
