use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use steelvis::api::{ApiClient, DataSource};
use steelvis::config::{self, Config};
use steelvis::dashboard::DashboardController;
use steelvis::model::ResourceKind;
use steelvis::paginate::ListController;
use steelvis::session::{Navigation, Session, DASHBOARD_PATH};
use steelvis::storage::Store;
use steelvis::training::TrainingController;
use steelvis::upload::{self, UploadTable};
use steelvis::views;

const DATA_MANAGEMENT_PATH: &str = "/data-management";

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Logistics visibility for plants, ports, rail trips and vessel contracts"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Mark this machine as logged in (no credentials are checked)
    Login,
    /// Clear the local login flag
    Logout,
    /// Print whether the login flag is set
    Whoami,
    /// Summary metrics for plants, ports and logistics
    Dashboard {
        /// Keep refreshing until interrupted
        #[arg(long)]
        watch: bool,
    },
    /// Paginated table of one resource
    List {
        /// plants, ports, trains, vessels or logistics
        resource: ResourceKind,
        /// Number of pages to load before printing
        #[arg(long, default_value = "1")]
        pages: u32,
        /// Keep re-fetching page 1 and print new rows until interrupted
        #[arg(long)]
        watch: bool,
    },
    /// Trigger a model training run and follow it until it finishes
    Train {
        /// Return right after triggering
        #[arg(long)]
        no_wait: bool,
    },
    /// Show the current training status once
    TrainingStatus,
    /// Bulk load a table from an .xlsx/.xls file
    Upload {
        /// plants, ports, trains, vessels, port_tariffs or vessel_delay_history
        #[arg(long)]
        table: UploadTable,
        #[arg(long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    cfg.ensure_dirs()?;

    let store = Store::open(&cfg.database_url()).await?;
    let mut session = Session::open(store.clone()).await?;

    match args.command {
        Command::Login => {
            session.login().await?;
            println!("Logged in.");
        }
        Command::Logout => {
            session.logout().await?;
            println!("Logged out.");
        }
        Command::Whoami => {
            if session.is_authenticated() {
                println!("Logged in.");
            } else {
                println!("Not logged in.");
            }
        }
        Command::Dashboard { watch } => {
            require(&session, DASHBOARD_PATH)?;
            run_dashboard(&cfg, connect(&cfg)?, watch).await?;
        }
        Command::List {
            resource,
            pages,
            watch,
        } => {
            require(&session, resource.route())?;
            run_list(&cfg, connect(&cfg)?, resource, pages, watch).await?;
        }
        Command::Train { no_wait } => {
            require(&session, DATA_MANAGEMENT_PATH)?;
            run_training(&cfg, connect(&cfg)?, store.clone(), no_wait).await?;
        }
        Command::TrainingStatus => {
            require(&session, DATA_MANAGEMENT_PATH)?;
            let training = TrainingController::open(connect(&cfg)?, store.clone()).await?;
            print!("{}", views::render_training(&training.mount().await));
        }
        Command::Upload { table, file } => {
            require(&session, DATA_MANAGEMENT_PATH)?;
            let source = connect(&cfg)?;
            let report = upload::upload_spreadsheet(source.as_ref(), table, &file).await?;
            if let Some(message) = &report.message {
                println!("{}", message);
            }
            println!("{}", serde_json::to_string_pretty(&report.raw)?);
        }
    }

    store.close().await;
    Ok(())
}

fn connect(cfg: &Config) -> Result<Arc<dyn DataSource>> {
    let client = ApiClient::new(cfg.base_url()?, cfg.app.request_timeout())?;
    info!(base_url = %client.base_url(), "using backend");
    Ok(Arc::new(client))
}

fn require(session: &Session, path: &str) -> Result<()> {
    match session.navigate(path) {
        Navigation::Render(_) => Ok(()),
        Navigation::Redirect(to) => {
            bail!("not logged in: {} redirects to {}; run `steelvis login` first", path, to)
        }
    }
}

/// Sleep for `every` or until Ctrl-C. Returns false once interrupted.
async fn tick_or_interrupt(every: Duration) -> bool {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => false,
        _ = tokio::time::sleep(every) => true,
    }
}

async fn run_dashboard(cfg: &Config, source: Arc<dyn DataSource>, watch: bool) -> Result<()> {
    let dashboard = DashboardController::new(source);
    dashboard.refresh().await;
    let snap = dashboard.snapshot().await;
    print!("{}", views::render_dashboard(&snap.summary, snap.error.as_deref()));
    if !watch {
        return Ok(());
    }

    let every = cfg.refresh_interval();
    let _refresh = dashboard.spawn_refresh(every);
    while tick_or_interrupt(every).await {
        let snap = dashboard.snapshot().await;
        println!();
        print!("{}", views::render_dashboard(&snap.summary, snap.error.as_deref()));
    }
    dashboard.close().await;
    Ok(())
}

async fn run_list(
    cfg: &Config,
    source: Arc<dyn DataSource>,
    resource: ResourceKind,
    pages: u32,
    watch: bool,
) -> Result<()> {
    let list = ListController::new(source, resource, cfg.api.page_size);
    list.mount().await;
    for _ in 1..pages.max(1) {
        if list.load_more().await.is_none() {
            break;
        }
    }
    print!("{}", views::render_list(&list.snapshot().await));
    if !watch {
        return Ok(());
    }

    let every = cfg.refresh_interval();
    let _refresh = list.spawn_refresh(every);
    let mut shown = list.snapshot().await.records.len();
    while tick_or_interrupt(every).await {
        let snap = list.snapshot().await;
        if snap.records.len() != shown {
            shown = snap.records.len();
            println!();
            print!("{}", views::render_list(&snap));
        }
    }
    list.close().await;
    Ok(())
}

async fn run_training(
    cfg: &Config,
    source: Arc<dyn DataSource>,
    store: Store,
    no_wait: bool,
) -> Result<()> {
    let training = TrainingController::open(source, store).await?;
    let current = training.mount().await;
    let snap = if current.polling {
        warn!(phase = %current.phase, "training already in progress; following it");
        current
    } else {
        training.start().await
    };
    print!("{}", views::render_training(&snap));
    if no_wait || !snap.polling {
        return Ok(());
    }

    let every = cfg.poll_interval();
    let done = tokio::select! {
        _ = tokio::signal::ctrl_c() => None,
        snap = training.poll_until_terminal(every) => Some(snap),
    };
    match done {
        Some(snap) => {
            println!();
            print!("{}", views::render_training(&snap));
        }
        None => {
            training.close().await;
            println!("Stopped following training; the run continues on the server.");
        }
    }
    Ok(())
}
