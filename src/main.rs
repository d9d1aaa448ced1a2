#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::FmtSubscriber;

use region_layout::config::{parse_level, Settings};
use region_layout::constants::grid::{DEFAULT_COL_SPAN, DEFAULT_ROW_SPAN};
use region_layout::{
    GridPosition, LayoutController, LayoutExport, MemoryLayoutApi, Region, RegionStore, RegionType, UserRole,
};

#[derive(Parser, Debug)]
#[command(name = "region-layout", version, about = "Edit grid dashboard layouts")]
struct Cli {
    /// Settings file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// User whose default layout is edited
    #[arg(long, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the regions of the layout
    Show {
        #[arg(long)]
        json: bool,
    },
    /// Add a region, at the first free slot unless a position is given
    Add {
        region_type: String,
        #[arg(long, requires = "col")]
        row: Option<u32>,
        #[arg(long, requires = "row")]
        col: Option<u32>,
        #[arg(long)]
        rows: Option<u32>,
        #[arg(long)]
        cols: Option<u32>,
    },
    /// Move a region to another cell
    Move { id: String, row: u32, col: u32 },
    /// Change how many rows and columns a region spans
    Resize { id: String, rows: u32, cols: u32 },
    /// Collapse or expand a region
    Collapse { id: String },
    /// Lock or unlock a region
    Lock { id: String },
    Remove { id: String },
    /// Replace every region with the default template of a role
    Reset {
        #[arg(long)]
        role: UserRole,
    },
    /// Write the layout as JSON to a file, or stdout without one
    Export { path: Option<PathBuf> },
    /// Replace the layout with an exported file
    Import { path: PathBuf },
    #[command(subcommand)]
    Versions(VersionCommand),
}

#[derive(Subcommand, Debug)]
enum VersionCommand {
    List,
    Create { label: String },
    Publish { id: String },
    Revert { id: String },
}

fn print_regions(regions: &[Region]) {
    if regions.is_empty() {
        println!("(no regions)");
        return;
    }
    for region in regions {
        let mut flags = String::new();
        if region.is_collapsed {
            flags.push_str(" collapsed");
        }
        if region.is_locked {
            flags.push_str(" locked");
        }
        println!(
            "{:<12} {:<16} row {:>2} col {:>2}  {}x{}  v{}{}",
            region.id,
            region.region_type,
            region.grid_row,
            region.grid_col,
            region.row_span,
            region.col_span,
            region.version,
            flags
        );
    }
}

async fn run(controller: &LayoutController<MemoryLayoutApi>, command: Command) -> Result<()> {
    match command {
        Command::Show { json } => {
            let regions = controller.regions();
            if json {
                println!("{}", serde_json::to_string_pretty(&regions)?);
            } else {
                print_regions(&regions);
            }
        }
        Command::Add {
            region_type,
            row,
            col,
            rows,
            cols,
        } => {
            let position = row.zip(col).map(|(row, col)| {
                GridPosition::new(
                    row,
                    col,
                    rows.unwrap_or(DEFAULT_ROW_SPAN),
                    cols.unwrap_or(DEFAULT_COL_SPAN),
                )
            });
            let region = controller.add_region(RegionType::new(region_type), position).await?;
            println!("{}", region.id);
        }
        Command::Move { id, row, col } => {
            let pos = controller.update_region_position(&id, row, col)?;
            println!("{id} now at row {} col {}", pos.row, pos.col);
        }
        Command::Resize { id, rows, cols } => {
            let pos = controller.update_region_size(&id, rows, cols)?;
            println!("{id} now spans {}x{}", pos.row_span, pos.col_span);
        }
        Command::Collapse { id } => {
            let collapsed = controller.toggle_collapse(&id)?;
            println!("{id} {}", if collapsed { "collapsed" } else { "expanded" });
        }
        Command::Lock { id } => {
            let locked = controller.toggle_lock(&id)?;
            println!("{id} {}", if locked { "locked" } else { "unlocked" });
        }
        Command::Remove { id } => {
            controller.remove_region(&id).await?;
            println!("removed {id}");
        }
        Command::Reset { role } => {
            let regions = controller.load_role_defaults(role).await?;
            print_regions(&regions);
        }
        Command::Export { path } => {
            let export = controller.export_layout()?;
            match path {
                Some(path) => export.write_to(&path)?,
                None => println!("{}", export.to_json()?),
            }
        }
        Command::Import { path } => {
            let export = LayoutExport::read_from(&path)?;
            let regions = controller.import_layout(&export).await?;
            print_regions(&regions);
        }
        Command::Versions(VersionCommand::List) => {
            for version in controller.list_versions().await? {
                println!(
                    "{:<12} #{:<3} {:<24} {} regions{}",
                    version.id,
                    version.version_number,
                    version.label,
                    version.regions.len(),
                    if version.is_published { " (published)" } else { "" }
                );
            }
        }
        Command::Versions(VersionCommand::Create { label }) => {
            let version = controller.create_version(&label).await?;
            println!("{}", version.id);
        }
        Command::Versions(VersionCommand::Publish { id }) => {
            controller.publish_version(&id).await?;
            println!("published {id}");
        }
        Command::Versions(VersionCommand::Revert { id }) => {
            let regions = controller.revert_to_version(&id).await?;
            print_regions(&regions);
        }
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings_path = cli.config.clone().unwrap_or_else(Settings::path);

    // LOG_LEVEL wins over the settings file; the subscriber has to exist
    // before settings are loaded so their log lines are not lost
    let log_level = std::env::var("LOG_LEVEL")
        .map(|name| parse_level(&name))
        .ok()
        .or_else(|| Settings::stored_level(&settings_path))
        .unwrap_or(tracing::Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let settings = Settings::load_from(&settings_path)?;

    let data_path = settings.data_path();
    let api = MemoryLayoutApi::load(&data_path, settings.grid)?;
    let store = RegionStore::new(settings.history_limit).shared();
    let mut controller = LayoutController::new(Arc::new(api), store, settings.engine());

    let user = cli.user.unwrap_or_else(|| settings.user_id.clone());
    let layout = controller
        .load_default(&user)
        .await
        .with_context(|| format!("Failed to load layout for user {user}"))?;
    info!(layout = %layout.id, user = %user, "Editing layout");

    let outcome = run(&controller, cli.command).await;

    let report = controller.flush().await?;
    if !report.is_clean() {
        warn!(?report, "Some edits were not saved");
    }
    controller.api().save(&data_path)?;
    outcome
}
