use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rollcall_store::{render_csv, SqliteStore};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall attendance administration CLI")]
struct Cli {
    /// SQLite database path (defaults to $ROLLCALL_DB_PATH, then the
    /// user data directory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage camera configurations
    #[command(subcommand)]
    Camera(CameraCommands),
    /// Manage the identity roster
    #[command(subcommand)]
    Roster(RosterCommands),
    /// Attendance reports
    #[command(subcommand)]
    Report(ReportCommands),
}

#[derive(Subcommand)]
enum CameraCommands {
    /// Add a camera (device index like "0", or a stream URL)
    Add {
        /// Unique camera name
        name: String,
        /// Capture source: device index or MJPEG URL
        #[arg(short, long)]
        source: String,
        /// Match distance threshold in (0, 1]
        #[arg(short, long, default_value_t = 0.6)]
        threshold: f32,
    },
    /// List configured cameras
    List,
    /// Remove a camera by name
    Remove { name: String },
}

#[derive(Subcommand)]
enum RosterCommands {
    /// Register an identity with an existing reference image
    Add {
        /// External identifier (badge or student ID)
        id: String,
        /// Display name
        #[arg(short, long)]
        name: String,
        /// Path to the reference face image
        #[arg(short, long)]
        image: PathBuf,
    },
    /// List identities
    List {
        /// Include deactivated identities
        #[arg(long)]
        all: bool,
    },
    /// Make an identity eligible for matching again
    Activate { id: String },
    /// Exclude an identity from matching without deleting its records
    Deactivate { id: String },
}

#[derive(Subcommand)]
enum ReportCommands {
    /// Print attendance records
    List {
        /// Restrict to one day (YYYY-MM-DD)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Case-insensitive name substring filter
        #[arg(long)]
        name: Option<String>,
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Export attendance records as CSV
    Csv {
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        name: Option<String>,
        /// Write to a file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let store = open_store(cli.db)?;

    match cli.command {
        Commands::Camera(cmd) => camera(&store, cmd),
        Commands::Roster(cmd) => roster(&store, cmd),
        Commands::Report(cmd) => report(&store, cmd),
    }
}

fn open_store(db: Option<PathBuf>) -> Result<SqliteStore> {
    let path = db
        .or_else(|| std::env::var("ROLLCALL_DB_PATH").ok().map(PathBuf::from))
        .unwrap_or_else(default_db_path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }
    SqliteStore::open(&path).with_context(|| format!("opening database {}", path.display()))
}

fn default_db_path() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall/attendance.db")
}

fn camera(store: &SqliteStore, cmd: CameraCommands) -> Result<()> {
    match cmd {
        CameraCommands::Add { name, source, threshold } => {
            anyhow::ensure!(
                threshold > 0.0 && threshold <= 1.0,
                "threshold {threshold} outside (0, 1]"
            );
            let camera = store.insert_camera(&name, &source, threshold)?;
            println!("Added camera {:?} (source {:?})", camera.name, camera.source);
        }
        CameraCommands::List => {
            let cameras = store.list_cameras()?;
            if cameras.is_empty() {
                println!("No cameras configured");
            }
            for camera in cameras {
                println!(
                    "{}\t{}\tsource={}\tthreshold={}",
                    camera.id, camera.name, camera.source, camera.threshold
                );
            }
        }
        CameraCommands::Remove { name } => {
            if store.remove_camera(&name)? {
                println!("Removed camera {name:?}");
            } else {
                anyhow::bail!("no camera named {name:?}");
            }
        }
    }
    Ok(())
}

fn roster(store: &SqliteStore, cmd: RosterCommands) -> Result<()> {
    match cmd {
        RosterCommands::Add { id, name, image } => {
            anyhow::ensure!(image.is_file(), "reference image {} not found", image.display());
            let image = image
                .canonicalize()
                .with_context(|| format!("resolving {}", image.display()))?;
            let record = store.insert_identity(&id, &name, &image.to_string_lossy())?;
            println!("Registered {} ({})", record.display_name, record.external_id);
        }
        RosterCommands::List { all } => {
            let identities = if all {
                store.list_identities()?
            } else {
                store.list_active_identities()?
            };
            if identities.is_empty() {
                println!("Roster is empty");
            }
            for identity in identities {
                let status = if identity.active { "active" } else { "inactive" };
                println!(
                    "{}\t{}\t{}\t{}",
                    identity.external_id, identity.display_name, status,
                    identity.reference_image_path
                );
            }
        }
        RosterCommands::Activate { id } => {
            store.set_identity_active(&id, true)?;
            println!("Activated {id}");
        }
        RosterCommands::Deactivate { id } => {
            store.set_identity_active(&id, false)?;
            println!("Deactivated {id}");
        }
    }
    Ok(())
}

fn report(store: &SqliteStore, cmd: ReportCommands) -> Result<()> {
    match cmd {
        ReportCommands::List { date, name, json } => {
            let rows = store.list_attendance(date, name.as_deref())?;
            if json {
                let entries: Vec<_> = rows
                    .iter()
                    .map(|row| {
                        serde_json::json!({
                            "name": row.display_name,
                            "id": row.external_id,
                            "date": row.record.date,
                            "check_in_time": row.record.check_in_time,
                            "check_out_time": row.record.check_out_time,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                if rows.is_empty() {
                    println!("No attendance records");
                }
                for row in rows {
                    let check_in = row
                        .record
                        .check_in_time
                        .map(|t| t.format("%H:%M:%S").to_string())
                        .unwrap_or_else(|| "-".to_string());
                    let check_out = row
                        .record
                        .check_out_time
                        .map(|t| t.format("%H:%M:%S").to_string())
                        .unwrap_or_else(|| "-".to_string());
                    println!(
                        "{}\t{}\t{}\tin={}\tout={}",
                        row.record.date, row.display_name, row.external_id, check_in, check_out
                    );
                }
            }
        }
        ReportCommands::Csv { date, name, out } => {
            let rows = store.list_attendance(date, name.as_deref())?;
            let csv = render_csv(&rows);
            match out {
                Some(path) => {
                    std::fs::write(&path, csv)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("Wrote {} rows to {}", rows.len(), path.display());
                }
                None => print!("{csv}"),
            }
        }
    }
    Ok(())
}
