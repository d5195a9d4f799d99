use std::fmt;
use std::sync::Arc;

use services::{AppServices, Clock, RestConfig, RestProgressStore, SweepOutcome, SyncConfig};
use storage::remote::{InMemoryRemoteStore, RemoteProgressStore};
use study_core::UserProgress;
use study_core::model::{Curriculum, SyncStatus, TaskId, UserId};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const BUNDLED_CURRICULUM: &str = include_str!("../curriculum.json");

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingOperand { command: &'static str, what: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidUser { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingOperand { command, what } => {
                write!(f, "{command} requires a {what}")
            }
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidUser { raw } => write!(f, "invalid --user value: {raw:?}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- status   [options]");
    eprintln!("  cargo run -p app -- complete <task-id> [options]");
    eprintln!("  cargo run -p app -- undo     <task-id> [options]");
    eprintln!("  cargo run -p app -- note     <task-id> <text> [options]");
    eprintln!("  cargo run -p app -- sync     [options]");
    eprintln!("  cargo run -p app -- demo     [options]");
    eprintln!("  cargo run -p app -- reset    [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>        default sqlite:tracker.sqlite3");
    eprintln!("  --curriculum <path>      JSON weeks file; bundled sample when omitted");
    eprintln!("  --user <id>              signed-in user; anonymous when omitted");
    eprintln!("  --demo                   run complete/undo/note against demo data");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  TRACKER_DB_URL, TRACKER_CURRICULUM, TRACKER_USER_ID,");
    eprintln!("  TRACKER_REMOTE_URL, TRACKER_REMOTE_KEY, TRACKER_REMOTE_TOKEN,");
    eprintln!("  TRACKER_SYNC_INTERVAL_SECS, TRACKER_SYNC_MAX_ATTEMPTS, RUST_LOG");
}

fn task_operand(
    args: &mut impl Iterator<Item = String>,
    command: &'static str,
) -> Result<TaskId, ArgsError> {
    args.next()
        .filter(|raw| !raw.starts_with("--"))
        .map(TaskId::new)
        .ok_or(ArgsError::MissingOperand {
            command,
            what: "task id",
        })
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Status,
    Complete(TaskId),
    Undo(TaskId),
    Note(TaskId, String),
    Sync,
    Demo,
    Reset,
}

impl Command {
    fn parse(args: &mut impl Iterator<Item = String>, name: &str) -> Result<Self, ArgsError> {
        match name {
            "status" => Ok(Self::Status),
            "complete" => Ok(Self::Complete(task_operand(args, "complete")?)),
            "undo" => Ok(Self::Undo(task_operand(args, "undo")?)),
            "note" => {
                let task_id = task_operand(args, "note")?;
                let text = args.next().ok_or(ArgsError::MissingOperand {
                    command: "note",
                    what: "note text",
                })?;
                Ok(Self::Note(task_id, text))
            }
            "sync" => Ok(Self::Sync),
            "demo" => Ok(Self::Demo),
            "reset" => Ok(Self::Reset),
            other => Err(ArgsError::UnknownArg(other.to_owned())),
        }
    }
}

struct Args {
    command: Command,
    db_url: String,
    curriculum_path: Option<String>,
    user: Option<UserId>,
    demo: bool,
}

impl Args {
    fn parse(argv: Vec<String>) -> Result<Self, ArgsError> {
        let mut args = argv.into_iter().peekable();

        let has_command = args.peek().is_some_and(|first| !first.starts_with("--"));
        let command = if has_command {
            let name = args.next().unwrap_or_default();
            Command::parse(&mut args, &name)?
        } else {
            Command::Status
        };

        let mut db_url = normalize_sqlite_url(
            std::env::var("TRACKER_DB_URL").unwrap_or_else(|_| "sqlite:tracker.sqlite3".into()),
        );
        let mut curriculum_path = std::env::var("TRACKER_CURRICULUM")
            .ok()
            .filter(|p| !p.trim().is_empty());
        let mut user = std::env::var("TRACKER_USER_ID")
            .ok()
            .and_then(|raw| raw.parse::<UserId>().ok());
        let mut demo = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--curriculum" => {
                    curriculum_path = Some(require_value(&mut args, "--curriculum")?);
                }
                "--user" => {
                    let value = require_value(&mut args, "--user")?;
                    let parsed = value
                        .parse::<UserId>()
                        .map_err(|_| ArgsError::InvalidUser { raw: value.clone() })?;
                    user = Some(parsed);
                }
                "--demo" => demo = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            command,
            db_url,
            curriculum_path,
            user,
            demo,
        })
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

fn load_curriculum(path: Option<&str>) -> Result<Curriculum, Box<dyn std::error::Error>> {
    let curriculum = match path {
        Some(path) => Curriculum::from_json(&std::fs::read_to_string(path)?)?,
        None => Curriculum::from_json(BUNDLED_CURRICULUM)?,
    };
    tracing::debug!(
        tasks = curriculum.total_tasks(),
        source = path.unwrap_or("bundled"),
        "curriculum loaded"
    );
    Ok(curriculum)
}

/// Remote store plus whether it is reachable at all.
fn remote_store() -> (Arc<dyn RemoteProgressStore>, bool) {
    match RestConfig::from_env() {
        Some(config) => {
            tracing::info!(base_url = %config.base_url, "using REST progress store");
            (Arc::new(RestProgressStore::new(config)), true)
        }
        None => {
            tracing::info!("no remote configured; changes stay local");
            (Arc::new(InMemoryRemoteStore::new()), false)
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_progress(progress: &UserProgress, curriculum: &Curriculum) {
    println!(
        "Completed {}/{} tasks ({}%), {} of {} points",
        progress.completed_tasks,
        progress.total_tasks,
        progress.completion_percentage,
        progress.points_earned,
        progress.total_points,
    );
    println!(
        "Streak: {} day(s), longest {}",
        progress.current_streak, progress.longest_streak
    );
    for (week, stats) in &progress.weeks {
        println!(
            "  week {week:>2}: {:>3}/{:<3} {:>3}%",
            stats.completed, stats.total, stats.percentage
        );
    }
    for (category, stats) in &progress.categories {
        if curriculum.category_total(*category) == 0 {
            continue;
        }
        println!(
            "  {category:<10} {:>3}/{:<3} {:>3}%",
            stats.completed, stats.total, stats.percentage
        );
    }
}

fn print_sync(status: &SyncStatus) {
    let last = status
        .last_sync
        .map_or_else(|| "never".to_owned(), |at| at.to_rfc3339());
    println!(
        "Sync: {:?}, {} pending, {} need attention, last sync {last}",
        status.badge(),
        status.pending_changes,
        status.needs_attention,
    );
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    if matches!(argv.first().map(String::as_str), Some("--help" | "-h")) {
        print_usage();
        return Ok(());
    }

    let args = Args::parse(argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    init_tracing();

    // Open + migrate SQLite at startup. Keep this in the binary glue so services stay pure.
    prepare_sqlite_file(&args.db_url)?;
    let curriculum = load_curriculum(args.curriculum_path.as_deref())?;
    let (remote, reachable) = remote_store();

    let services = AppServices::new_sqlite(
        &args.db_url,
        Clock::default_clock(),
        curriculum,
        remote,
        SyncConfig::from_env(),
    )
    .await?;
    if let Some(user) = &args.user {
        services.auth().sign_in(user.clone());
    }
    services.connectivity().set_online(reachable);
    services.start();

    let store = services.store();
    let demo = args.demo || args.command == Command::Demo;
    if demo {
        store.load_demo_data().await;
    } else {
        store.hydrate().await;
    }

    let progress = match &args.command {
        Command::Status | Command::Demo => store.progress(),
        Command::Complete(task) | Command::Undo(task) if !store.curriculum().contains(task) => {
            eprintln!("unknown task: {task}");
            store.progress()
        }
        Command::Complete(task) => store.toggle_task(task, true).await,
        Command::Undo(task) => store.toggle_task(task, false).await,
        Command::Note(task, text) => {
            if !store.set_note(task, Some(text.clone())).await {
                eprintln!("{task} is not completed; complete it before adding a note");
            }
            store.progress()
        }
        Command::Sync => {
            match services.sync().force_sync().await {
                SweepOutcome::Completed { delivered } => println!("Synced {delivered} task(s)"),
                SweepOutcome::Partial { delivered, failed } => {
                    println!("Synced {delivered} task(s), {failed} still pending");
                }
                SweepOutcome::Skipped(reason) => println!("Sync skipped: {reason:?}"),
            }
            store.progress()
        }
        Command::Reset => {
            let progress = store.clear_demo_data().await;
            println!("Local progress cleared");
            progress
        }
    };

    // One-shot runs flush what they queued before exiting.
    if !demo
        && matches!(
            args.command,
            Command::Complete(_) | Command::Undo(_) | Command::Note(..)
        )
    {
        services.sync().sync_pending_changes().await;
    }
    services.stop().await;

    if demo {
        println!("[demo mode]");
    }
    print_progress(&progress, store.curriculum());
    print_sync(&services.sync().status());
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn no_arguments_means_status() {
        let args = Args::parse(argv(&["--db", "sqlite::memory:"])).unwrap();
        assert_eq!(args.command, Command::Status);
        assert_eq!(args.db_url, "sqlite::memory:");
        assert!(!args.demo);
    }

    #[test]
    fn note_takes_task_and_text() {
        let args = Args::parse(argv(&["note", "w1-d1-hiragana-k", "ki vs sa", "--demo"])).unwrap();
        assert_eq!(
            args.command,
            Command::Note(TaskId::new("w1-d1-hiragana-k"), "ki vs sa".into())
        );
        assert!(args.demo);
    }

    #[test]
    fn complete_requires_a_task() {
        let err = Args::parse(argv(&["complete", "--demo"])).err().unwrap();
        assert!(matches!(err, ArgsError::MissingOperand { command: "complete", .. }));
    }

    #[test]
    fn blank_user_is_rejected() {
        let err = Args::parse(argv(&["status", "--user", "  "])).err().unwrap();
        assert!(matches!(err, ArgsError::InvalidUser { .. }));
    }

    #[test]
    fn bundled_curriculum_is_valid() {
        let curriculum = Curriculum::from_json(BUNDLED_CURRICULUM).unwrap();
        assert_eq!(curriculum.weeks().count(), 2);
        assert_eq!(curriculum.total_tasks(), 13);
    }
}
