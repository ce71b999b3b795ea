//! `Taskboard` demo.
//!
//! Runs two sessions against an in-memory backend and walks through a
//! create, assign, progress and delete cycle, printing each user's view.
//! Configuration via CLI flags, environment variables, or config file
//! (`~/.config/taskboard/config.toml`).
//!
//! ```bash
//! cargo run --bin taskboard
//! cargo run --bin taskboard -- --user bob --display-name Bob --filter assigned
//! TASKBOARD_LOG=debug cargo run --bin taskboard
//! ```

use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;

use taskboard::auth::Auth;
use taskboard::backend::Backend;
use taskboard::backend::memory::InMemoryBackend;
use taskboard::board::{TaskDraft, TaskFilter};
use taskboard::config::{CliArgs, ClientConfig, SessionConfig};
use taskboard::session::{Session, SessionSlot};
use taskboard_proto::presence::PresenceStatus;
use taskboard_proto::profile::UserId;
use taskboard_proto::task::Priority;

/// Users seeded into the demo directory.
const DEMO_USERS: [(&str, &str); 3] = [("alice", "Alice"), ("bob", "Bob"), ("carol", "Carol")];

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = CliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            ClientConfig::default()
        }
    };

    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());
    tracing::info!("taskboard starting");

    let backend = Arc::new(InMemoryBackend::with_feed_capacity(config.feed_capacity));
    for (id, name) in DEMO_USERS {
        backend.upsert_profile(&UserId::from(id), name).await?;
    }

    let me = UserId::new(config.user.clone().unwrap_or_else(|| "alice".to_string()));
    let teammate = if me.as_str() == "bob" {
        UserId::from("alice")
    } else {
        UserId::from("bob")
    };

    let auth = Auth::new();
    let mut slot = SessionSlot::new(Arc::clone(&backend), config.session_config());
    auth.sign_in(me.clone());
    slot.apply_auth(auth.current_user()).await?;
    let mut other = Session::start(Arc::clone(&backend), teammate.clone(), &SessionConfig::default()).await?;

    let Some(mine) = slot.session_mut() else {
        return Err("session did not start".into());
    };
    println!("Signed in as {} ({})", mine.display_name(), mine.user());

    let created = mine
        .board_mut()
        .create_task(TaskDraft {
            title: "Write release notes".to_string(),
            description: Some("Cover the sync and presence changes".to_string()),
            priority: Some(Priority::High),
            assignees: vec![teammate.clone()],
        })
        .await?;
    let scratch = mine
        .board_mut()
        .create_task(TaskDraft {
            title: "Scratch task".to_string(),
            priority: Some(Priority::Low),
            ..TaskDraft::default()
        })
        .await?
        .task;
    println!(
        "Created {:?}: {} assignment(s), {} notification(s)",
        created.task.title,
        created.assignments.len(),
        created.fan_out.created
    );

    other.pump();
    println!(
        "{} has {} unread notification(s)",
        other.display_name(),
        other.inbox().unread_count()
    );
    other.board_mut().set_progress(created.task.id, 50).await?;
    if let Some(assignment) = created.assignments.first() {
        other
            .board_mut()
            .update_assignment_progress(assignment.id, 50)
            .await?;
    }
    other.mark_notifications_read().await?;

    if let Err(e) = other.board_mut().delete_task(created.task.id).await {
        println!("{} tried to delete: {}", other.display_name(), e.user_message());
    }

    mine.pump();
    mine.board_mut().delete_task(scratch.id).await?;
    mine.resync_if_needed().await?;

    print_board(mine, &config.timestamp_format);
    other.pump();
    other.set_filter(TaskFilter::AssignedTo(teammate.clone()));
    print_board(&other, &config.timestamp_format);

    auth.sign_out();
    slot.apply_auth(auth.current_user()).await?;
    other.pump();
    println!(
        "After sign-out {} sees {} as {}",
        other.display_name(),
        me,
        presence_label(other.presence().status(&me))
    );

    other.shutdown();
    tracing::info!("taskboard exiting");
    Ok(())
}

/// Prints one session's filtered board with live presence.
fn print_board<B: Backend>(session: &Session<B>, timestamp_format: &str) {
    let counts = session.board().counts();
    println!();
    println!(
        "== {} | filter {:?} | all {} active {} completed {} mine {} | {} online ==",
        session.display_name(),
        session.filter(),
        counts.all,
        counts.active,
        counts.completed,
        counts.assigned_to_me,
        session.presence().online_count()
    );
    for row in session.rows() {
        let assignee = if row.assignees.is_empty() {
            "unassigned".to_string()
        } else {
            row.assignees
                .iter()
                .map(|p| format!("{} ({})", p.display_name, presence_label(p.status)))
                .collect::<Vec<_>>()
                .join(", ")
        };
        println!(
            "  [{}] {:<24} {:>4}  by {} ({})  -> {}  at {}{}",
            row.task
                .priority
                .map_or_else(|| "-".to_string(), |p| p.to_string()),
            row.task.title,
            row.task.progress,
            row.creator.display_name,
            presence_label(row.creator.status),
            assignee,
            format_timestamp(row.task.created_at, timestamp_format),
            if row.editable { "  (editable)" } else { "" },
        );
    }
}

const fn presence_label(status: PresenceStatus) -> &'static str {
    match status {
        PresenceStatus::Online => "online",
        PresenceStatus::Offline => "offline",
    }
}

/// Formats milliseconds since epoch in local time.
fn format_timestamp(ms: u64, format: &str) -> String {
    i64::try_from(ms)
        .ok()
        .and_then(chrono::DateTime::from_timestamp_millis)
        .map_or_else(
            || ms.to_string(),
            |utc| utc.with_timezone(&chrono::Local).format(format).to_string(),
        )
}

/// Initialize file-based logging.
///
/// Logs go to a file so they never interleave with the printed board.
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure all
/// buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("taskboard.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_env("TASKBOARD_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}
