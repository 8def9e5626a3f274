//! `taskboard` command-line client.
//!
//! Talks to a `taskboard-server` over WebSocket. Configuration via CLI
//! flags, environment variables, or config file
//! (`~/.config/taskboard/config.toml`).
//!
//! ```bash
//! taskboard --email ada@example.com --password hunter22 sign-up
//! taskboard add-list Groceries
//! taskboard add-task <list-id> --title Milk --description 2% \
//!     --due 2024-01-01 --priority low
//! taskboard move <task-id> <list-id>-Low <list-id>-High
//! taskboard watch
//! ```

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;

use taskboard::board::Board;
use taskboard::config::{CliArgs, ClientConfig, Command};
use taskboard::context::ClientContext;
use taskboard::error::BoardError;
use taskboard::remote::RemoteBackend;
use taskboard::session::TodoSession;
use taskboard_proto::model::{ListId, TaskDraft, TaskId};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(2);
        }
    };

    // Logs go to a file so stdout carries only command output.
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());
    tracing::info!(command = ?cli.command, "taskboard starting");

    let prepared = config.to_remote_config().and_then(|remote| {
        let (email, password) = config.credentials()?;
        Ok((remote, email, password))
    });
    let (remote, email, password) = match prepared {
        Ok(v) => v,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(2);
        }
    };

    let ctx = match ClientContext::connect(&remote).await {
        Ok(ctx) => ctx,
        Err(e) => return fail(&e),
    };

    let output = Output { json: cli.json };
    let result = run(&ctx, &cli.command, email, password, output).await;
    ctx.shutdown();
    tracing::info!("taskboard exiting");

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail(&e),
    }
}

/// Initialize file-based logging.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure all
/// buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("taskboard.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

fn fail(error: &BoardError) -> ExitCode {
    tracing::error!(error = %error, "command failed");
    eprintln!("{}", error.user_message());
    ExitCode::FAILURE
}

type Ctx = ClientContext<RemoteBackend, RemoteBackend>;

async fn run(
    ctx: &Ctx,
    command: &Command,
    email: &str,
    password: &str,
    out: Output,
) -> Result<(), BoardError> {
    if *command == Command::SignUp {
        let user = ctx.sign_up(email, password).await?;
        out.value(&serde_json::json!({ "user_id": user }), || {
            format!("signed up as {user}")
        });
        return Ok(());
    }

    let user = ctx.log_in(email, password).await?;
    let session = ctx.open_session(user).await?;
    run_with_session(&session, command, out).await
}

async fn run_with_session(
    session: &TodoSession<RemoteBackend>,
    command: &Command,
    out: Output,
) -> Result<(), BoardError> {
    match command {
        Command::SignUp => {}
        Command::Lists => out.board(&session.board()),
        Command::AddList { name } => {
            let list = session.add_list(name).await?;
            out.value(&list, || format!("created list {} ({})", list.name, list.id));
        }
        Command::RenameList { id, name } => {
            session.rename_list(&ListId::new(id.as_str()), name).await?;
            out.value(&serde_json::json!({ "renamed": id }), || format!("renamed list {id}"));
        }
        Command::DeleteList { id } => {
            session.delete_list(&ListId::new(id.as_str())).await?;
            out.value(&serde_json::json!({ "deleted": id }), || format!("deleted list {id}"));
        }
        Command::AddTask {
            list_id,
            title,
            description,
            due,
            priority,
        } => {
            let draft = TaskDraft {
                title: title.clone(),
                description: description.clone(),
                due_date: due.clone(),
                priority: Some(*priority),
            };
            let task = session.add_task(&ListId::new(list_id.as_str()), &draft).await?;
            out.value(&task, || format!("created task {} ({})", task.title, task.id));
        }
        Command::DeleteTask { id } => {
            session.delete_task(&TaskId::new(id.as_str())).await?;
            out.value(&serde_json::json!({ "deleted": id }), || format!("deleted task {id}"));
        }
        Command::Move { task_id, from, to } => match session.move_task(task_id, from, to).await? {
            Some(assignment) => out.value(
                &serde_json::json!({
                    "task_id": assignment.task_id,
                    "from": assignment.from,
                    "to": assignment.to,
                }),
                || format!("moved {} to {}", assignment.task_id, assignment.to),
            ),
            None => out.value(&serde_json::Value::Null, || "nothing to move".to_string()),
        },
        Command::Watch => watch(session, out).await,
    }
    Ok(())
}

async fn watch(session: &TodoSession<RemoteBackend>, out: Output) {
    let mut updates = session.updates();
    out.board(&session.board());
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                out.board(&session.board());
            }
        }
    }
}

#[derive(Clone, Copy)]
struct Output {
    json: bool,
}

impl Output {
    fn value<T: serde::Serialize>(self, value: &T, text: impl FnOnce() -> String) {
        if self.json {
            match serde_json::to_string(value) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(error = %e, "failed to encode output"),
            }
        } else {
            println!("{}", text());
        }
    }

    fn board(self, board: &Board) {
        if self.json {
            let lists: Vec<_> = board
                .lists()
                .iter()
                .map(|list| {
                    let columns: serde_json::Map<_, _> = board
                        .columns(&list.id)
                        .into_iter()
                        .map(|(column, tasks)| {
                            (column.priority.to_string(), serde_json::json!(tasks))
                        })
                        .collect();
                    serde_json::json!({ "id": list.id, "name": list.name, "columns": columns })
                })
                .collect();
            self.value(&lists, String::new);
            return;
        }

        if board.lists().is_empty() {
            println!("no lists");
        }
        for list in board.lists() {
            println!("{} ({})", list.name, list.id);
            for (column, tasks) in board.columns(&list.id) {
                println!("  {} [{column}]", column.priority);
                for task in tasks {
                    println!("    {} ({}) due {}: {}", task.title, task.id, task.due_date, task.description);
                }
            }
        }
        println!();
    }
}
