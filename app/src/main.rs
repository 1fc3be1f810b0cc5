//! Todo Sync command-line entry point.
//!
//! # Usage
//!
//! ```bash
//! # Run the consumer until Ctrl+C
//! cargo run --bin todo-sync -- consume
//!
//! # Exercise the provider chain
//! cargo run --bin todo-sync -- list
//! cargo run --bin todo-sync -- get 5
//! cargo run --bin todo-sync -- create "Water the plants"
//! cargo run --bin todo-sync -- update 5 "Water the cactus"
//! cargo run --bin todo-sync -- delete 5
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use todo_sync_app::{Config, TodoSyncApp, cancel_on_signal};
use todo_sync_core::{CancellationToken, ExternalTodoService, ProviderId};
use todo_sync_runtime::metrics::MetricsServer;
use todo_sync_runtime::{ConsumerState, CreateOutcome, UpdateOutcome};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "todo-sync", version, about = "External todo sync pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Consume ExternalTodoCreated events until interrupted
    Consume,
    /// List all external todos
    List,
    /// Fetch one external todo by provider id
    Get {
        /// Provider id
        id: ProviderId,
    },
    /// Create an external todo and publish ExternalTodoCreated
    Create {
        /// Todo title
        title: String,
    },
    /// Replace the title of an external todo
    Update {
        /// Provider id
        id: ProviderId,
        /// New title
        title: String,
    },
    /// Delete an external todo
    Delete {
        /// Provider id
        id: ProviderId,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "todo_sync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    let mut metrics = config.metrics_addr.map(MetricsServer::new);
    if let Some(server) = metrics.as_mut() {
        server.start().context("Failed to start metrics exporter")?;
    }

    let app = TodoSyncApp::new(config).context("Failed to assemble application")?;
    let cancel = CancellationToken::new();
    let interrupt = cancel_on_signal(tokio::signal::ctrl_c(), cancel.clone());

    let result = run(&app, cli.command, &cancel).await;
    interrupt.abort();

    if let Err(e) = app.shutdown().await {
        tracing::error!(error = %e, "Publisher shutdown incomplete");
    }
    result
}

async fn run(app: &TodoSyncApp, command: Command, cancel: &CancellationToken) -> anyhow::Result<()> {
    match command {
        Command::Consume => consume(app, cancel).await,
        Command::List => {
            let todos = app.service().list(cancel).await?;
            for todo in &todos {
                println!("{}\t{}", todo.id, todo.title);
            }
            tracing::info!(count = todos.len(), "Listed external todos");
            Ok(())
        }
        Command::Get { id } => {
            match app.service().get_by_id(id, cancel).await? {
                Some(todo) => println!("{}\t{}", todo.id, todo.title),
                None => println!("External todo {id} not found"),
            }
            Ok(())
        }
        Command::Create { title } => {
            match app.commands().create(&title, cancel).await? {
                CreateOutcome::Rejected => println!("Provider rejected the todo"),
                CreateOutcome::Announced(record) => {
                    println!("Created {} and published ExternalTodoCreated", record.id);
                }
                CreateOutcome::Unannounced { record, error } => {
                    println!("Created {} but the event was not published: {error}", record.id);
                }
            }
            Ok(())
        }
        Command::Update { id, title } => {
            match app.commands().update(id, &title, cancel).await? {
                UpdateOutcome::NotFound => println!("External todo {id} not found"),
                UpdateOutcome::Rejected => println!("Provider rejected the update"),
                UpdateOutcome::Updated(record) => println!("Updated {id}: {}", record.title),
            }
            Ok(())
        }
        Command::Delete { id } => {
            if app.service().delete(id, cancel).await? {
                println!("Deleted {id}");
            } else {
                println!("Provider did not delete {id}");
            }
            Ok(())
        }
    }
}

async fn consume(app: &TodoSyncApp, cancel: &CancellationToken) -> anyhow::Result<()> {
    let handle = app
        .consumer()
        .context("Failed to create consumer")?
        .spawn(cancel.clone());
    let mut state = handle.subscribe_state();

    tracing::info!("Consumer running, press Ctrl+C to stop");

    tokio::select! {
        () = cancel.cancelled() => {
            tracing::info!("Shutting down gracefully...");
        }
        _ = state.wait_for(|s| *s == ConsumerState::Closed) => {
            tracing::warn!("Consumer stopped on its own");
        }
    }

    cancel.cancel();
    handle.join().await.context("Consumer task failed")?;
    Ok(())
}
