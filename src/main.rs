#![deny(clippy::implicit_return)]
#![allow(clippy::needless_return)]

mod application;
mod configuration;
mod domain;
mod infrastructure;

use std::env;
use std::process;
use std::time::Duration;

use anyhow::bail;
use anyhow::Error;
use anyhow::Result;
use domain::models::Action;
use domain::models::Event;
use infrastructure::collections::CollectionManager;
use tokio::sync::mpsc;
use tokio::task;
use yansi::Paint;

use crate::application::cli;
use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::services::LocalStore;
use crate::domain::services::Persistence;
use crate::domain::services::SyncWorker;

fn handle_error(err: Error) {
    eprintln!(
            "{}",
            Paint::red(format!(
                "Oh no! Canvas has failed with the following app version and error.\n\nVersion: {}\nCommit: {}\nError: {}",
                env!("CARGO_PKG_VERSION"),
                env!("VERGEN_GIT_DESCRIBE"),
                err
            ))
        );

    let backtrace = err.backtrace();
    if backtrace.to_string() == "disabled backtrace" {
        let args = env::args().collect::<Vec<String>>().join(" ");
        eprintln!("\nRunning the following can help explain further what the issue is:");
        eprintln!("\nRUST_BACKTRACE=1 {args}");
        eprintln!(
            "\nA debug log is written to {} when RUST_LOG=canvas is set.",
            cli::log_path().to_string_lossy()
        );
    } else {
        eprintln!("\n{}", backtrace);
    }

    process::exit(1);
}

/// Reconciles every project once, then keeps the selected project in sync on
/// an interval until interrupted. Every store change is saved as it lands.
async fn watch() -> Result<()> {
    let persistence = Persistence::default();
    let store = LocalStore::default();
    store.init(&persistence).await;
    if let Some(err) = &store.get_snapshot().error {
        bail!(format!(
            "Failed to load projects from {}: {err}",
            persistence.path().to_string_lossy()
        ));
    }

    let session = CollectionManager::session_from_config()?;
    if !session.is_active() {
        bail!("Syncing is disabled. Set remote-url and remote-token to sign in.");
    }

    let interval = match Config::get(ConfigKey::SyncInterval).parse::<u64>()? {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };

    let (action_tx, mut action_rx) = mpsc::unbounded_channel::<Action>();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();

    let mut background_futures = task::JoinSet::new();
    let worker =
        SyncWorker::new(store.clone(), session.clone()).with_persistence(persistence.clone());
    background_futures.spawn(async move {
        return worker.start(event_tx, &mut action_rx, interval).await;
    });

    let store_rx = store.subscribe();
    background_futures.spawn(async move {
        return persistence.start(store_rx).await;
    });

    action_tx.send(Action::SignIn(session))?;
    println!("Watching for changes. Press CTRL+C to stop.");

    loop {
        tokio::select! {
            Some(Event::SyncCompleted(component, outcome)) = event_rx.recv() => {
                println!("{}", cli::format_outcome(&store.get_snapshot(), &component, &outcome));
            }
            res = background_futures.join_next() => {
                if let Some(res) = res {
                    res??;
                }
                return Ok(());
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, stopping watch");
                break;
            }
        }
    }

    drop(action_tx);
    drop(store);
    while let Some(res) = background_futures.join_next().await {
        res??;
    }

    return Ok(());
}

#[tokio::main]
async fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        better_panic::Settings::auto().create_panic_handler()(panic_info);
    }));

    let debug_log_path = cli::log_path();
    let debug_log_dir = debug_log_path
        .parent()
        .map(|e| return e.to_path_buf())
        .unwrap_or_default();

    let file_appender = tracing_appender::rolling::never(debug_log_dir, "debug.log");
    let (writer, _guard) = tracing_appender::non_blocking(file_appender);
    if env::var("RUST_LOG")
        .unwrap_or_else(|_| return "".to_string())
        .contains("canvas")
    {
        tracing_subscriber::fmt()
            .json()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(writer)
            .init();
    }

    let ready_res = cli::parse().await;
    if let Err(ready_err) = ready_res {
        handle_error(ready_err);
        return;
    }
    if let Ok(false) = ready_res {
        process::exit(0);
    }

    if let Err(err) = watch().await {
        handle_error(err);
    }

    process::exit(0);
}
