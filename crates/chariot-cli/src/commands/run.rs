use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use chariot_config::ChariotConfig;
use chariot_core::{ChariotError, Program, Result};
use chariot_runtime::{AgentManager, MemoryLogSink, Runtime, SessionManager};

pub(super) async fn cmd_run(config: ChariotConfig, program: &Path, hold_secs: u64) -> Result<()> {
    let raw = std::fs::read_to_string(program)?;
    let program = Program::from_json(&raw)?;

    let agents = AgentManager::new(config.agents.clone());
    let sink = Arc::new(MemoryLogSink::new(config.runtime.log_buffer));
    let bootstrap = Runtime::builder()
        .sink(sink.clone())
        .agents(agents.clone())
        .build();

    if let Some(path) = config.runtime.bootstrap.clone() {
        load_bootstrap(&bootstrap, path).await?;
    }

    let sessions = SessionManager::new(
        bootstrap,
        Duration::from_secs(config.sessions.timeout_secs),
    );
    let id = sessions.create(None).await;
    let rt = sessions
        .get(id)
        .await
        .ok_or_else(|| ChariotError::Eval(format!("session {id} disappeared")))?;

    // Subscribe before the program can start agents.
    let mut events = agents.subscribe();

    let result = tokio::task::spawn_blocking(move || rt.exec_program(&program))
        .await
        .map_err(|e| ChariotError::Eval(format!("program execution panicked: {e}")))?;

    let value = match result {
        Ok(value) => value,
        Err(e) => {
            agents.shutdown();
            return Err(e);
        }
    };
    println!("{value}");

    if hold_secs > 0 && !agents.is_empty() {
        println!(
            "   Holding {} agent(s) for {hold_secs}s: {}",
            agents.len(),
            agents.list().join(", ")
        );

        let cancel = CancellationToken::new();
        let cleanup = {
            let sessions = sessions.clone();
            let cancel = cancel.clone();
            let interval = Duration::from_secs(config.sessions.cleanup_interval_secs.max(1));
            tokio::spawn(async move { sessions.run_cleanup(interval, cancel).await })
        };

        let deadline = tokio::time::sleep(Duration::from_secs(hold_secs));
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupted, stopping agents");
                    break;
                }
                event = events.recv() => match event {
                    Ok(event) => println!("{}", serde_json::to_string(&event)?),
                    Err(RecvError::Lagged(n)) => warn!(skipped = n, "event stream lagged"),
                    Err(RecvError::Closed) => break,
                },
            }
        }

        cancel.cancel();
        if let Err(e) = cleanup.await {
            warn!(error = %e, "session cleanup task failed");
        }
    }

    let stopped = agents.shutdown();
    if stopped > 0 {
        println!("   Stopped {stopped} agent(s)");
    }
    sessions.end(id).await;

    let errors = sink
        .entries()
        .into_iter()
        .filter(|e| e.level == chariot_runtime::LogLevel::Error)
        .count();
    if errors > 0 {
        println!("   {errors} error(s) logged by agents");
    }
    Ok(())
}

async fn load_bootstrap(bootstrap: &Arc<Runtime>, path: PathBuf) -> Result<()> {
    let rt = Arc::clone(bootstrap);
    let shown = path.display().to_string();
    tokio::task::spawn_blocking(move || rt.exec_file(&path))
        .await
        .map_err(|e| ChariotError::Eval(format!("bootstrap panicked: {e}")))??;
    info!(
        path = %shown,
        globals = bootstrap.list_global_variables().len(),
        "bootstrap loaded"
    );
    Ok(())
}
