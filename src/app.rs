use crate::config::{DeclarationsConfig, OperatorConfig};
use crate::error::{Context, Result};
use crate::reconcile::{ReconcileEvent, ReconcileLoop, Reconciler};
use crate::surface::{FileWorkload, LogRelationDataSink, LogStatusPublisher};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const READER_STOP_TIMEOUT: Duration = Duration::from_secs(1);

pub struct OperatorApp {
    reconciler: Reconciler,
    event_capacity: usize,
    shutdown: CancellationToken,
}

impl OperatorApp {
    pub async fn initialise(config: OperatorConfig) -> Result<Self> {
        let path = match config.declarations_path.as_deref() {
            Some(path) if !path.trim().is_empty() => path.to_string(),
            _ => crate::bail_err!("no declarations file configured (pass -c <PATH>)"),
        };

        let declarations = DeclarationsConfig::from_path(&path)
            .with_context(|| format!("failed to load declarations from {path}"))?;

        tracing::info!(
            declarations = path.as_str(),
            output = config.output_path.as_str(),
            relations = declarations.relations.len(),
            image = declarations.workload.image.as_str(),
            "operator initialised"
        );

        let reconciler = Reconciler::new(
            &declarations,
            config.app_name.clone(),
            Arc::new(FileWorkload::new(&config.output_path)),
            Arc::new(LogStatusPublisher),
            Arc::new(LogRelationDataSink),
        );

        Ok(Self {
            reconciler,
            event_capacity: config.event_capacity.max(1),
            shutdown: CancellationToken::new(),
        })
    }

    /// Runs the loop against JSON-line events on stdin until ctrl-c, a
    /// `teardown` event or a fatal error.
    pub async fn run(self) -> Result<()> {
        let Self {
            reconciler,
            event_capacity,
            shutdown,
        } = self;

        let (sender, receiver) = mpsc::channel(event_capacity);
        let reader_shutdown = shutdown.clone();
        let reader = tokio::spawn(async move {
            let stdin = BufReader::new(tokio::io::stdin());
            forward_events(stdin, sender, reader_shutdown).await
        });

        let signal_shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown signal received");
                signal_shutdown.cancel();
            }
        });

        let report = ReconcileLoop::new(reconciler, receiver, shutdown.clone())
            .run()
            .await;
        shutdown.cancel();

        match timeout(READER_STOP_TIMEOUT, reader).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(err))) => tracing::warn!(error = %err, "event reader failed"),
            Ok(Err(join_err)) => tracing::warn!(error = %join_err, "event reader task failed"),
            Err(_) => tracing::debug!("event reader still blocked on stdin at shutdown"),
        }

        let report = report?;
        tracing::info!(
            exit = report.exit.as_str(),
            status = report
                .reconciler
                .last_status()
                .map(ToString::to_string)
                .unwrap_or_default(),
            "operator stopped"
        );
        Ok(())
    }
}

/// Parses one event per line and forwards it to the loop.
///
/// Blank lines and `#` comments are skipped; malformed lines are logged and
/// dropped. At end of input the sender is held until shutdown so that a closed
/// stream does not cancel an in-flight pass.
pub async fn forward_events<R>(
    reader: R,
    sender: mpsc::Sender<ReconcileEvent>,
    shutdown: CancellationToken,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut line_number = 0usize;

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            line = lines.next_line() => line.context("failed to read event stream")?,
        };

        let Some(line) = line else {
            tracing::debug!(lines = line_number, "event stream closed");
            shutdown.cancelled().await;
            return Ok(());
        };
        line_number += 1;

        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        match serde_json::from_str::<ReconcileEvent>(trimmed) {
            Ok(event) => {
                if sender.send(event).await.is_err() {
                    return Ok(());
                }
            }
            Err(err) => tracing::warn!(line = line_number, error = %err, "ignoring malformed event"),
        }
    }
}
