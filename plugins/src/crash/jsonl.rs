//! Appends crash reports to a JSON lines file.
//!
//! `report` never blocks: records go through a bounded channel to a writer
//! task and are dropped (and counted) when the channel is full.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Context;
use lifeline_core::api::{CrashReporter, JsonlReporterConfig, TaskFault};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};

#[derive(Serialize)]
struct CrashRecord<'a> {
    #[serde(flatten)]
    fault: &'a TaskFault,
    context: &'a HashMap<String, String>,
}

enum WriterMsg {
    Line(String),
    Flush(oneshot::Sender<()>),
}

pub struct JsonlCrashReporter {
    tx: mpsc::Sender<WriterMsg>,
    dropped: Arc<AtomicU64>,
}

impl JsonlCrashReporter {
    /// Open (or create) the target file and start the writer task.
    pub async fn start(cfg: &JsonlReporterConfig) -> anyhow::Result<Self> {
        let path = cfg.path.clone();
        if let Some(parent) = std::path::Path::new(&path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("creating crash log directory {}", parent.display()))?;
            }
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("opening crash log {path}"))?;

        let (tx, mut rx) = mpsc::channel::<WriterMsg>(cfg.channel_capacity.max(1));

        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                match msg {
                    WriterMsg::Line(mut line) => {
                        line.push('\n');
                        if let Err(e) = file.write_all(line.as_bytes()).await {
                            tracing::warn!(path = %path, error = %e, "crash log write failed");
                            return;
                        }
                    }
                    WriterMsg::Flush(ack) => {
                        let _ = file.flush().await;
                        let _ = ack.send(());
                    }
                }
            }
            let _ = file.flush().await;
        });

        Ok(Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl CrashReporter for JsonlCrashReporter {
    fn name(&self) -> &str {
        "jsonl"
    }

    fn report(&self, fault: &TaskFault, context: &HashMap<String, String>) {
        let line = match serde_json::to_string(&CrashRecord { fault, context }) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "crash record not serializable");
                return;
            }
        };
        if self.tx.try_send(WriterMsg::Line(line)).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(WriterMsg::Flush(ack)).await.is_ok() {
            let _ = done.await;
        }
        let dropped = self.dropped_count();
        if dropped > 0 {
            tracing::warn!(dropped, "crash records dropped because the writer fell behind");
        }
    }
}
