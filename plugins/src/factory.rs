use std::sync::Arc;

use anyhow::Result;

use lifeline_core::api::{AppConfig, CrashReporter, CrashReporterProvider, NoopCrashReporter};

use crate::crash::{JsonlCrashReporter, TracingCrashReporter};

pub async fn build_crash_reporter(cfg: &AppConfig) -> Result<Arc<dyn CrashReporter>> {
    if !cfg.crash.enabled {
        return Ok(Arc::new(NoopCrashReporter));
    }

    match &cfg.crash.reporter {
        CrashReporterProvider::Tracing => Ok(Arc::new(TracingCrashReporter)),
        CrashReporterProvider::Jsonl(jsonl_cfg) => {
            Ok(Arc::new(JsonlCrashReporter::start(jsonl_cfg).await?))
        }
    }
}
