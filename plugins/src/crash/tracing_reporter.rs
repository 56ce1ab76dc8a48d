use std::collections::HashMap;

use lifeline_core::api::{CrashReporter, FaultKind, TaskFault};

/// Turns every fault into an `error!` record on the `lifeline.crash` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingCrashReporter;

#[async_trait::async_trait]
impl CrashReporter for TracingCrashReporter {
    fn name(&self) -> &str {
        "tracing"
    }

    fn report(&self, fault: &TaskFault, context: &HashMap<String, String>) {
        let task_id = fault
            .task_id
            .as_ref()
            .map(|id| id.as_str())
            .unwrap_or("-");
        let kind = match fault.kind {
            FaultKind::Error => "error",
            FaultKind::Panic => "panic",
        };
        let mut ctx: Vec<_> = context.iter().collect();
        ctx.sort();

        tracing::error!(
            target: "lifeline.crash",
            task_id = %task_id,
            fault_kind = %kind,
            chain = ?fault.chain,
            context = ?ctx,
            "{}",
            fault.message
        );
    }
}
