use lifeline_core::api::{AppState, CliError, LifecycleError, StateMachine, Transition};
use serde::Serialize;

/// Result of one replayed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckStep {
    pub transition: Transition,
    pub accepted: bool,
    pub state: AppState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Parse every name first, then replay them on a fresh, started machine.
pub fn check_sequence(events: &[String]) -> Result<Vec<CheckStep>, CliError> {
    let transitions = events
        .iter()
        .map(|e| e.parse::<Transition>().map_err(CliError::Command))
        .collect::<Result<Vec<_>, _>>()?;

    let sm = StateMachine::new();
    sm.start();

    Ok(transitions
        .into_iter()
        .map(|transition| {
            let result = sm.try_trigger(transition);
            CheckStep {
                transition,
                accepted: result.is_ok(),
                state: sm.current_state(),
                error: result.err().map(|e: LifecycleError| e.to_string()),
            }
        })
        .collect())
}

pub fn render_steps(steps: &[CheckStep]) -> String {
    steps
        .iter()
        .map(|step| {
            let mark = if step.accepted { "ok  " } else { "FAIL" };
            match &step.error {
                Some(err) => format!("{mark} {:<22} -> {} ({err})\n", step.transition.as_str(), step.state),
                None => format!("{mark} {:<22} -> {}\n", step.transition.as_str(), step.state),
            }
        })
        .collect()
}
