use lifeline_core::api::{AppState, CliError, EdgeScope, TransitionTable};

use super::cli::TableFormat;

pub fn render_table(format: TableFormat) -> Result<String, CliError> {
    let edges = TransitionTable::edges();
    match format {
        TableFormat::Json => serde_json::to_string_pretty(&edges)
            .map_err(|e| CliError::Command(format!("serialize transition table: {e}"))),
        TableFormat::Text => {
            let mut out = format!("{:<16} {:<22} {}\n", "FROM", "EVENT", "TO");
            for edge in edges {
                let from = match edge.scope {
                    EdgeScope::Scoped(state) => state.as_str(),
                    EdgeScope::Global => "*",
                };
                out.push_str(&format!(
                    "{:<16} {:<22} {}\n",
                    from,
                    edge.transition.as_str(),
                    edge.to.as_str()
                ));
            }

            out.push_str(&format!("\n{:<16} {}\n", "STATE", "DESCRIPTION"));
            for state in AppState::ALL {
                let terminal = if state.is_terminal() { " (terminal)" } else { "" };
                out.push_str(&format!(
                    "{:<16} {}{}\n",
                    state.as_str(),
                    state.description(),
                    terminal
                ));
            }
            Ok(out)
        }
    }
}
