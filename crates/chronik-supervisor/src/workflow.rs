//! Workflow name resolution.
//!
//! Launchers address workflows by short aliases; each canonical
//! workflow carries default parameters that are overlaid *under* the
//! caller's parameters, so explicit values always win.

use serde_json::{json, Value};

const ALIASES: &[(&str, &str)] = &[
    ("analyze", "history-analysis"),
    ("git", "history-analysis"),
    ("sessions", "session-analysis"),
    ("full", "full-sync"),
];

#[derive(Debug, Clone)]
pub struct ResolvedWorkflow {
    pub name: String,
    pub parameters: Value,
}

/// Resolve an alias to its canonical workflow and overlay defaults.
pub fn resolve_workflow(name: &str, caller_parameters: &Value) -> ResolvedWorkflow {
    let canonical = ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, target)| *target)
        .unwrap_or(name);

    let mut parameters = default_parameters(canonical);
    merge_over(&mut parameters, caller_parameters);
    ResolvedWorkflow {
        name: canonical.to_string(),
        parameters,
    }
}

fn default_parameters(name: &str) -> Value {
    match name {
        "history-analysis" => json!({
            "includeSessions": false,
            "endCommit": "HEAD",
        }),
        "session-analysis" => json!({
            "includeSessions": true,
        }),
        "full-sync" => json!({
            "includeSessions": true,
            "endCommit": "HEAD",
            "recordStepOutputs": true,
        }),
        _ => json!({}),
    }
}

/// Overlay `caller` keys onto `base` (caller wins, shallow).
fn merge_over(base: &mut Value, caller: &Value) {
    let (Some(base), Some(caller)) = (base.as_object_mut(), caller.as_object()) else {
        return;
    };
    for (k, v) in caller {
        base.insert(k.clone(), v.clone());
    }
}
