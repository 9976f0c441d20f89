//! Recipe execution: link setup, Ctrl-C wiring and event streaming.

use std::sync::{Arc, Mutex};

use eyre::Result;
use mixer_core::format::{format_duration, format_grams};
use mixer_core::model::pin_label;
use mixer_core::{
    Engine, ExecutionEvent, ExecutionMode, RunOutcome, RunRequest, StepReport, StopSignal,
};
use serde_json::{Value, json};

use crate::cli::{Link, Target};
use crate::commands::{Ctx, find_recipe, open_link};
use crate::error_fmt::exit_code_for_outcome;

pub fn run_recipe(ctx: &Ctx, target: &Target, mode: ExecutionMode, link: &Link) -> Result<i32> {
    let inv = ctx.inventory()?;
    let recipe = find_recipe(inv.catalog(), &target.recipe)?.clone();
    let (transport, sim) = open_link(ctx, link)?;

    let engine = Engine::new(Arc::new(Mutex::new(transport)), Arc::new(Mutex::new(inv)))
        .with_limits(ctx.limits.clone());
    let request = RunRequest::new(recipe, target.grams)
        .with_selection(target.lines.selection())
        .with_mode(mode);

    let stop = StopSignal::new();
    {
        let stop = stop.clone();
        // Once the run starts, stop() also sends batchabort at once.
        // A second handler cannot be installed in the same process; runs still work without it.
        if let Err(e) = ctrlc::set_handler(move || stop.stop()) {
            tracing::warn!(error = %e, "failed to install Ctrl-C handler");
        }
    }

    tracing::info!(recipe = %request.recipe.name, grams = request.desired_g, %mode, "run starting");
    let handle = engine.start_with(request, stop)?;
    for event in handle.events() {
        if ctx.json {
            println!("{}", event_json(&event));
        } else if let Some(line) = event_text(&event) {
            println!("{line}");
        }
    }
    let outcome = handle.join();

    if let Some(sim) = sim
        && !ctx.json
    {
        println!("-- commands sent --");
        for c in sim.sent() {
            println!("> {c}");
        }
    }
    Ok(exit_code_for_outcome(&outcome))
}

fn step_text(s: &StepReport) -> String {
    format!(
        "{} -> {} node {} pin {} for {} ({})",
        s.label,
        s.pump,
        s.node,
        pin_label(s.pin),
        format_duration(s.duration_ms),
        format_grams(s.grams)
    )
}

fn event_text(event: &ExecutionEvent) -> Option<String> {
    match event {
        ExecutionEvent::State(state) => Some(format!("[{state}]")),
        ExecutionEvent::Log(msg) => Some(msg.clone()),
        ExecutionEvent::Step(step) => Some(step_text(step)),
        // Progress is for interactive front-ends.
        ExecutionEvent::Progress(_) => None,
        ExecutionEvent::Estimate(est) => Some(format!(
            "estimated: sequential {}, parallel {}",
            format_duration(est.sequential_ms),
            format_duration(est.parallel_ms)
        )),
        ExecutionEvent::Finished(outcome) => Some(outcome_text(outcome)),
    }
}

fn outcome_text(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::Completed {
            consumed,
            ledger_errors,
        } => {
            let mut lines = vec!["run completed".to_string()];
            lines.extend(consumed.iter().map(|c| {
                format!(
                    "  {}: {} used, {} left",
                    c.name,
                    format_grams(c.consumed_g),
                    format_grams(c.after_g)
                )
            }));
            lines.extend(
                ledger_errors
                    .iter()
                    .map(|(id, e)| format!("  ! stock of ingredient {id} not saved: {e}")),
            );
            lines.join("\n")
        }
        RunOutcome::Stopped => "run stopped by operator".to_string(),
        RunOutcome::StockBlocked(shortfalls) => {
            let mut lines = vec!["not enough stock:".to_string()];
            lines.extend(shortfalls.iter().map(|s| {
                format!(
                    "  {}: need {}, have {}",
                    s.name,
                    format_grams(s.needed_g),
                    format_grams(s.available_g)
                )
            }));
            lines.join("\n")
        }
        RunOutcome::SendFailed(e) => format!("run aborted: {e}"),
        RunOutcome::ConfigurationFailed(errors) => {
            let mut lines = vec!["recipe cannot run:".to_string()];
            lines.extend(errors.iter().map(|e| format!("  {e}")));
            lines.join("\n")
        }
        RunOutcome::Faulted(msg) => format!("run faulted: {msg}"),
    }
}

fn event_json(event: &ExecutionEvent) -> Value {
    match event {
        ExecutionEvent::State(state) => json!({ "event": "state", "state": state.to_string() }),
        ExecutionEvent::Log(msg) => json!({ "event": "log", "message": msg }),
        ExecutionEvent::Step(s) => json!({
            "event": "step",
            "ingredient_id": s.ingredient,
            "label": s.label,
            "pump": s.pump.to_string(),
            "uid": s.node.to_string(),
            "pin": s.pin,
            "duration_ms": s.duration_ms,
            "grams": s.grams,
        }),
        ExecutionEvent::Progress(p) => json!({ "event": "progress", "fraction": p }),
        ExecutionEvent::Estimate(est) => json!({
            "event": "estimate",
            "sequential_ms": est.sequential_ms,
            "parallel_ms": est.parallel_ms,
            "segments": est.segment_count,
        }),
        ExecutionEvent::Finished(outcome) => outcome_json(outcome),
    }
}

fn outcome_json(outcome: &RunOutcome) -> Value {
    let detail = match outcome {
        RunOutcome::Completed {
            consumed,
            ledger_errors,
        } => json!({
            "consumed": consumed.iter().map(|c| json!({
                "ingredient_id": c.ingredient,
                "ingredient": c.name,
                "before_g": c.before_g,
                "consumed_g": c.consumed_g,
                "after_g": c.after_g,
            })).collect::<Vec<_>>(),
            "ledger_errors": ledger_errors.iter().map(|(id, e)| json!({ "ingredient_id": id, "error": e })).collect::<Vec<_>>(),
        }),
        RunOutcome::StockBlocked(shortfalls) => json!({
            "shortfalls": shortfalls.iter().map(|s| json!({
                "ingredient_id": s.ingredient,
                "ingredient": s.name,
                "needed_g": s.needed_g,
                "available_g": s.available_g,
                "missing_g": s.missing_g,
            })).collect::<Vec<_>>(),
        }),
        RunOutcome::SendFailed(e) => json!({
            "stage": e.stage.to_string(),
            "uid": e.node.map(|n| n.to_string()),
            "ingredient": e.ingredient,
            "message": e.to_string(),
        }),
        RunOutcome::ConfigurationFailed(errors) => json!({
            "errors": errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
        }),
        RunOutcome::Faulted(msg) => json!({ "message": msg }),
        RunOutcome::Stopped => json!({}),
    };
    json!({
        "event": "finished",
        "status": outcome.status_name(),
        "exit_code": exit_code_for_outcome(outcome),
        "detail": detail,
    })
}
