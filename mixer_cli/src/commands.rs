//! Subcommand implementations. Each returns the process exit code.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use eyre::{Result, WrapErr};
use mixer_config::Config;
use mixer_core::audit::audit;
use mixer_core::format::{format_duration, format_grams};
use mixer_core::ledger::max_producible_grams;
use mixer_core::model::{parse_pin, pin_label};
use mixer_core::{
    Availability, Catalog, Engine, ExecutionLimits, FileInventory, Inventory, PinRules, Preflight,
    Recipe, preflight,
};
use mixer_hardware::{LineTransport, SimulatedTransport};
use mixer_traits::Transport;
use serde_json::json;

use crate::cli::{Link, Lines, Target};
use crate::error_fmt::{EXIT_CONFIG, EXIT_OK, EXIT_STOCK, SetupError};

/// Everything loaded from disk before a command runs.
pub struct Ctx {
    pub cfg: Config,
    pub limits: ExecutionLimits,
    pub json: bool,
    inventory_path: Option<PathBuf>,
    calibration_path: Option<PathBuf>,
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let setup = |reason: String| SetupError::Config {
        path: path.display().to_string(),
        reason,
    };
    let text = std::fs::read_to_string(path).map_err(|e| setup(e.to_string()))?;
    let cfg: Config = toml::from_str(&text).map_err(|e| setup(e.message().to_string()))?;
    cfg.validate().map_err(|e| setup(format!("{e:#}")))?;
    Ok(cfg)
}

impl Ctx {
    pub fn new(
        cfg: Config,
        json: bool,
        inventory_path: Option<PathBuf>,
        calibration_path: Option<PathBuf>,
    ) -> Self {
        let limits = ExecutionLimits::from(&cfg.execution);
        Self {
            cfg,
            limits,
            json,
            inventory_path,
            calibration_path,
        }
    }

    /// Open the inventory and apply calibration rates, if any.
    pub fn inventory(&self) -> Result<FileInventory> {
        let path = self.inventory_path.as_deref().ok_or(SetupError::MissingInventory)?;
        let mut inv = FileInventory::open(path).map_err(|e| SetupError::Inventory {
            path: path.display().to_string(),
            reason: format!("{e:#}"),
        })?;
        if let Some(csv) = self.calibration_path.as_deref() {
            let rows = mixer_config::load_calibration_csv(csv).map_err(|e| SetupError::Calibration {
                path: csv.display().to_string(),
                reason: format!("{e:#}"),
            })?;
            for id in inv.apply_calibration(&rows) {
                tracing::warn!(ingredient = id, "calibration row for unknown ingredient ignored");
            }
            tracing::info!(rows = rows.len(), "calibration applied");
        }
        Ok(inv)
    }

    fn out(&self, text: impl FnOnce() -> String, value: impl FnOnce() -> serde_json::Value) {
        if self.json {
            println!("{}", value());
        } else {
            println!("{}", text());
        }
    }
}

/// Numeric id first, then case-insensitive name.
pub fn find_recipe<'a>(catalog: &'a Catalog, key: &str) -> Result<&'a Recipe> {
    key.trim()
        .parse::<u64>()
        .ok()
        .and_then(|id| catalog.recipe(id))
        .or_else(|| catalog.recipe_by_name(key))
        .ok_or_else(|| SetupError::UnknownRecipe(key.to_string()).into())
}

fn preflight_for(ctx: &Ctx, target: &Target) -> Result<Preflight> {
    let inv = ctx.inventory()?;
    let recipe = find_recipe(inv.catalog(), &target.recipe)?;
    Ok(preflight(
        recipe,
        target.grams,
        &target.lines.selection(),
        &inv,
        &ctx.limits,
    )?)
}

pub fn plan(ctx: &Ctx, target: &Target) -> Result<i32> {
    let pre = preflight_for(ctx, target)?;
    let plan = &pre.plan;
    ctx.out(
        || {
            let mut lines = vec![format!(
                "{} at {} (scale {:.3})",
                plan.recipe_name,
                format_grams(plan.desired_g),
                plan.scale_factor
            )];
            for (i, r) in plan.requests.iter().enumerate() {
                lines.push(format!(
                    "{:>3}. {:<24} {:<5} node {} pin {:<3} {:>10} {:>10}{}",
                    i + 1,
                    r.ingredient.name,
                    r.pump,
                    r.node,
                    pin_label(r.pin),
                    format_duration(r.duration_ms),
                    format_grams(r.grams),
                    if r.uses_default_rate { " (default rate)" } else { "" }
                ));
            }
            for e in &plan.errors {
                lines.push(format!("  ! {e}"));
            }
            lines.join("\n")
        },
        || {
            json!({
                "recipe": plan.recipe_name,
                "desired_g": plan.desired_g,
                "scale_factor": plan.scale_factor,
                "requests": plan.requests.iter().map(|r| json!({
                    "ingredient_id": r.ingredient.id,
                    "ingredient": r.ingredient.name,
                    "pump": r.pump.to_string(),
                    "uid": r.node.to_string(),
                    "pin": r.pin,
                    "duration_ms": r.duration_ms,
                    "grams": r.grams,
                    "ms_per_gram": r.ms_per_gram,
                })).collect::<Vec<_>>(),
                "errors": plan.errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
            })
        },
    );
    Ok(if plan.is_complete() { EXIT_OK } else { EXIT_CONFIG })
}

pub fn estimate(ctx: &Ctx, target: &Target) -> Result<i32> {
    let pre = preflight_for(ctx, target)?;
    let est = pre.estimate;
    ctx.out(
        || {
            format!(
                "sequential: {}\nparallel:   {}\nsegments:   {}",
                format_duration(est.sequential_ms),
                format_duration(est.parallel_ms),
                est.segment_count
            )
        },
        || {
            json!({
                "sequential_ms": est.sequential_ms,
                "parallel_ms": est.parallel_ms,
                "segments": est.segment_count,
            })
        },
    );
    Ok(EXIT_OK)
}

pub fn check_stock(ctx: &Ctx, target: &Target) -> Result<i32> {
    let pre = preflight_for(ctx, target)?;
    let shortfalls = pre.availability.shortfalls();
    let errors = &pre.plan.errors;
    ctx.out(
        || {
            let mut lines: Vec<String> = shortfalls
                .iter()
                .map(|s| {
                    format!(
                        "{}: need {}, have {}, missing {}",
                        s.name,
                        format_grams(s.needed_g),
                        format_grams(s.available_g),
                        format_grams(s.missing_g)
                    )
                })
                .collect();
            if !errors.is_empty() {
                // lines that failed to plan were never checked against stock
                lines.push("recipe cannot run:".to_string());
                lines.extend(errors.iter().map(|e| format!("  ! {e}")));
            } else if lines.is_empty() {
                lines.push("stock ok".to_string());
            }
            lines.join("\n")
        },
        || {
            json!({
                "sufficient": shortfalls.is_empty(),
                "complete": pre.plan.is_complete(),
                "shortfalls": shortfalls.iter().map(|s| json!({
                    "ingredient_id": s.ingredient,
                    "ingredient": s.name,
                    "needed_g": s.needed_g,
                    "available_g": s.available_g,
                    "missing_g": s.missing_g,
                })).collect::<Vec<_>>(),
                "errors": errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
            })
        },
    );
    if !pre.plan.is_complete() {
        return Ok(EXIT_CONFIG);
    }
    Ok(match pre.availability {
        Availability::Sufficient => EXIT_OK,
        Availability::Insufficient(_) => EXIT_STOCK,
    })
}

pub fn max_batch(ctx: &Ctx, recipe: &str, lines: &Lines) -> Result<i32> {
    let inv = ctx.inventory()?;
    let recipe = find_recipe(inv.catalog(), recipe)?;
    let grams = max_producible_grams(recipe, &lines.selection(), &inv, &ctx.limits);
    ctx.out(
        || format!("{}: at most {grams} g", recipe.name),
        || json!({ "recipe": recipe.name, "max_grams": grams }),
    );
    Ok(EXIT_OK)
}

pub fn audit_inventory(ctx: &Ctx) -> Result<i32> {
    let inv = ctx.inventory()?;
    let findings = audit(inv.catalog(), &PinRules::from(&ctx.cfg.pins));
    ctx.out(
        || {
            if findings.is_empty() {
                "no wiring problems".to_string()
            } else {
                findings
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        },
        || json!({ "findings": findings.iter().map(ToString::to_string).collect::<Vec<_>>() }),
    );
    Ok(if findings.is_empty() { EXIT_OK } else { EXIT_CONFIG })
}

pub fn self_check(ctx: &Ctx) -> Result<i32> {
    let mut report = vec!["config ok".to_string()];
    let mut ingredients = None;
    if ctx.inventory_path.is_some() {
        let inv = ctx.inventory()?;
        let cat = inv.catalog();
        let count = cat.ingredients().count();
        ingredients = Some(count);
        report.push(format!(
            "inventory ok: {count} ingredients, {} recipes",
            cat.recipes().count()
        ));
        // Every ingredient must resolve to a pump owner.
        for ing in cat.ingredients() {
            if let Err(e) = mixer_core::resolve(&inv, ing.id) {
                report.push(format!("  ! {e}"));
            }
        }
    }
    match ctx.cfg.serial.device.as_deref() {
        Some(dev) if Path::new(dev).exists() => report.push(format!("device {dev} present")),
        Some(dev) => report.push(format!("device {dev} not found (use --simulate)")),
        None => report.push("no device configured (simulation only)".to_string()),
    }
    let problems = report.iter().filter(|l| l.starts_with("  !")).count();
    ctx.out(
        || report.join("\n"),
        || {
            json!({
                "ok": problems == 0,
                "ingredients": ingredients,
                "device": ctx.cfg.serial.device,
                "report": report,
            })
        },
    );
    Ok(if problems == 0 { EXIT_OK } else { EXIT_CONFIG })
}

/// Transport for `link`: in-memory simulator or the serial device.
pub fn open_link(
    ctx: &Ctx,
    link: &Link,
) -> Result<(Box<dyn Transport + Send>, Option<SimulatedTransport>)> {
    if link.simulate {
        let sim = SimulatedTransport::new();
        return Ok((Box::new(sim.clone()), Some(sim)));
    }
    let device = link
        .device
        .clone()
        .or_else(|| ctx.cfg.serial.device.as_ref().map(PathBuf::from))
        .ok_or(SetupError::NoDevice)?;
    let t = LineTransport::open(&device)
        .wrap_err_with(|| format!("opening serial device {}", device.display()))?;
    Ok((Box::new(t), None))
}

pub fn pulse(ctx: &Ctx, slave: u32, pin: &str, ms: u64, link: &Link) -> Result<i32> {
    let pin_no = parse_pin(pin).ok_or_else(|| SetupError::InvalidPin(pin.to_string()))?;
    let (transport, sim) = open_link(ctx, link)?;
    let engine = Engine::new(Arc::new(Mutex::new(transport)), Arc::new(Mutex::new(NoStock)))
        .with_limits(ctx.limits.clone());
    engine.pulse(slave, pin_no, ms)?;
    ctx.out(
        || {
            let mut lines = vec![format!(
                "pulse sent: slave {slave}, pin {}, {}",
                pin_label(pin_no),
                format_duration(ms)
            )];
            if let Some(sim) = &sim {
                lines.extend(sim.sent().into_iter().map(|c| format!("> {c}")));
            }
            lines.join("\n")
        },
        || json!({ "slave": slave, "pin": pin_no, "duration_ms": ms, "sent": sim.as_ref().map(SimulatedTransport::sent) }),
    );
    Ok(EXIT_OK)
}

/// Manual pulses never touch stock.
struct NoStock;

impl Inventory for NoStock {
    fn ingredient(&self, _id: u64) -> Option<mixer_core::Ingredient> {
        None
    }

    fn set_stock(&mut self, id: u64, _grams: f64) -> std::result::Result<(), mixer_traits::BoxError> {
        Err(format!("ingredient {id} not found").into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mixer_core::Selection;

    #[test]
    fn recipes_resolve_by_id_then_name() {
        let cat = Catalog::new()
            .with_recipe(Recipe {
                id: 7,
                name: "Cologne".into(),
                reference_batch_g: 100.0,
                items: vec![],
            })
            .with_recipe(Recipe {
                id: 8,
                name: "7".into(),
                reference_batch_g: 100.0,
                items: vec![],
            });
        assert_eq!(find_recipe(&cat, "7").map(|r| r.id).ok(), Some(7));
        assert_eq!(find_recipe(&cat, "COLOGNE").map(|r| r.id).ok(), Some(7));
        assert!(find_recipe(&cat, "chypre").is_err());
    }

    #[test]
    fn line_flags_pick_the_selection() {
        assert_eq!(Lines::default().selection(), Selection::AsRecipe);
        let only = Lines {
            only: vec![3, 1],
            all: false,
        };
        assert_eq!(only.selection(), Selection::Only([1, 3].into()));
        let all = Lines {
            only: vec![],
            all: true,
        };
        assert_eq!(all.selection(), Selection::All);
    }

    #[test]
    fn missing_config_path_means_defaults() {
        let cfg = load_config(None).unwrap();
        assert_eq!(cfg.execution.max_batch_size, 64);
    }
}
