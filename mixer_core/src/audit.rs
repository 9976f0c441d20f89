//! Wiring audit of the catalog.
//!
//! Ingredients that delegate to a master use the master's pumps and are not
//! audited themselves.

use std::collections::BTreeMap;
use std::fmt;

use crate::catalog::Catalog;
use crate::config::PinRules;
use crate::model::{IngredientId, NodeUid, PumpKind, pin_label};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinOwner {
    pub ingredient: IngredientId,
    pub name: String,
    pub pump: PumpKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditFinding {
    RestrictedPin { owner: PinOwner, pin: u8 },
    PinOutOfRange { owner: PinOwner, pin: u8, max_pin: u8 },
    DuplicatePin { node: NodeUid, pin: u8, owners: Vec<PinOwner> },
    TooManyPins { node: NodeUid, count: usize, max: usize },
}

impl fmt::Display for AuditFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditFinding::RestrictedPin { owner, pin } => write!(
                f,
                "{} ({} pump): pin {} is reserved by the node firmware",
                owner.name,
                owner.pump,
                pin_label(*pin)
            ),
            AuditFinding::PinOutOfRange { owner, pin, max_pin } => write!(
                f,
                "{} ({} pump): pin {pin} is above the highest pin {}",
                owner.name,
                owner.pump,
                pin_label(*max_pin)
            ),
            AuditFinding::DuplicatePin { node, pin, owners } => {
                let names: Vec<String> = owners
                    .iter()
                    .map(|o| format!("{} ({})", o.name, o.pump))
                    .collect();
                write!(
                    f,
                    "node {node} pin {} is used by {}",
                    pin_label(*pin),
                    names.join(", ")
                )
            }
            AuditFinding::TooManyPins { node, count, max } => {
                write!(f, "node {node} has {count} pins assigned, at most {max} allowed")
            }
        }
    }
}

pub fn audit(catalog: &Catalog, rules: &PinRules) -> Vec<AuditFinding> {
    let mut findings = Vec::new();
    let mut by_wire: BTreeMap<(NodeUid, u8), Vec<PinOwner>> = BTreeMap::new();

    for ing in catalog.ingredients().filter(|i| i.master_id.is_none()) {
        for kind in [PumpKind::Large, PumpKind::Small] {
            let out = ing.pumps.output(kind);
            let Some(pin) = out.pin else { continue };
            let owner = PinOwner {
                ingredient: ing.id,
                name: ing.name.clone(),
                pump: kind,
            };
            if rules.restricted.contains(&pin) {
                findings.push(AuditFinding::RestrictedPin {
                    owner: owner.clone(),
                    pin,
                });
            }
            if pin > rules.max_pin {
                findings.push(AuditFinding::PinOutOfRange {
                    owner: owner.clone(),
                    pin,
                    max_pin: rules.max_pin,
                });
            }
            if let Some(node) = out.node {
                by_wire.entry((node, pin)).or_default().push(owner);
            }
        }
    }

    let mut per_node: BTreeMap<NodeUid, usize> = BTreeMap::new();
    for ((node, pin), owners) in by_wire {
        *per_node.entry(node).or_default() += 1;
        if owners.len() > 1 {
            findings.push(AuditFinding::DuplicatePin { node, pin, owners });
        }
    }
    findings.extend(
        per_node
            .into_iter()
            .filter(|(_, count)| *count > rules.max_pins_per_uid)
            .map(|(node, count)| AuditFinding::TooManyPins {
                node,
                count,
                max: rules.max_pins_per_uid,
            }),
    );
    findings
}
