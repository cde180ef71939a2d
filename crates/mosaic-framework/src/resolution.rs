//! Inter-module service dependency resolution.
//!
//! Every module publishes its contracts through `Module::expose` and lists
//! its `ServiceSlot`s through `Module::declare`. A slot is satisfied by
//! exactly one *other* module whose tier the consumer may depend on
//! (`Tier::can_depend_on`). All slots are planned before any is assigned, so
//! a failed resolution leaves every slot untouched.

use std::sync::Arc;

use mosaic_core::{CompositeError, CompositeResult, ErrorCode, Exports, ServiceExport, Slots};
use tracing::debug;

use crate::plugin_set::ModuleRecord;

/// A contract exposed by one module of the composite.
#[derive(Debug)]
pub struct ProvidedService {
    /// Index of the providing module in the record list.
    pub provider: usize,
    pub export: ServiceExport,
}

/// Collects the contracts exposed by every module.
pub fn collect_exports(records: &[ModuleRecord]) -> Vec<ProvidedService> {
    records
        .iter()
        .enumerate()
        .flat_map(|(provider, record)| {
            let mut exports = Exports::new();
            Arc::clone(&record.module).expose(&mut exports);
            exports
                .into_vec()
                .into_iter()
                .map(move |export| ProvidedService { provider, export })
        })
        .collect()
}

fn describe(record: &ModuleRecord) -> String {
    format!("{}/{}", record.plugin, record.name)
}

/// Assigns every declared service slot from `provided`.
pub fn resolve_services(records: &[ModuleRecord], provided: &[ProvidedService]) -> CompositeResult<()> {
    let declared: Vec<Slots<'_>> = records
        .iter()
        .map(|record| {
            let mut slots = Slots::new();
            record.module.declare(&mut slots);
            slots
        })
        .collect();

    // ── 1. Plan every assignment ─────────────────────────────────────────────
    let mut plan: Vec<(usize, usize, &ProvidedService)> = Vec::new();
    for (consumer, slots) in declared.iter().enumerate() {
        let record = &records[consumer];
        for (slot_index, slot) in slots.services().iter().enumerate() {
            let declared_before = plan
                .iter()
                .any(|&(c, i, _)| std::ptr::addr_eq(declared[c].services()[i], *slot));
            if declared_before || slot.is_assigned() {
                return Err(CompositeError::composition(
                    ErrorCode::SlotAlreadyAssigned,
                    format!(
                        "module '{}' declares slot '{}' that is already assigned or declared twice",
                        describe(record),
                        slot.contract_name()
                    ),
                )
                .with_details(vec![describe(record), slot.contract_name().to_string()]));
            }

            let implementers: Vec<&ProvidedService> = provided
                .iter()
                .filter(|p| p.export.contract == slot.contract() && p.provider != consumer)
                .collect();
            let visible: Vec<&ProvidedService> = implementers
                .iter()
                .copied()
                .filter(|p| record.tier.can_depend_on(records[p.provider].tier))
                .collect();

            match visible.as_slice() {
                [single] => plan.push((consumer, slot_index, *single)),
                [] if implementers.is_empty() => {
                    return Err(CompositeError::composition(
                        ErrorCode::ServiceNotFound,
                        format!(
                            "module '{}' requires '{}' but no module provides it",
                            describe(record),
                            slot.contract_name()
                        ),
                    )
                    .with_details(vec![describe(record), slot.contract_name().to_string()]));
                }
                [] => {
                    let hidden: Vec<String> = implementers
                        .iter()
                        .map(|p| {
                            let provider = &records[p.provider];
                            format!("{} ({})", describe(provider), provider.tier)
                        })
                        .collect();
                    return Err(CompositeError::composition(
                        ErrorCode::ServiceNotVisible,
                        format!(
                            "module '{}' ({}) requires '{}', provided only by tiers it cannot depend on: {}",
                            describe(record),
                            record.tier,
                            slot.contract_name(),
                            hidden.join(", ")
                        ),
                    )
                    .with_details(hidden));
                }
                many => {
                    let candidates: Vec<String> =
                        many.iter().map(|p| describe(&records[p.provider])).collect();
                    return Err(CompositeError::composition(
                        ErrorCode::AmbiguousService,
                        format!(
                            "module '{}' requires exactly one '{}' but {} modules provide it: {}",
                            describe(record),
                            slot.contract_name(),
                            candidates.len(),
                            candidates.join(", ")
                        ),
                    )
                    .with_details(candidates));
                }
            }
        }
    }

    // ── 2. Assign ────────────────────────────────────────────────────────────
    for (consumer, slot_index, provided) in plan {
        let slot = declared[consumer].services()[slot_index];
        slot.assign(&provided.export.value)?;
        debug!(
            consumer = %describe(&records[consumer]),
            provider = %describe(&records[provided.provider]),
            contract = slot.contract_name(),
            "Service dependency resolved"
        );
    }
    Ok(())
}
