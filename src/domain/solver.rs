//! Fixed-point custom field solver.
//!
//! Custom fields may reference each other in any order, within one entity or
//! across entities. The solver sweeps `custom field × entity` repeatedly,
//! writing each field into an entity's map the first time all of its
//! variables resolve. A sweep that writes nothing new ends the loop, and the
//! number of sweeps never exceeds `custom field count + 1`, so cyclic
//! definitions simply stay unset.

use crate::domain::entity::{NameIndex, Workspace};
use crate::domain::expr_eval::CompiledFormula;
use crate::domain::value::{FieldValue, Snapshot};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SolveReport {
    /// Sweeps actually run.
    pub passes: usize,
    /// Cells written with a number.
    pub computed: usize,
    /// Cells written as null after an evaluation fault.
    pub faulted: usize,
    /// (field, entity) pairs left unset.
    pub unresolved: usize,
}

struct FieldDef {
    name: String,
    formula: CompiledFormula,
}

/// Upper bound on sweeps for a workspace.
pub fn max_passes(workspace: &Workspace) -> usize {
    workspace.custom_fields().count() + 1
}

/// Compute every custom field in place.
pub fn solve(snapshot: &mut Snapshot, workspace: &Workspace, index: &NameIndex) -> SolveReport {
    let fields: Vec<FieldDef> = workspace
        .custom_fields()
        .filter(|(entity, def)| !entity.name.is_empty() && !def.formula.trim().is_empty())
        .map(|(entity, def)| {
            let formula = CompiledFormula::compile(&def.formula);
            if let Some(err) = formula.parse_error() {
                log::warn!("custom field '{}' does not parse: {}", entity.name, err);
            }
            FieldDef {
                name: entity.name.clone(),
                formula,
            }
        })
        .collect();

    let entity_names: Vec<String> = snapshot.keys().cloned().collect();
    let mut report = SolveReport::default();

    for _ in 0..max_passes(workspace) {
        report.passes += 1;
        let mut computed_in_pass = 0;

        for field in &fields {
            for entity_name in &entity_names {
                let Some(current) = snapshot.get(entity_name) else {
                    continue;
                };
                if current.contains_key(&field.name) {
                    continue;
                }

                let value = match field.formula.evaluate(current, snapshot, index) {
                    None => continue,
                    Some(Ok(v)) => {
                        computed_in_pass += 1;
                        report.computed += 1;
                        FieldValue::Number(v)
                    }
                    Some(Err(e)) => {
                        log::debug!("'{}' on '{}': {}", field.name, entity_name, e);
                        report.faulted += 1;
                        FieldValue::Null
                    }
                };
                if let Some(map) = snapshot.get_mut(entity_name) {
                    map.insert(field.name.clone(), value);
                }
            }
        }

        if computed_in_pass == 0 {
            break;
        }
    }

    report.unresolved = fields
        .iter()
        .map(|field| {
            snapshot
                .values()
                .filter(|map| !map.contains_key(&field.name))
                .count()
        })
        .sum();

    log::debug!(
        "solver: {} pass(es), {} computed, {} faulted, {} unresolved",
        report.passes,
        report.computed,
        report.faulted,
        report.unresolved
    );
    report
}
