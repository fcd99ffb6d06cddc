//! Entity resolution and basket aggregation.
//!
//! Builds the intermediate snapshot that the solver starts from: one renamed
//! copy of the raw tick per base stock with data, and one weight-normalised
//! map per stock group.

use crate::domain::entity::{StockGroup, Workspace};
use crate::domain::fields::{FieldTable, NAME_KEY};
use crate::domain::tick::RawPool;
use crate::domain::value::{FieldMap, FieldValue, Snapshot};
use std::collections::BTreeMap;

/// Settings the aggregation stage reads from the engine configuration.
#[derive(Debug, Clone, Copy)]
pub struct AggregationContext<'a> {
    pub fields: &'a FieldTable,
    pub ticker_key: &'a str,
    pub market_separator: char,
}

/// Copy raw fields for every base stock, then aggregate every stock group.
pub fn aggregate(workspace: &Workspace, pool: &RawPool, ctx: &AggregationContext<'_>) -> Snapshot {
    let mut snapshot = Snapshot::new();

    for (entity, stock) in workspace.base_stocks() {
        let Some(ticker) = stock.ticker(ctx.market_separator) else {
            continue;
        };
        if let Some(tick) = pool.get(&ticker) {
            snapshot.insert(entity.name.clone(), ctx.fields.rename(&tick.fields));
        }
    }

    for (entity, group) in workspace.stock_groups() {
        let map = aggregate_group(&entity.name, group, workspace, &snapshot, ctx);
        snapshot.insert(entity.name.clone(), map);
    }

    snapshot
}

/// Weighted average of every numeric field across a group's members.
///
/// Members with no base-stock entity, no data this cycle, or a weight that is
/// not positive contribute nothing. Each field is divided by the total weight
/// of all contributing members.
pub fn aggregate_group(
    name: &str,
    group: &StockGroup,
    workspace: &Workspace,
    snapshot: &Snapshot,
    ctx: &AggregationContext<'_>,
) -> FieldMap {
    let mut weighted_sums: BTreeMap<&str, f64> = BTreeMap::new();
    let mut total_weight = 0.0;

    for code in &group.members {
        let Some(member) = workspace.base_stock_by_code(code) else {
            continue;
        };
        let Some(fields) = snapshot.get(&member.name) else {
            continue;
        };
        let weight = group.weight(code);
        if weight <= 0.0 || !weight.is_finite() {
            continue;
        }

        total_weight += weight;
        for (field, value) in fields {
            if let Some(v) = value.as_number().filter(|v| v.is_finite()) {
                *weighted_sums.entry(field.as_str()).or_insert(0.0) += v * weight;
            }
        }
    }

    let mut map = FieldMap::new();
    if total_weight > 0.0 {
        for (field, sum) in weighted_sums {
            map.insert(field.to_string(), FieldValue::Number(sum / total_weight));
        }
    } else {
        log::debug!("group '{}' has no contributing members", name);
    }

    // Identity fields take precedence over any numeric average of the same name.
    map.insert(
        ctx.fields.display_name(NAME_KEY).to_string(),
        FieldValue::from(name),
    );
    map.insert(
        ctx.fields.display_name(ctx.ticker_key).to_string(),
        FieldValue::from(name),
    );
    map
}
