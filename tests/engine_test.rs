//! End-to-end behaviour of the derivation engine.
//!
//! Tests cover:
//! - Idempotent recomputation
//! - Solver pass bound, dependency order and cycles
//! - Weighted basket aggregation
//! - Once / repeating alert policy and reset
//! - Missing raw data and malformed ticks

mod common;

use approx::assert_relative_eq;
use common::*;
use serde_json::json;
use tickwatch::domain::engine::{compute, EngineConfig, EngineState};
use tickwatch::domain::entity::{Entity, Frequency};
use tickwatch::domain::solver::max_passes;
use tickwatch::domain::tick::RawPool;
use tickwatch::domain::value::FieldValue;

mod recomputation {
    use super::*;

    #[test]
    fn recompute_twice_gives_identical_snapshot() {
        let mut engine = engine(vec![
            Entity::base_stock(1, "A", "sh.AAA"),
            Entity::base_stock(2, "B", "sh.BBB"),
            Entity::stock_group(3, "G", &[("sh.AAA", 1.0), ("sh.BBB", 2.0)]),
            Entity::custom_field(4, "rel", "[price] / {G}[price]"),
        ]);
        let mut sink = RecordingAlertSink::default();
        engine.ingest(&[tick("AAA", 10.0), tick("BBB", 13.0)], &mut sink);
        let first = engine.snapshot().clone();

        engine.recompute(&mut sink);
        assert_eq!(engine.snapshot(), &first);
        engine.recompute(&mut sink);
        assert_eq!(engine.snapshot(), &first);
    }

    #[test]
    fn snapshot_replaced_wholesale() {
        let mut engine = engine(vec![
            Entity::base_stock(1, "A", "sh.AAA"),
            Entity::base_stock(2, "B", "sh.BBB"),
        ]);
        let mut sink = RecordingAlertSink::default();
        engine.ingest(&[tick("AAA", 1.0), tick("BBB", 2.0)], &mut sink);
        assert_eq!(engine.snapshot().len(), 2);

        engine.clear();
        engine.ingest(&[tick("AAA", 3.0)], &mut sink);
        assert_eq!(engine.snapshot().len(), 1);
        assert_eq!(number(engine.snapshot(), "A", "price"), Some(3.0));
    }

    #[test]
    fn compute_depends_only_on_pool_and_workspace() {
        let ws = workspace(vec![
            Entity::base_stock(1, "A", "sh.AAA"),
            Entity::custom_field(2, "x", "[price] ^ 2"),
        ]);
        let mut pool = RawPool::new();
        pool.ingest(&[tick("AAA", 4.0)], "a1");
        let config = EngineConfig::default();
        let (a, _) = compute(&ws, &pool, &config);
        let (b, _) = compute(&ws, &pool, &config);
        assert_eq!(a, b);
        assert_eq!(number(&a, "A", "x"), Some(16.0));
    }
}

mod solver {
    use super::*;

    #[test]
    fn passes_never_exceed_field_count_plus_one() {
        let entities = vec![
            Entity::base_stock(1, "A", "sh.AAA"),
            Entity::custom_field(2, "f5", "[f4] + 1"),
            Entity::custom_field(3, "f4", "[f3] + 1"),
            Entity::custom_field(4, "f3", "[f2] + 1"),
            Entity::custom_field(5, "f2", "[f1] + 1"),
            Entity::custom_field(6, "f1", "[price]"),
            Entity::custom_field(7, "loop_a", "[loop_b]"),
            Entity::custom_field(8, "loop_b", "[loop_a]"),
        ];
        let ws = workspace(entities.clone());
        let mut engine = engine(entities);
        let report = engine.ingest(&[tick("AAA", 1.0)], &mut RecordingAlertSink::default());

        assert!(report.solve.passes <= max_passes(&ws));
        assert_eq!(number(engine.snapshot(), "A", "f5"), Some(5.0));
        assert!(!engine.snapshot()["A"].contains_key("loop_a"));
    }

    #[test]
    fn dependency_resolved_in_either_declaration_order() {
        for entities in [
            vec![
                Entity::base_stock(1, "A", "sh.AAA"),
                Entity::custom_field(2, "X", "[Y] + 1"),
                Entity::custom_field(3, "Y", "5"),
            ],
            vec![
                Entity::base_stock(1, "A", "sh.AAA"),
                Entity::custom_field(3, "Y", "5"),
                Entity::custom_field(2, "X", "[Y] + 1"),
            ],
        ] {
            let mut engine = engine(entities);
            engine.ingest(&[tick("AAA", 1.0)], &mut RecordingAlertSink::default());
            assert_eq!(number(engine.snapshot(), "A", "X"), Some(6.0));
        }
    }

    #[test]
    fn mutual_cycle_leaves_both_unset() {
        let mut engine = engine(vec![
            Entity::base_stock(1, "S", "sh.AAA"),
            Entity::custom_field(2, "A", "[B]"),
            Entity::custom_field(3, "B", "[A]"),
        ]);
        let report = engine.ingest(&[tick("AAA", 1.0)], &mut RecordingAlertSink::default());
        let s = &engine.snapshot()["S"];
        assert!(!s.contains_key("A"));
        assert!(!s.contains_key("B"));
        assert_eq!(report.solve.unresolved, 2);
    }

    #[test]
    fn custom_field_over_group_and_across_entities() {
        let mut engine = engine(vec![
            Entity::base_stock(1, "A", "sh.AAA"),
            Entity::base_stock(2, "B", "sh.BBB"),
            Entity::stock_group(3, "G", &[("sh.AAA", 1.0), ("sh.BBB", 1.0)]),
            Entity::custom_field(4, "vs_group", "[price] - {g}[price]"),
        ]);
        engine.ingest(&[tick("AAA", 10.0), tick("BBB", 20.0)], &mut RecordingAlertSink::default());
        let snap = engine.snapshot();
        assert_eq!(number(snap, "A", "vs_group"), Some(-5.0));
        assert_eq!(number(snap, "B", "vs_group"), Some(5.0));
        assert_eq!(number(snap, "G", "vs_group"), Some(0.0));
    }

    #[test]
    fn long_sum_formula_completes_cycle() {
        for (terms, expected) in [(100, FieldValue::Number(100.0)), (20_000, FieldValue::Null)] {
            let formula = vec!["[price]"; terms].join(" + ");
            let mut engine = engine(vec![
                Entity::base_stock(1, "A", "sh.AAA"),
                Entity::custom_field(2, "total", &formula),
            ]);
            engine.ingest(&[tick("AAA", 1.0)], &mut RecordingAlertSink::default());
            assert_eq!(engine.snapshot()["A"].get("total"), Some(&expected));
        }
    }

    #[test]
    fn division_by_zero_stored_as_null() {
        let mut engine = engine(vec![
            Entity::base_stock(1, "A", "sh.AAA"),
            Entity::custom_field(2, "bad", "[price] / ([price] - [price])"),
        ]);
        engine.ingest(&[tick("AAA", 2.0)], &mut RecordingAlertSink::default());
        assert_eq!(engine.snapshot()["A"].get("bad"), Some(&FieldValue::Null));
    }
}

mod aggregation {
    use super::*;

    #[test]
    fn weighted_basket_average() {
        let mut engine = engine(vec![
            Entity::base_stock(1, "A", "sh.AAA"),
            Entity::base_stock(2, "B", "sh.BBB"),
            Entity::stock_group(3, "G", &[("sh.AAA", 1.0), ("sh.BBB", 3.0)]),
        ]);
        engine.ingest(&[tick("AAA", 10.0), tick("BBB", 20.0)], &mut RecordingAlertSink::default());
        assert_relative_eq!(number(engine.snapshot(), "G", "price").unwrap(), 17.5);
        assert_eq!(
            engine.snapshot()["G"].get("name"),
            Some(&FieldValue::from("G"))
        );
    }

    #[test]
    fn group_without_member_data_has_identity_only() {
        let mut engine = engine(vec![
            Entity::base_stock(1, "A", "sh.AAA"),
            Entity::stock_group(2, "G", &[("sh.AAA", 1.0)]),
        ]);
        engine.ingest(&[tick("ZZZ", 1.0)], &mut RecordingAlertSink::default());
        let g = &engine.snapshot()["G"];
        assert_eq!(g.len(), 2);
        assert_eq!(g.get("code"), Some(&FieldValue::from("G")));
    }
}

mod alerts {
    use super::*;

    fn alert_engine(frequency: Frequency) -> tickwatch::domain::engine::EngineState {
        engine(vec![
            Entity::base_stock(1, "A", "sh.AAA"),
            Entity::alert_rule(2, "A high", alert("{A}[price] > 10", frequency)),
        ])
    }

    #[test]
    fn once_fires_on_first_cycle_only_then_again_after_reset() {
        let mut engine = alert_engine(Frequency::Once);
        let mut sink = RecordingAlertSink::default();
        for _ in 0..5 {
            engine.ingest(&[tick("AAA", 11.0)], &mut sink);
        }
        assert_eq!(sink.notifications.len(), 1);
        assert_eq!(
            sink.notifications[0],
            ("A high".to_string(), "{A}[price] > 10".to_string())
        );
        assert_eq!(sink.sounds, 1);

        engine.reset_triggered();
        engine.ingest(&[tick("AAA", 11.0)], &mut sink);
        assert_eq!(sink.notifications.len(), 2);
    }

    #[test]
    fn repeating_fires_each_cycle_while_true() {
        let mut engine = alert_engine(Frequency::Repeating);
        let mut sink = RecordingAlertSink::default();
        engine.ingest(&[tick("AAA", 11.0)], &mut sink);
        engine.ingest(&[tick("AAA", 9.0)], &mut sink);
        engine.ingest(&[tick("AAA", 12.0)], &mut sink);
        assert_eq!(sink.notifications.len(), 2);
    }

    #[test]
    fn missing_entity_means_not_triggered() {
        let mut engine = alert_engine(Frequency::Repeating);
        let mut sink = RecordingAlertSink::default();
        let report = engine.ingest(&[tick("BBB", 50.0)], &mut sink);
        assert!(report.alerts.is_empty());
        assert_eq!(sink.sounds, 0);
    }

    #[test]
    fn workspace_switch_rearms_once_rules() {
        let mut engine = alert_engine(Frequency::Once);
        let mut sink = RecordingAlertSink::default();
        engine.ingest(&[tick("AAA", 11.0)], &mut sink);
        let ws = engine.workspace().cloned();
        engine.switch_workspace(ws);
        engine.ingest(&[tick("AAA", 11.0)], &mut sink);
        assert_eq!(sink.sounds, 2);
    }
}

mod ingestion {
    use super::*;

    #[test]
    fn base_stock_without_raw_data_is_absent() {
        let mut engine = engine(vec![
            Entity::base_stock(1, "A", "sh.AAA"),
            Entity::base_stock(2, "B", "sh.BBB"),
        ]);
        engine.ingest(&[tick("AAA", 1.0)], &mut RecordingAlertSink::default());
        assert!(engine.snapshot().contains_key("A"));
        assert!(!engine.snapshot().contains_key("B"));
    }

    #[test]
    fn entries_without_ticker_are_dropped() {
        let mut engine = engine(vec![Entity::base_stock(1, "A", "sh.AAA")]);
        let report = engine.ingest(
            &[
                json!({"a3": 1.0}),
                json!({"a1": "", "a3": 2.0}),
                json!(null),
                tick("aaa", 3.0),
            ],
            &mut RecordingAlertSink::default(),
        );
        assert_eq!(report.ingest.accepted, 1);
        assert_eq!(report.ingest.dropped, 3);
        assert_eq!(engine.raw_pool().len(), 1);
        assert_eq!(number(engine.snapshot(), "A", "price"), Some(3.0));
    }

    #[test]
    fn no_workspace_gives_empty_snapshot() {
        let mut engine = EngineState::new(EngineConfig::default());
        engine.ingest(&[tick("AAA", 1.0)], &mut RecordingAlertSink::default());
        assert!(engine.snapshot().is_empty());
    }
}
