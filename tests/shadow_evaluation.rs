// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shadow evaluation through the public facade: candidate configurations
//! compared against a live baseline, with mismatch reporting.

use konditional::prelude::*;
use konditional::{EvaluationMode, Hooks, InMemoryMetrics, MismatchKind, NoopLogger};
use std::sync::{Arc, Mutex};

fn feature(key: &str) -> Feature<i64> {
    Feature::register("shadows", key, 0)
}

fn ns_serving(feature: &Feature<i64>, value: i64, metrics: Option<InMemoryMetrics>) -> Namespace {
    let hooks = match metrics {
        Some(metrics) => Hooks::new(Arc::new(NoopLogger), Arc::new(metrics)),
        None => Hooks::noop(),
    };
    let ns = Namespace::new("shadows", 2, hooks);
    ns.load(
        Configuration::builder()
            .flag(
                FlagDefinition::builder(feature)
                    .rule(Rule::builder().platforms(["IOS"]), value)
                    .build()
                    .unwrap(),
            )
            .version("base")
            .build(),
    );
    ns
}

fn ios() -> EvalContext {
    EvalContext::new()
        .with_platform("IOS")
        .with_stable_id(StableId::of("shadow-user"))
}

#[test]
fn matching_candidate_is_silent() {
    let f = feature("silent");
    let baseline = ns_serving(&f, 7, None);
    let candidate = ns_serving(&f, 7, None);
    let mismatches = Mutex::new(Vec::new());

    let value = evaluate_with_shadow(
        &f,
        &ios(),
        &candidate,
        &baseline,
        &ShadowOptions::default(),
        |m| mismatches.lock().unwrap().push(m),
    );
    assert_eq!(value, 7);
    assert!(mismatches.lock().unwrap().is_empty());
}

#[test]
fn differing_candidate_reports_and_baseline_still_serves() {
    let f = feature("diverges");
    let baseline = ns_serving(&f, 7, None);
    let candidate = ns_serving(&f, 9, None);
    let mismatches = Mutex::new(Vec::new());

    let value = evaluate_with_shadow(
        &f,
        &ios(),
        &candidate,
        &baseline,
        &ShadowOptions::default(),
        |m| mismatches.lock().unwrap().push(m),
    );
    assert_eq!(value, 7, "the baseline always wins");

    let mismatches = mismatches.into_inner().unwrap();
    assert_eq!(mismatches.len(), 1);
    let mismatch = &mismatches[0];
    assert_eq!(mismatch.kinds, [MismatchKind::Value]);
    assert_eq!(mismatch.baseline.value, 7);
    assert_eq!(mismatch.candidate.value, 9);
    assert_eq!(mismatch.feature_key, f.id().canonical());
}

#[test]
fn shadow_traffic_is_segregated_in_telemetry() {
    let f = feature("segregated");
    let base_metrics = InMemoryMetrics::new();
    let cand_metrics = InMemoryMetrics::new();
    let baseline = ns_serving(&f, 7, Some(base_metrics.clone()));
    let candidate = ns_serving(&f, 9, Some(cand_metrics.clone()));

    let _ = evaluate_with_shadow(
        &f,
        &ios(),
        &candidate,
        &baseline,
        &ShadowOptions::default(),
        |_| {},
    );

    let base_records = base_metrics.evaluations();
    assert_eq!(base_records.len(), 1);
    assert_eq!(base_records[0].mode, EvaluationMode::Normal);

    let cand_records = cand_metrics.evaluations();
    assert_eq!(cand_records.len(), 1);
    assert_eq!(cand_records[0].mode, EvaluationMode::Shadow);
}

#[test]
fn disabled_baseline_short_circuits_unless_opted_in() {
    let f = feature("disabled_base");
    let baseline = ns_serving(&f, 7, None);
    baseline.disable_all();
    let cand_metrics = InMemoryMetrics::new();
    let candidate = ns_serving(&f, 9, Some(cand_metrics.clone()));

    let value = evaluate_with_shadow(
        &f,
        &ios(),
        &candidate,
        &baseline,
        &ShadowOptions::default(),
        |_| {},
    );
    assert_eq!(value, 0, "kill-switched baseline serves the declared default");
    assert!(cand_metrics.evaluations().is_empty(), "candidate skipped");

    let value = evaluate_with_shadow(
        &f,
        &ios(),
        &candidate,
        &baseline,
        &ShadowOptions {
            evaluate_candidate_when_baseline_disabled: true,
            ..ShadowOptions::default()
        },
        |_| {},
    );
    assert_eq!(value, 0);
    assert_eq!(cand_metrics.evaluations().len(), 1);
}
