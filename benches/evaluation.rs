// SPDX-License-Identifier: MIT OR Apache-2.0
//! Hot-path benchmarks: bucketing and end-to-end evaluation.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use konditional::prelude::*;
use konditional::{bucket_for, Hooks};

fn bench_bucketing(c: &mut Criterion) {
    let id = StableId::of("bench-user");
    c.bench_function("bucket_for", |b| {
        b.iter(|| {
            bucket_for(
                black_box("v1"),
                black_box("feature::bench::dark_mode"),
                black_box(&id),
            )
        })
    });
}

fn bench_evaluation(c: &mut Criterion) {
    let feature: Feature<bool> = Feature::register("bench", "dark_mode", false);
    let ns = Namespace::new("bench", 2, Hooks::noop());
    ns.load(
        Configuration::builder()
            .flag(
                FlagDefinition::builder(&feature)
                    .rule(
                        Rule::builder()
                            .platforms(["IOS"])
                            .locales(["en-US"])
                            .version(VersionRange::at_least(Version::new(2, 0, 0)))
                            .ramp_up(25.0),
                        true,
                    )
                    .rule(Rule::builder().platforms(["IOS"]).ramp_up(50.0), true)
                    .build()
                    .unwrap(),
            )
            .build(),
    );
    let ctx = EvalContext::new()
        .with_platform("IOS")
        .with_locale("en-US")
        .with_version(Version::new(2, 1, 0))
        .with_stable_id(StableId::of("bench-user"));

    c.bench_function("evaluate_two_rules", |b| {
        b.iter(|| ns.evaluate(black_box(&feature), black_box(&ctx)))
    });

    c.bench_function("evaluate_with_reason", |b| {
        b.iter(|| ns.evaluate_with_reason(black_box(&feature), black_box(&ctx)))
    });
}

criterion_group!(benches, bench_bucketing, bench_evaluation);
criterion_main!(benches);
