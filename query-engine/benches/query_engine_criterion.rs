/********************************************************************************
 * Copyright (c) 2024 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use query_engine::{Event, QueryEngine, QueryOptions};
use serde_json::json;

fn populated_engine(queries: usize) -> QueryEngine {
    let mut engine = QueryEngine::new();
    for index in 0..queries {
        let options = QueryOptions::from_value(json!({
            "types": [format!("record.{}", index % 16), "comment.*"],
            "appInstanceDepth": (index % 4) as u32,
            "payloadQuery": [
                { "payload.ownerId": format!("user-{index}") },
                { "payload.status": "escalated", "payload.region": format!("{}*", index % 8) }
            ]
        }))
        .expect("bench options are valid");
        engine
            .save_query(&format!("socket-{index}"), &options)
            .expect("bench query saves");
    }
    engine
}

fn bench_matches(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_engine_matches");

    for queries in [100usize, 1_000, 10_000] {
        let engine = populated_engine(queries);
        let mut event = Event::new("record.3", "workspace-1");
        event.source.app_instance_depth = Some(1);
        event.payload = json!({ "ownerId": "user-3", "status": "escalated", "region": "3-eu" });

        group.bench_with_input(BenchmarkId::from_parameter(queries), &event, |b, event| {
            b.iter(|| black_box(engine.matches(black_box(event))))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_matches);
criterion_main!(benches);
