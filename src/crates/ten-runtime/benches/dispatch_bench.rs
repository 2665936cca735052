use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ten_runtime::engine::Engine;
use ten_runtime::location::Location;
use ten_runtime::msg::path_table::{GroupPolicy, PathTable, ResolvedResult};
use ten_runtime::msg::Message;

fn decide_dispatch_benchmark(c: &mut Criterion) {
    let (_tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let engine = Engine::new("app://bench", rx);
    let dest = Location::new("app://bench", engine.graph_id.clone(), "grp", "");

    c.bench_function("engine decide_dispatch", |b| {
        b.iter(|| {
            let mut msg = Message::cmd("ping");
            msg.clear_and_set_dest(dest.clone());
            black_box(engine.decide_dispatch(black_box(msg)));
        });
    });
}

fn resolve_out_path_fan_out_benchmark(c: &mut Criterion) {
    let loc = Location::for_extension("app://bench", "g1", "grp", "e1");

    c.bench_function("path table resolve_out_path fan-out", |b| {
        b.iter(|| {
            let mut table = PathTable::new();
            for seq in 0..8u32 {
                table.add_out_path(
                    format!("member-{seq}"),
                    "do_thing",
                    loc.clone(),
                    Duration::from_secs(5),
                    Some("parent".to_string()),
                    Some(GroupPolicy::FirstErrorOrLastOk),
                    seq,
                );
            }
            for seq in 0..8u32 {
                black_box(table.resolve_out_path(
                    &format!("member-{seq}"),
                    ResolvedResult::Ok { detail: Some("done".to_string()) },
                ));
            }
        });
    });
}

criterion_group!(benches, decide_dispatch_benchmark, resolve_out_path_fan_out_benchmark);
criterion_main!(benches);
