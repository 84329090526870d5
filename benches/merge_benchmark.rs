use criterion::{criterion_group, criterion_main, Criterion};
use measurement_journal::services::chart::{table_points, ChartSpec};
use measurement_journal::services::merger::{has_equivalent_entry, merge_chart_block};
use std::hint::black_box;

/// A measurement file with a year of daily rows and a chart.
fn large_measurement_file() -> String {
    let mut doc = String::from("# Weight\n\n| Date | User | Value (kg) |\n| --- | --- | --- |\n");
    for day in 0..365 {
        let value = 80.0 - f64::from(day) * 0.02;
        doc.push_str(&format!(
            "| 2025-{:02}-{:02} 07:30 | Me | {value:.1} |\n",
            day / 28 % 12 + 1,
            day % 28 + 1
        ));
    }
    doc
}

fn benchmark_dedup(c: &mut Criterion) {
    let doc = large_measurement_file();
    let spec = ChartSpec {
        title: "Weight".to_string(),
        y_label: "Weight (kg)".to_string(),
    };
    let charted = merge_chart_block(&doc, &table_points(&doc), &spec);

    let mut group = c.benchmark_group("measurement_file");

    group.bench_function("duplicate_row_found", |b| {
        b.iter(|| has_equivalent_entry(black_box(&charted), black_box("| 2025-06-10 07:30 | Me | 77.0 |")))
    });

    group.bench_function("new_row_scans_everything", |b| {
        b.iter(|| has_equivalent_entry(black_box(&charted), black_box("| 2026-01-05 07:30 | Me | 72.0 |")))
    });

    group.bench_function("rechart", |b| {
        b.iter(|| merge_chart_block(black_box(&charted), &table_points(&charted), &spec))
    });

    group.finish();
}

criterion_group!(benches, benchmark_dedup);
criterion_main!(benches);
