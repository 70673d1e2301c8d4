use std::hint::black_box;
use std::io::Write;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use tempfile::NamedTempFile;

use accidents_etl::engine::{materialize, CountSink, ExecOptions};
use accidents_etl::plan::{DeriveExpr, LazyTable, ScanOptions};
use accidents_etl::table::temporal::parse_timestamp;

fn synthetic_source(rows: usize) -> NamedTempFile {
    let mut tmp = NamedTempFile::new().expect("create tmp");
    writeln!(tmp, "ID,Start_Time,End_Time,City,State,Wind_Speed(mph)").unwrap();
    for i in 0..rows {
        let city = if i % 7 == 0 { "" } else { "Sacramento" };
        let state = if i % 3 == 0 { "OR" } else { "CA" };
        let wind = if i % 5 == 0 { String::new() } else { format!("{}.5", i % 30) };
        writeln!(
            tmp,
            "A-{i},2016-02-{:02} {:02}:15:00,2016-02-{:02} {:02}:45:00,{city},{state},{wind}",
            i % 28 + 1,
            i % 24,
            i % 28 + 1,
            i % 24,
        )
        .unwrap();
    }
    tmp.flush().unwrap();
    tmp
}

fn bench_timestamp_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("timestamp_parsing");

    group.bench_function("plain", |b| {
        b.iter(|| parse_timestamp(black_box("2016-02-08 05:46:00")));
    });
    group.bench_function("fractional", |b| {
        b.iter(|| parse_timestamp(black_box("2016-02-08 05:46:00.000000000")));
    });
    group.bench_function("unparseable", |b| {
        b.iter(|| parse_timestamp(black_box("not recorded")));
    });

    group.finish();
}

fn bench_materialize(c: &mut Criterion) {
    let mut group = c.benchmark_group("materialize");
    group.sample_size(20);

    let source = synthetic_source(20_000);
    let plan = LazyTable::scan(source.path(), &ScanOptions::default())
        .unwrap()
        .drop(["ID"])
        .parse_timestamp("Start_Time")
        .unwrap()
        .parse_timestamp("End_Time")
        .unwrap()
        .filter_null_subset(["City"])
        .unwrap()
        .derive("Hour", DeriveExpr::hour("Start_Time"))
        .unwrap()
        .derive(
            "Duration_Minutes",
            DeriveExpr::minutes_between("Start_Time", "End_Time"),
        )
        .unwrap()
        .fill_null("Wind_Speed(mph)", 0.0)
        .unwrap();

    for chunk_rows in [1_000usize, 10_000, 50_000] {
        group.bench_with_input(
            BenchmarkId::new("clean_plan", chunk_rows),
            &chunk_rows,
            |b, &chunk_rows| {
                b.iter(|| {
                    let mut sink = CountSink::new();
                    materialize(&plan, &mut sink, &ExecOptions { chunk_rows }).unwrap();
                    black_box(sink.rows())
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_timestamp_parsing, bench_materialize);
criterion_main!(benches);
