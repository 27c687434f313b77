use chainorm::{Dialect, QueryBuilder, Row, Value, ValueCodec, params, placeholder};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

/// SELECT with `n` fields and `n` AND-joined conditions.
fn build_select(n: usize) -> QueryBuilder {
    let fields: Vec<String> = (0..n).map(|i| format!("col{i}")).collect();
    let refs: Vec<&str> = fields.iter().map(String::as_str).collect();
    let mut q = QueryBuilder::new();
    if let Ok(select) = q.select("t", &refs) {
        for i in 0..n {
            let _ = select.where_(&format!("col{i} = ?"), params![i as i64]);
        }
    }
    q
}

fn bench_to_param(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_builder/to_param");

    for n in [1, 5, 10, 50] {
        let q = build_select(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &q, |b, q| {
            b.iter(|| black_box(q.to_param()));
        });
    }

    group.finish();
}

fn bench_to_sql_string(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_builder/to_sql_string");

    for n in [1, 5, 10, 50] {
        let q = build_select(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &q, |b, q| {
            b.iter(|| black_box(q.to_sql_string()));
        });
    }

    group.finish();
}

fn bench_in_list(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_builder/in_list");

    for n in [5_i64, 20, 100, 500] {
        let ids: Vec<Value> = (0..n).map(Value::from).collect();
        group.bench_with_input(BenchmarkId::from_parameter(n), &ids, |b, ids| {
            b.iter(|| {
                let mut q = QueryBuilder::new();
                let _ = q
                    .select("t", &["id"])
                    .and_then(|s| s.where_("id IN ?", vec![Value::Array(ids.clone())]));
                black_box(q.to_param())
            });
        });
    }

    group.finish();
}

fn bench_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_builder/update");

    for n in [1, 10, 50] {
        let mut fields = Row::new();
        for i in 0..n {
            fields.insert(format!("col{i}"), format!("value {i}"));
        }
        group.bench_with_input(BenchmarkId::from_parameter(n), &fields, |b, fields| {
            b.iter(|| {
                let mut q = QueryBuilder::new();
                let _ = q
                    .update("t")
                    .and_then(|u| u.update_fields(fields.clone()))
                    .and_then(|u| u.where_("id = ?", params![1]));
                black_box(q.to_param())
            });
        });
    }

    group.finish();
}

fn bench_inline_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_builder/inline_all");

    for dialect in [Dialect::Mysql, Dialect::Postgres] {
        let codec = ValueCodec::new(dialect);
        let sql = "UPDATE t SET a = ?, b = ?, c = ? WHERE id = ?";
        let values = params!["it's", 3.5, true, 42];
        group.bench_function(format!("{dialect:?}"), |b| {
            b.iter(|| black_box(placeholder::inline_all(sql, &values, &codec)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_to_param,
    bench_to_sql_string,
    bench_in_list,
    bench_update,
    bench_inline_all
);
criterion_main!(benches);
