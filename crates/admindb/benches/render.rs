use admindb::dialect::Where;
use admindb::{DialectKind, Parameters, SqlComponent, Value, WhereState};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

/// Component with `n` equality conditions, ordered and paginated.
fn build_component(n: usize) -> SqlComponent {
    let mut comp = SqlComponent::new("goadmin_users");
    comp.fields = vec!["id".into(), "username".into(), "created_at".into()];
    for i in 0..n {
        comp.wheres.push(Where {
            field: format!("col{i}"),
            operator: "=".into(),
            placeholder: "?".into(),
        });
        comp.args.push(Value::Int(i as i64));
    }
    comp.order = "`id` DESC".into();
    comp.limit = "10".into();
    comp.offset = "20".into();
    comp
}

fn bench_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("render/select");

    for kind in [DialectKind::Mysql, DialectKind::Postgresql, DialectKind::Mssql] {
        let dialect = kind.dialect();
        for n in [1, 10, 50] {
            let comp = build_component(n);
            group.bench_with_input(
                BenchmarkId::new(kind.as_str(), n),
                &comp,
                |b, comp| {
                    b.iter(|| {
                        let mut comp = comp.clone();
                        let sql = dialect.select(&mut comp);
                        black_box(dialect.prepare(&sql));
                    });
                },
            );
        }
    }

    group.finish();
}

fn bench_filters(c: &mut Criterion) {
    let mut group = c.benchmark_group("render/filters");

    for n in [1, 10, 50] {
        let mut query = String::from("__page=2&__pageSize=20&__sort=id");
        let mut columns = Vec::with_capacity(n);
        for i in 0..n {
            query.push_str(&format!("&col{i}=v{i}&col{i}__goadmin_operator__=like"));
            columns.push(format!("col{i}"));
        }
        group.bench_with_input(BenchmarkId::from_parameter(n), &query, |b, query| {
            b.iter(|| {
                let params = Parameters::from_query(query, 10, "id");
                black_box(params.compile_plain(
                    WhereState::new(),
                    "goadmin_users",
                    ("`", "`"),
                    &columns,
                ));
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_select, bench_filters);
criterion_main!(benches);
