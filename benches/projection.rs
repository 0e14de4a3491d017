use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use rowproj_core::expr::ExprArena;
use rowproj_core::row::{Row, VarlenHeap};
use rowproj_core::schema::{DataType, Field, Schema};
use rowproj_core::types::Scalar;
use rowproj_operators::OptimizedProjector;

const FIELDS: usize = 32;

fn make_schema() -> Arc<Schema> {
    Arc::new(Schema::new(
        (0..FIELDS)
            .map(|i| {
                let data_type = if i % 4 == 3 {
                    DataType::Utf8
                } else {
                    DataType::Int64
                };
                Field::new(format!("f{i}"), data_type, i % 2 == 0)
            })
            .collect(),
    ))
}

fn make_row(schema: &Arc<Schema>, heap: &VarlenHeap) -> Row {
    let values: Vec<Scalar> = (0..FIELDS)
        .map(|i| match schema.data_type(i) {
            DataType::Utf8 => Scalar::Str(format!("value-{i}")),
            _ => Scalar::I64(i as i64 * 31),
        })
        .collect();
    Row::from_values(schema.clone(), heap.clone(), &values).unwrap()
}

fn bench_projection(c: &mut Criterion) {
    let schema = make_schema();
    let heap = VarlenHeap::new();
    let src = make_row(&schema, &heap);

    let mut arena = ExprArena::new();
    let exprs: Vec<_> = (0..FIELDS).map(|i| arena.column(i).unwrap()).collect();
    let uncompiled = OptimizedProjector::new(&exprs);
    let mut compiled = uncompiled.clone();
    compiled.optimize(&schema, &schema, &arena).unwrap();

    let mut dst = Row::new(schema.clone(), heap.clone());
    c.bench_function("project_uncompiled", |b| {
        b.iter(|| uncompiled.exec(&mut dst, &src, &arena).unwrap())
    });
    c.bench_function("project_compiled", |b| {
        b.iter(|| compiled.exec(&mut dst, &src, &arena).unwrap())
    });

    // Every other index flipped: no two copies stay adjacent.
    let mut scattered = uncompiled.clone();
    scattered.permute_on_index_bit(5, 0).unwrap();
    scattered.optimize(&schema, &schema, &arena).unwrap();
    c.bench_function("project_compiled_scattered", |b| {
        b.iter(|| scattered.exec(&mut dst, &src, &arena).unwrap())
    });
}

criterion_group!(benches, bench_projection);
criterion_main!(benches);
