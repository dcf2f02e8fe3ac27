//! Criterion benchmarks for tokenizing and welding.

use arcwelder::gcode::parse_line;
use arcwelder::{weld_gcode, WelderConfig};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

/// A long spiral of one-degree steps, the dense-segment shape slicers emit.
fn spiral_program(revolutions: usize) -> String {
    let mut program = String::from("G90\nM82\nG1 X20 Y0 F1800\n");
    let mut e = 0.0;
    for step in 1..=(revolutions * 360) {
        let angle = (step as f64).to_radians();
        let radius = 20.0 + step as f64 * 0.001;
        e += 0.01;
        program.push_str(&format!(
            "G1 X{:.3} Y{:.3} E{:.2}\n",
            radius * angle.cos(),
            radius * angle.sin(),
            e
        ));
    }
    program
}

fn weld_bench(c: &mut Criterion) {
    let fixture = include_str!("../tests/fixtures/ring_part.gcode");
    let spiral = spiral_program(10);
    let config = WelderConfig::default();

    let mut group = c.benchmark_group("weld");
    group.sample_size(10);

    group.bench_function("tokenize_fixture", |b| {
        b.iter(|| {
            for line in fixture.lines() {
                let _ = black_box(parse_line(black_box(line)));
            }
        });
    });

    group.bench_function("weld_fixture", |b| {
        b.iter(|| black_box(weld_gcode(&config, black_box(fixture))));
    });

    group.bench_function("weld_spiral", |b| {
        b.iter(|| black_box(weld_gcode(&config, black_box(&spiral))));
    });

    group.finish();
}

criterion_group!(benches, weld_bench);
criterion_main!(benches);
