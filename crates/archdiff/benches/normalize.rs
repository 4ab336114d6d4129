use archdiff::{apply_patch, parse_arch, ArchNormalizer};
use criterion::{criterion_group, criterion_main, Criterion};
use std::fmt::Write;
use std::hint::black_box;

const SMALL_GROUPS: usize = 8;
const LARGE_GROUPS: usize = 200;

/// A form with `groups` groups of five fields each.
fn make_form(groups: usize, edited: bool) -> String {
    let mut xml = String::from("<form><sheet>");
    for g in 0..groups {
        let _ = write!(xml, r#"<group name="g{g}">"#);
        for f in 0..5 {
            if edited && g % 3 == 0 && f == 2 {
                // Inserted field and changed attribute
                let _ = write!(xml, r#"<field name="new_{g}"/>"#);
                let _ = write!(xml, r#"<field name="f{g}_{f}" required="1"/>"#);
            } else if edited && g % 7 == 1 && f == 4 {
                // Field moved to the next group below
                continue;
            } else {
                let _ = write!(xml, r#"<field name="f{g}_{f}"/>"#);
            }
        }
        if edited && g % 7 == 2 {
            let _ = write!(xml, r#"<field name="f{}_4"/>"#, g - 1);
        }
        xml.push_str("</group>");
    }
    xml.push_str("</sheet></form>");
    xml
}

fn bench_compile_small(c: &mut Criterion) {
    let old = make_form(SMALL_GROUPS, false);
    let new = make_form(SMALL_GROUPS, true);
    let normalizer = ArchNormalizer::default();
    c.bench_function("bench_compile_small", |b| {
        b.iter(|| {
            let normalized = normalizer.compile(black_box(&old), black_box(&new)).unwrap();
            black_box(normalized.patch.len());
        });
    });
}

fn bench_compile_large(c: &mut Criterion) {
    let old = make_form(LARGE_GROUPS, false);
    let new = make_form(LARGE_GROUPS, true);
    let normalizer = ArchNormalizer::default();
    c.bench_function("bench_compile_large", |b| {
        b.iter(|| {
            let normalized = normalizer.compile(black_box(&old), black_box(&new)).unwrap();
            black_box(normalized.patch.len());
        });
    });
}

fn bench_apply_large(c: &mut Criterion) {
    let old = make_form(LARGE_GROUPS, false);
    let new = make_form(LARGE_GROUPS, true);
    let patch = ArchNormalizer::default().compile(&old, &new).unwrap().patch;
    let arch = parse_arch(&old).unwrap();
    c.bench_function("bench_apply_large", |b| {
        b.iter(|| {
            let patched = apply_patch(black_box(&arch), black_box(&patch)).unwrap();
            black_box(patched.children.len());
        });
    });
}

criterion_group!(
    benches,
    bench_compile_small,
    bench_compile_large,
    bench_apply_large
);
criterion_main!(benches);
