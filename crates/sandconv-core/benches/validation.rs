//! Security validation benchmarks for sandconv.
//!
//! Measures validation performance:
//! - Entry name normalization against a sandbox root
//! - Upload filename sanitization
//! - Central directory pre-scan for archives of growing entry counts
//! - Extraction of a small multi-file archive
//!
//! The pre-scan runs on every upload, so it should stay well below the cost
//! of extraction itself.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::field_reassign_with_default,
    missing_docs
)]

use criterion::BenchmarkId;
use criterion::Criterion;
use criterion::Throughput;
use criterion::criterion_group;
use criterion::criterion_main;
use sandconv_core::ArchiveLimits;
use sandconv_core::SafePath;
use sandconv_core::SandboxRoot;
use sandconv_core::UploadedArchive;
use sandconv_core::extraction::SecureExtractor;
use sandconv_core::security::ArchiveValidator;
use sandconv_core::security::check_entry_name;
use sandconv_core::security::sanitize_filename;
use sandconv_core::test_utils::create_test_zip;
use sandconv_core::test_utils::create_zip_with_entries;
use std::hint::black_box;
use tempfile::TempDir;

/// Entry name benchmarks.
fn benchmark_path_normalization(c: &mut Criterion) {
    let mut group = c.benchmark_group("path_normalization");

    let temp = TempDir::new().unwrap();
    let root = SandboxRoot::new(temp.path()).unwrap();
    let limits = ArchiveLimits::default();

    group.bench_function("simple", |b| {
        b.iter(|| SafePath::normalize(black_box("docs/guide/page.txt"), &root, &limits));
    });

    group.bench_function("with_dot_segments", |b| {
        b.iter(|| SafePath::normalize(black_box("./docs/./guide/./page.txt"), &root, &limits));
    });

    group.bench_function("deep", |b| {
        b.iter(|| SafePath::normalize(black_box("a/b/c/d/e/f/g/h/i/j/page.txt"), &root, &limits));
    });

    group.bench_function("traversal_rejected", |b| {
        b.iter(|| SafePath::normalize(black_box("docs/../../etc/passwd"), &root, &limits));
    });

    group.bench_function("prescan_name_check", |b| {
        b.iter(|| check_entry_name(black_box("Kit.doccarchive/data/documentation/kit/page.json"), &limits));
    });

    group.finish();
}

/// Upload filename benchmarks.
fn benchmark_filename_sanitization(c: &mut Criterion) {
    let mut group = c.benchmark_group("filename_sanitization");

    group.bench_function("plain", |b| {
        b.iter(|| sanitize_filename(black_box("MyKit.doccarchive.zip"), 255));
    });

    group.bench_function("with_directories", |b| {
        b.iter(|| sanitize_filename(black_box("C:\\Users\\dev\\Downloads\\MyKit.zip"), 255));
    });

    group.bench_function("rejected", |b| {
        b.iter(|| sanitize_filename(black_box("$(reboot).zip"), 255));
    });

    group.finish();
}

/// Pre-scan throughput as the entry count grows.
fn benchmark_prescan(c: &mut Criterion) {
    let mut group = c.benchmark_group("prescan");
    let limits = ArchiveLimits::default();
    let validator = ArchiveValidator::new(&limits);

    for count in [10, 100, 1_000, 5_000] {
        let upload = UploadedArchive::new("docs.zip", create_zip_with_entries(count));
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &upload, |b, upload| {
            b.iter(|| validator.validate(black_box(upload)).unwrap());
        });
    }

    group.finish();
}

/// End-to-end extraction of a small archive.
fn benchmark_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("extraction");
    let limits = ArchiveLimits::default();
    let page = vec![b'x'; 4 * 1024];
    let names: Vec<String> = (0..50).map(|i| format!("docs/section-{}/page-{i}.txt", i % 5)).collect();
    let zip = create_test_zip(names.iter().map(|name| (name.as_str(), page.as_slice())).collect());

    group.throughput(Throughput::Bytes(zip.len() as u64));
    group.bench_function("50_files", |b| {
        b.iter_with_setup(
            || {
                let temp = TempDir::new().unwrap();
                let root = SandboxRoot::new(temp.path()).unwrap();
                (temp, root)
            },
            |(_temp, root)| {
                SecureExtractor::new(&limits)
                    .extract(black_box(&zip), &root)
                    .unwrap()
            },
        );
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_path_normalization,
    benchmark_filename_sanitization,
    benchmark_prescan,
    benchmark_extraction
);
criterion_main!(benches);
