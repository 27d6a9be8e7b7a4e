//! Performance benchmarks for model diffing and the local scan

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use elara::diff::diff;
use elara::model::DirectoryModel;
use elara::scan::LocalScanner;

/// `folders` folders of `files_per_folder` files; every `skip`-th file left out
fn build_model(folders: usize, files_per_folder: usize, skip: usize) -> DirectoryModel {
    let mut model = DirectoryModel::new();
    for f in 0..folders {
        let folder = if f == 0 {
            "/".to_string()
        } else {
            format!("/seq{:03}/shot{:03}", f / 10, f)
        };
        for i in 0..files_per_folder {
            if skip > 0 && i % skip == 0 {
                continue;
            }
            model.insert_file(folder.clone(), format!("frame.{:04}.exr", i));
        }
    }
    model
}

fn bench_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("model_diff");

    for folders in [10, 100, 1000] {
        let local = build_model(folders, 100, 7);
        let remote = build_model(folders, 100, 11);
        group.throughput(Throughput::Elements((folders * 100) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(folders), &folders, |b, _| {
            b.iter(|| diff(black_box(&local), black_box(&remote)))
        });
    }

    group.finish();
}

fn bench_local_scan(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    for f in 0..50 {
        let folder = dir.path().join(format!("shot{:03}", f));
        std::fs::create_dir_all(&folder).unwrap();
        for i in 0..40 {
            std::fs::write(folder.join(format!("frame.{:04}.exr", i)), b"").unwrap();
        }
    }
    let scanner = LocalScanner::new(dir.path());

    c.bench_function("local_scan_2000_files", |b| {
        b.iter(|| scanner.scan().unwrap())
    });
}

criterion_group!(benches, bench_diff, bench_local_scan);
criterion_main!(benches);
