use bkrotate::archiver::open_artifact;
use bkrotate::config::LogTarget;
use bkrotate::{
    ArchiveOptions, Archiver, ArtifactName, BackupConfig, CompressFormat, CompressionLevel,
    Orchestrator, RetentionPolicy, TracingObserver,
};
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;

fn artifacts(dir: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| ArtifactName::parse(&p.file_name().unwrap().to_string_lossy()).is_some())
        .collect();
    paths.sort();
    paths
}

fn write_source(root: &Path) -> PathBuf {
    let source = root.join("documents");
    fs::create_dir_all(source.join("reports/2026")).unwrap();
    fs::create_dir_all(source.join("empty")).unwrap();
    fs::write(source.join("todo.txt"), "water the plants\n").unwrap();
    fs::write(
        source.join("reports/2026/q1.csv"),
        "month,total\n".repeat(300),
    )
    .unwrap();
    fs::write(source.join("reports/summary.bin"), [0u8, 1, 2, 255, 254]).unwrap();
    source
}

fn relative_files(root: &Path) -> Vec<(PathBuf, Vec<u8>)> {
    let mut files: Vec<_> = WalkDir::new(root)
        .into_iter()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e.path().strip_prefix(root).unwrap().to_path_buf();
            (rel, fs::read(e.path()).unwrap())
        })
        .collect();
    files.sort();
    files
}

#[test]
fn repeated_runs_keep_newest() {
    let temp = TempDir::new().unwrap();
    let source = write_source(temp.path());
    let dest = temp.path().join("backups");
    let mut created = vec![];

    for _ in 0..6 {
        let mut config = BackupConfig::new(&source, &dest);
        config.keep = 3;
        config.log = LogTarget::Console;
        let outcome = Orchestrator::new(config).run(&mut TracingObserver);
        assert!(outcome.is_success());
        created.push(outcome.summary.artifact_path.unwrap());
    }

    let remaining = artifacts(&dest);
    assert_eq!(remaining.len(), 3);
    let mut newest = created[3..].to_vec();
    newest.sort();
    assert_eq!(remaining, newest);
}

#[test]
fn megabyte_source_compresses() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("logs");
    fs::create_dir_all(&source).unwrap();
    let line = b"2026-10-17T09:00:00Z INFO request served in 12ms\n";
    let sizes = [500_000usize, 300_000, 200_000];
    for (i, size) in sizes.iter().enumerate() {
        let body: Vec<u8> = line.iter().copied().cycle().take(*size).collect();
        fs::write(source.join(format!("app-{i}.log")), body).unwrap();
    }
    let dest = temp.path().join("backups");

    let mut config = BackupConfig::new(&source, &dest);
    config.log = LogTarget::Console;
    let outcome = Orchestrator::new(config).run(&mut TracingObserver);

    let summary = &outcome.summary;
    assert!(outcome.is_success());
    assert_eq!(summary.file_count, 3);
    assert_eq!(summary.original_bytes, 1_000_000);
    assert!(summary.compressed_bytes <= 1_000_000);
    assert!(summary.compression_ratio > 0.0 && summary.compression_ratio <= 1.0);
    assert_eq!(
        fs::metadata(summary.artifact_path.as_ref().unwrap()).unwrap().len(),
        summary.compressed_bytes
    );
}

#[test]
fn every_format_restores_source() {
    let temp = TempDir::new().unwrap();
    let source = write_source(temp.path());
    let expected = relative_files(&source);

    for format in CompressFormat::ALL {
        let dest = temp.path().join(format!("backups-{format}"));
        let options = ArchiveOptions {
            level: CompressionLevel::new(9).unwrap(),
            format,
            follow_symlinks: false,
        };
        let result = Archiver::new(options).archive(&source, &dest).unwrap();
        assert_eq!(result.file_count, expected.len());

        let restore = temp.path().join(format!("restore-{format}"));
        let reader = open_artifact(&result.artifact_path, format).unwrap();
        tar::Archive::new(reader).unpack(&restore).unwrap();

        let restored_root = restore.join("documents");
        assert_eq!(relative_files(&restored_root), expected, "{format}");
        assert!(restored_root.join("empty").is_dir(), "{format}");
    }
}

#[test]
fn rotation_only_touches_own_backups() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path();
    let day = |d: u32| {
        NaiveDate::from_ymd_opt(2001, 1, d)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    };
    for d in 1..=4 {
        for source in ["mail", "photos"] {
            let name = ArtifactName::new(source, day(d), CompressFormat::Gzip);
            fs::write(dest.join(name.file_name()), "x").unwrap();
        }
    }
    fs::write(dest.join("shopping-list.txt"), "milk").unwrap();

    let result = RetentionPolicy::new(2)
        .unwrap()
        .scoped_to("mail")
        .enforce(dest)
        .unwrap();

    assert_eq!(result.kept_paths.len(), 2);
    assert_eq!(result.removed_paths.len(), 2);
    assert!(result.deletion_warnings.is_empty());
    assert_eq!(artifacts(dest).len(), 6);
    assert!(dest.join("shopping-list.txt").exists());
    assert!(dest.join("mail_20010104-120000.tar.gz").exists());
    assert!(!dest.join("mail_20010101-120000.tar.gz").exists());
}
