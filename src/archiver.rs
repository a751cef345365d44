//! Directory archiving.
//!
//! Walks a source tree, streams it through a tar builder and a compressor
//! into a hidden temporary file in the destination directory, then renames
//! the temporary file to its final artifact name once everything has been
//! written and synced. A failed or interrupted run therefore never leaves a
//! file that looks like a finished backup.

use crate::artifact::{ArtifactName, CompressFormat, CompressionLevel, source_name};
use crate::error::{ArchiveError, Warning};
use bzip2::write::BzEncoder;
use chrono::{Local, NaiveDateTime};
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tar::{EntryType, Header};
use walkdir::WalkDir;
use xz2::write::XzEncoder;

/// Prefix of in-progress artifacts. Never matches [`ArtifactName::parse`].
pub const TEMP_PREFIX: &str = ".bkrotate-";
/// Suffix of in-progress artifacts.
pub const TEMP_SUFFIX: &str = ".partial";

/// Whether `file_name` looks like an in-progress (or abandoned) artifact.
pub fn is_partial_name(file_name: &str) -> bool {
    file_name.len() > TEMP_PREFIX.len() + TEMP_SUFFIX.len()
        && file_name.starts_with(TEMP_PREFIX)
        && file_name.ends_with(TEMP_SUFFIX)
}

/// Settings for a single archive operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveOptions {
    pub level: CompressionLevel,
    pub format: CompressFormat,
    /// Follow symbolic links instead of skipping them.
    pub follow_symlinks: bool,
}

/// Outcome of a successful archive operation.
#[derive(Debug, Clone)]
pub struct ArchiveResult {
    /// Final path of the written artifact.
    pub artifact_path: PathBuf,
    pub name: ArtifactName,
    /// Regular files stored in the archive.
    pub file_count: usize,
    /// Entries left out because they could not be read.
    pub skipped_count: usize,
    /// Symbolic links left out by the symlink policy.
    pub symlinks_skipped: usize,
    /// Sum of the sizes of all archived files.
    pub original_bytes: u64,
    /// Size of the artifact on disk.
    pub compressed_bytes: u64,
    pub format: CompressFormat,
    pub level: CompressionLevel,
    pub warnings: Vec<Warning>,
}

/// Archives `source` into `destination` as a gzip tarball.
///
/// # Errors
/// Fails if `level` is outside 1..=9, or for any fatal [`ArchiveError`].
pub fn archive(source: &Path, destination: &Path, level: u32) -> Result<ArchiveResult, ArchiveError> {
    let level = CompressionLevel::new(level).ok_or(ArchiveError::InvalidLevel(level))?;
    Archiver::new(ArchiveOptions {
        level,
        ..ArchiveOptions::default()
    })
    .archive(source, destination)
}

/// Creates backup artifacts with a fixed set of options.
#[derive(Debug, Clone, Default)]
pub struct Archiver {
    options: ArchiveOptions,
}

#[derive(Default)]
struct TreeStats {
    file_count: usize,
    skipped_count: usize,
    symlinks_skipped: usize,
    original_bytes: u64,
    warnings: Vec<Warning>,
}

impl TreeStats {
    fn skip(&mut self, path: &Path, reason: impl ToString) {
        let reason = reason.to_string();
        tracing::debug!(path = %path.display(), %reason, "skipping entry");
        self.skipped_count += 1;
        self.warnings.push(Warning::FileSkipped {
            path: path.to_path_buf(),
            reason,
        });
    }
}

impl Archiver {
    pub fn new(options: ArchiveOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ArchiveOptions {
        &self.options
    }

    /// Archives `source` into `destination`, naming the artifact after the current local time.
    pub fn archive(&self, source: &Path, destination: &Path) -> Result<ArchiveResult, ArchiveError> {
        self.archive_at(source, destination, Local::now().naive_local())
    }

    /// Archives `source` into `destination`, naming the artifact after `stamp`.
    pub fn archive_at(
        &self,
        source: &Path,
        destination: &Path,
        stamp: NaiveDateTime,
    ) -> Result<ArchiveResult, ArchiveError> {
        check_source(source)?;

        fs::create_dir_all(destination).map_err(|e| ArchiveError::DestinationUnwritable {
            path: destination.to_path_buf(),
            source: e,
        })?;

        let root_name = source_name(source);
        let name = ArtifactName::next_free(destination, &root_name, stamp, self.options.format);
        let artifact_path = destination.join(name.file_name());
        let write_failed = |e: io::Error| ArchiveError::ArtifactWriteFailed {
            path: artifact_path.clone(),
            source: e,
        };

        let temp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(TEMP_SUFFIX)
            .tempfile_in(destination)
            .map_err(|e| ArchiveError::DestinationUnwritable {
                path: destination.to_path_buf(),
                source: e,
            })?;
        tracing::debug!(
            temp = %temp.path().display(),
            artifact = %artifact_path.display(),
            format = %self.options.format,
            level = %self.options.level,
            "writing archive"
        );

        let encoder = Encoder::new(
            BufWriter::new(temp),
            self.options.format,
            self.options.level,
        )
        .map_err(write_failed)?;
        let mut builder = tar::Builder::new(encoder);

        let own_dir = destination_in_source(source, destination);
        if let Some(dir) = &own_dir {
            tracing::debug!(
                destination = %dir.display(),
                "destination lies inside the source, excluding backups from the archive"
            );
        }
        let stats = self.append_tree(
            &mut builder,
            source,
            &root_name,
            own_dir.as_deref(),
            &write_failed,
        )?;
        if stats.file_count == 0 {
            return Err(ArchiveError::EmptySource(source.to_path_buf()));
        }

        let temp = builder
            .into_inner()
            .and_then(Encoder::finish)
            .and_then(|writer| writer.into_inner().map_err(io::IntoInnerError::into_error))
            .map_err(write_failed)?;
        temp.as_file().sync_all().map_err(write_failed)?;
        let file = temp
            .persist_noclobber(&artifact_path)
            .map_err(|e| write_failed(e.error))?;
        let compressed_bytes = file.metadata().map_err(write_failed)?.len();

        Ok(ArchiveResult {
            artifact_path,
            name,
            file_count: stats.file_count,
            skipped_count: stats.skipped_count,
            symlinks_skipped: stats.symlinks_skipped,
            original_bytes: stats.original_bytes,
            compressed_bytes,
            format: self.options.format,
            level: self.options.level,
            warnings: stats.warnings,
        })
    }

    fn append_tree<W: Write>(
        &self,
        builder: &mut tar::Builder<W>,
        source: &Path,
        root_name: &str,
        own_dir: Option<&Path>,
        write_failed: &impl Fn(io::Error) -> ArchiveError,
    ) -> Result<TreeStats, ArchiveError> {
        let mut stats = TreeStats::default();
        let root_meta = fs::metadata(source).map_err(|e| ArchiveError::SourceUnreadable {
            path: source.to_path_buf(),
            source: e,
        })?;
        append_dir(builder, Path::new(root_name), &root_meta).map_err(write_failed)?;

        let walker = WalkDir::new(source)
            .follow_links(self.options.follow_symlinks)
            .sort_by_file_name()
            .min_depth(1)
            .into_iter()
            .filter_entry(|entry| !is_own_output(entry, own_dir));
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) if err.depth() == 0 => {
                    return Err(ArchiveError::SourceUnreadable {
                        path: source.to_path_buf(),
                        source: err.into_io_error().unwrap_or_else(|| {
                            io::Error::other("filesystem loop at source root")
                        }),
                    });
                }
                Err(err) => {
                    let path = err.path().unwrap_or(source).to_path_buf();
                    stats.skip(&path, &err);
                    continue;
                }
            };

            let path = entry.path();
            let Ok(rel) = path.strip_prefix(source) else {
                continue;
            };
            let name = Path::new(root_name).join(rel);
            let file_type = entry.file_type();

            if file_type.is_symlink() {
                tracing::debug!(path = %path.display(), "skipping symbolic link");
                stats.symlinks_skipped += 1;
            } else if file_type.is_dir() {
                match entry.metadata() {
                    Ok(meta) => append_dir(builder, &name, &meta).map_err(write_failed)?,
                    Err(e) => stats.skip(path, e),
                }
            } else if file_type.is_file() {
                append_file(builder, path, &name, &mut stats).map_err(write_failed)?;
            } else {
                stats.skip(path, "unsupported file type");
            }
        }
        Ok(stats)
    }
}

/// Where `destination` shows up during a walk of `source`, if it lies inside it.
fn destination_in_source(source: &Path, destination: &Path) -> Option<PathBuf> {
    let source_abs = source.canonicalize().ok()?;
    let destination_abs = destination.canonicalize().ok()?;
    let rel = destination_abs.strip_prefix(&source_abs).ok()?;
    Some(source.join(rel))
}

/// Backups never end up inside backups: skips the destination subtree, or,
/// when the destination is the source root itself, the artifacts and partial
/// files stored there.
fn is_own_output(entry: &walkdir::DirEntry, own_dir: Option<&Path>) -> bool {
    let Some(dir) = own_dir else {
        return false;
    };
    let path = entry.path();
    if path == dir {
        return true;
    }
    path.parent() == Some(dir)
        && !entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| is_partial_name(name) || ArtifactName::parse(name).is_some())
}

fn check_source(source: &Path) -> Result<(), ArchiveError> {
    let meta = fs::metadata(source).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => ArchiveError::SourceNotFound(source.to_path_buf()),
        _ => ArchiveError::SourceUnreadable {
            path: source.to_path_buf(),
            source: e,
        },
    })?;
    if !meta.is_dir() {
        return Err(ArchiveError::SourceNotADirectory(source.to_path_buf()));
    }
    fs::read_dir(source).map_err(|e| ArchiveError::SourceUnreadable {
        path: source.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

fn append_dir<W: Write>(
    builder: &mut tar::Builder<W>,
    name: &Path,
    meta: &fs::Metadata,
) -> io::Result<()> {
    let mut header = Header::new_gnu();
    header.set_metadata(meta);
    header.set_entry_type(EntryType::Directory);
    header.set_size(0);
    builder.append_data(&mut header, name, io::empty())
}

/// Appends one regular file. Read failures become warnings; only errors
/// writing the archive itself are returned.
fn append_file<W: Write>(
    builder: &mut tar::Builder<W>,
    path: &Path,
    name: &Path,
    stats: &mut TreeStats,
) -> io::Result<()> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) => {
            stats.skip(path, e);
            return Ok(());
        }
    };
    let meta = match file.metadata() {
        Ok(meta) => meta,
        Err(e) => {
            stats.skip(path, e);
            return Ok(());
        }
    };

    let mut header = Header::new_gnu();
    header.set_metadata(&meta);
    let mut reader = FixedLen::new(BufReader::new(file), meta.len());
    builder.append_data(&mut header, name, &mut reader)?;

    if let Some(reason) = reader.shortfall {
        tracing::debug!(path = %path.display(), %reason, "file changed while archiving");
        stats.warnings.push(Warning::FileChanged {
            path: path.to_path_buf(),
            reason,
        });
    }
    stats.file_count += 1;
    stats.original_bytes += meta.len();
    Ok(())
}

/// Yields exactly `len` bytes: extra data is ignored and a short or failing
/// source is zero-filled, so a tar header written up front stays truthful.
struct FixedLen<R> {
    inner: R,
    remaining: u64,
    shortfall: Option<String>,
}

impl<R: Read> FixedLen<R> {
    fn new(inner: R, len: u64) -> Self {
        Self {
            inner,
            remaining: len,
            shortfall: None,
        }
    }
}

impl<R: Read> Read for FixedLen<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let max = usize::try_from(self.remaining).map_or(buf.len(), |rem| rem.min(buf.len()));
        let buf = &mut buf[..max];

        let mut n = 0;
        if self.shortfall.is_none() {
            match self.inner.read(buf) {
                Ok(0) => self.shortfall = Some("file shrank while being read".to_string()),
                Ok(read) => n = read,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => return Err(e),
                Err(e) => self.shortfall = Some(e.to_string()),
            }
        }
        if n == 0 {
            buf.fill(0);
            n = max;
        }
        self.remaining -= n as u64;
        Ok(n)
    }
}

/// Compressing writer for each supported [`CompressFormat`].
enum Encoder<W: Write> {
    Gzip(GzEncoder<W>),
    Zstd(zstd::stream::write::Encoder<'static, W>),
    Bzip2(BzEncoder<W>),
    Xz(XzEncoder<W>),
}

impl<W: Write> Encoder<W> {
    fn new(inner: W, format: CompressFormat, level: CompressionLevel) -> io::Result<Self> {
        let level = level.get();
        Ok(match format {
            CompressFormat::Gzip => {
                Encoder::Gzip(GzEncoder::new(inner, flate2::Compression::new(level)))
            }
            CompressFormat::Zstd => {
                Encoder::Zstd(zstd::stream::write::Encoder::new(inner, level as i32)?)
            }
            CompressFormat::Bzip2 => {
                Encoder::Bzip2(BzEncoder::new(inner, bzip2::Compression::new(level)))
            }
            CompressFormat::Xz => Encoder::Xz(XzEncoder::new(inner, level)),
        })
    }

    fn finish(self) -> io::Result<W> {
        match self {
            Encoder::Gzip(e) => e.finish(),
            Encoder::Zstd(e) => e.finish(),
            Encoder::Bzip2(e) => e.finish(),
            Encoder::Xz(e) => e.finish(),
        }
    }
}

impl<W: Write> Write for Encoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Encoder::Gzip(e) => e.write(buf),
            Encoder::Zstd(e) => e.write(buf),
            Encoder::Bzip2(e) => e.write(buf),
            Encoder::Xz(e) => e.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Encoder::Gzip(e) => e.flush(),
            Encoder::Zstd(e) => e.flush(),
            Encoder::Bzip2(e) => e.flush(),
            Encoder::Xz(e) => e.flush(),
        }
    }
}

/// Opens an artifact for reading with the decoder matching its format.
pub fn open_artifact(path: &Path, format: CompressFormat) -> io::Result<Box<dyn Read>> {
    let file = BufReader::new(File::open(path)?);
    Ok(match format {
        CompressFormat::Gzip => Box::new(flate2::read::GzDecoder::new(file)),
        CompressFormat::Zstd => Box::new(zstd::stream::read::Decoder::with_buffer(file)?),
        CompressFormat::Bzip2 => Box::new(bzip2::read::BzDecoder::new(file)),
        CompressFormat::Xz => Box::new(xz2::read::XzDecoder::new(file)),
    })
}
