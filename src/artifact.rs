//! Artifact naming and compression settings.
//!
//! Every backup produced by this crate is named
//! `<source>_<YYYYMMDD-HHMMSS>[_<seq>].<ext>`, where `<seq>` is a three-digit
//! counter only written for the second and later artifacts of the same
//! second. `_` sorts after `.`, so the plain file names of one source already
//! sort in creation order, as do the parsed `(timestamp, seq, file name)`.

use chrono::{NaiveDateTime, Timelike};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};

/// Timestamp layout embedded in artifact names.
pub const STAMP_FORMAT: &str = "%Y%m%d-%H%M%S";
/// Length of a formatted [`STAMP_FORMAT`] value.
const STAMP_LEN: usize = 15;
/// Digits of the same-second sequence suffix.
const SEQ_WIDTH: usize = 3;
/// Largest same-second sequence number that keeps names fixed-width.
pub const MAX_SEQ: u32 = 999;

/// Supported compression formats wrapped around the tar stream.
#[derive(ValueEnum, Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CompressFormat {
    #[default]
    Gzip,
    Zstd,
    Bzip2,
    Xz,
}

impl CompressFormat {
    pub const ALL: [CompressFormat; 4] = [
        CompressFormat::Gzip,
        CompressFormat::Zstd,
        CompressFormat::Bzip2,
        CompressFormat::Xz,
    ];

    /// File extension, without the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            CompressFormat::Gzip => "tar.gz",
            CompressFormat::Zstd => "tar.zst",
            CompressFormat::Bzip2 => "tar.bz2",
            CompressFormat::Xz => "tar.xz",
        }
    }
}

impl fmt::Display for CompressFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompressFormat::Gzip => "gzip",
            CompressFormat::Zstd => "zstd",
            CompressFormat::Bzip2 => "bzip2",
            CompressFormat::Xz => "xz",
        };
        f.write_str(name)
    }
}

/// Compression level in the range 1 (fastest) to 9 (smallest).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct CompressionLevel(u32);

impl CompressionLevel {
    pub const MIN: u32 = 1;
    pub const MAX: u32 = 9;
    pub const DEFAULT: CompressionLevel = CompressionLevel(6);

    /// Returns `None` when `level` is outside 1..=9.
    pub fn new(level: u32) -> Option<Self> {
        (Self::MIN..=Self::MAX)
            .contains(&level)
            .then_some(CompressionLevel(level))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The parsed form of an artifact file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactName {
    source: String,
    stamp: NaiveDateTime,
    seq: u32,
    format: CompressFormat,
}

impl ArtifactName {
    /// Builds a name for `source` at `stamp`. Sub-second precision is dropped.
    pub fn new(source: impl Into<String>, stamp: NaiveDateTime, format: CompressFormat) -> Self {
        let stamp = stamp.with_nanosecond(0).unwrap_or(stamp);
        Self {
            source: source.into(),
            stamp,
            seq: 0,
            format,
        }
    }

    /// Disambiguates several artifacts created within the same second.
    pub fn with_seq(mut self, seq: u32) -> Self {
        self.seq = seq;
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn stamp(&self) -> NaiveDateTime {
        self.stamp
    }

    pub fn seq(&self) -> u32 {
        self.seq
    }

    pub fn format(&self) -> CompressFormat {
        self.format
    }

    pub fn file_name(&self) -> String {
        let stamp = self.stamp.format(STAMP_FORMAT);
        if self.seq == 0 {
            format!("{}_{stamp}.{}", self.source, self.format.extension())
        } else {
            format!(
                "{}_{stamp}_{:0width$}.{}",
                self.source,
                self.seq,
                self.format.extension(),
                width = SEQ_WIDTH
            )
        }
    }

    /// Parses a file name produced by [`ArtifactName::file_name`].
    ///
    /// Anything else, including names with a malformed or non-canonical
    /// timestamp or sequence, yields `None`.
    pub fn parse(file_name: &str) -> Option<Self> {
        let format = CompressFormat::ALL.into_iter().find(|format| {
            file_name
                .strip_suffix(format.extension())
                .is_some_and(|rest| rest.ends_with('.'))
        })?;
        let stem = &file_name[..file_name.len() - format.extension().len() - 1];

        let (source, stamp, seq) = match split_seq(stem) {
            Some((rest, seq)) => {
                let (source, stamp) = split_stamp(rest)?;
                (source, stamp, seq)
            }
            None => {
                let (source, stamp) = split_stamp(stem)?;
                (source, stamp, 0)
            }
        };

        Some(Self {
            source: source.to_string(),
            stamp,
            seq,
            format,
        })
    }

    /// Picks the first name for `source` at `stamp` that is free in `dir`.
    ///
    /// Once all [`MAX_SEQ`] suffixes are taken the last one is returned, and
    /// writing it fails instead of clobbering an existing backup.
    pub fn next_free(
        dir: &Path,
        source: &str,
        stamp: NaiveDateTime,
        format: CompressFormat,
    ) -> Self {
        let base = ArtifactName::new(source, stamp, format);
        (0..=MAX_SEQ)
            .map(|seq| base.clone().with_seq(seq))
            .find(|name| !dir.join(name.file_name()).exists())
            .unwrap_or_else(|| base.with_seq(MAX_SEQ))
    }
}

/// Splits `<rest>_<NNN>` into `rest` and a non-zero sequence number.
fn split_seq(stem: &str) -> Option<(&str, u32)> {
    let (rest, digits) = stem.rsplit_once('_')?;
    if digits.len() != SEQ_WIDTH || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let seq = digits.parse().ok().filter(|&seq| seq > 0)?;
    Some((rest, seq))
}

/// Splits `<source>_<stamp>`, accepting only canonically formatted stamps.
fn split_stamp(stem: &str) -> Option<(&str, NaiveDateTime)> {
    let (source, stamp_str) = stem.rsplit_once('_')?;
    if source.is_empty() || stamp_str.len() != STAMP_LEN {
        return None;
    }
    let stamp = NaiveDateTime::parse_from_str(stamp_str, STAMP_FORMAT).ok()?;
    (stamp.format(STAMP_FORMAT).to_string() == stamp_str).then_some((source, stamp))
}

impl Ord for ArtifactName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.stamp
            .cmp(&other.stamp)
            .then(self.seq.cmp(&other.seq))
            .then_with(|| self.file_name().cmp(&other.file_name()))
    }
}

impl PartialOrd for ArtifactName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}

/// An artifact found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub name: ArtifactName,
}

/// Base name used for artifacts of `source`.
///
/// Falls back to the canonical path for inputs like `..`, and to `backup`
/// when no name can be derived at all (e.g. `/`).
pub fn source_name(source: &Path) -> String {
    source
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .or_else(|| {
            source
                .canonicalize()
                .ok()
                .and_then(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
        })
        .unwrap_or_else(|| "backup".to_string())
}
