//! Exit status codes, following the BSD sysexits convention.
//! reference: [SYSEXITS](https://man.freebsd.org/cgi/man.cgi?query=sysexits&apropos=0&sektion=0&manpath=FreeBSD+11.2-stable&arch=default&format=html)

/// value: 0 <br>
/// The backup was written. Warnings do not change the exit status.
pub const EX_OK: i32 = 0;

/// value: 64 <br>
/// The command line was incomplete, or a compression level was out of range.
pub const EX_USAGE: i32 = 64;

/// value: 65 <br>
/// The source directory held nothing to archive.
pub const EX_DATAERR: i32 = 65;

/// value: 66 <br>
/// The source directory does not exist, is not a directory or cannot be read.
pub const EX_NOINPUT: i32 = 66;

/// value: 73 <br>
/// The destination directory or a settings file cannot be created.
pub const EX_CANTCREAT: i32 = 73;

/// value: 74 <br>
/// Writing or finalizing the backup artifact failed.
pub const EX_IOERR: i32 = 74;

/// value: 78 <br>
/// The settings file is unreadable, malformed or holds invalid values.
pub const EX_CONFIG: i32 = 78;
