// logsift - platform/fs.rs
//
// File identity for rotation detection.
//
// On Unix a file is identified by (device, inode): a rename-and-recreate
// rotation gives the path a new inode even when the new file is larger than
// the old read offset. Elsewhere the creation time is the best stable
// signal available from std; when even that is missing, callers fall back
// to size-shrink detection alone.

use std::fs::Metadata;
use std::time::SystemTime;

/// Opaque identity of the file a path currently points to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileIdentity {
    Inode { dev: u64, ino: u64 },
    Created(SystemTime),
}

#[cfg(unix)]
pub fn file_identity(metadata: &Metadata) -> Option<FileIdentity> {
    use std::os::unix::fs::MetadataExt;
    Some(FileIdentity::Inode {
        dev: metadata.dev(),
        ino: metadata.ino(),
    })
}

#[cfg(not(unix))]
pub fn file_identity(metadata: &Metadata) -> Option<FileIdentity> {
    metadata.created().ok().map(FileIdentity::Created)
}
