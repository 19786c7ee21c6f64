use std::path::PathBuf;

/// Fixture-integrity faults.
///
/// These mean the test setup is broken, not that the tool under test did
/// something wrong, so the [`Redirector`](crate::Redirector) never hands them
/// to the caller: they go to its fatal handler instead.
#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("fixture root {} cannot be resolved: {source}", .root.display())]
    RootUnresolvable {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("fixture root {} resolves to the filesystem root", .root.display())]
    RootIsFilesystemRoot { root: PathBuf },
    #[error("failed to open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read {expected} from {}", .path.display())]
    Malformed {
        path: PathBuf,
        expected: &'static str,
    },
    #[error("unimplemented ioctl() {request:#x} for {}", .path.display())]
    UnsupportedQuery { request: u64, path: PathBuf },
    #[error("descriptor path {} names no device", .path.display())]
    NoDevice { path: PathBuf },
    #[error("sector count in {} overflows a 64-bit byte size", .path.display())]
    Overflow { path: PathBuf },
}

pub type Result<T> = std::result::Result<T, FixtureError>;
