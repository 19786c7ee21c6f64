//! Redirection engine for running hardware-inventory tools against recorded
//! fixtures.
//!
//! Paths under the virtual namespaces (`/proc/`, `/dev/`, `/sys/` by
//! default) are remapped beneath a fixture root, writes to them are refused,
//! and paths handed back to the caller have the root stripped again. Block
//! device geometry, `sysconf` values and the machine architecture are
//! synthesized from small files in the same tree:
//!
//! ```text
//! <root>/proc/... <root>/dev/... <root>/sys/...   namespace mirrors
//! <root>/sysconf/<id>                             sysconf answers
//! <root>/arch                                     uname machine override
//! <root>/sys/block/<dev>/size                     512-byte sectors
//! <root>/sys/block/<dev>/queue/{physical,logical}_block_size
//! ```
//!
//! The [`Redirector`] never performs an operation itself; it delegates to a
//! [`SystemOps`] implementation, [`LibcOps`] in production.

pub mod device;
pub mod error;
pub mod fatal;
pub mod guard;
pub mod identity;
pub mod namespace;
pub mod ops;
pub mod path;
pub mod reals;
pub mod redirector;
pub mod root;
pub mod scalar;

pub use device::{BlockAnswer, BlockQuery, BLKGETSIZE64, BLKPBSZGET, BLKSSZGET};
pub use error::{FixtureError, Result};
pub use fatal::{abort_with_diagnostic, FatalHandler};
pub use guard::AccessIntent;
pub use identity::{UtsField, UtsName, UTS_FIELD_LEN};
pub use namespace::NamespaceSet;
pub use ops::{cwd_buffer, CwdBuffer, DescriptorLookup, GlobErrFn, SystemOps};
pub use path::MappedPath;
pub use reals::{LibcOps, ProcFdLookup};
pub use redirector::{Redirector, RedirectorBuilder};
pub use root::FixtureRoot;
