//! Directory mirroring tool - `rmirror`
//!
//! `rmirror` makes a destination directory tree match a source tree: missing
//! directories are created, files that differ are recopied wholesale, and
//! destination entries without a source counterpart are removed.
//!
//! # Pipeline
//!
//! One (source, destination) pair is processed in three strictly ordered
//! phases:
//!
//! 1. **Scan** - walk the source tree and enqueue one task per file and per
//!    directory into two MPMC queues; the queues are closed once full.
//! 2. **Reap** - walk the destination tree and delete everything with no
//!    source counterpart.
//! 3. **Workers** - two independent pools (file copy, directory creation)
//!    drain the pre-filled queues concurrently; a closed-and-empty queue is
//!    the termination signal.
//!
//! Every worker consults the CPU governor (the `throttle` crate) before each
//! unit of work, so the whole pool backs off under host load.
//!
//! Multiple pairs run as isolated tasks with no shared mutable state; a
//! host-wide TCP-port lock ([`guard::SingletonGuard`]) ensures only one
//! scheduler instance runs at a time.
//!
//! Re-running with an unchanged source performs zero copies and zero
//! directory creations - the pipeline converges and is idempotent.

pub mod guard;
pub mod pair;
pub mod scanner;
pub mod workers;
