//! Run registry and response log.
//!
//! Two collaborators share one backend trait: the run registry tracks
//! which worker instance owns which active run (liveness via TTL), and
//! the response log is the append-only, replayable event stream each run
//! writes to and callers stream from.

pub mod backend;
pub mod memory;
pub mod redis;

pub use backend::{ControlSignal, RegistryBackend};
pub use memory::MemoryBackend;
pub use redis::RedisBackend;
