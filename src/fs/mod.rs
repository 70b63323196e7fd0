pub mod config;
pub mod locking;
pub mod work_dir;

pub use config::{Config, ExecutorConfig, GatePolicy, SignalsConfig, DEFAULT_CONFIG};
pub use locking::{atomic_write, locked_read, with_exclusive_lock, LockGuard};
pub use work_dir::{WorkDir, WORK_DIR_NAME};
