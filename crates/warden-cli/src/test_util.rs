//! Shared test helpers. Tests that mutate process environment variables
//! (config resolution) must hold this lock for the duration of the mutation
//! to avoid racing with other tests in the same binary.

use std::sync::{Mutex, OnceLock};

pub fn lock_env() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(())).lock().unwrap_or_else(|e| e.into_inner())
}
