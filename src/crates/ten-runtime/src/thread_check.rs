//! Thread-ownership sanitizer.
//!
//! Grounded on `core/include/ten_utils/sanitizer/thread_check.h`: every
//! ownership-sensitive object records which OS thread may touch it. Here
//! this collapses to a single trait with a debug-only assertion and a
//! no-op release build.

use std::thread::ThreadId;

/// Records an object's current owning thread, with support for the two
/// documented handoffs: engine→extension-thread on instantiation, and
/// extension-thread→engine on shutdown join.
#[derive(Debug)]
pub struct ThreadCheck {
    owner: std::sync::RwLock<Option<ThreadId>>,
    /// Bypasses the check while an outside thread holds lock-mode against
    /// this object's owner.
    locked: std::sync::atomic::AtomicBool,
}

impl ThreadCheck {
    /// A check bound to the thread constructing it.
    pub fn new_bound_to_current() -> Self {
        Self {
            owner: std::sync::RwLock::new(Some(std::thread::current().id())),
            locked: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// An unbound check, adopted by the first thread to call
    /// `inherit_current`. Used for objects created on one thread but owned
    /// by another from the start (e.g. an `Extension` created on the engine
    /// thread but owned by its `ExtensionThread`).
    pub fn new_unbound() -> Self {
        Self {
            owner: std::sync::RwLock::new(None),
            locked: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Transfer ownership to the calling thread. Only valid at a documented
    /// handoff point; callers are responsible for not racing this with
    /// concurrent access from the previous owner.
    pub fn inherit_current(&self) {
        *self.owner.write().unwrap() = Some(std::thread::current().id());
    }

    pub fn set_lock_mode(&self, locked: bool) {
        self.locked.store(locked, std::sync::atomic::Ordering::Release);
    }

    /// Debug-only assertion that the calling thread is the recorded owner,
    /// or that lock-mode is currently bypassing the check. A no-op in
    /// release builds.
    #[cfg(debug_assertions)]
    pub fn check_integrity(&self) -> crate::error::Result<()> {
        if self.locked.load(std::sync::atomic::Ordering::Acquire) {
            return Ok(());
        }
        let owner = *self.owner.read().unwrap();
        match owner {
            Some(owner) if owner == std::thread::current().id() => Ok(()),
            Some(_) => Err(crate::error::TenError::ThreadIntegrity(
                "object accessed from a thread other than its recorded owner".into(),
            )),
            None => Ok(()),
        }
    }

    #[cfg(not(debug_assertions))]
    #[inline(always)]
    pub fn check_integrity(&self) -> crate::error::Result<()> {
        Ok(())
    }
}

/// Implemented by every object whose mutation is confined to a single
/// runloop thread.
pub trait ThreadChecked {
    fn thread_check(&self) -> &ThreadCheck;

    fn check_integrity(&self) -> crate::error::Result<()> {
        self.thread_check().check_integrity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owning_thread_passes_check() {
        let tc = ThreadCheck::new_bound_to_current();
        assert!(tc.check_integrity().is_ok());
    }

    #[cfg(debug_assertions)]
    #[test]
    fn foreign_thread_fails_check() {
        let tc = std::sync::Arc::new(ThreadCheck::new_bound_to_current());
        let tc2 = tc.clone();
        let result = std::thread::spawn(move || tc2.check_integrity()).join().unwrap();
        assert!(result.is_err());
    }

    #[test]
    fn lock_mode_bypasses_check_for_other_threads() {
        let tc = std::sync::Arc::new(ThreadCheck::new_bound_to_current());
        tc.set_lock_mode(true);
        let tc2 = tc.clone();
        let result = std::thread::spawn(move || tc2.check_integrity()).join().unwrap();
        assert!(result.is_ok());
    }

    #[test]
    fn inherit_current_moves_ownership() {
        let tc = std::sync::Arc::new(ThreadCheck::new_bound_to_current());
        let tc2 = tc.clone();
        std::thread::spawn(move || {
            tc2.inherit_current();
            assert!(tc2.check_integrity().is_ok());
        })
        .join()
        .unwrap();
        // Original thread is no longer the owner.
        assert!(tc.check_integrity().is_err());
    }
}
