use std::cell::Cell;
use std::marker::PhantomData;

thread_local! {
    static SUPPRESSED: Cell<bool> = const { Cell::new(false) };
}

/// Per-thread re-entrancy suppressor for queue interception.
///
/// While a [`GuardScope`] is alive on a thread, interception on that thread is
/// bypassed. Other threads are unaffected.
pub struct InterceptionGuard;

impl InterceptionGuard {
    pub fn is_engaged() -> bool {
        SUPPRESSED.with(Cell::get)
    }

    pub fn engage() -> GuardScope {
        let previous = SUPPRESSED.with(|s| s.replace(true));
        GuardScope { previous, _thread: PhantomData }
    }
}

/// Suppression token. Dropping it releases the guard on every exit path,
/// unwinding included. Tied to the thread that created it.
pub struct GuardScope {
    previous: bool,
    _thread: PhantomData<*const ()>,
}

impl Drop for GuardScope {
    fn drop(&mut self) {
        SUPPRESSED.with(|s| s.set(self.previous));
    }
}

impl std::fmt::Debug for GuardScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardScope").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_engages_and_releases() {
        assert!(!InterceptionGuard::is_engaged());
        {
            let _scope = InterceptionGuard::engage();
            assert!(InterceptionGuard::is_engaged());
        }
        assert!(!InterceptionGuard::is_engaged());
    }

    #[test]
    fn released_on_panic() {
        let result = std::panic::catch_unwind(|| {
            let _scope = InterceptionGuard::engage();
            panic!("replay blew up");
        });
        assert!(result.is_err());
        assert!(!InterceptionGuard::is_engaged());
    }

    #[test]
    fn other_threads_are_unaffected() {
        let _scope = InterceptionGuard::engage();
        let seen = std::thread::spawn(InterceptionGuard::is_engaged).join().unwrap();
        assert!(!seen);
        assert!(InterceptionGuard::is_engaged());
    }
}
