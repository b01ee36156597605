use std::ops::{Deref, DerefMut};

use tracing::debug;

use rusty_wallet_core::DeviceSession;

/// Owns an open hardware session and closes it when dropped, whichever way
/// the signing operation exits.
pub struct DeviceGuard<T: DeviceSession + ?Sized> {
    session: Box<T>,
    device: &'static str,
}

impl<T: DeviceSession + ?Sized> DeviceGuard<T> {
    pub fn new(session: Box<T>, device: &'static str) -> Self {
        debug!(device, "hardware session opened");
        Self { session, device }
    }
}

impl<T: DeviceSession + ?Sized> Deref for DeviceGuard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.session
    }
}

impl<T: DeviceSession + ?Sized> DerefMut for DeviceGuard<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.session
    }
}

impl<T: DeviceSession + ?Sized> Drop for DeviceGuard<T> {
    fn drop(&mut self) {
        self.session.close();
        debug!(device = self.device, "hardware session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counting(Arc<AtomicUsize>);

    impl DeviceSession for Counting {
        fn close(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn fails(guard: DeviceGuard<Counting>) -> Result<(), &'static str> {
        let _guard = guard;
        Err("device unplugged")
    }

    #[test]
    fn closes_on_error_path() {
        let closes = Arc::new(AtomicUsize::new(0));
        let guard = DeviceGuard::new(Box::new(Counting(closes.clone())), "test");
        assert!(fails(guard).is_err());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
