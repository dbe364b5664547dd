//! Waiting for the guest to change power state.

use std::thread;
use std::time::Duration;

/// Guest boot settling time.
pub const BOOT_DELAY: Duration = Duration::from_secs(180);
/// Guest power-off settling time.
pub const SHUTDOWN_DELAY: Duration = Duration::from_secs(30);

/// How the pipeline waits for the guest between power transitions.
pub trait ReadinessWait {
    fn wait_until_booted(&mut self);
    fn wait_until_powered_off(&mut self);
}

/// Sleeps a fixed time instead of probing the guest.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay {
    pub boot: Duration,
    pub shutdown: Duration,
}

impl Default for FixedDelay {
    fn default() -> Self {
        Self {
            boot: BOOT_DELAY,
            shutdown: SHUTDOWN_DELAY,
        }
    }
}

impl ReadinessWait for FixedDelay {
    fn wait_until_booted(&mut self) {
        println!("  Waiting {}s for the guest to boot...", self.boot.as_secs());
        thread::sleep(self.boot);
    }

    fn wait_until_powered_off(&mut self) {
        println!("  Waiting {}s for the guest to power off...", self.shutdown.as_secs());
        thread::sleep(self.shutdown);
    }
}
