//! Bounded retry for blocking operations on the main loop.

use embedded_hal::delay::DelayNs;
use log::warn;

use crate::error::Result;

/// Attempts for direct reads and the broker connect.
pub const ATTEMPTS: u32 = 3;
/// Pause between attempts.
pub const RETRY_DELAY_MS: u32 = 3_000;

/// Run `op` up to `attempts` times, sleeping `delay_ms` between failures.
/// The last error is returned unchanged.
pub fn with_retry<T>(
    attempts: u32,
    delay_ms: u32,
    delay: &mut impl DelayNs,
    what: &str,
    mut op: impl FnMut() -> Result<T>,
) -> Result<T> {
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Ok(v) => return Ok(v),
            Err(e) if attempt < attempts => {
                warn!("{what}: attempt {attempt}/{attempts} failed: {e}");
                delay.delay_ms(delay_ms);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
