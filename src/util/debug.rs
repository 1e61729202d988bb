/// Per-peer debug logging.
///
/// `rakrs_debug!(true, ...)` marks a line as noisy (one per datagram or more)
/// and is emitted at `trace`, anything else goes to `debug`. No subscriber is
/// installed by this crate.
#[macro_export]
macro_rules! rakrs_debug {
    (true, $($t: tt)*) => {
        $crate::tracing::trace!($($t)*)
    };
    ($($t: tt)*) => {
        $crate::tracing::debug!($($t)*)
    };
}
