//! Category-gated logging.
//!
//! Each adapter carries a [`LogMask`](crate::params::LogMask); messages in a
//! category the mask does not contain are dropped before formatting.

/// Logs at `$level` if `$mask` contains category `$cat`.
macro_rules! hba_dbg {
    ($mask:expr, $cat:ident, $level:ident, $($arg:tt)*) => {
        if $mask.contains($crate::params::LogMask::$cat) {
            sashba_core::hba_log!(sashba_core::log::LogLevel::$level, $($arg)*);
        }
    };
}

/// Failure-path diagnostics (`LogMask::FAIL`).
macro_rules! fail_dbg {
    ($mask:expr, $($arg:tt)*) => { hba_dbg!($mask, FAIL, Error, $($arg)*) };
}

/// Bring-up progress (`LogMask::INIT`).
macro_rules! init_dbg {
    ($mask:expr, $($arg:tt)*) => { hba_dbg!($mask, INIT, Info, $($arg)*) };
}

/// Interrupt and completion tracing (`LogMask::IO`).
macro_rules! io_dbg {
    ($mask:expr, $($arg:tt)*) => { hba_dbg!($mask, IO, Trace, $($arg)*) };
}
