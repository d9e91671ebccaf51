//! Error type shared by every pool and pool operation in the HAL core.
//!
//! Programmer errors (bad handles, capacity exhaustion, malformed command
//! streams) are not represented here: those are treated as fatal and
//! surfaced through `assert!`/`panic!` with diagnostic context, per the
//! error-handling design. This type carries the remaining two categories:
//! driver/API call failures and expected transient conditions.

use core::fmt;

use crate::Format;

/// HAL error.
#[derive(Clone, PartialEq, Debug)]
pub enum Error {
    /// Out of host memory.
    OutOfHostMemory,
    /// Out of device memory.
    OutOfDeviceMemory,
    /// The device was removed or lost mid-operation.
    DeviceLost,
    /// A driver/API call failed; `what` names the call, `detail` carries
    /// whatever diagnostic text the backend could recover (e.g. DRED
    /// breadcrumbs on device removal).
    Api { what: &'static str, detail: String },
    /// No supported swapchain format among the ones requested.
    UnsupportedSwapchainFormats(Vec<Format>),
    /// A requested format is not supported for the given usage.
    UnsupportedFormat(Format),
    /// A pool has reached its configured capacity.
    PoolExhausted(&'static str),
    /// A handle did not resolve to a live entry (stale generation or never
    /// allocated).
    ExpiredHandle(&'static str),
    /// Generic invalid-argument condition, used by `check_invalid_parameter!`.
    InvalidParameter(String),
    /// Feature not implemented by this backend.
    NotImplemented(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OutOfHostMemory => f.write_str("out of host memory"),
            Error::OutOfDeviceMemory => f.write_str("out of device memory"),
            Error::DeviceLost => f.write_str("device lost"),
            Error::Api { what, detail } if detail.is_empty() => write!(f, "API call failed: {what}"),
            Error::Api { what, detail } => write!(f, "API call failed: {what} ({detail})"),
            Error::UnsupportedSwapchainFormats(formats) => {
                f.write_str("no supported swapchain format among: ")?;
                for (i, format) in formats.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{format:?}")?;
                }
                Ok(())
            }
            Error::UnsupportedFormat(format) => write!(f, "unsupported format: {format:?}"),
            Error::PoolExhausted(pool) => write!(f, "pool exhausted: {pool}"),
            Error::ExpiredHandle(what) => write!(f, "expired handle: {what}"),
            Error::InvalidParameter(s) => write!(f, "invalid parameter: {s}"),
            Error::NotImplemented(s) => write!(f, "not implemented: {s}"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = core::result::Result<T, Error>;

#[macro_export]
macro_rules! check_invalid_parameter {
    ($expected:expr, $($args:tt)*) => {
        if !$expected {
            return Err($crate::Error::InvalidParameter(format!($($args)*)));
        }
    };
}
