#[cfg(feature = "context")]
mod context;
#[cfg(feature = "signal")]
mod signal;
