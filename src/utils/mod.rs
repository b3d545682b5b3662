//! Crate-internal helpers

#[macro_use]
pub(crate) mod log;
