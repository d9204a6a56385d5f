#[cfg(feature = "tracking")]
pub mod tracking;
