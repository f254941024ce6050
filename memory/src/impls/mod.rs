#[cfg(feature = "ash")]
mod ash;
