//! Cross-crate scenarios for Parley. Everything here is test-only.

#[cfg(test)]
mod render_snapshots;
#[cfg(test)]
mod unit;
