//! Logic modules around the core pipeline.
//!
//! # Modules
//!
//! - `preinstall`: summary and time estimate shown before installing
//! - `postinstall`: profile loop, AUR helper and theme overlay

pub mod postinstall;
pub mod preinstall;
