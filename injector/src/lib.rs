//! Library surface of the injector: option parsing and the injection session.
//!
//! The binary in `main.rs` is a thin shell over these modules; integration
//! tests drive them directly.

pub mod args;
pub mod logger;
pub mod remote;
