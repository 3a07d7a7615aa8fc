//! Meta DNS Infrastructure Layer
pub mod dns;
