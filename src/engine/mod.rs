// Queue engine - scanning, classification, persistence and conversion

pub mod core;
pub mod probe;
pub mod retag;
pub mod session;
pub mod worker;

pub use self::core::*;
