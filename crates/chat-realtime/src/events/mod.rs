//! Consumer event routing

pub mod router;

pub use router::route;
