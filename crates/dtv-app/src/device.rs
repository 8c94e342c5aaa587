//! Samsung Frame TV art-mode client.

pub mod protocol;
mod samsung;

pub use samsung::SamsungConnector;
