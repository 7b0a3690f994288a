// Arena Protocol
// Wire types exchanged with the comparison engine

pub mod protocol;

pub use protocol::*;
