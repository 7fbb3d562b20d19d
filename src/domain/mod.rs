pub mod matches;
pub mod odds;
pub mod sport;

pub use matches::*;
pub use odds::*;
pub use sport::*;
