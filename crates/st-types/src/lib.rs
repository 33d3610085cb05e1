pub mod errors;
pub mod fitness;
pub mod params;

pub use errors::*;
pub use fitness::*;
pub use params::*;
