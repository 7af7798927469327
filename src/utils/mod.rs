pub mod coordinate;
pub mod logging;
pub mod utils;
