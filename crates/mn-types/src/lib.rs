pub mod errors;
pub mod task;
pub mod trial;

pub use errors::*;
pub use task::*;
pub use trial::*;
