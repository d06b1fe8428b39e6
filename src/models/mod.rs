mod options;
mod resolve;

pub use options::*;
pub use resolve::*;
