// Save hooks run around a single record write

pub mod context;
pub mod error;
pub mod implementations;
pub mod pipeline;
pub mod traits;

pub use context::*;
pub use error::*;
pub use implementations::*;
pub use pipeline::*;
pub use traits::*;
