pub mod utils;
pub mod wizard_get;
pub mod wizard_post;

pub use wizard_get::get as wizard_get;
pub use wizard_post::post as wizard_post;
