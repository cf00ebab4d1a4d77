pub mod action;

pub use action::mass_update_action;
