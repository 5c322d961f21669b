mod controller;
mod polling;

pub use controller::{GalleryController, RefreshMode};
pub use polling::PollConfig;
