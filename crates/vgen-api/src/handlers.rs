//! Request handlers.

pub mod callback;
pub mod delivery;
pub mod health;
pub mod tasks;
pub mod video_status;

pub use callback::video_callback;
pub use delivery::get_video;
pub use health::*;
pub use tasks::{create_task, get_task};
pub use video_status::get_video_status;
