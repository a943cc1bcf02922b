mod build;
mod slug;
mod submission;

pub use build::*;
pub use slug::*;
pub use submission::*;
