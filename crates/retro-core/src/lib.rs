pub mod ids;
pub mod model;
pub mod phase;
pub mod protocol;

pub use model::{Column, TypingActivity, DEFAULT_GROUP_TITLE, DEFAULT_RETRO_NAME, VOTE_BUDGET};
pub use phase::Phase;
