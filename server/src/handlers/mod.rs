mod get_conversation;
mod get_inbox;

pub use get_conversation::get_conversation;
pub use get_inbox::get_inbox;
