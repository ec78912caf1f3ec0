// Public API for integration tests and potential library usage

pub mod announce;
pub mod backend;
pub mod keyboard;
pub mod moderation;
pub mod protocol;
pub mod ratelimit;
pub mod state;
pub mod types;
pub mod wordcloud;
pub mod ws;

// Re-export broadcast for testing
pub mod broadcast;
