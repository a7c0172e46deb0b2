pub mod logging;
pub mod parsing;

// Re-export commonly used items
pub use parsing::{format_channel_list, parse_channel_list};
