mod layout;

pub use layout::{draw_ui, format_ping, format_speed};
