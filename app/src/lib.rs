pub mod render;

pub use render::{media_summary, render_nodes, save_media, Style};
