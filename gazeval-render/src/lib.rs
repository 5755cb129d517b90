pub mod canvas;
pub mod text;

pub use canvas::SkiaDisplay;
pub use text::{TextCache, load_font, render_text_pixmap};
