//! Meme compositing and export.

pub mod compositor;
pub mod export;
pub mod typeface;

pub use compositor::{wrap_text, MemeCompositor};
pub use export::{
    export_png, share_with_fallback, ClipboardShare, DownloadShare, ExportedMeme, ShareOutcome, ShareStrategy,
    StorageShare,
};
pub use typeface::{BlockTypeface, GlyphTypeface, Typeface};
