pub mod clipboard;
pub mod commands;
pub mod input;
pub mod interaction;
pub mod session;
pub mod viewport;

pub use clipboard::{ClipboardError, ClipboardImage, CopyEngine, MemoryClipboard, SystemClipboard};
pub use commands::CommandStack;
pub use input::{InputEvent, PointerButton};
pub use interaction::{EntityInteraction, Hit, InteractionAction, InteractionState};
pub use session::{Session, SessionRequest};
pub use viewport::{Camera, Viewport};
