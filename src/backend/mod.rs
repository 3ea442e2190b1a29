/// Backend submodules for the conversation sync engine
///
/// - `view`: single-writer conversation state shared by the async tasks
/// - `poll`: recurring fetch of new messages
/// - `pagination`: older history on scroll-to-top
/// - `session`: one open conversation tying the above together
/// - `main_loop`: backend thread driven by UI actions
pub mod main_loop;
pub mod pagination;
pub mod poll;
pub mod session;
pub mod view;

// Re-export the main backend entry points
pub use main_loop::run_backend;
pub use pagination::{LoadOutcome, PaginationLoader};
pub use poll::{PollLoop, TickOutcome};
pub use session::{ChatSession, SessionOptions};
pub use view::{lock_view, ConversationView, SharedView};
