pub mod footer;
pub mod header;
pub mod utils;

pub use footer::{draw_footer, FlashKind};
pub use header::draw_header;
pub use utils::{active_badge, truncate};
