//! Memory mappings backing AUX buffer bytes.
//!
//! - [`MappedWindow`]: demand mapping of one buffer's file region, unmapped on drop
//! - [`SessionMap`]: a single mapping of the whole capture, shared by many buffers
//! - [`SessionSlice`]: one buffer's view into a [`SessionMap`]

mod session_map;
mod window;

pub use session_map::{SessionMap, SessionSlice};
pub use window::{MappedWindow, page_size};
