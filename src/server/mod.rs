pub mod dto;
pub mod response;
mod router;
mod session;
mod tables;

pub use router::{AppState, create_router};
pub use session::session_router;
pub use tables::tables_router;
