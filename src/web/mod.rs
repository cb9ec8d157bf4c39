pub mod api;
pub mod server;
pub mod state;

pub use server::*;
pub use state::*;
