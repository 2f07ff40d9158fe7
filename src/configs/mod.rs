pub mod base;
pub mod jellyfin;
pub mod logging;
pub mod player;
pub mod server;
pub mod voice;

pub use base::*;
pub use jellyfin::*;
pub use logging::*;
pub use player::*;
pub use server::*;
pub use voice::*;
