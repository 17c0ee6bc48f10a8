pub mod command;
pub mod direction;
pub mod order;
pub mod signal;

pub use command::*;
pub use direction::*;
pub use order::*;
pub use signal::*;
