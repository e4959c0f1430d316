pub mod busy;
pub mod clock;
pub mod drag;
pub mod models;
pub mod palette;
