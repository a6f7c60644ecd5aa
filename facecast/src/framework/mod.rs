pub mod logging;
pub mod pixels;
