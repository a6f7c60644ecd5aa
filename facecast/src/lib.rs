pub mod avatar;
pub mod config;
pub mod error;
pub mod framework;
pub mod overlay;
pub mod prelude;
pub mod render;
pub mod runtime;
pub mod scene;
pub mod vision;

pub use runtime::app::run;
