pub mod frame;
pub mod gpu;
pub mod texture;

pub use gpu::{Gpu, Sprite};
pub use texture::{TextureId, TextureManager};
