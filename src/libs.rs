pub mod embed;
pub mod shader;
pub mod smart_arc;
pub mod texture;
