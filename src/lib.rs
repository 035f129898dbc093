pub mod core;
pub mod demo;
pub mod effects;
pub mod libs;
pub mod post;

pub use demo::run;
use rust_embed::Embed;

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

/// Every WGSL program the effects can draw with.
#[derive(Embed)]
#[folder = "src/shader/"]
#[include = "*.wgsl"]
pub struct ShaderAssets;
