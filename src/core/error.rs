use derive_more::Display;

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

/// Conditions a host may want to match on. Everything else travels as a plain
/// `anyhow::Error`.
#[derive(Display, Debug, Clone, PartialEq, Eq)]
pub enum Error {
	#[display(fmt = "Shader '{}' could not be found", _0)]
	ShaderNotFound(String),

	#[display(fmt = "Effect '{}' was rendered before being initialized", _0)]
	NotInitialized(&'static str),

	#[display(fmt = "Invalid shader '{}': {}", name, reason)]
	InvalidShader { name: String, reason: String },

	#[display(fmt = "Cannot blit a texture onto itself")]
	SameTexture,
}

impl std::error::Error for Error {}
