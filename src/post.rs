//! The contract between post-processing effects and whoever drives them.
//!
//! A host owns a [`RenderDevice`], the frame images and the property sheets, and
//! calls into every [`PostProcessEffectRenderer`] once per frame with a
//! [`RenderContext`] bundling all of them.

#[cfg(test)]
pub mod recording;
pub mod sheet;
pub mod stack;
pub mod wgpu_device;

use anyhow::Result;
use image::RgbaImage;
use rand::RngCore;
use wgpu::TextureFormat;

use self::sheet::{PropertySheet, PropertySheetFactory};
use crate::{
	core::size::ScreenSize,
	libs::{shader::ShaderLibrary, smart_arc::Sarc, texture::TexDescriptor},
};

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct FrameInfo {
	/// Number of frames rendered before this one
	pub frame_count: u64,
	pub screen_size: ScreenSize,
}

impl FrameInfo {
	/// Whether this frame falls on a multiple of `period`. A zero period never
	/// matches.
	pub fn is_multiple_of(&self, period: u64) -> bool {
		period != 0 && self.frame_count % period == 0
	}
}

/// A shader and the pass to draw it with.
pub struct BlitMaterial<'a, T> {
	pub sheet: &'a PropertySheet<T>,
	pub pass: u32,
}

impl<'a, T> BlitMaterial<'a, T> {
	pub fn new(sheet: &'a PropertySheet<T>, pass: u32) -> Self {
		Self { sheet, pass }
	}
}

/// Texture allocation and draw recording.
pub trait RenderDevice {
	type Texture: Send + Sync + 'static;

	fn create_texture(&mut self, desc: &TexDescriptor) -> Result<Sarc<Self::Texture>>;

	/// Replaces the whole content of the texture. The image must have the same
	/// size as the texture.
	fn write_texture(&mut self, texture: &Self::Texture, image: &RgbaImage) -> Result<()>;

	/// Draws one triangle covering `destination`, sampling `source`. Without a
	/// material this is a plain copy.
	fn blit_fullscreen_triangle(
		&mut self,
		source: &Sarc<Self::Texture>,
		destination: &Sarc<Self::Texture>,
		material: Option<BlitMaterial<'_, Self::Texture>>,
	) -> Result<()>;

	fn texture_size(&self, texture: &Self::Texture) -> ScreenSize;

	fn texture_format(&self, texture: &Self::Texture) -> TextureFormat;
}

/// Everything an effect gets to touch during one frame.
pub struct RenderContext<'a, D: RenderDevice> {
	pub device: &'a mut D,
	pub source: &'a Sarc<D::Texture>,
	pub destination: &'a Sarc<D::Texture>,
	pub property_sheets: &'a mut PropertySheetFactory<D::Texture>,
	pub frame: FrameInfo,
	pub rng: &'a mut dyn RngCore,
}

pub trait PostProcessEffectRenderer<D: RenderDevice>: Send + Sync {
	fn name(&self) -> &'static str;

	fn is_enabled(&self) -> bool {
		true
	}

	/// Called once before the first frame.
	fn init(&mut self, shaders: &ShaderLibrary) -> Result<()>;

	fn render(&mut self, context: &mut RenderContext<'_, D>) -> Result<()>;

	/// Drops every resource the effect holds. The effect needs another
	/// [`PostProcessEffectRenderer::init`] before it can render again.
	fn release(&mut self) {}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn frame_multiples() {
		let frame = |frame_count| FrameInfo {
			frame_count,
			..Default::default()
		};

		assert!(frame(0).is_multiple_of(13));
		assert!(frame(949).is_multiple_of(13));
		assert!(frame(949).is_multiple_of(73));
		assert!(!frame(950).is_multiple_of(73));
		assert!(!frame(0).is_multiple_of(0));
	}
}
