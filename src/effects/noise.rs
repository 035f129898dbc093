use image::{Rgba, RgbaImage};
use rand::Rng;

use crate::{
	core::size::ScreenSize,
	libs::texture::{TexDescriptor, TexSamplerDescriptor},
	size,
};

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

/// An opaque color with uniformly random RGB channels.
pub fn random_color<R: Rng + ?Sized>(rng: &mut R) -> Rgba<u8> {
	Rgba([rng.gen(), rng.gen(), rng.gen(), u8::MAX])
}

/// CPU side of the stripe noise: a narrow texture of horizontal color runs.
#[derive(Clone, Debug, PartialEq)]
pub struct NoiseTexture {
	image: RgbaImage,
}

impl NoiseTexture {
	pub const WIDTH: u32 = 64;

	/// A black noise texture of the given height. Needs a [`NoiseTexture::repaint`]
	/// before it means anything.
	pub fn new(height: u32) -> Self {
		Self {
			image: RgbaImage::new(Self::WIDTH, height),
		}
	}

	/// Overwrites every pixel in row-major order with a running color that gets
	/// replaced whenever a uniform draw exceeds `threshold`.
	///
	/// The expected length of a run is `1 / (1 - threshold)`.
	pub fn repaint<R: Rng + ?Sized>(&mut self, threshold: f32, rng: &mut R) {
		let mut color = random_color(rng);

		for y in 0..self.image.height() {
			for x in 0..self.image.width() {
				if rng.gen::<f32>() > threshold {
					color = random_color(rng);
				}
				self.image.put_pixel(x, y, color);
			}
		}
	}

	pub fn image(&self) -> &RgbaImage {
		&self.image
	}

	pub fn size(&self) -> ScreenSize {
		size!(self.image.width(), self.image.height())
	}

	pub fn descriptor(&self) -> TexDescriptor {
		TexDescriptor::new("Stripe noise", self.size()).with_sampler(TexSamplerDescriptor::NEAREST_CLAMP)
	}
}

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/
