use anyhow::{Context, Result};
use log::{debug, info};
use rand::RngCore;

use super::{sheet::PropertySheetFactory, FrameInfo, PostProcessEffectRenderer, RenderContext, RenderDevice};
use crate::libs::{shader::ShaderLibrary, smart_arc::Sarc, texture::TexDescriptor};

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

/// Runs a list of effects one after the other, each one reading what the
/// previous one wrote.
pub struct PostProcessStack<D: RenderDevice> {
	effects: Vec<Box<dyn PostProcessEffectRenderer<D>>>,
	property_sheets: PropertySheetFactory<D::Texture>,
	temporaries: [Option<Sarc<D::Texture>>; 2],
}

impl<D: RenderDevice> Default for PostProcessStack<D> {
	fn default() -> Self {
		Self {
			effects: Vec::new(),
			property_sheets: PropertySheetFactory::new(),
			temporaries: [None, None],
		}
	}
}

impl<D: RenderDevice> PostProcessStack<D> {
	pub fn empty() -> Self {
		Self::default()
	}

	pub fn with(mut self, effect: impl PostProcessEffectRenderer<D> + 'static) -> Self {
		self.push(effect);
		self
	}

	pub fn push(&mut self, effect: impl PostProcessEffectRenderer<D> + 'static) {
		self.effects.push(Box::new(effect));
	}

	pub fn effects(&self) -> impl Iterator<Item = &dyn PostProcessEffectRenderer<D>> {
		self.effects.iter().map(|e| e.as_ref())
	}

	pub fn effects_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn PostProcessEffectRenderer<D>>> {
		self.effects.iter_mut()
	}

	pub fn init(&mut self, shaders: &ShaderLibrary) -> Result<()> {
		for effect in &mut self.effects {
			effect
				.init(shaders)
				.with_context(|| format!("Couldn't initialize effect '{}'", effect.name()))?;
			info!("Initialized effect '{}'", effect.name());
		}
		Ok(())
	}

	/// Renders every enabled effect from `source` into `destination`. With no
	/// enabled effect the source is copied over as-is.
	pub fn render(
		&mut self,
		device: &mut D,
		source: &Sarc<D::Texture>,
		destination: &Sarc<D::Texture>,
		frame: FrameInfo,
		rng: &mut dyn RngCore,
	) -> Result<()> {
		let enabled = self
			.effects
			.iter()
			.enumerate()
			.filter(|(_, e)| e.is_enabled())
			.map(|(i, _)| i)
			.collect::<Vec<_>>();

		if enabled.is_empty() {
			return device.blit_fullscreen_triangle(source, destination, None);
		}

		// Only chains of two or more effects need somewhere to put intermediate frames
		let temporaries = if enabled.len() > 1 {
			self.prepare_temporaries(device, source, enabled.len() > 2)?
		} else {
			[None, None]
		};

		for (step, &index) in enabled.iter().enumerate() {
			let input = match step {
				0 => source,
				_ => temporaries[(step - 1) % 2].as_ref().unwrap_or(source),
			};
			let output = if step == enabled.len() - 1 {
				destination
			} else {
				temporaries[step % 2].as_ref().unwrap_or(destination)
			};

			let effect = &mut self.effects[index];
			let mut context = RenderContext {
				device: &mut *device,
				source: input,
				destination: output,
				property_sheets: &mut self.property_sheets,
				frame,
				rng: &mut *rng,
			};

			effect
				.render(&mut context)
				.with_context(|| format!("Effect '{}' failed on frame {}", effect.name(), frame.frame_count))?;
		}

		Ok(())
	}

	pub fn release(&mut self) {
		for effect in &mut self.effects {
			effect.release();
			debug!("Released effect '{}'", effect.name());
		}
		self.property_sheets.release();
		self.temporaries = [None, None];
	}

	/// Makes sure the intermediate textures exist with the size and format of the
	/// source frame.
	fn prepare_temporaries(
		&mut self,
		device: &mut D,
		source: &Sarc<D::Texture>,
		need_both: bool,
	) -> Result<[Option<Sarc<D::Texture>>; 2]> {
		let size = device.texture_size(source);
		let format = device.texture_format(source);
		let needed = if need_both { 2 } else { 1 };

		for (i, slot) in self.temporaries.iter_mut().enumerate().take(needed) {
			let stale = slot
				.as_ref()
				.map_or(true, |t| device.texture_size(t) != size || device.texture_format(t) != format);

			if stale {
				debug!("Allocating post-processing temporary {} at {}", i, size);
				let desc = TexDescriptor::new(format!("Post-processing temporary {}", i), size).with_format(format);
				*slot = Some(device.create_texture(&desc)?);
			}
		}

		Ok(self.temporaries.clone())
	}
}

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/
