use anyhow::Result;
use log::{debug, error, trace};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{
	noise::NoiseTexture,
	parameter::{FloatParameter, IntParameter},
};
use crate::{
	core::error::Error,
	libs::{
		shader::{self, Shader, ShaderLibrary},
		smart_arc::Sarc,
		texture::TexDescriptor,
	},
	post::{BlitMaterial, FrameInfo, PostProcessEffectRenderer, RenderContext, RenderDevice},
};

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

/// When the auxiliary textures get thrown away and allocated again.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum ReallocationPolicy {
	/// Every time the stripe frequency gate opens, whether anything changed or not
	#[default]
	EveryGate,
	/// Only when the gate opens and a texture's size no longer matches
	OnChange,
}

/// Settings of the digital stripe glitch. Every numeric value is kept within
/// its range.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq)]
#[serde(from = "GlitchDigitalStripeValues", into = "GlitchDigitalStripeValues")]
pub struct GlitchDigitalStripe {
	pub enabled: bool,
	pub reallocation: ReallocationPolicy,
	intensity: FloatParameter,
	frequency: IntParameter,
	stripe_length: FloatParameter,
	stripe_width: IntParameter,
}

impl Default for GlitchDigitalStripe {
	fn default() -> Self {
		Self {
			enabled: true,
			reallocation: ReallocationPolicy::default(),
			intensity: FloatParameter::new(0.25, 0.0, 1.0),
			frequency: IntParameter::new(3, 1, 10),
			stripe_length: FloatParameter::new(8.0, 5.0, 9.8),
			stripe_width: IntParameter::new(32, 8, 64),
		}
	}
}

impl GlitchDigitalStripe {
	pub fn intensity(&self) -> f32 {
		self.intensity.value()
	}

	pub fn set_intensity(&mut self, value: f32) -> &mut Self {
		self.intensity.set(value);
		self
	}

	/// Number of frames between two noise updates
	pub fn frequency(&self) -> u64 {
		self.frequency.value() as u64
	}

	pub fn set_frequency(&mut self, value: i32) -> &mut Self {
		self.frequency.set(value);
		self
	}

	pub fn stripe_length(&self) -> f32 {
		self.stripe_length.value()
	}

	pub fn set_stripe_length(&mut self, value: f32) -> &mut Self {
		self.stripe_length.set(value);
		self
	}

	/// Height of the noise texture, in pixels
	pub fn stripe_width(&self) -> u32 {
		self.stripe_width.value() as u32
	}

	pub fn set_stripe_width(&mut self, value: i32) -> &mut Self {
		self.stripe_width.set(value);
		self
	}

	/// The probability for a noise pixel to keep the color of the previous one.
	pub fn stripe_threshold(&self) -> f32 {
		self.stripe_length() * 0.1
	}
}

/// Plain values, as they are written in configuration files.
#[derive(Serialize, Deserialize, Copy, Clone, Debug)]
#[serde(default)]
struct GlitchDigitalStripeValues {
	enabled: bool,
	reallocation: ReallocationPolicy,
	intensity: f32,
	frequency: i32,
	stripe_length: f32,
	stripe_width: i32,
}

impl Default for GlitchDigitalStripeValues {
	fn default() -> Self {
		GlitchDigitalStripe::default().into()
	}
}

impl From<GlitchDigitalStripe> for GlitchDigitalStripeValues {
	fn from(settings: GlitchDigitalStripe) -> Self {
		Self {
			enabled: settings.enabled,
			reallocation: settings.reallocation,
			intensity: settings.intensity(),
			frequency: settings.frequency.value(),
			stripe_length: settings.stripe_length(),
			stripe_width: settings.stripe_width.value(),
		}
	}
}

impl From<GlitchDigitalStripeValues> for GlitchDigitalStripe {
	fn from(values: GlitchDigitalStripeValues) -> Self {
		let mut settings = Self {
			enabled: values.enabled,
			reallocation: values.reallocation,
			..Default::default()
		};
		settings
			.set_intensity(values.intensity)
			.set_frequency(values.frequency)
			.set_stripe_length(values.stripe_length)
			.set_stripe_width(values.stripe_width);
		settings
	}
}

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

pub mod shader_ids {
	pub const INTENSITY: &str = "intensity";
	pub const NOISE_TEX: &str = "noise_tex";
	pub const TRASH_TEX: &str = "trash_tex";
}

/// The noise pixels and the device texture they were uploaded to.
struct StripeNoise<T> {
	pixels: NoiseTexture,
	texture: Sarc<T>,
}

/// Displaces horizontal stripes of the screen, tints some of them, and swaps
/// others with stale frames captured earlier.
///
/// Shader API:\
/// `#property intensity: f32`\
/// `#property noise_tex: texture`\
/// `#property trash_tex: texture`
pub struct GlitchDigitalStripeRenderer<D: RenderDevice> {
	pub settings: GlitchDigitalStripe,
	shader: Option<Sarc<Shader>>,
	noise: Option<StripeNoise<D::Texture>>,
	trash_frames: [Option<Sarc<D::Texture>>; 2],
}

impl<D: RenderDevice> GlitchDigitalStripeRenderer<D> {
	pub const NAME: &'static str = "Glitch/DigitalStripe";
	pub const SHADER: &'static str = "glitch/digital_stripe";

	/// Trash frame `i` captures the source every `TRASH_FRAME_PERIODS[i]` frames
	pub const TRASH_FRAME_PERIODS: [u64; 2] = [13, 73];

	pub fn new(settings: GlitchDigitalStripe) -> Self {
		Self {
			settings,
			shader: None,
			noise: None,
			trash_frames: [None, None],
		}
	}

	pub fn noise_texture(&self) -> Option<&Sarc<D::Texture>> {
		self.noise.as_ref().map(|n| &n.texture)
	}

	pub fn noise_pixels(&self) -> Option<&NoiseTexture> {
		self.noise.as_ref().map(|n| &n.pixels)
	}

	pub fn trash_frame(&self, index: usize) -> Option<&Sarc<D::Texture>> {
		self.trash_frames.get(index).and_then(Option::as_ref)
	}

	fn is_gate_open(&self, frame: &FrameInfo) -> bool {
		frame.is_multiple_of(self.settings.frequency().max(1))
	}

	/// (Re)allocates the noise texture and the trash frames on gated frames.
	/// Returns whether anything was allocated.
	fn set_up_resources(&mut self, device: &mut D, frame: &FrameInfo) -> Result<bool> {
		if !self.is_gate_open(frame) {
			return Ok(false);
		}

		let stripe_width = self.settings.stripe_width();
		let on_change = self.settings.reallocation == ReallocationPolicy::OnChange;
		let mut allocated = false;

		let noise_matches = self
			.noise
			.as_ref()
			.is_some_and(|n| n.pixels.size().h == stripe_width);
		if !(on_change && noise_matches) {
			let pixels = NoiseTexture::new(stripe_width);
			let texture = device.create_texture(&pixels.descriptor())?;
			self.noise = Some(StripeNoise { pixels, texture });
			allocated = true;
		}

		for (i, slot) in self.trash_frames.iter_mut().enumerate() {
			let frame_matches = slot
				.as_ref()
				.is_some_and(|t| device.texture_size(t) == frame.screen_size);
			if on_change && frame_matches {
				continue;
			}

			let desc = TexDescriptor::new(format!("Trash frame {}", i + 1), frame.screen_size);
			*slot = Some(device.create_texture(&desc)?);
			allocated = true;
		}

		if allocated {
			debug!(
				"Allocated glitch resources on frame {} (noise 64x{}, trash {})",
				frame.frame_count, stripe_width, frame.screen_size
			);
		}

		Ok(allocated)
	}

	/// Paints new stripes into the noise texture on gated frames and uploads them.
	fn update_noise_texture<R: Rng + ?Sized>(&mut self, device: &mut D, frame: &FrameInfo, rng: &mut R) -> Result<()> {
		if !self.is_gate_open(frame) {
			return Ok(());
		}

		let threshold = self.settings.stripe_threshold();
		let Some(noise) = self.noise.as_mut() else {
			return Ok(());
		};

		noise.pixels.repaint(threshold, rng);
		device.write_texture(&noise.texture, noise.pixels.image())
	}
}

impl<D: RenderDevice> PostProcessEffectRenderer<D> for GlitchDigitalStripeRenderer<D> {
	fn name(&self) -> &'static str {
		Self::NAME
	}

	fn is_enabled(&self) -> bool {
		self.settings.enabled
	}

	fn init(&mut self, shaders: &ShaderLibrary) -> Result<()> {
		let shader = shaders
			.require(Self::SHADER)
			.and_then(|s| shader::validate_entry_points(&s).map(|_| s))
			.inspect_err(|err| error!("{}: {:#}", Self::NAME, err))?;

		self.shader = Some(shader);
		Ok(())
	}

	fn render(&mut self, context: &mut RenderContext<'_, D>) -> Result<()> {
		let shader = self.shader.clone().ok_or(Error::NotInitialized(Self::NAME))?;
		let frame = context.frame;

		self.set_up_resources(&mut *context.device, &frame)?;
		self.update_noise_texture(&mut *context.device, &frame, &mut *context.rng)?;

		let sheet = context.property_sheets.get(&shader);
		sheet.set_float(shader_ids::INTENSITY, self.settings.intensity());

		for (trash_frame, period) in self.trash_frames.iter().zip(Self::TRASH_FRAME_PERIODS) {
			if let Some(trash_frame) = trash_frame.as_ref().filter(|_| frame.is_multiple_of(period)) {
				context
					.device
					.blit_fullscreen_triangle(context.source, trash_frame, None)?;
			}
		}

		match self.noise.as_ref() {
			Some(noise) => {
				sheet.set_texture(shader_ids::NOISE_TEX, &noise.texture);
			}
			None => trace!("No noise texture to bind on frame {}", frame.frame_count),
		}

		let trash_frame = if context.rng.gen::<f32>() > 0.5 {
			&self.trash_frames[0]
		} else {
			&self.trash_frames[1]
		};
		match trash_frame {
			Some(trash_frame) => {
				sheet.set_texture(shader_ids::TRASH_TEX, trash_frame);
			}
			None => trace!("No trash frame to bind on frame {}", frame.frame_count),
		}

		context
			.device
			.blit_fullscreen_triangle(context.source, context.destination, Some(BlitMaterial::new(sheet, 0)))
	}

	fn release(&mut self) {
		self.noise = None;
		self.trash_frames = [None, None];
		self.shader = None;
	}
}

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

#[cfg(test)]
mod tests {
	use rand::{rngs::StdRng, SeedableRng};

	use super::*;
	use crate::{
		core::size::ScreenSize,
		post::{
			recording::{Command, RecordedTexture, RecordingDevice},
			sheet::PropertySheetFactory,
		},
		size,
	};

	type Renderer = GlitchDigitalStripeRenderer<RecordingDevice>;

	const SCREEN: ScreenSize = size!(320, 180);

	struct Host {
		device: RecordingDevice,
		sheets: PropertySheetFactory<RecordedTexture>,
		source: Sarc<RecordedTexture>,
		destination: Sarc<RecordedTexture>,
		rng: StdRng,
	}

	impl Host {
		fn new() -> Self {
			let mut device = RecordingDevice::new();
			let source = device.external_texture("source", SCREEN);
			let destination = device.external_texture("destination", SCREEN);
			Self {
				device,
				sheets: PropertySheetFactory::new(),
				source,
				destination,
				rng: StdRng::seed_from_u64(1234),
			}
		}

		fn render_at(&mut self, renderer: &mut Renderer, frame_count: u64, screen_size: ScreenSize) -> Result<()> {
			let mut context = RenderContext {
				device: &mut self.device,
				source: &self.source,
				destination: &self.destination,
				property_sheets: &mut self.sheets,
				frame: FrameInfo {
					frame_count,
					screen_size,
				},
				rng: &mut self.rng,
			};
			renderer.render(&mut context)
		}

		fn render(&mut self, renderer: &mut Renderer, frame_count: u64) -> Result<()> {
			self.render_at(renderer, frame_count, SCREEN)
		}
	}

	fn renderer(settings: GlitchDigitalStripe) -> Renderer {
		let mut renderer = Renderer::new(settings);
		renderer.init(&ShaderLibrary::embedded().unwrap()).unwrap();
		renderer
	}

	fn settings(frequency: i32, stripe_width: i32, stripe_length: f32) -> GlitchDigitalStripe {
		let mut settings = GlitchDigitalStripe::default();
		settings
			.set_frequency(frequency)
			.set_stripe_width(stripe_width)
			.set_stripe_length(stripe_length);
		settings
	}

	fn ids(renderer: &Renderer) -> (Option<usize>, Option<usize>, Option<usize>) {
		(
			renderer.noise_texture().map(|t| t.id),
			renderer.trash_frame(0).map(|t| t.id),
			renderer.trash_frame(1).map(|t| t.id),
		)
	}

	#[test]
	fn settings_defaults() {
		let settings = GlitchDigitalStripe::default();

		assert!(settings.enabled);
		assert_eq!(settings.intensity(), 0.25);
		assert_eq!(settings.frequency(), 3);
		assert_eq!(settings.stripe_length(), 8.0);
		assert_eq!(settings.stripe_width(), 32);
		assert_eq!(settings.reallocation, ReallocationPolicy::EveryGate);
	}

	#[test]
	fn settings_are_clamped() {
		let mut settings = GlitchDigitalStripe::default();
		settings
			.set_intensity(3.0)
			.set_frequency(0)
			.set_stripe_length(1.0)
			.set_stripe_width(1000);

		assert_eq!(settings.intensity(), 1.0);
		assert_eq!(settings.frequency(), 1);
		assert_eq!(settings.stripe_length(), 5.0);
		assert_eq!(settings.stripe_width(), 64);
		assert!((settings.stripe_threshold() - 0.5).abs() < 1e-6);
	}

	#[test]
	fn settings_are_clamped_when_deserialized() {
		let settings: GlitchDigitalStripe = ron::from_str("(intensity: -1.0, stripe_width: 4)").unwrap();

		assert_eq!(settings.intensity(), 0.0);
		assert_eq!(settings.stripe_width(), 8);
		assert_eq!(settings.frequency(), 3);
	}

	#[test]
	fn init_fails_on_missing_shader() {
		let mut renderer = Renderer::new(GlitchDigitalStripe::default());
		let err = renderer.init(&ShaderLibrary::new()).unwrap_err();

		assert_eq!(
			err.downcast_ref::<Error>(),
			Some(&Error::ShaderNotFound(Renderer::SHADER.to_owned()))
		);
	}

	#[test]
	fn render_before_init_fails() {
		let mut host = Host::new();
		let mut renderer = Renderer::new(GlitchDigitalStripe::default());

		let err = host.render(&mut renderer, 0).unwrap_err();
		assert_eq!(err.downcast_ref::<Error>(), Some(&Error::NotInitialized(Renderer::NAME)));
	}

	#[test]
	fn allocation_follows_frequency_gate() {
		let mut host = Host::new();
		let mut renderer = renderer(settings(3, 32, 8.0));

		let mut previous = ids(&renderer);
		for frame in 0..30 {
			host.device.take();
			host.render(&mut renderer, frame).unwrap();

			let current = ids(&renderer);
			let created = host.device.creations().count();

			if frame % 3 == 0 {
				assert_eq!(created, 3, "frame {frame}");
				assert_ne!(current.0, previous.0);
				assert_ne!(current.1, previous.1);
				assert_ne!(current.2, previous.2);
			} else {
				assert_eq!(created, 0, "frame {frame}");
				assert_eq!(current, previous);
			}
			previous = current;
		}
	}

	#[test]
	fn noise_content_only_changes_on_gated_frames() {
		let mut host = Host::new();
		let mut renderer = renderer(settings(4, 16, 8.0));

		host.render(&mut renderer, 0).unwrap();
		let painted = renderer.noise_pixels().cloned();

		for frame in 1..4 {
			host.device.take();
			host.render(&mut renderer, frame).unwrap();
			assert_eq!(host.device.writes().count(), 0);
			assert_eq!(renderer.noise_pixels().cloned(), painted);
		}

		host.render(&mut renderer, 4).unwrap();
		assert_ne!(renderer.noise_pixels().cloned(), painted);
	}

	#[test]
	fn noise_texture_shape_follows_settings() {
		let mut host = Host::new();
		let mut renderer = renderer(settings(1, 24, 8.0));

		host.render(&mut renderer, 0).unwrap();
		let noise = renderer.noise_texture().unwrap().clone();

		assert_eq!(noise.desc.size, size!(64, 24));
		assert_eq!(noise.desc.sampler, Some(crate::libs::texture::TexSamplerDescriptor::NEAREST_CLAMP));

		let uploaded = noise.content.lock().unwrap().clone().unwrap();
		assert_eq!(&uploaded, renderer.noise_pixels().unwrap().image());

		let trash = renderer.trash_frame(0).unwrap();
		assert_eq!(trash.desc.size, SCREEN);
	}

	#[test]
	fn resize_repaints_every_pixel() {
		let mut host = Host::new();
		let mut renderer = renderer(settings(1, 8, 8.0));
		host.render(&mut renderer, 0).unwrap();

		renderer.settings.set_stripe_width(40);
		host.render(&mut renderer, 1).unwrap();

		let noise = renderer.noise_pixels().unwrap();
		assert_eq!(noise.size(), size!(64, 40));
		assert!(noise.image().pixels().all(|p| p.0[3] == 255));
	}

	#[test]
	fn trash_frames_capture_on_their_periods() {
		let mut host = Host::new();
		let mut renderer = renderer(settings(10, 32, 8.0));

		for frame in 0..2000u64 {
			host.device.take();
			host.render(&mut renderer, frame).unwrap();

			// Allocation happens first, so captures land in the current textures
			let (_, trash_1, trash_2) = ids(&renderer);
			let captures = host
				.device
				.blits()
				.filter(|(src, _, material)| *src == host.source.id && material.is_none())
				.map(|(_, dst, _)| Some(dst))
				.collect::<Vec<_>>();

			assert_eq!(captures.contains(&trash_1), frame % 13 == 0, "frame {frame}");
			assert_eq!(captures.contains(&trash_2), frame % 73 == 0, "frame {frame}");
			assert_eq!(captures.len() == 2, frame % 949 == 0, "frame {frame}");
		}
	}

	#[test]
	fn trash_captures_happen_before_the_glitch_blit() {
		let mut host = Host::new();
		let mut renderer = renderer(settings(1, 32, 8.0));

		host.render(&mut renderer, 949).unwrap();

		let blits = host.device.blits().collect::<Vec<_>>();
		assert_eq!(blits.len(), 3);
		assert!(blits[0].2.is_none());
		assert!(blits[1].2.is_none());
		assert_eq!(blits[2].1, host.destination.id);
		assert!(blits[2].2.is_some());
	}

	#[test]
	fn glitch_blit_binds_settings_and_textures() {
		let mut host = Host::new();
		let mut s = settings(3, 32, 8.0);
		s.set_intensity(0.7);
		let mut renderer = renderer(s);

		host.render(&mut renderer, 0).unwrap();

		let (source, destination, material) = host.device.blits().last().unwrap();
		let material = material.unwrap();
		let trash = material.texture(shader_ids::TRASH_TEX);
		let (noise, trash_1, trash_2) = ids(&renderer);

		assert_eq!((source, destination), (host.source.id, host.destination.id));
		assert_eq!(material.shader, Renderer::SHADER);
		assert_eq!(material.pass, 0);
		assert_eq!(material.float(shader_ids::INTENSITY), Some(0.7));
		assert_eq!(material.texture(shader_ids::NOISE_TEX), noise);
		assert!(trash == trash_1 || trash == trash_2);
	}

	#[test]
	fn both_trash_frames_get_picked() {
		let mut host = Host::new();
		let mut renderer = renderer(settings(10, 32, 8.0));
		let mut picked = [0u32; 2];

		for frame in 0..200 {
			host.device.take();
			host.render(&mut renderer, frame).unwrap();

			let (_, trash_1, trash_2) = ids(&renderer);
			let (_, _, material) = host.device.blits().last().unwrap();
			let bound = material.unwrap().texture(shader_ids::TRASH_TEX);
			if bound == trash_1 {
				picked[0] += 1;
			} else if bound == trash_2 {
				picked[1] += 1;
			}
		}

		assert_eq!(picked[0] + picked[1], 200);
		assert!(picked[0] > 50 && picked[1] > 50, "{picked:?}");
	}

	#[test]
	fn missing_noise_texture_is_not_bound() {
		let mut host = Host::new();
		let mut renderer = renderer(settings(3, 32, 8.0));

		// Frame 7 is off the gate, so nothing was ever allocated
		host.render(&mut renderer, 7).unwrap();

		assert!(renderer.noise_texture().is_none());
		assert_eq!(host.device.creations().count(), 0);

		let (_, _, material) = host.device.blits().last().unwrap();
		let material = material.unwrap();
		assert!(material.texture(shader_ids::NOISE_TEX).is_none());
		assert!(material.texture(shader_ids::TRASH_TEX).is_none());
		assert_eq!(material.float(shader_ids::INTENSITY), Some(0.25));
	}

	#[test]
	fn end_to_end_frame_six() {
		let mut host = Host::new();
		let mut renderer = renderer(settings(3, 32, 8.0));
		assert!((renderer.settings.stripe_threshold() - 0.8).abs() < 1e-6);

		host.render(&mut renderer, 6).unwrap();

		// Reallocation happened and the noise was painted and uploaded
		assert_eq!(host.device.creations().count(), 3);
		let noise_id = renderer.noise_texture().unwrap().id;
		assert_eq!(host.device.writes().collect::<Vec<_>>(), vec![noise_id]);
		assert_eq!(renderer.noise_pixels().unwrap().size(), size!(64, 32));

		// 6 is neither a multiple of 13 nor of 73: only the glitch blit
		let blits = host.device.blits().collect::<Vec<_>>();
		assert_eq!(blits.len(), 1);
		assert_eq!(blits[0].2.unwrap().texture(shader_ids::NOISE_TEX), Some(noise_id));
	}

	#[test]
	fn on_change_policy_keeps_matching_textures() {
		let mut host = Host::new();
		let mut s = settings(2, 32, 8.0);
		s.reallocation = ReallocationPolicy::OnChange;
		let mut renderer = renderer(s);

		host.render(&mut renderer, 0).unwrap();
		let first = ids(&renderer);

		host.render(&mut renderer, 2).unwrap();
		assert_eq!(ids(&renderer), first);

		// Noise gets repainted even when it isn't reallocated
		host.device.take();
		host.render(&mut renderer, 4).unwrap();
		assert_eq!(host.device.writes().collect::<Vec<_>>(), vec![first.0.unwrap()]);

		renderer.settings.set_stripe_width(16);
		host.render(&mut renderer, 6).unwrap();
		let resized = ids(&renderer);
		assert_ne!(resized.0, first.0);
		assert_eq!((resized.1, resized.2), (first.1, first.2));

		host.render_at(&mut renderer, 8, size!(640, 360)).unwrap();
		let rescaled = ids(&renderer);
		assert_eq!(rescaled.0, resized.0);
		assert_ne!(rescaled.1, first.1);
		assert_ne!(rescaled.2, first.2);
	}

	#[test]
	fn allocation_failure_propagates() {
		let mut host = Host::new();
		let mut renderer = renderer(GlitchDigitalStripe::default());
		host.device.fail_allocations = true;

		assert!(host.render(&mut renderer, 0).is_err());
		assert!(!host.device.commands.iter().any(|c| matches!(c, Command::Blit { .. })));
	}

	#[test]
	fn release_drops_resources_and_requires_init() {
		let mut host = Host::new();
		let mut renderer = renderer(GlitchDigitalStripe::default());
		host.render(&mut renderer, 0).unwrap();

		renderer.release();
		renderer.release();

		assert_eq!(ids(&renderer), (None, None, None));
		assert!(host.render(&mut renderer, 1).is_err());

		renderer.init(&ShaderLibrary::embedded().unwrap()).unwrap();
		assert!(host.render(&mut renderer, 1).is_ok());
	}
}
