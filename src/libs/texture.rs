use image::RgbaImage;
use serde::{Deserialize, Serialize};
use wgpu::{
	AddressMode, FilterMode, ImageCopyTexture, ImageDataLayout, Origin3d, Sampler, SamplerDescriptor, TextureAspect,
	TextureDescriptor, TextureDimension, TextureFormat, TextureUsages, TextureView, TextureViewDescriptor,
};

use crate::core::{gpu::Gpu, size::ScreenSize};

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

#[derive(Serialize, Deserialize, Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum SamplerEdges {
	#[default]
	ClampToEdge,
	Repeat,
	MirrorRepeat,
}

impl SamplerEdges {
	pub fn as_address_mode(&self) -> AddressMode {
		match self {
			SamplerEdges::ClampToEdge => AddressMode::ClampToEdge,
			SamplerEdges::Repeat => AddressMode::Repeat,
			SamplerEdges::MirrorRepeat => AddressMode::MirrorRepeat,
		}
	}
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TexSamplerDescriptor {
	pub filter: FilterMode,
	pub edges: SamplerEdges,
}

impl TexSamplerDescriptor {
	pub const LINEAR_CLAMP: Self = Self {
		filter: FilterMode::Linear,
		edges: SamplerEdges::ClampToEdge,
	};

	pub const NEAREST_CLAMP: Self = Self {
		filter: FilterMode::Nearest,
		edges: SamplerEdges::ClampToEdge,
	};
}

/// Backend-independent description of a 2D texture.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TexDescriptor {
	pub label: String,
	pub size: ScreenSize,
	pub format: TextureFormat,
	pub sampler: Option<TexSamplerDescriptor>,
}

impl TexDescriptor {
	/// Format of every texture the effects allocate on their own.
	pub const DEFAULT_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;

	pub fn new(label: impl Into<String>, size: ScreenSize) -> Self {
		Self {
			label: label.into(),
			size,
			format: Self::DEFAULT_FORMAT,
			sampler: Some(TexSamplerDescriptor::LINEAR_CLAMP),
		}
	}

	pub fn with_format(mut self, format: TextureFormat) -> Self {
		self.format = format;
		self
	}

	pub fn with_sampler(mut self, sampler: TexSamplerDescriptor) -> Self {
		self.sampler = Some(sampler);
		self
	}
}

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

#[derive(Debug)]
pub struct Tex {
	pub label: String,
	pub texture: wgpu::Texture,
	pub view: TextureView,
	pub sampler: Option<Sampler>,
}

impl Tex {
	/// Every texture can be sampled, rendered to, and copied in either direction
	pub const USAGES: TextureUsages = TextureUsages::TEXTURE_BINDING
		.union(TextureUsages::RENDER_ATTACHMENT)
		.union(TextureUsages::COPY_SRC)
		.union(TextureUsages::COPY_DST);

	pub fn create(gpu: &Gpu, desc: &TexDescriptor) -> Self {
		let texture = gpu.device.create_texture(&TextureDescriptor {
			label: Some(&format!("{} Texture", desc.label)),
			size: desc.size.into(),
			mip_level_count: 1,
			sample_count: 1,
			dimension: TextureDimension::D2,
			format: desc.format,
			usage: Self::USAGES,
			view_formats: &[],
		});

		let view = texture.create_view(&TextureViewDescriptor {
			label: Some(&format!("{} Texture View", desc.label)),
			format: Some(desc.format),
			aspect: TextureAspect::All,
			..Default::default()
		});

		let sampler = desc.sampler.map(|sampler_desc| {
			gpu.device.create_sampler(&SamplerDescriptor {
				label: Some(&format!("{} Sampler", desc.label)),
				address_mode_u: sampler_desc.edges.as_address_mode(),
				address_mode_v: sampler_desc.edges.as_address_mode(),
				address_mode_w: sampler_desc.edges.as_address_mode(),
				mag_filter: sampler_desc.filter,
				min_filter: sampler_desc.filter,
				mipmap_filter: sampler_desc.filter,
				..Default::default()
			})
		});

		Self {
			label: desc.label.clone(),
			texture,
			view,
			sampler,
		}
	}

	pub fn upload_image(&self, gpu: &Gpu, img: &RgbaImage) {
		// Panic to avoid dumb errors in the long run
		assert_eq!(img.width(), self.size().w);
		assert_eq!(img.height(), self.size().h);

		gpu.queue.write_texture(
			ImageCopyTexture {
				aspect: TextureAspect::All,
				texture: &self.texture,
				mip_level: 0,
				origin: Origin3d::ZERO,
			},
			img.as_raw(),
			ImageDataLayout {
				offset: 0,
				bytes_per_row: Some(4 * img.width()),
				rows_per_image: Some(img.height()),
			},
			self.texture.size(),
		);
	}

	pub fn size(&self) -> ScreenSize {
		self.texture.size().into()
	}

	pub fn format(&self) -> TextureFormat {
		self.texture.format()
	}
}

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

/// Number of bytes per pixel for the formats the crate can upload and read back.
pub fn bytes_per_pixel(format: TextureFormat) -> Option<u32> {
	match format {
		TextureFormat::Rgba8Unorm
		| TextureFormat::Rgba8UnormSrgb
		| TextureFormat::Bgra8Unorm
		| TextureFormat::Bgra8UnormSrgb => Some(4),
		_ => None,
	}
}
