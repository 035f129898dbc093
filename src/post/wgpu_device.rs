use std::sync::mpsc;

use anyhow::{anyhow, bail, Context, Result};
use bevy_ecs::system::Resource;
use hashlink::LinkedHashMap;
use image::RgbaImage;
use log::{debug, trace};
use wgpu::{
	util::{BufferInitDescriptor, DeviceExt},
	BindGroup, BindGroupDescriptor, BindGroupEntry, BindGroupLayout, BindGroupLayoutDescriptor, BindGroupLayoutEntry,
	BindingResource, BindingType, BlendState, BufferBindingType, BufferDescriptor, BufferUsages, Color,
	ColorTargetState, ColorWrites, CommandEncoder, CommandEncoderDescriptor, Device, ErrorFilter, FragmentState,
	FrontFace, ImageCopyBuffer, ImageCopyTexture, ImageDataLayout, LoadOp, Maintain, MapMode, MultisampleState,
	Operations, Origin3d, PipelineLayoutDescriptor, PolygonMode, PrimitiveState, PrimitiveTopology,
	RenderPassColorAttachment, RenderPassDescriptor, RenderPipeline, RenderPipelineDescriptor, Sampler,
	SamplerBindingType, SamplerDescriptor, ShaderModuleDescriptor, ShaderSource, ShaderStages, StoreOp,
	TextureAspect, TextureFormat, TextureSampleType, TextureViewDimension, VertexState,
};

use super::{BlitMaterial, RenderDevice};
use crate::{
	core::{error::Error, gpu::Gpu, size::ScreenSize},
	libs::{
		shader::{self, Shader, ShaderLibrary},
		smart_arc::Sarc,
		texture::{self, Tex, TexDescriptor},
	},
	size,
};

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

/// A render pipeline drawing one shader into one texture format.
struct BlitPipeline {
	pipeline: RenderPipeline,
	source_layout: BindGroupLayout,
	properties_layout: BindGroupLayout,
}

impl BlitPipeline {
	fn new(device: &Device, shader: &Shader, format: TextureFormat) -> Result<Self> {
		device.push_error_scope(ErrorFilter::Validation);

		let module = device.create_shader_module(ShaderModuleDescriptor {
			label: Some(&format!("{} Shader", shader.name)),
			source: ShaderSource::Wgsl(shader.full_source().into()),
		});

		// Group 0 always has the frame being processed
		let source_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
			label: Some(&format!("{} Source Bind Group Layout", shader.name)),
			entries: &[texture_entry(0), sampler_entry(1)],
		});

		// Group 1 has the property block followed by the texture properties
		let mut entries = vec![BindGroupLayoutEntry {
			binding: 0,
			visibility: ShaderStages::FRAGMENT,
			ty: BindingType::Buffer {
				ty: BufferBindingType::Uniform,
				has_dynamic_offset: false,
				min_binding_size: None,
			},
			count: None,
		}];
		for i in 0..shader.textures().count() as u32 {
			entries.push(texture_entry(1 + 2 * i));
			entries.push(sampler_entry(2 + 2 * i));
		}

		let properties_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
			label: Some(&format!("{} Properties Bind Group Layout", shader.name)),
			entries: &entries,
		});

		let layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
			label: Some(&format!("{} Pipeline Layout", shader.name)),
			bind_group_layouts: &[&source_layout, &properties_layout],
			push_constant_ranges: &[],
		});

		let pipeline = device.create_render_pipeline(&RenderPipelineDescriptor {
			label: Some(&format!("{} Pipeline", shader.name)),
			layout: Some(&layout),
			// No vertex buffers, the vertex shader places a single oversized triangle
			vertex: VertexState {
				module: &module,
				entry_point: "vs_main",
				buffers: &[],
			},
			fragment: Some(FragmentState {
				module: &module,
				entry_point: "fs_main",
				targets: &[Some(ColorTargetState {
					format,
					blend: Some(BlendState::REPLACE),
					write_mask: ColorWrites::ALL,
				})],
			}),
			primitive: PrimitiveState {
				topology: PrimitiveTopology::TriangleList,
				strip_index_format: None,
				front_face: FrontFace::Ccw,
				cull_mode: None,
				polygon_mode: PolygonMode::Fill,
				unclipped_depth: false,
				conservative: false,
			},
			depth_stencil: None,
			multisample: MultisampleState {
				count: 1,
				mask: !0,
				alpha_to_coverage_enabled: false,
			},
			multiview: None,
		});

		if let Some(err) = pollster::block_on(device.pop_error_scope()) {
			bail!(Error::InvalidShader {
				name: shader.name.clone(),
				reason: err.to_string(),
			});
		}

		Ok(Self {
			pipeline,
			source_layout,
			properties_layout,
		})
	}
}

fn texture_entry(binding: u32) -> BindGroupLayoutEntry {
	BindGroupLayoutEntry {
		binding,
		visibility: ShaderStages::FRAGMENT,
		ty: BindingType::Texture {
			multisampled: false,
			view_dimension: TextureViewDimension::D2,
			sample_type: TextureSampleType::Float { filterable: true },
		},
		count: None,
	}
}

fn sampler_entry(binding: u32) -> BindGroupLayoutEntry {
	BindGroupLayoutEntry {
		binding,
		visibility: ShaderStages::FRAGMENT,
		// This should match the filterable field of the texture entries
		ty: BindingType::Sampler(SamplerBindingType::Filtering),
		count: None,
	}
}

/// Rows of a texture-to-buffer copy have to be aligned to
/// [`wgpu::COPY_BYTES_PER_ROW_ALIGNMENT`].
fn padded_bytes_per_row(width: u32, bytes_per_pixel: u32) -> u32 {
	let unpadded = width * bytes_per_pixel;
	unpadded.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT
}

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

/// A [`RenderDevice`] recording into a wgpu command encoder. Draws are only sent
/// to the GPU on [`WgpuDevice::submit`].
#[derive(Resource)]
pub struct WgpuDevice {
	gpu: Gpu,
	encoder: Option<CommandEncoder>,
	pipelines: LinkedHashMap<(Sarc<Shader>, TextureFormat), Sarc<BlitPipeline>>,
	copy_shader: Sarc<Shader>,
	/// Bound in place of texture properties nobody set
	fallback_texture: Tex,
	fallback_sampler: Sampler,
}

impl WgpuDevice {
	pub const COPY_SHADER: &'static str = "blit/copy";

	pub fn new(gpu: Gpu, shaders: &ShaderLibrary) -> Result<Self> {
		let copy_shader = shaders.require(Self::COPY_SHADER)?;
		shader::validate_entry_points(&copy_shader)?;

		let fallback_texture = Tex::create(&gpu, &TexDescriptor::new("Fallback", size!(1, 1)));
		fallback_texture.upload_image(&gpu, &RgbaImage::new(1, 1));

		let fallback_sampler = gpu.device.create_sampler(&SamplerDescriptor {
			label: Some("Fallback Sampler"),
			..Default::default()
		});

		Ok(Self {
			gpu,
			encoder: None,
			pipelines: LinkedHashMap::new(),
			copy_shader,
			fallback_texture,
			fallback_sampler,
		})
	}

	pub fn gpu(&self) -> &Gpu {
		&self.gpu
	}

	/// Sends every draw recorded so far to the GPU.
	pub fn submit(&mut self) {
		if let Some(encoder) = self.encoder.take() {
			self.gpu.queue.submit([encoder.finish()]);
		}
	}

	/// Copies the content of the texture back into memory, waiting for every
	/// pending draw to finish first.
	pub fn read_texture(&mut self, texture: &Tex) -> Result<RgbaImage> {
		self.submit();

		let format = texture.format();
		let ScreenSize { w, h } = texture.size();
		let bytes_per_pixel =
			texture::bytes_per_pixel(format).with_context(|| format!("Can't read back {:?} textures", format))?;
		let unpadded = w * bytes_per_pixel;
		let padded = padded_bytes_per_row(w, bytes_per_pixel);

		let buffer = self.gpu.device.create_buffer(&BufferDescriptor {
			label: Some(&format!("{} Readback Buffer", texture.label)),
			size: padded as u64 * h as u64,
			usage: BufferUsages::COPY_DST | BufferUsages::MAP_READ,
			mapped_at_creation: false,
		});

		let mut encoder = self.gpu.device.create_command_encoder(&CommandEncoderDescriptor {
			label: Some("Readback Encoder"),
		});
		encoder.copy_texture_to_buffer(
			ImageCopyTexture {
				texture: &texture.texture,
				mip_level: 0,
				origin: Origin3d::ZERO,
				aspect: TextureAspect::All,
			},
			ImageCopyBuffer {
				buffer: &buffer,
				layout: ImageDataLayout {
					offset: 0,
					bytes_per_row: Some(padded),
					rows_per_image: Some(h),
				},
			},
			texture.size().into(),
		);
		self.gpu.queue.submit([encoder.finish()]);

		let slice = buffer.slice(..);
		let (sender, receiver) = mpsc::channel();
		slice.map_async(MapMode::Read, move |result| {
			let _ = sender.send(result);
		});
		let _ = self.gpu.device.poll(Maintain::Wait);
		receiver
			.recv()
			.context("Readback was dropped")?
			.map_err(|e| anyhow!("Couldn't map readback buffer: {}", e))?;

		let mut pixels = Vec::with_capacity((unpadded * h) as usize);
		{
			let data = slice.get_mapped_range();
			for row in data.chunks(padded as usize) {
				pixels.extend_from_slice(&row[..unpadded as usize]);
			}
		}
		buffer.unmap();

		if matches!(format, TextureFormat::Bgra8Unorm | TextureFormat::Bgra8UnormSrgb) {
			for pixel in pixels.chunks_exact_mut(4) {
				pixel.swap(0, 2);
			}
		}

		RgbaImage::from_raw(w, h, pixels).context("Readback has the wrong size")
	}

	fn pipeline(&mut self, shader: &Sarc<Shader>, format: TextureFormat) -> Result<Sarc<BlitPipeline>> {
		let key = (shader.clone(), format);
		if let Some(pipeline) = self.pipelines.get(&key) {
			return Ok(pipeline.clone());
		}

		debug!("Building pipeline for shader '{}' ({:?})", shader.name, format);
		let pipeline = Sarc::new(BlitPipeline::new(&self.gpu.device, shader, format)?);
		self.pipelines.insert(key, pipeline.clone());
		Ok(pipeline)
	}

	fn properties_bind_group(
		&self,
		pipeline: &BlitPipeline,
		shader: &Shader,
		material: Option<&BlitMaterial<'_, Tex>>,
	) -> BindGroup {
		let uniform_data = match material {
			Some(material) => material.sheet.uniform_data(),
			None => vec![0.0; shader.uniform_len()],
		};
		let uniform_buffer = self.gpu.device.create_buffer_init(&BufferInitDescriptor {
			label: Some(&format!("{} Properties Buffer", shader.name)),
			contents: bytemuck::cast_slice(&uniform_data),
			usage: BufferUsages::UNIFORM,
		});

		let mut entries = vec![BindGroupEntry {
			binding: 0,
			resource: uniform_buffer.as_entire_binding(),
		}];

		for (i, property) in shader.textures().enumerate() {
			let bound = material.and_then(|m| m.sheet.texture(&property.name));
			if bound.is_none() {
				trace!("Binding fallback texture to '{}' of '{}'", property.name, shader.name);
			}
			let texture = bound.map_or(&self.fallback_texture, |t| &**t);

			entries.push(BindGroupEntry {
				binding: 1 + 2 * i as u32,
				resource: BindingResource::TextureView(&texture.view),
			});
			entries.push(BindGroupEntry {
				binding: 2 + 2 * i as u32,
				resource: BindingResource::Sampler(texture.sampler.as_ref().unwrap_or(&self.fallback_sampler)),
			});
		}

		self.gpu.device.create_bind_group(&BindGroupDescriptor {
			label: Some(&format!("{} Properties Bind Group", shader.name)),
			layout: &pipeline.properties_layout,
			entries: &entries,
		})
	}
}

impl RenderDevice for WgpuDevice {
	type Texture = Tex;

	fn create_texture(&mut self, desc: &TexDescriptor) -> Result<Sarc<Self::Texture>> {
		let device = &self.gpu.device;
		device.push_error_scope(ErrorFilter::OutOfMemory);
		device.push_error_scope(ErrorFilter::Validation);

		let texture = Tex::create(&self.gpu, desc);

		let validation = pollster::block_on(device.pop_error_scope());
		let out_of_memory = pollster::block_on(device.pop_error_scope());
		if let Some(err) = validation.or(out_of_memory) {
			bail!("Couldn't allocate texture '{}' ({}): {}", desc.label, desc.size, err);
		}

		trace!("Allocated texture '{}' ({})", desc.label, desc.size);
		Ok(Sarc::new(texture))
	}

	fn write_texture(&mut self, texture: &Self::Texture, image: &RgbaImage) -> Result<()> {
		if ScreenSize::from(image.dimensions()) != texture.size() {
			bail!(
				"Can't write a {}x{} image to texture '{}' ({})",
				image.width(),
				image.height(),
				texture.label,
				texture.size()
			);
		}

		// Uploads go through the queue directly, so earlier draws have to be sent first
		self.submit();
		texture.upload_image(&self.gpu, image);
		Ok(())
	}

	fn blit_fullscreen_triangle(
		&mut self,
		source: &Sarc<Self::Texture>,
		destination: &Sarc<Self::Texture>,
		material: Option<BlitMaterial<'_, Self::Texture>>,
	) -> Result<()> {
		if Sarc::ptr_eq(source, destination) {
			bail!(Error::SameTexture);
		}

		let shader = match &material {
			Some(material) if material.pass != 0 => {
				bail!("Shader '{}' has no pass {}", material.sheet.shader().name, material.pass)
			}
			Some(material) => material.sheet.shader().clone(),
			None => self.copy_shader.clone(),
		};

		let pipeline = self.pipeline(&shader, destination.format())?;

		let source_bind_group = self.gpu.device.create_bind_group(&BindGroupDescriptor {
			label: Some(&format!("{} Source Bind Group", source.label)),
			layout: &pipeline.source_layout,
			entries: &[
				BindGroupEntry {
					binding: 0,
					resource: BindingResource::TextureView(&source.view),
				},
				BindGroupEntry {
					binding: 1,
					resource: BindingResource::Sampler(source.sampler.as_ref().unwrap_or(&self.fallback_sampler)),
				},
			],
		});
		let properties_bind_group = self.properties_bind_group(&pipeline, &shader, material.as_ref());

		let encoder = self.encoder.get_or_insert_with(|| {
			self.gpu.device.create_command_encoder(&CommandEncoderDescriptor {
				label: Some("Post-processing Encoder"),
			})
		});

		let mut render_pass = encoder.begin_render_pass(&RenderPassDescriptor {
			label: Some(&format!("{} Render Pass", shader.name)),
			color_attachments: &[Some(RenderPassColorAttachment {
				view: &destination.view,
				resolve_target: None,
				ops: Operations {
					load: LoadOp::Clear(Color::BLACK),
					store: StoreOp::Store,
				},
			})],
			depth_stencil_attachment: None,
			timestamp_writes: None,
			occlusion_query_set: None,
		});

		render_pass.set_pipeline(&pipeline.pipeline);
		render_pass.set_bind_group(0, &source_bind_group, &[]);
		render_pass.set_bind_group(1, &properties_bind_group, &[]);
		render_pass.draw(0..3, 0..1);

		Ok(())
	}

	fn texture_size(&self, texture: &Self::Texture) -> ScreenSize {
		texture.size()
	}

	fn texture_format(&self, texture: &Self::Texture) -> TextureFormat {
		texture.format()
	}
}

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/
