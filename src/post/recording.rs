use std::sync::Mutex;

use anyhow::{bail, Result};
use image::RgbaImage;
use wgpu::TextureFormat;

use super::{BlitMaterial, RenderDevice};
use crate::{
	core::{error::Error, size::ScreenSize},
	libs::{smart_arc::Sarc, texture::TexDescriptor},
};

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

#[derive(Debug)]
pub struct RecordedTexture {
	pub id: usize,
	pub desc: TexDescriptor,
	pub content: Mutex<Option<RgbaImage>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecordedMaterial {
	pub shader: String,
	pub pass: u32,
	pub floats: Vec<(String, f32)>,
	pub textures: Vec<(String, usize)>,
}

impl RecordedMaterial {
	pub fn float(&self, name: &str) -> Option<f32> {
		self.floats.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
	}

	pub fn texture(&self, name: &str) -> Option<usize> {
		self.textures.iter().find(|(n, _)| n == name).map(|(_, id)| *id)
	}
}

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
	Create { id: usize, desc: TexDescriptor },
	Write { id: usize },
	Blit {
		source: usize,
		destination: usize,
		material: Option<RecordedMaterial>,
	},
}

/// A [`RenderDevice`] that only writes down what it was asked to do.
#[derive(Debug, Default)]
pub struct RecordingDevice {
	next_id: usize,
	pub commands: Vec<Command>,
	pub fail_allocations: bool,
}

impl RecordingDevice {
	pub fn new() -> Self {
		Self::default()
	}

	/// A texture that doesn't show up in the command log, like a host's frame
	/// buffers.
	pub fn external_texture(&mut self, label: &str, size: ScreenSize) -> Sarc<RecordedTexture> {
		self.next_id += 1;
		Sarc::new(RecordedTexture {
			id: self.next_id,
			desc: TexDescriptor::new(label, size),
			content: Mutex::new(None),
		})
	}

	pub fn take(&mut self) -> Vec<Command> {
		std::mem::take(&mut self.commands)
	}

	pub fn blits(&self) -> impl Iterator<Item = (usize, usize, Option<&RecordedMaterial>)> + '_ {
		self.commands.iter().filter_map(|c| match c {
			Command::Blit {
				source,
				destination,
				material,
			} => Some((*source, *destination, material.as_ref())),
			_ => None,
		})
	}

	pub fn creations(&self) -> impl Iterator<Item = (usize, &TexDescriptor)> + '_ {
		self.commands.iter().filter_map(|c| match c {
			Command::Create { id, desc } => Some((*id, desc)),
			_ => None,
		})
	}

	pub fn writes(&self) -> impl Iterator<Item = usize> + '_ {
		self.commands.iter().filter_map(|c| match c {
			Command::Write { id } => Some(*id),
			_ => None,
		})
	}
}

impl RenderDevice for RecordingDevice {
	type Texture = RecordedTexture;

	fn create_texture(&mut self, desc: &TexDescriptor) -> Result<Sarc<Self::Texture>> {
		if self.fail_allocations {
			bail!("Out of memory allocating '{}'", desc.label);
		}

		self.next_id += 1;
		self.commands.push(Command::Create {
			id: self.next_id,
			desc: desc.clone(),
		});

		Ok(Sarc::new(RecordedTexture {
			id: self.next_id,
			desc: desc.clone(),
			content: Mutex::new(None),
		}))
	}

	fn write_texture(&mut self, texture: &Self::Texture, image: &RgbaImage) -> Result<()> {
		assert_eq!(texture.desc.size, ScreenSize::from(image.dimensions()));

		self.commands.push(Command::Write { id: texture.id });
		if let Ok(mut content) = texture.content.lock() {
			*content = Some(image.clone());
		}
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

		let material = material.map(|m| RecordedMaterial {
			shader: m.sheet.shader().name.clone(),
			pass: m.pass,
			floats: m.sheet.floats().map(|(n, v)| (n.to_owned(), v)).collect(),
			textures: m.sheet.textures().map(|(n, t)| (n.to_owned(), t.id)).collect(),
		});

		self.commands.push(Command::Blit {
			source: source.id,
			destination: destination.id,
			material,
		});
		Ok(())
	}

	fn texture_size(&self, texture: &Self::Texture) -> ScreenSize {
		texture.desc.size
	}

	fn texture_format(&self, texture: &Self::Texture) -> TextureFormat {
		texture.desc.format
	}
}
