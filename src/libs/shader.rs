use std::{collections::HashSet, fmt::Write as _, ops::Range};

use anyhow::{anyhow, bail, Context, Result};
use hashlink::LinkedHashMap;
use log::{debug, trace};
use regex::Regex;

use super::{embed::Assets, smart_arc::Sarc};
use crate::core::error::Error;

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PropertyKind {
	Float,
	Texture,
}

impl PropertyKind {
	fn parse(kind: &str) -> Option<Self> {
		match kind {
			"f32" | "float" => Some(PropertyKind::Float),
			"texture" => Some(PropertyKind::Texture),
			_ => None,
		}
	}
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ShaderProperty {
	pub name: String,
	pub kind: PropertyKind,
}

/// A fully preprocessed WGSL program along with the properties it declares.
///
/// Shader API:\
/// `@vertex fn vs_main(@builtin(vertex_index) index: u32) -> FullscreenVertex`\
/// `@fragment fn fs_main(in: FullscreenVertex) -> @location(0) vec4f`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Shader {
	pub name: String,
	pub source: String,
	pub properties: Vec<ShaderProperty>,
}

impl Shader {
	pub const SOURCE_TEXTURE: &'static str = "source_texture";
	pub const SOURCE_SAMPLER: &'static str = "source_sampler";

	/// Parses a standalone shader source. `#include` directives are not available.
	pub fn from_source(name: impl Into<String>, source: &str) -> Result<Self> {
		let name = name.into();
		let mut preprocessor = Preprocessor::new(None);
		let source = preprocessor.expand(&name, source.to_owned())?;
		Self::from_expanded(name, source)
	}

	fn from_expanded(name: String, mut source: String) -> Result<Self> {
		let properties = take_property_directives(&mut source).map_err(|reason| Error::InvalidShader {
			name: name.clone(),
			reason,
		})?;

		Ok(Self {
			name,
			source,
			properties,
		})
	}

	pub fn property(&self, name: &str) -> Option<&ShaderProperty> {
		self.properties.iter().find(|p| p.name == name)
	}

	pub fn floats(&self) -> impl Iterator<Item = &ShaderProperty> {
		self.properties.iter().filter(|p| p.kind == PropertyKind::Float)
	}

	pub fn textures(&self) -> impl Iterator<Item = &ShaderProperty> {
		self.properties.iter().filter(|p| p.kind == PropertyKind::Texture)
	}

	/// Number of f32 slots in the property uniform block, padded to whole vec4s.
	pub fn uniform_len(&self) -> usize {
		let floats = self.floats().count().max(1);
		floats.div_ceil(4) * 4
	}

	/// The WGSL declarations for every binding the shader can use, to be put in
	/// front of the shader source.
	///
	/// group 0: source texture and sampler\
	/// group 1: property uniform block, then one texture/sampler pair per texture
	/// property
	pub fn binding_source_code(&self) -> String {
		let mut code = String::new();

		let _ = writeln!(
			code,
			"@group(0) @binding(0) var {}: texture_2d<f32>;",
			Self::SOURCE_TEXTURE
		);
		let _ = writeln!(code, "@group(0) @binding(1) var {}: sampler;", Self::SOURCE_SAMPLER);

		let mut fields = self.floats().map(|p| p.name.clone()).collect::<Vec<_>>();
		let declared = fields.len();
		for i in declared..self.uniform_len() {
			fields.push(format!("padding_{}", i - declared));
		}

		let _ = writeln!(code, "struct Properties {{");
		for field in fields {
			let _ = writeln!(code, "\t{}: f32,", field);
		}
		let _ = writeln!(code, "}};");
		let _ = writeln!(code, "@group(1) @binding(0) var<uniform> properties: Properties;");

		for (i, texture) in self.textures().enumerate() {
			let binding = 1 + 2 * i as u32;
			let _ = writeln!(
				code,
				"@group(1) @binding({}) var {}: texture_2d<f32>;",
				binding, texture.name
			);
			let _ = writeln!(
				code,
				"@group(1) @binding({}) var {}_sampler: sampler;",
				binding + 1,
				texture.name
			);
		}

		code
	}

	/// Source that can be handed to the GPU as-is.
	pub fn full_source(&self) -> String {
		format!("{}\n{}", self.binding_source_code(), self.source)
	}
}

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

/// All the shader programs available to effects, looked up by name.
///
/// The name of an embedded shader is its path without the `.wgsl` extension,
/// e.g. `glitch/digital_stripe`.
#[derive(Debug, Default)]
pub struct ShaderLibrary {
	shaders: LinkedHashMap<String, Sarc<Shader>>,
}

impl ShaderLibrary {
	pub fn new() -> Self {
		Self::default()
	}

	/// Loads every shader compiled into the binary.
	pub fn embedded() -> Result<Self> {
		Self::from_assets(&crate::ShaderAssets)
	}

	pub fn from_assets(assets: &dyn Assets) -> Result<Self> {
		let mut library = Self::new();

		for path in assets.iter() {
			let Some(name) = path.strip_suffix(".wgsl") else {
				continue;
			};

			let source = read_asset(assets, &path)?;
			let mut preprocessor = Preprocessor::new(Some(assets));
			let source = preprocessor
				.expand(&path, source)
				.with_context(|| format!("Couldn't preprocess shader '{}'", path))?;

			let shader = Shader::from_expanded(name.to_owned(), source)?;
			debug!(
				"Loaded shader '{}' with {} properties",
				shader.name,
				shader.properties.len()
			);
			library.insert(shader);
		}

		Ok(library)
	}

	pub fn insert(&mut self, shader: Shader) -> Sarc<Shader> {
		let shader = Sarc::new(shader);
		self.shaders.insert(shader.name.clone(), shader.clone());
		shader
	}

	pub fn find(&self, name: &str) -> Option<Sarc<Shader>> {
		self.shaders.get(name).cloned()
	}

	/// Like [`ShaderLibrary::find`], but a missing shader is an error.
	pub fn require(&self, name: &str) -> Result<Sarc<Shader>> {
		self.find(name)
			.ok_or_else(|| Error::ShaderNotFound(name.to_owned()).into())
	}

	pub fn names(&self) -> impl Iterator<Item = &str> {
		self.shaders.keys().map(String::as_str)
	}

	pub fn len(&self) -> usize {
		self.shaders.len()
	}

	pub fn is_empty(&self) -> bool {
		self.shaders.is_empty()
	}
}

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

fn read_asset(assets: &dyn Assets, path: &str) -> Result<String> {
	let data = assets.get(path).ok_or(anyhow!("File not found: {}", path))?.data;
	String::from_utf8(data.to_vec()).or(Err(anyhow!("Invalid UTF8 file: {}", path)))
}

struct Preprocessor<'a> {
	assets: Option<&'a dyn Assets>,
	included: HashSet<String>,
}

impl<'a> Preprocessor<'a> {
	fn new(assets: Option<&'a dyn Assets>) -> Self {
		Self {
			assets,
			included: HashSet::new(),
		}
	}

	/// Replaces every `#include "path/to/shader.wgsl"` in the source with the
	/// contents of that file. Each file is included at most once.
	fn expand(&mut self, path: &str, mut source: String) -> Result<String> {
		self.included.insert(path.to_owned());

		let re = Regex::new(r#"(?m)^#include "(.+?)"[ \t]*$"#)?;

		let includes = re
			.captures_iter(&source)
			.filter_map(|caps| Some((caps.get(0)?.range(), caps.get(1)?.as_str().to_owned())))
			.collect::<Vec<(Range<usize>, String)>>();

		// Go back to front so the earlier ranges stay valid
		for (range, include) in includes.into_iter().rev() {
			let include_path = resolve_path(path, &include);

			let included_source = if self.included.contains(&include_path) {
				trace!("Skipping repeated include '{}' in '{}'", include_path, path);
				String::new()
			} else {
				let assets = self
					.assets
					.ok_or(anyhow!("Cannot include '{}' from a standalone shader", include_path))?;
				let raw = read_asset(assets, &include_path)?;
				self.expand(&include_path, raw)?
			};

			source.replace_range(range, &included_source);
		}

		Ok(source)
	}
}

/// Resolves `include` relative to the directory of `from`. A leading `/` makes
/// it relative to the asset root instead.
fn resolve_path(from: &str, include: &str) -> String {
	let mut parts = Vec::new();

	if !include.starts_with('/') {
		if let Some((parent, _)) = from.rsplit_once('/') {
			parts.extend(parent.split('/'));
		}
	}

	for part in include.split('/') {
		match part {
			"" | "." => {}
			".." => {
				parts.pop();
			}
			part => parts.push(part),
		}
	}

	parts.join("/")
}

/// Strips every `#property name: kind` line from the source and returns the
/// declared properties in order.
fn take_property_directives(source: &mut String) -> std::result::Result<Vec<ShaderProperty>, String> {
	let re = Regex::new(r#"(?m)^#property[ \t]+(\w+)[ \t]*:[ \t]*(\w+)[ \t]*$"#).map_err(|e| e.to_string())?;

	let mut properties = Vec::<ShaderProperty>::new();
	let mut ranges = Vec::<Range<usize>>::new();

	for caps in re.captures_iter(source) {
		let (Some(all), Some(name), Some(kind)) = (caps.get(0), caps.get(1), caps.get(2)) else {
			continue;
		};

		let kind = PropertyKind::parse(kind.as_str())
			.ok_or_else(|| format!("Unknown kind '{}' for property '{}'", kind.as_str(), name.as_str()))?;

		if properties.iter().any(|p| p.name == name.as_str()) {
			return Err(format!("Property '{}' is declared twice", name.as_str()));
		}

		properties.push(ShaderProperty {
			name: name.as_str().to_owned(),
			kind,
		});
		ranges.push(all.range());
	}

	for range in ranges.into_iter().rev() {
		source.replace_range(range, "");
	}

	Ok(properties)
}

pub(crate) fn validate_entry_points(shader: &Shader) -> Result<()> {
	for entry_point in ["fn vs_main", "fn fs_main"] {
		if !shader.source.contains(entry_point) {
			bail!(Error::InvalidShader {
				name: shader.name.clone(),
				reason: format!("missing entry point `{}`", entry_point),
			});
		}
	}
	Ok(())
}

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn property_directives_are_collected_and_stripped() {
		let shader = Shader::from_source(
			"test",
			"#property intensity: f32\n#property noise_tex: texture\nfn fs_main() {}\n",
		)
		.unwrap();

		assert_eq!(shader.properties.len(), 2);
		assert_eq!(shader.property("intensity").unwrap().kind, PropertyKind::Float);
		assert_eq!(shader.property("noise_tex").unwrap().kind, PropertyKind::Texture);
		assert!(!shader.source.contains("#property"));
		assert!(shader.source.contains("fn fs_main"));
	}

	#[test]
	fn unknown_property_kind_is_rejected() {
		let err = Shader::from_source("broken", "#property thing: mat4\n").unwrap_err();

		assert!(matches!(
			err.downcast_ref::<Error>(),
			Some(Error::InvalidShader { name, .. }) if name == "broken"
		));
	}

	#[test]
	fn duplicate_property_is_rejected() {
		assert!(Shader::from_source("dup", "#property a: f32\n#property a: texture\n").is_err());
	}

	#[test]
	fn uniform_block_is_padded_to_vec4() {
		let none = Shader::from_source("none", "").unwrap();
		let five = Shader::from_source(
			"five",
			"#property a: f32\n#property b: f32\n#property c: f32\n#property d: f32\n#property e: f32\n",
		)
		.unwrap();

		assert_eq!(none.uniform_len(), 4);
		assert_eq!(five.uniform_len(), 8);
	}

	#[test]
	fn bindings_follow_declaration_order() {
		let shader = Shader::from_source(
			"bindings",
			"#property noise_tex: texture\n#property intensity: f32\n#property trash_tex: texture\n",
		)
		.unwrap();
		let code = shader.binding_source_code();

		assert!(code.contains("@group(0) @binding(0) var source_texture: texture_2d<f32>;"));
		assert!(code.contains("\tintensity: f32,"));
		assert!(code.contains("\tpadding_2: f32,"));
		assert!(code.contains("@group(1) @binding(1) var noise_tex: texture_2d<f32>;"));
		assert!(code.contains("@group(1) @binding(2) var noise_tex_sampler: sampler;"));
		assert!(code.contains("@group(1) @binding(3) var trash_tex: texture_2d<f32>;"));
		assert!(code.contains("@group(1) @binding(4) var trash_tex_sampler: sampler;"));
	}

	#[test]
	fn include_paths_resolve_relative_to_the_includer() {
		assert_eq!(resolve_path("glitch/digital_stripe.wgsl", "../fullscreen.wgsl"), "fullscreen.wgsl");
		assert_eq!(resolve_path("glitch/digital_stripe.wgsl", "common.wgsl"), "glitch/common.wgsl");
		assert_eq!(resolve_path("a/b/c.wgsl", "/fullscreen.wgsl"), "fullscreen.wgsl");
		assert_eq!(resolve_path("top.wgsl", "./x/y.wgsl"), "x/y.wgsl");
	}

	#[test]
	fn standalone_shaders_cannot_include() {
		assert!(Shader::from_source("inc", "#include \"fullscreen.wgsl\"\n").is_err());
	}

	#[test]
	fn embedded_library_has_every_program() {
		let library = ShaderLibrary::embedded().unwrap();

		for name in ["blit/copy", "glitch/digital_stripe"] {
			let shader = library.require(name).unwrap();
			assert!(!shader.source.contains("#include"));
			validate_entry_points(&shader).unwrap();
		}

		let glitch = library.require("glitch/digital_stripe").unwrap();
		assert!(glitch.property("intensity").is_some());
		assert!(glitch.property("noise_tex").is_some());
		assert!(glitch.property("trash_tex").is_some());
	}

	#[test]
	fn missing_shader_is_a_typed_error() {
		let library = ShaderLibrary::new();
		let err = library.require("nope").unwrap_err();

		assert_eq!(err.downcast_ref::<Error>(), Some(&Error::ShaderNotFound("nope".to_owned())));
	}
}
