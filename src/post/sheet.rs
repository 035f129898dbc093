use hashlink::LinkedHashMap;
use log::trace;

use crate::libs::{shader::Shader, smart_arc::Sarc};

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

/// The values bound to a shader's properties for one draw.
pub struct PropertySheet<T> {
	shader: Sarc<Shader>,
	floats: LinkedHashMap<String, f32>,
	textures: LinkedHashMap<String, Sarc<T>>,
}

impl<T> PropertySheet<T> {
	pub fn new(shader: Sarc<Shader>) -> Self {
		Self {
			shader,
			floats: LinkedHashMap::new(),
			textures: LinkedHashMap::new(),
		}
	}

	pub fn shader(&self) -> &Sarc<Shader> {
		&self.shader
	}

	pub fn set_float(&mut self, name: &str, value: f32) -> &mut Self {
		if self.shader.property(name).is_none() {
			trace!("Shader '{}' has no property '{}'", self.shader.name, name);
		}
		self.floats.insert(name.to_owned(), value);
		self
	}

	pub fn set_texture(&mut self, name: &str, texture: &Sarc<T>) -> &mut Self {
		if self.shader.property(name).is_none() {
			trace!("Shader '{}' has no property '{}'", self.shader.name, name);
		}
		self.textures.insert(name.to_owned(), texture.clone());
		self
	}

	pub fn float(&self, name: &str) -> Option<f32> {
		self.floats.get(name).copied()
	}

	pub fn texture(&self, name: &str) -> Option<&Sarc<T>> {
		self.textures.get(name)
	}

	pub fn floats(&self) -> impl Iterator<Item = (&str, f32)> {
		self.floats.iter().map(|(k, v)| (k.as_str(), *v))
	}

	pub fn textures(&self) -> impl Iterator<Item = (&str, &Sarc<T>)> {
		self.textures.iter().map(|(k, v)| (k.as_str(), v))
	}

	pub fn clear(&mut self) {
		self.floats.clear();
		self.textures.clear();
	}

	/// The float properties laid out like the shader's uniform block. Properties
	/// that were never set read as zero.
	pub fn uniform_data(&self) -> Vec<f32> {
		let mut data = self
			.shader
			.floats()
			.map(|p| self.float(&p.name).unwrap_or_default())
			.collect::<Vec<_>>();
		data.resize(self.shader.uniform_len(), 0.0);
		data
	}
}

impl<T> Clone for PropertySheet<T> {
	fn clone(&self) -> Self {
		Self {
			shader: self.shader.clone(),
			floats: self.floats.clone(),
			textures: self.textures.clone(),
		}
	}
}

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

/// Hands out one reusable [`PropertySheet`] per shader.
pub struct PropertySheetFactory<T> {
	sheets: LinkedHashMap<String, PropertySheet<T>>,
}

impl<T> Default for PropertySheetFactory<T> {
	fn default() -> Self {
		Self {
			sheets: LinkedHashMap::new(),
		}
	}
}

impl<T> PropertySheetFactory<T> {
	pub fn new() -> Self {
		Self::default()
	}

	/// The sheet for `shader`, emptied of whatever the previous draw bound.
	pub fn get(&mut self, shader: &Sarc<Shader>) -> &mut PropertySheet<T> {
		let sheet = self
			.sheets
			.entry(shader.name.clone())
			.or_insert_with(|| PropertySheet::new(shader.clone()));

		// The shader was reloaded under the same name
		if !Sarc::ptr_eq(&sheet.shader, shader) {
			*sheet = PropertySheet::new(shader.clone());
		}

		sheet.clear();
		sheet
	}

	pub fn len(&self) -> usize {
		self.sheets.len()
	}

	pub fn is_empty(&self) -> bool {
		self.sheets.is_empty()
	}

	pub fn release(&mut self) {
		self.sheets.clear();
	}
}

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

#[cfg(test)]
mod tests {
	use super::*;

	fn shader() -> Sarc<Shader> {
		Sarc::new(
			Shader::from_source(
				"sheet_test",
				"#property intensity: f32\n#property speed: f32\n#property noise_tex: texture\n",
			)
			.unwrap(),
		)
	}

	#[test]
	fn uniform_data_follows_declaration_order() {
		let mut sheet = PropertySheet::<()>::new(shader());
		sheet.set_float("speed", 2.0).set_float("intensity", 0.25);

		assert_eq!(sheet.uniform_data(), vec![0.25, 2.0, 0.0, 0.0]);
	}

	#[test]
	fn unset_floats_read_as_zero() {
		let sheet = PropertySheet::<()>::new(shader());
		assert_eq!(sheet.uniform_data(), vec![0.0; 4]);
	}

	#[test]
	fn factory_reuses_and_clears_sheets() {
		let shader = shader();
		let mut factory = PropertySheetFactory::<u32>::new();
		let texture = Sarc::new(3);

		factory.get(&shader).set_texture("noise_tex", &texture).set_float("intensity", 1.0);
		let sheet = factory.get(&shader);

		assert!(sheet.texture("noise_tex").is_none());
		assert!(sheet.float("intensity").is_none());
		assert_eq!(factory.len(), 1);
	}

	#[test]
	fn factory_replaces_sheets_of_reloaded_shaders() {
		let mut factory = PropertySheetFactory::<u32>::new();
		let first = shader();
		let second = shader();

		factory.get(&first);
		assert!(Sarc::ptr_eq(factory.get(&second).shader(), &second));
		assert_eq!(factory.len(), 1);
	}
}
