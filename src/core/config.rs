use std::{
	fs,
	path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::{debug, warn};
use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize};

use crate::{core::size::ScreenSize, effects::glitch_digital_stripe::GlitchDigitalStripe, size};

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

/// Everything the demo needs to know before it starts rendering. Fields missing
/// from a config file keep their default value.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct DemoConfig {
	pub resolution: ScreenSize,
	/// Number of frames to render
	pub frames: u64,
	/// Write a PNG every this many frames, 0 to never export
	pub export_every: u64,
	pub seed: u64,
	pub output: PathBuf,
	pub glitch: GlitchDigitalStripe,
}

impl Default for DemoConfig {
	fn default() -> Self {
		Self {
			resolution: size!(640, 360),
			frames: 240,
			export_every: 30,
			seed: 0x5742_1b3d,
			output: PathBuf::from("frames"),
			glitch: GlitchDigitalStripe::default(),
		}
	}
}

impl DemoConfig {
	pub fn load(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let text = fs::read_to_string(path).with_context(|| format!("Couldn't read config {}", path.display()))?;
		let config = ron::from_str::<Self>(&text).with_context(|| format!("Invalid config {}", path.display()))?;

		debug!("Loaded config {}: {:?}", path.display(), config);
		Ok(config)
	}

	/// Loads the file if there is one, otherwise falls back to the defaults.
	pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
		match path {
			Some(path) if path.exists() => Self::load(path),
			Some(path) => {
				warn!("Config {} doesn't exist, using defaults", path.display());
				Ok(Self::default())
			}
			None => Ok(Self::default()),
		}
	}

	pub fn to_ron(&self) -> Result<String> {
		Ok(ron::ser::to_string_pretty(self, PrettyConfig::default())?)
	}
}

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

#[cfg(test)]
mod tests {
	use std::io::Write;

	use super::*;
	use crate::effects::glitch_digital_stripe::ReallocationPolicy;

	#[test]
	fn partial_file_keeps_defaults() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		write!(
			file,
			"(frames: 12, glitch: (intensity: 0.9, stripe_width: 100, reallocation: OnChange))"
		)
		.unwrap();

		let config = DemoConfig::load(file.path()).unwrap();

		assert_eq!(config.frames, 12);
		assert_eq!(config.resolution, size!(640, 360));
		assert_eq!(config.glitch.intensity(), 0.9);
		assert_eq!(config.glitch.stripe_width(), 64);
		assert_eq!(config.glitch.reallocation, ReallocationPolicy::OnChange);
	}

	#[test]
	fn saved_config_loads_back() {
		let mut config = DemoConfig {
			resolution: size!(128, 72),
			export_every: 0,
			..Default::default()
		};
		config.glitch.set_frequency(7);

		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("demo.ron");
		fs::write(&path, config.to_ron().unwrap()).unwrap();

		assert_eq!(DemoConfig::load(&path).unwrap(), config);
	}

	#[test]
	fn missing_file_falls_back_to_defaults() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("nothing.ron");

		assert_eq!(DemoConfig::load_or_default(Some(&path)).unwrap(), DemoConfig::default());
		assert!(DemoConfig::load(&path).is_err());
	}

	#[test]
	fn malformed_file_is_an_error() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		write!(file, "(frames: \"many\")").unwrap();

		let err = DemoConfig::load(file.path()).unwrap_err();
		assert!(format!("{err:#}").contains("Invalid config"));
	}
}
