use derive_more::Display;
use serde::{Deserialize, Serialize};
use wgpu::Extent3d;

/// Size of a screen or texture, in pixels.
#[repr(C)]
#[derive(
	Display, Serialize, Deserialize, bytemuck::Pod, bytemuck::Zeroable, Copy, Clone, Debug, Default, PartialEq, Eq, Hash,
)]
#[display(fmt = "{}x{}", w, h)]
pub struct ScreenSize {
	pub w: u32,
	pub h: u32,
}

#[macro_export]
macro_rules! size {
	($w:expr, $h:expr) => {
		$crate::core::size::ScreenSize { w: $w, h: $h }
	};
}

impl ScreenSize {
	pub fn area(&self) -> u64 {
		self.w as u64 * self.h as u64
	}

	pub fn is_empty(&self) -> bool {
		self.w == 0 || self.h == 0
	}
}

impl From<ScreenSize> for Extent3d {
	fn from(size: ScreenSize) -> Self {
		Extent3d {
			width: size.w,
			height: size.h,
			depth_or_array_layers: 1,
		}
	}
}

impl From<Extent3d> for ScreenSize {
	fn from(extent: Extent3d) -> Self {
		Self {
			w: extent.width,
			h: extent.height,
		}
	}
}

impl From<(u32, u32)> for ScreenSize {
	fn from((w, h): (u32, u32)) -> Self {
		Self { w, h }
	}
}
