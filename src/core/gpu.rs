use anyhow::{Context, Result};
use bevy_ecs::system::Resource;
use log::info;
use wgpu::{
	Adapter, Backends, Device, DeviceDescriptor, Features, Instance, InstanceDescriptor, InstanceFlags, Limits,
	PowerPreference, Queue, RequestAdapterOptions,
};

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

#[derive(Resource)]
pub struct Gpu {
	pub instance: Instance,
	pub adapter: Adapter,
	pub device: Device,
	pub queue: Queue,
}

impl Gpu {
	/// A device that never presents anything, everything gets rendered offscreen.
	pub fn new_headless() -> Result<Self> {
		pollster::block_on(Self::new())
	}

	async fn new() -> Result<Self> {
		#[cfg(debug_assertions)]
		// Not running in --release mode, activate validation and debug info for wgpu
		let instance = Instance::new(InstanceDescriptor {
			backends: Backends::PRIMARY,
			flags: InstanceFlags::VALIDATION | InstanceFlags::DEBUG,
			..Default::default()
		});

		#[cfg(not(debug_assertions))]
		let instance = Instance::new(InstanceDescriptor {
			backends: Backends::PRIMARY,
			..Default::default()
		});

		let adapter = instance
			.request_adapter(&RequestAdapterOptions {
				power_preference: PowerPreference::HighPerformance,
				compatible_surface: None,
				force_fallback_adapter: false,
			})
			.await
			.context("Couldn't request a compatible adapter")?;

		info!("Using adapter {:?}", adapter.get_info());

		let (device, queue) = adapter
			.request_device(
				&(DeviceDescriptor {
					required_features: Features::empty(),
					required_limits: Limits::downlevel_defaults().using_resolution(adapter.limits()),
					label: Some("Post-processing device"),
				}),
				None,
			)
			.await
			.context("Couldn't request device")?;

		Ok(Self {
			instance,
			adapter,
			device,
			queue,
		})
	}
}
