use std::{fs, path::PathBuf};

use anyhow::{bail, Context, Result};
use bevy_ecs::{
	schedule::IntoSystemConfigs,
	system::{IntoSystem, Res, ResMut, Resource},
	world::World,
};
use image::{Rgba, RgbaImage};
use log::info;
use rand::{rngs::StdRng, SeedableRng};

use crate::{
	core::{
		config::DemoConfig,
		gameloop::{self, report, PostRender, Render, Time},
		gpu::Gpu,
		size::ScreenSize,
	},
	effects::glitch_digital_stripe::GlitchDigitalStripeRenderer,
	libs::{
		shader::ShaderLibrary,
		smart_arc::Sarc,
		texture::{Tex, TexDescriptor},
	},
	post::{stack::PostProcessStack, wgpu_device::WgpuDevice, RenderDevice},
};

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

#[derive(Resource)]
pub struct Stack(pub PostProcessStack<WgpuDevice>);

#[derive(Resource)]
pub struct Frames {
	pub size: ScreenSize,
	pub source: Sarc<Tex>,
	pub destination: Sarc<Tex>,
}

#[derive(Resource)]
pub struct DemoRng(pub StdRng);

#[derive(Resource, Debug, Clone)]
pub struct Exporter {
	pub output: PathBuf,
	pub every: u64,
}

impl Exporter {
	pub fn is_due(&self, frame: u64) -> bool {
		self.every != 0 && frame % self.every == 0
	}

	pub fn frame_path(&self, frame: u64) -> PathBuf {
		self.output.join(format!("frame_{:05}.png", frame))
	}
}

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

/// Diagonal color bands scrolling sideways over a grid, so that displaced
/// stripes are easy to spot.
pub fn test_pattern(size: ScreenSize, frame: u64) -> RgbaImage {
	let offset = (frame * 4) as u32;

	RgbaImage::from_fn(size.w, size.h, |x, y| {
		let band = ((x + y + offset) / 32) % 6;
		let [r, g, b] = match band {
			0 => [230, 60, 60],
			1 => [230, 170, 50],
			2 => [90, 200, 80],
			3 => [60, 170, 220],
			4 => [110, 80, 220],
			_ => [220, 80, 180],
		};

		if x % 64 == 0 || y % 64 == 0 {
			Rgba([255, 255, 255, 255])
		} else {
			Rgba([r, g, b, 255])
		}
	})
}

fn draw_test_pattern(time: Res<Time>, frames: Res<Frames>, mut device: ResMut<WgpuDevice>) -> Result<()> {
	let pattern = test_pattern(frames.size, time.counter_frame);
	device.write_texture(&frames.source, &pattern)
}

fn render_effects(
	time: Res<Time>,
	frames: Res<Frames>,
	mut device: ResMut<WgpuDevice>,
	mut stack: ResMut<Stack>,
	mut rng: ResMut<DemoRng>,
) -> Result<()> {
	stack.0.render(
		&mut device,
		&frames.source,
		&frames.destination,
		time.frame_info(frames.size),
		&mut rng.0,
	)?;
	device.submit();
	Ok(())
}

fn export_frame(
	time: Res<Time>,
	frames: Res<Frames>,
	mut device: ResMut<WgpuDevice>,
	exporter: Res<Exporter>,
) -> Result<()> {
	let frame = time.counter_frame;
	if !exporter.is_due(frame) {
		return Ok(());
	}

	let image = device.read_texture(&frames.destination)?;
	let path = exporter.frame_path(frame);
	image
		.save(&path)
		.with_context(|| format!("Couldn't write {}", path.display()))?;

	info!("Exported frame {} to {}", frame, path.display());
	Ok(())
}

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

/// Renders `config.frames` frames of the test pattern through the glitch,
/// offscreen, exporting some of them as PNG files.
pub fn run(config: DemoConfig) -> Result<()> {
	if config.resolution.is_empty() {
		bail!("Invalid resolution {}", config.resolution);
	}

	let shaders = ShaderLibrary::embedded()?;
	info!("Loaded {} shaders", shaders.len());

	let mut device = WgpuDevice::new(Gpu::new_headless()?, &shaders)?;
	let frames = Frames {
		size: config.resolution,
		source: device.create_texture(&TexDescriptor::new("Source frame", config.resolution))?,
		destination: device.create_texture(&TexDescriptor::new("Destination frame", config.resolution))?,
	};

	let mut stack = PostProcessStack::<WgpuDevice>::empty().with(GlitchDigitalStripeRenderer::new(config.glitch));
	stack.init(&shaders)?;

	let exporter = Exporter {
		output: config.output.clone(),
		every: config.export_every,
	};
	if exporter.every != 0 {
		fs::create_dir_all(&exporter.output)
			.with_context(|| format!("Couldn't create output directory {}", exporter.output.display()))?;
	}

	let mut world = World::new();
	gameloop::init_schedules(&mut world);

	world.insert_resource(device);
	world.insert_resource(frames);
	world.insert_resource(Stack(stack));
	world.insert_resource(DemoRng(StdRng::seed_from_u64(config.seed)));
	world.insert_resource(exporter);

	world.schedule_scope(Render, |_, schedule| {
		schedule.add_systems((draw_test_pattern.pipe(report), render_effects.pipe(report)).chain());
	});
	world.schedule_scope(PostRender, |_, schedule| {
		schedule.add_systems(export_frame.pipe(report));
	});

	info!(
		"Rendering {} frames at {} (seed {})",
		config.frames, config.resolution, config.seed
	);
	let result = gameloop::run_frames(&mut world, config.frames);

	if let Some(mut stack) = world.remove_resource::<Stack>() {
		stack.0.release();
	}
	result?;

	let time = world.resource::<Time>();
	info!(
		"Rendered {} frames in {:.2}s ({:.1} fps)",
		time.counter_frame,
		time.current_time.as_secs_f32(),
		time.smooth_fps
	);

	Ok(())
}

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/
