use std::time::{Duration, Instant};

use anyhow::Result;
use bevy_ecs::{
	schedule::{Schedule, ScheduleLabel},
	system::{In, ResMut, Resource},
	world::World,
};
use log::{error, trace};

use crate::{core::size::ScreenSize, post::FrameInfo};

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

/// The schedule that runs once per frame, meant for producing and processing the
/// frame image
#[derive(ScheduleLabel, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Render;

/// The schedule that runs right after [`Render`], meant for consuming the
/// finished frame
#[derive(ScheduleLabel, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PostRender;

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

#[derive(Resource, Debug, Copy, Clone)]
pub struct Time {
	start_time: Instant,
	last_render_time: Instant,

	pub current_time: Duration,
	pub dt_f: Duration,

	/// Number of frames rendered so far
	pub counter_frame: u64,

	pub fps: f32,
	pub smooth_fps: f32,
}

impl Time {
	const SMOOTH_RESPONSIVENESS: f32 = 0.05;

	pub fn smoothed(&self, smoothed: f32, raw: f32) -> f32 {
		let response = Self::SMOOTH_RESPONSIVENESS;
		(1.0 - response) * smoothed + response * raw
	}

	pub fn frame_info(&self, screen_size: ScreenSize) -> FrameInfo {
		FrameInfo {
			frame_count: self.counter_frame,
			screen_size,
		}
	}

	fn advance(&mut self) {
		let now = Instant::now();

		self.dt_f = now - self.last_render_time;
		self.current_time = now - self.start_time;

		if !self.dt_f.is_zero() {
			self.fps = 1. / self.dt_f.as_secs_f32();
			self.smooth_fps = if self.counter_frame == 0 {
				self.fps
			} else {
				self.smoothed(self.smooth_fps, self.fps)
			};
		}

		self.last_render_time = now;
		self.counter_frame += 1;
	}
}

impl Default for Time {
	fn default() -> Self {
		Self {
			start_time: Instant::now(),
			last_render_time: Instant::now(),
			current_time: Default::default(),
			dt_f: Default::default(),
			counter_frame: Default::default(),
			fps: Default::default(),
			smooth_fps: Default::default(),
		}
	}
}

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

/// Errors returned by systems during the current frame. A frame with errors
/// stops the loop.
#[derive(Resource, Debug, Default)]
pub struct FrameErrors(pub Vec<anyhow::Error>);

/// Meant to be piped after systems returning a [`Result`].
pub fn report(In(result): In<Result<()>>, mut errors: ResMut<FrameErrors>) {
	if let Err(err) = result {
		error!("{:#}", err);
		errors.0.push(err);
	}
}

pub fn init_schedules(world: &mut World) {
	world.init_resource::<Time>();
	world.init_resource::<FrameErrors>();
	world.add_schedule(Schedule::new(Render));
	world.add_schedule(Schedule::new(PostRender));
}

/// Runs [`Render`] then [`PostRender`] once per frame, for `frames` frames.
pub fn run_frames(world: &mut World, frames: u64) -> Result<()> {
	for _ in 0..frames {
		let frame = world.resource::<Time>().counter_frame;
		trace!("Frame {}", frame);

		let _ = world.try_run_schedule(Render);
		let _ = world.try_run_schedule(PostRender);

		let mut errors = world.resource_mut::<FrameErrors>();
		if let Some(err) = errors.0.drain(..).next() {
			return Err(err.context(format!("Frame {} failed", frame)));
		}

		world.resource_mut::<Time>().advance();
	}

	Ok(())
}

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/
