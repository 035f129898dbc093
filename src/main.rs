use std::path::PathBuf;

use clap::Parser;
use digital_stripe::core::config::DemoConfig;
use log::{error, LevelFilter};

/// Renders an animated test pattern through the digital stripe glitch and
/// exports frames as PNG files.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
	/// RON file with the demo settings
	#[arg(short, long)]
	config: Option<PathBuf>,

	/// Number of frames to render
	#[arg(short, long)]
	frames: Option<u64>,

	/// Directory the exported frames go to
	#[arg(short, long)]
	output: Option<PathBuf>,

	/// Seed of the glitch randomness
	#[arg(short, long)]
	seed: Option<u64>,
}

fn main() {
	env_logger::Builder::new()
		.filter_level(LevelFilter::Warn)
		.filter_module("digital_stripe", LevelFilter::Info)
		.parse_default_env()
		.init();

	let args = Args::parse();

	let result = DemoConfig::load_or_default(args.config.as_deref()).and_then(|mut config| {
		if let Some(frames) = args.frames {
			config.frames = frames;
		}
		if let Some(output) = args.output {
			config.output = output;
		}
		if let Some(seed) = args.seed {
			config.seed = seed;
		}
		digital_stripe::run(config)
	});

	if let Err(err) = result {
		error!("{:#}", err);
		std::process::exit(1);
	}
}
