//! Post-processing effects and the pieces they share.

pub mod glitch_digital_stripe;
pub mod noise;
pub mod parameter;
