use std::fmt::Debug;

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

pub type FloatParameter = Parameter<f32>;
pub type IntParameter = Parameter<i32>;

/// A tunable value that always stays within `[min, max]`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Parameter<T> {
	value: T,
	min: T,
	max: T,
}

impl<T> Parameter<T>
where
	T: PartialOrd + Copy + Debug,
{
	pub fn new(value: T, min: T, max: T) -> Self {
		assert!(min <= max, "Invalid parameter range {:?}..={:?}", min, max);

		Self {
			value: clamp(value, min, max),
			min,
			max,
		}
	}

	pub fn value(&self) -> T {
		self.value
	}

	/// Sets the value, clamped to the range, and returns what was stored.
	pub fn set(&mut self, value: T) -> T {
		self.value = clamp(value, self.min, self.max);
		self.value
	}

	pub fn min(&self) -> T {
		self.min
	}

	pub fn max(&self) -> T {
		self.max
	}
}

/// Unordered values (NaN) end up at `min`.
fn clamp<T: PartialOrd>(value: T, min: T, max: T) -> T {
	if value > max {
		max
	} else if value >= min {
		value
	} else {
		min
	}
}
