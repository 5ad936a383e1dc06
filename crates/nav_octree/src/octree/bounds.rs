//! Axis-aligned bounding box with double precision for world-space navigation bounds.

use glam::DVec3;

/// Size below which a box counts as a point on every axis.
pub const NEARLY_ZERO_SIZE: f64 = 1.0e-4;

/// Double-precision axis-aligned bounding box.
///
/// Unlike most boxes in the crate this type may hold invalid values
/// (NaN, inverted corners). Callers validate at the boundary with
/// [`NavBounds::is_valid`] / [`NavBounds::is_degenerate`] and reject bad input
/// instead of asserting.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NavBounds {
	/// Minimum corner (inclusive).
	pub min: DVec3,
	/// Maximum corner (inclusive).
	pub max: DVec3,
}

impl NavBounds {
	/// The empty box. Identity element for [`NavBounds::union`], never valid.
	pub const EMPTY: Self = Self {
		min: DVec3::INFINITY,
		max: DVec3::NEG_INFINITY,
	};

	/// Create a box from min and max corners. No validation is performed.
	pub const fn new(min: DVec3, max: DVec3) -> Self {
		Self { min, max }
	}

	/// Create a new box from center and half-extents.
	pub fn from_center_half_extents(center: DVec3, half_extents: DVec3) -> Self {
		Self {
			min: center - half_extents,
			max: center + half_extents,
		}
	}

	/// Smallest box containing every point, or `None` for an empty iterator.
	pub fn from_points(points: impl IntoIterator<Item = DVec3>) -> Option<Self> {
		let mut iter = points.into_iter();
		let first = iter.next()?;
		let mut bounds = Self::new(first, first);
		for p in iter {
			bounds.min = bounds.min.min(p);
			bounds.max = bounds.max.max(p);
		}
		Some(bounds)
	}

	/// True if no component is NaN or infinite.
	#[inline]
	pub fn is_finite(&self) -> bool {
		self.min.is_finite() && self.max.is_finite()
	}

	/// Finite and `min <= max` on all axes.
	#[inline]
	pub fn is_valid(&self) -> bool {
		self.is_finite() && self.min.cmple(self.max).all()
	}

	/// True if the box is (within tolerance) a single point.
	#[inline]
	pub fn is_nearly_zero_size(&self) -> bool {
		self.size().abs().max_element() <= NEARLY_ZERO_SIZE
	}

	/// Invalid, or nearly zero size. Degenerate boxes never reach the spatial
	/// tree or the dirty-area list.
	#[inline]
	pub fn is_degenerate(&self) -> bool {
		!self.is_valid() || self.is_nearly_zero_size()
	}

	/// Check if this box overlaps with another.
	///
	/// Two boxes overlap if they share any interior or boundary points.
	#[inline]
	pub fn overlaps(&self, other: &NavBounds) -> bool {
		self.min.x <= other.max.x
			&& self.max.x >= other.min.x
			&& self.min.y <= other.max.y
			&& self.max.y >= other.min.y
			&& self.min.z <= other.max.z
			&& self.max.z >= other.min.z
	}

	/// Check if this box contains a point.
	#[inline]
	pub fn contains_point(&self, point: DVec3) -> bool {
		point.x >= self.min.x
			&& point.x <= self.max.x
			&& point.y >= self.min.y
			&& point.y <= self.max.y
			&& point.z >= self.min.z
			&& point.z <= self.max.z
	}

	/// Check if `other` lies entirely inside this box.
	#[inline]
	pub fn contains(&self, other: &NavBounds) -> bool {
		self.min.cmple(other.min).all() && self.max.cmpge(other.max).all()
	}

	/// Get the size of the box (max - min).
	#[inline]
	pub fn size(&self) -> DVec3 {
		self.max - self.min
	}

	/// Get the center of the box.
	#[inline]
	pub fn center(&self) -> DVec3 {
		(self.min + self.max) * 0.5
	}

	/// Half-size on each axis.
	#[inline]
	pub fn extent(&self) -> DVec3 {
		self.size() * 0.5
	}

	/// Smallest box containing both boxes. [`NavBounds::EMPTY`] is the identity.
	#[inline]
	pub fn union(&self, other: &NavBounds) -> NavBounds {
		NavBounds {
			min: self.min.min(other.min),
			max: self.max.max(other.max),
		}
	}

	/// Union of many boxes, skipping invalid ones. `None` if nothing valid remains.
	pub fn union_all<'a>(boxes: impl IntoIterator<Item = &'a NavBounds>) -> Option<NavBounds> {
		let merged = boxes
			.into_iter()
			.filter(|b| b.is_valid())
			.fold(NavBounds::EMPTY, |acc, b| acc.union(b));
		merged.is_valid().then_some(merged)
	}

	/// Grow the box by `amount` on every side.
	#[inline]
	pub fn expand_by(&self, amount: f64) -> NavBounds {
		NavBounds {
			min: self.min - DVec3::splat(amount),
			max: self.max + DVec3::splat(amount),
		}
	}

	/// Radius of the sphere centred on the box that encloses it.
	#[inline]
	pub fn bounding_sphere_radius(&self) -> f64 {
		self.extent().length()
	}

	/// Volume, or zero for invalid boxes.
	#[inline]
	pub fn volume(&self) -> f64 {
		if !self.is_valid() {
			return 0.0;
		}
		let s = self.size();
		s.x * s.y * s.z
	}
}

impl Default for NavBounds {
	fn default() -> Self {
		Self::EMPTY
	}
}
