//! Geometry exporter: collects collision triangle soups into the byte buffer
//! stored on octree elements.
//!
//! # Layout
//!
//! ```text
//! chunk := vertex_count: u32 | index_count: u32
//!          | vertex_count * (x: f32, y: f32, z: f32)
//!          | index_count * u32
//! buffer := chunk*          (all little-endian, chunks concatenated)
//! ```

use glam::DVec3;

use crate::octree::NavBounds;

const HEADER_BYTES: usize = 8;
const VERTEX_BYTES: usize = 12;
const INDEX_BYTES: usize = 4;

/// Box corner order used by [`GeometryExporter::add_box`].
const BOX_TRIANGLES: [u32; 36] = [
  0, 2, 1, 1, 2, 3, // -z
  4, 5, 6, 5, 7, 6, // +z
  0, 1, 4, 1, 5, 4, // -y
  2, 6, 3, 3, 6, 7, // +y
  0, 4, 2, 2, 4, 6, // -x
  1, 3, 5, 3, 7, 5, // +x
];

/// Accumulates exported collision geometry.
#[derive(Clone, Debug, Default)]
pub struct GeometryExporter {
  data: Vec<u8>,
  bounds: NavBounds,
  triangle_count: usize,
}

impl GeometryExporter {
  pub fn new() -> Self {
    Self::default()
  }

  /// Append one indexed triangle soup. Out-of-range indices are dropped with
  /// their triangle.
  pub fn add_triangles(&mut self, vertices: &[DVec3], indices: &[u32]) {
    let valid: Vec<u32> = indices
      .chunks_exact(3)
      .filter(|tri| tri.iter().all(|&i| (i as usize) < vertices.len()))
      .flatten()
      .copied()
      .collect();
    if valid.is_empty() {
      return;
    }

    self
      .data
      .reserve(HEADER_BYTES + vertices.len() * VERTEX_BYTES + valid.len() * INDEX_BYTES);
    self.data.extend_from_slice(&(vertices.len() as u32).to_le_bytes());
    self.data.extend_from_slice(&(valid.len() as u32).to_le_bytes());
    for v in vertices {
      for c in [v.x, v.y, v.z] {
        self.data.extend_from_slice(&(c as f32).to_le_bytes());
      }
    }
    for i in &valid {
      self.data.extend_from_slice(&i.to_le_bytes());
    }

    if let Some(b) = NavBounds::from_points(vertices.iter().copied()) {
      self.bounds = self.bounds.union(&b);
    }
    self.triangle_count += valid.len() / 3;
  }

  /// Append the 12 triangles of a box.
  pub fn add_box(&mut self, bounds: &NavBounds) {
    let (lo, hi) = (bounds.min, bounds.max);
    let corners: [DVec3; 8] = std::array::from_fn(|i| {
      DVec3::new(
        if i & 1 == 0 { lo.x } else { hi.x },
        if i & 2 == 0 { lo.y } else { hi.y },
        if i & 4 == 0 { lo.z } else { hi.z },
      )
    });
    self.add_triangles(&corners, &BOX_TRIANGLES);
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  pub fn data(&self) -> &[u8] {
    &self.data
  }

  /// Bounds of everything exported so far ([`NavBounds::EMPTY`] if nothing).
  pub fn bounds(&self) -> NavBounds {
    self.bounds
  }

  pub fn triangle_count(&self) -> usize {
    self.triangle_count
  }

  pub fn into_data(self) -> Vec<u8> {
    self.data
  }
}

/// Count triangles in an exported buffer. Stops at the first truncated chunk.
pub fn triangle_count_of(mut data: &[u8]) -> usize {
  let mut triangles = 0;
  while data.len() >= HEADER_BYTES {
    let vertex_count = read_u32(&data[0..4]) as usize;
    let index_count = read_u32(&data[4..8]) as usize;
    let chunk = HEADER_BYTES + vertex_count * VERTEX_BYTES + index_count * INDEX_BYTES;
    if data.len() < chunk {
      break;
    }
    triangles += index_count / 3;
    data = &data[chunk..];
  }
  triangles
}

fn read_u32(bytes: &[u8]) -> u32 {
  let mut buf = [0u8; 4];
  buf.copy_from_slice(bytes);
  u32::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_box_export() {
    let mut exporter = GeometryExporter::new();
    let b = NavBounds::new(DVec3::ZERO, DVec3::new(2.0, 3.0, 4.0));
    exporter.add_box(&b);

    assert_eq!(exporter.triangle_count(), 12);
    assert_eq!(exporter.bounds(), b);
    assert_eq!(
      exporter.data().len(),
      HEADER_BYTES + 8 * VERTEX_BYTES + 36 * INDEX_BYTES
    );
    assert_eq!(triangle_count_of(exporter.data()), 12);
  }

  #[test]
  fn test_out_of_range_triangles_dropped() {
    let mut exporter = GeometryExporter::new();
    let verts = [DVec3::ZERO, DVec3::X, DVec3::Y];
    exporter.add_triangles(&verts, &[0, 1, 2, 0, 1, 9]);
    assert_eq!(exporter.triangle_count(), 1);

    exporter.add_triangles(&verts, &[5, 6, 7]);
    assert_eq!(exporter.triangle_count(), 1, "fully invalid soup adds nothing");
  }

  #[test]
  fn test_chunks_concatenate() {
    let mut exporter = GeometryExporter::new();
    exporter.add_box(&NavBounds::new(DVec3::ZERO, DVec3::ONE));
    exporter.add_box(&NavBounds::new(DVec3::splat(5.0), DVec3::splat(6.0)));
    assert_eq!(triangle_count_of(exporter.data()), 24);
    assert_eq!(exporter.bounds().max, DVec3::splat(6.0));

    // Truncated buffer counts only complete chunks.
    let data = exporter.into_data();
    assert_eq!(triangle_count_of(&data[..data.len() - 1]), 12);
  }
}
