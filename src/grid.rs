//! Spawn-point grid planning.
//!
//! The server keeps a square of chunks around the world spawn generated at
//! all times. Moving the spawn across a grid whose pitch equals that square's
//! edge and starting the server once per position covers the requested area.
//! The outermost positions are pulled inward so the last square ends exactly
//! on the far edge of the area instead of overshooting it.

use crate::error::ExploreError;
use std::fmt;

pub const CHUNK_BLOCKS: i32 = 16;
pub const REGION_BLOCKS: i32 = 512;

/// Height written into the spawn point. The server picks the real surface.
pub const ANCHOR_Y: i32 = 64;

/// Spawn chunks with full biome generation, Minecraft 1.16 and newer (23x23).
pub const DEFAULT_FOOTPRINT: i32 = 368;
/// Spawn chunks where trees and snow generate, Minecraft 1.15 and older (24x24).
pub const LEGACY_FOOTPRINT: i32 = 384;
/// All loaded spawn chunks, partially decorated at the rim (25x25).
pub const FULL_SPAWN_FOOTPRINT: i32 = 400;

/// One chunk held back so the rows shared with the neighbouring spawn square
/// are not generated twice.
pub const EDGE_MARGIN: i32 = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AnchorPoint {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl fmt::Display for AnchorPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}, {}", self.x, self.y, self.z)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Unit {
    Chunk,
    Region,
}

impl Unit {
    pub fn blocks(self) -> i32 {
        match self {
            Unit::Chunk => CHUNK_BLOCKS,
            Unit::Region => REGION_BLOCKS,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Chunk => f.write_str("chunk"),
            Unit::Region => f.write_str("region"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Extent {
    pub x_size: u32,
    pub z_size: u32,
    pub unit: Unit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridCell {
    pub column: usize,
    pub row: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AxisPlan {
    pub snapped: i32,
    /// Blocks to cover beyond the footprint centred on `snapped`.
    pub span: i64,
    pub coordinates: Vec<i32>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GridPlan {
    pub x: AxisPlan,
    pub z: AxisPlan,
    pub footprint: i32,
}

impl GridPlan {
    pub fn snapped_origin(&self) -> (i32, i32) {
        (self.x.snapped, self.z.snapped)
    }

    pub fn len(&self) -> usize {
        self.x.coordinates.len() * self.z.coordinates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Edge lengths in blocks of the area the whole grid generates.
    pub fn covered_blocks(&self) -> (i64, i64) {
        let footprint = i64::from(self.footprint);
        (self.x.span + footprint, self.z.span + footprint)
    }

    /// Cells in row-major order: every z step for a column before the next x.
    pub fn cells(&self) -> impl Iterator<Item = (GridCell, AnchorPoint)> + '_ {
        self.x
            .coordinates
            .iter()
            .enumerate()
            .flat_map(move |(column, &x)| {
                self.z
                    .coordinates
                    .iter()
                    .enumerate()
                    .map(move |(row, &z)| {
                        (
                            GridCell { column, row },
                            AnchorPoint { x, y: ANCHOR_Y, z },
                        )
                    })
            })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridPlanner {
    footprint: i32,
    edge_margin: i32,
}

impl Default for GridPlanner {
    fn default() -> Self {
        Self {
            footprint: DEFAULT_FOOTPRINT,
            edge_margin: EDGE_MARGIN,
        }
    }
}

impl GridPlanner {
    /// The footprint must exceed the edge margin, or the span of a small
    /// extent goes far enough below zero to leave an axis with no step.
    pub fn with_footprint(footprint: i32) -> Result<Self, ExploreError> {
        if footprint <= EDGE_MARGIN {
            return Err(ExploreError::InvalidFootprint(footprint));
        }
        Ok(Self {
            footprint,
            ..Self::default()
        })
    }

    /// Rejects extents that do not reach past the always-generated square.
    pub fn validate(&self, extent: Extent) -> Result<(), ExploreError> {
        for (axis, size) in [('x', extent.x_size), ('z', extent.z_size)] {
            let blocks = i64::from(size) * i64::from(extent.unit.blocks());
            if blocks <= i64::from(self.footprint) {
                return Err(ExploreError::InvalidExtent {
                    axis,
                    size,
                    unit: extent.unit,
                    blocks,
                    footprint: self.footprint,
                });
            }
        }
        Ok(())
    }

    pub fn plan(&self, extent: Extent, origin: (i32, i32)) -> Result<GridPlan, ExploreError> {
        self.validate(extent)?;
        Ok(GridPlan {
            x: self.plan_axis('x', extent.x_size, extent.unit, origin.0)?,
            z: self.plan_axis('z', extent.z_size, extent.unit, origin.1)?,
            footprint: self.footprint,
        })
    }

    fn plan_axis(
        &self,
        axis: char,
        size: u32,
        unit: Unit,
        origin: i32,
    ) -> Result<AxisPlan, ExploreError> {
        let unit_blocks = i64::from(unit.blocks());
        let footprint = i64::from(self.footprint);
        let snapped = snap_axis(origin, size, unit);
        let span = i64::from(size) * unit_blocks - footprint - i64::from(self.edge_margin);
        let steps = div_ceil(span, footprint) + 1;

        // Work in half blocks so an odd span stays exact until the final
        // truncation toward zero.
        let first = 2 * snapped - span;
        let last = 2 * snapped + span;
        // Coordinates lie between the two ends, so checking the ends first
        // bounds the step count before anything is allocated.
        for value in [first / 2, last / 2] {
            i32::try_from(value)
                .map_err(|_| ExploreError::CoordinateOutOfRange { axis, value })?;
        }
        let coordinates = (0..steps)
            .map(|step| ((first + 2 * step * footprint).min(last) / 2) as i32)
            .collect();

        Ok(AxisPlan {
            snapped: i32::try_from(snapped)
                .map_err(|_| ExploreError::CoordinateOutOfRange { axis, value: snapped })?,
            span,
            coordinates,
        })
    }
}

/// Moves `origin` to the nearest chunk or region centre, border midpoint or
/// corner, whichever keeps an area of `size` units aligned to unit borders.
pub fn snap_axis(origin: i32, size: u32, unit: Unit) -> i64 {
    let unit_blocks = i64::from(unit.blocks());
    let offset = i64::from(size % 2) * unit_blocks / 2;
    div_round_half_away(i64::from(origin) + offset, unit_blocks) * unit_blocks - offset
}

fn div_round_half_away(numerator: i64, denominator: i64) -> i64 {
    let half = denominator / 2;
    if numerator >= 0 {
        (numerator + half) / denominator
    } else {
        -((-numerator + half) / denominator)
    }
}

fn div_ceil(numerator: i64, denominator: i64) -> i64 {
    let quotient = numerator / denominator;
    if numerator % denominator > 0 {
        quotient + 1
    } else {
        quotient
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(x_size: u32, z_size: u32) -> Extent {
        Extent {
            x_size,
            z_size,
            unit: Unit::Chunk,
        }
    }

    #[test]
    fn thirty_two_chunks_around_spawn() {
        let plan = GridPlanner::default().plan(chunks(32, 32), (13, -42)).unwrap();
        assert_eq!(plan.snapped_origin(), (16, -48));
        // 512 - 368 - 16 = 128 => ceil(128 / 368) + 1 = 2 steps.
        assert_eq!(plan.x.span, 128);
        assert_eq!(plan.z.span, 128);
        assert_eq!(plan.x.coordinates, vec![-48, 80]);
        assert_eq!(plan.z.coordinates, vec![-112, 16]);
        assert_eq!(plan.len(), 4);
        assert_eq!(plan.covered_blocks(), (496, 496));
    }

    #[test]
    fn cells_are_row_major() {
        let plan = GridPlanner::default().plan(chunks(32, 32), (13, -42)).unwrap();
        let cells: Vec<_> = plan.cells().collect();
        assert_eq!(
            cells,
            vec![
                (GridCell { column: 0, row: 0 }, AnchorPoint { x: -48, y: ANCHOR_Y, z: -112 }),
                (GridCell { column: 0, row: 1 }, AnchorPoint { x: -48, y: ANCHOR_Y, z: 16 }),
                (GridCell { column: 1, row: 0 }, AnchorPoint { x: 80, y: ANCHOR_Y, z: -112 }),
                (GridCell { column: 1, row: 1 }, AnchorPoint { x: 80, y: ANCHOR_Y, z: 16 }),
            ]
        );
    }

    #[test]
    fn odd_sizes_snap_to_cell_centres() {
        // 33 chunks: offset 8, so the origin lands on a chunk centre.
        assert_eq!(snap_axis(0, 33, Unit::Chunk), 8);
        assert_eq!(snap_axis(13, 33, Unit::Chunk), 8);
        assert_eq!(snap_axis(-13, 33, Unit::Chunk), -8);
        // 3 regions: offset 256.
        assert_eq!(snap_axis(100, 3, Unit::Region), 256);
        assert_eq!(snap_axis(-300, 3, Unit::Region), -256);
    }

    #[test]
    fn halfway_rounds_away_from_zero() {
        assert_eq!(snap_axis(8, 32, Unit::Chunk), 16);
        assert_eq!(snap_axis(-8, 32, Unit::Chunk), -16);
        assert_eq!(snap_axis(7, 32, Unit::Chunk), 0);
        assert_eq!(snap_axis(-7, 32, Unit::Chunk), 0);
    }

    #[test]
    fn snapping_is_idempotent() {
        for unit in [Unit::Chunk, Unit::Region] {
            for size in [26u32, 27, 32, 33, 100, 101] {
                for origin in [-10_000, -777, -256, -8, 0, 1, 13, 255, 9_999] {
                    let once = snap_axis(origin, size, unit);
                    let twice = snap_axis(once as i32, size, unit);
                    assert_eq!(once, twice, "unit={unit} size={size} origin={origin}");
                }
            }
        }
    }

    #[test]
    fn first_and_last_anchor_sit_on_the_span_edges() {
        for footprint in [DEFAULT_FOOTPRINT, LEGACY_FOOTPRINT, FULL_SPAWN_FOOTPRINT] {
            let planner = GridPlanner::with_footprint(footprint).unwrap();
            for size in [26u32, 40, 64, 129, 300] {
                let plan = planner.plan(chunks(size, size), (-1234, 987)).unwrap();
                for axis in [&plan.x, &plan.z] {
                    assert!(!axis.coordinates.is_empty());
                    let snapped = i64::from(axis.snapped);
                    let first = i64::from(axis.coordinates[0]);
                    let last = i64::from(*axis.coordinates.last().unwrap());
                    assert_eq!(first, (2 * snapped - axis.span) / 2);
                    assert_eq!(last, (2 * snapped + axis.span) / 2);
                    for pair in axis.coordinates.windows(2) {
                        let pitch = i64::from(pair[1] - pair[0]);
                        assert!(pitch > 0 && pitch <= i64::from(footprint));
                    }
                }
            }
        }
    }

    #[test]
    fn regions_plan_many_steps() {
        let plan = GridPlanner::default()
            .plan(
                Extent {
                    x_size: 2,
                    z_size: 4,
                    unit: Unit::Region,
                },
                (0, 0),
            )
            .unwrap();
        // 1024 - 368 - 16 = 640 => ceil(640 / 368) + 1 = 3 steps.
        assert_eq!(plan.x.span, 640);
        assert_eq!(plan.x.coordinates, vec![-320, 48, 320]);
        // 2048 - 384 = 1664 => ceil(1664 / 368) + 1 = 6 steps.
        assert_eq!(plan.z.coordinates.len(), 6);
        assert_eq!(plan.z.coordinates.last(), Some(&832));
        assert_eq!(plan.len(), 18);
    }

    #[test]
    fn smallest_extent_needs_one_step() {
        // 24 chunks = 384 blocks: span 0, a single spawn covers everything.
        let plan = GridPlanner::default().plan(chunks(24, 24), (0, 0)).unwrap();
        assert_eq!(plan.x.coordinates, vec![0]);
        assert_eq!(plan.len(), 1);

        // 368 < 23.5 chunks: span is negative but one step still happens.
        let planner = GridPlanner::with_footprint(360).unwrap();
        let plan = planner.plan(chunks(23, 23), (0, 0)).unwrap();
        assert_eq!(plan.x.span, 368 - 360 - 16);
        assert_eq!(plan.x.coordinates, vec![-4]);
    }

    #[test]
    fn too_small_extents_are_rejected() {
        let planner = GridPlanner::default();
        match planner.plan(chunks(23, 40), (0, 0)) {
            Err(ExploreError::InvalidExtent { axis, blocks, .. }) => {
                assert_eq!(axis, 'x');
                assert_eq!(blocks, 368);
            }
            other => panic!("unexpected result {other:?}"),
        }
        assert!(matches!(
            planner.plan(chunks(40, 0), (0, 0)),
            Err(ExploreError::InvalidExtent { axis: 'z', .. })
        ));
        assert!(planner
            .validate(Extent {
                x_size: 1,
                z_size: 1,
                unit: Unit::Region
            })
            .is_ok());
    }

    #[test]
    fn footprint_must_exceed_the_edge_margin() {
        for footprint in [-5, 0, 8, EDGE_MARGIN] {
            assert!(matches!(
                GridPlanner::with_footprint(footprint),
                Err(ExploreError::InvalidFootprint(value)) if value == footprint
            ));
        }
        let planner = GridPlanner::with_footprint(EDGE_MARGIN + 1).unwrap();
        let plan = planner.plan(chunks(2, 2), (0, 0)).unwrap();
        assert_eq!(plan.x.span, -1);
        assert_eq!(plan.x.coordinates, vec![0]);
        // 64 - 17 - 16 = 31 => ceil(31 / 17) + 1 = 3 steps.
        let plan = planner.plan(chunks(4, 4), (0, 0)).unwrap();
        assert_eq!(plan.x.coordinates, vec![-15, 1, 15]);
    }

    #[test]
    fn huge_extents_fail_before_allocating() {
        let extent = Extent {
            x_size: u32::MAX,
            z_size: u32::MAX,
            unit: Unit::Region,
        };
        match GridPlanner::default().plan(extent, (0, 0)) {
            Err(ExploreError::CoordinateOutOfRange { axis, value }) => {
                assert_eq!(axis, 'x');
                assert!(value < i64::from(i32::MIN));
            }
            other => panic!("unexpected result {other:?}"),
        }
    }
}
