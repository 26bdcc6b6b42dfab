// box_model.rs — per-caller scratch state and the temporary box brush

use super::{CBrush, CBrushSide, ClipHandle, BOX_MODEL_HANDLE};
use crate::q_shared::{ContentFlags, CPlane, SurfaceFlags, Vec3};

/// Counters bumped by every query made through one client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CmStats {
    pub traces: u64,
    pub brush_traces: u64,
    pub point_contents: u64,
}

/// Mutable state for one querying thread.
///
/// A brush can sit in several leafs; the stamp array makes sure a single
/// trace clips it once. The box brush is rebuilt by every
/// `temp_box_model` call and only this client sees it.
#[derive(Debug, Clone)]
pub struct TraceClient {
    checkcount: u32,
    brush_checks: Vec<u32>,

    pub(crate) box_planes: [CPlane; 6],
    pub(crate) box_sides: [CBrushSide; 6],
    pub(crate) box_brush: CBrush,
    box_mins: Vec3,
    box_maxs: Vec3,

    pub stats: CmStats,
}

impl TraceClient {
    pub fn new() -> Self {
        let mut box_sides = [CBrushSide::default(); 6];
        for (i, side) in box_sides.iter_mut().enumerate() {
            side.plane_idx = i;
            side.surface_flags = SurfaceFlags::empty();
            side.shader_num = -1;
        }
        Self {
            checkcount: 0,
            brush_checks: Vec::new(),
            box_planes: [CPlane::default(); 6],
            box_sides,
            box_brush: CBrush {
                contents: ContentFlags::empty(),
                firstbrushside: 0,
                numsides: 6,
                shader_num: -1,
            },
            box_mins: [0.0; 3],
            box_maxs: [0.0; 3],
            stats: CmStats::default(),
        }
    }

    /// Starts a new dedup generation.
    pub(crate) fn next_checkcount(&mut self) {
        self.checkcount = self.checkcount.wrapping_add(1);
        if self.checkcount == 0 {
            // stamps from the previous lap would collide
            self.brush_checks.iter_mut().for_each(|c| *c = 0);
            self.checkcount = 1;
        }
    }

    /// True the first time brush `n` is seen in this generation.
    pub(crate) fn check_brush(&mut self, n: usize) -> bool {
        if n >= self.brush_checks.len() {
            self.brush_checks.resize(n + 1, 0);
        }
        if self.brush_checks[n] == self.checkcount {
            return false;
        }
        self.brush_checks[n] = self.checkcount;
        true
    }

    /// Turns the box brush into an axial box with the given contents.
    /// Traces against the returned handle clip against it.
    pub fn temp_box_model(&mut self, mins: &Vec3, maxs: &Vec3, contents: ContentFlags) -> ClipHandle {
        self.box_mins = *mins;
        self.box_maxs = *maxs;
        self.box_brush.contents = contents;

        for axis in 0..3 {
            let mut normal = [0.0f32; 3];
            normal[axis] = 1.0;
            self.box_planes[axis * 2] = CPlane::new(normal, maxs[axis]);
            normal[axis] = -1.0;
            self.box_planes[axis * 2 + 1] = CPlane::new(normal, -mins[axis]);
        }

        BOX_MODEL_HANDLE
    }

    pub fn box_bounds(&self) -> (Vec3, Vec3) {
        (self.box_mins, self.box_maxs)
    }

    /// Brush plus the side and plane tables it indexes.
    pub(crate) fn box_parts(&self) -> (&CBrush, &[CBrushSide], &[CPlane]) {
        (&self.box_brush, &self.box_sides, &self.box_planes)
    }
}

impl Default for TraceClient {
    fn default() -> Self {
        Self::new()
    }
}
