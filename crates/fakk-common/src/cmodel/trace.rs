// trace.rs — swept box traces through the BSP tree
//
// Brush testing stays sequential: the dedup stamps and the early exit on a
// zero fraction both depend on the order brushes are visited in.

use super::{
    CBrush, CBrushSide, CLeaf, CModelContext, ClipHandle, TraceClient, BOX_MODEL_HANDLE,
    DIST_EPSILON,
};
use crate::q_shared::{
    dot_product, rotate_into_frame, rotate_out_of_frame, vector_compare, vector_is_zero,
    vector_lerp, vector_subtract, ContentFlags, CPlane, Trace, Vec3,
};

/// Everything fixed for the duration of one trace, plus the result so far.
struct TraceWork {
    start: Vec3,
    end: Vec3,
    mins: Vec3,
    maxs: Vec3,
    /// Largest distance from the origin along each axis.
    extents: Vec3,
    is_point: bool,
    contents: ContentFlags,
    trace: Trace,
}

impl TraceWork {
    fn new(start: &Vec3, end: &Vec3, mins: &Vec3, maxs: &Vec3, brushmask: ContentFlags) -> Self {
        let is_point = vector_is_zero(mins) && vector_is_zero(maxs);
        let mut extents = [0.0f32; 3];
        if !is_point {
            for i in 0..3 {
                extents[i] = (-mins[i]).max(maxs[i]);
            }
        }
        Self {
            start: *start,
            end: *end,
            mins: *mins,
            maxs: *maxs,
            extents,
            is_point,
            contents: brushmask,
            trace: Trace::default(),
        }
    }

    /// Plane distance pushed out to the box corner that touches it first.
    fn expanded_dist(&self, plane: &CPlane) -> f32 {
        if self.is_point {
            return plane.dist;
        }
        let mut ofs = [0.0f32; 3];
        for j in 0..3 {
            ofs[j] = if plane.normal[j] < 0.0 { self.maxs[j] } else { self.mins[j] };
        }
        plane.dist - dot_product(&ofs, &plane.normal)
    }

    /// How far a node plane has to be from the path before the box can't
    /// reach across it.
    fn plane_offset(&self, plane: &CPlane) -> f32 {
        if (plane.plane_type as usize) < 3 {
            self.extents[plane.plane_type as usize]
        } else if self.is_point {
            0.0
        } else {
            (self.extents[0] * plane.normal[0]).abs()
                + (self.extents[1] * plane.normal[1]).abs()
                + (self.extents[2] * plane.normal[2]).abs()
        }
    }
}

// ============================================================
// Brush tests
// ============================================================

fn clip_box_to_brush(tw: &mut TraceWork, brush: &CBrush, sides: &[CBrushSide], planes: &[CPlane]) {
    if brush.numsides == 0 {
        return;
    }

    let mut enterfrac: f32 = -1.0;
    let mut leavefrac: f32 = 1.0;
    let mut leadside: Option<&CBrushSide> = None;

    let mut getout = false;
    let mut startout = false;

    for side in &sides[brush.firstbrushside..brush.firstbrushside + brush.numsides] {
        let plane = &planes[side.plane_idx];
        let dist = tw.expanded_dist(plane);

        let d1 = dot_product(&tw.start, &plane.normal) - dist;
        let d2 = dot_product(&tw.end, &plane.normal) - dist;

        if d2 > 0.0 {
            getout = true; // endpoint is not in solid
        }
        if d1 > 0.0 {
            startout = true;
        }

        // completely in front of face, no intersection
        if d1 > 0.0 && d2 >= d1 {
            return;
        }
        if d1 <= 0.0 && d2 <= 0.0 {
            continue;
        }

        if d1 > d2 {
            // enter
            let f = ((d1 - DIST_EPSILON) / (d1 - d2)).max(0.0);
            if f > enterfrac {
                enterfrac = f;
                leadside = Some(side);
            }
        } else {
            // leave
            let f = ((d1 + DIST_EPSILON) / (d1 - d2)).min(1.0);
            if f < leavefrac {
                leavefrac = f;
            }
        }
    }

    if !startout {
        // original point was inside brush
        tw.trace.startsolid = true;
        if !getout {
            tw.trace.allsolid = true;
            tw.trace.fraction = 0.0;
            tw.trace.contents = brush.contents;
        }
        return;
    }

    if enterfrac < leavefrac && enterfrac > -1.0 && enterfrac < tw.trace.fraction {
        if let Some(side) = leadside {
            tw.trace.fraction = enterfrac;
            tw.trace.plane = planes[side.plane_idx];
            tw.trace.surface_flags = side.surface_flags;
            tw.trace.contents = brush.contents;
        }
    }
}

fn test_box_in_brush(tw: &mut TraceWork, brush: &CBrush, sides: &[CBrushSide], planes: &[CPlane]) {
    if brush.numsides == 0 {
        return;
    }
    for side in &sides[brush.firstbrushside..brush.firstbrushside + brush.numsides] {
        let plane = &planes[side.plane_idx];
        let d1 = dot_product(&tw.start, &plane.normal) - tw.expanded_dist(plane);
        // if completely in front of face, no intersection
        if d1 > 0.0 {
            return;
        }
    }

    tw.trace.startsolid = true;
    tw.trace.allsolid = true;
    tw.trace.fraction = 0.0;
    tw.trace.contents = brush.contents;
}

// ============================================================
// Leaf and tree walks
// ============================================================

impl CModelContext {
    fn trace_through_leaf(&self, client: &mut TraceClient, tw: &mut TraceWork, leaf: &CLeaf) {
        for k in 0..leaf.numleafbrushes {
            let brushnum = self.map_leafbrushes[leaf.firstleafbrush + k];
            if !client.check_brush(brushnum) {
                continue; // already checked this brush in another leaf
            }
            let brush = &self.map_brushes[brushnum];
            if !brush.contents.intersects(tw.contents) {
                continue;
            }
            client.stats.brush_traces += 1;
            clip_box_to_brush(tw, brush, &self.map_brushsides, &self.map_planes);
            if tw.trace.fraction == 0.0 {
                return;
            }
        }
    }

    fn test_in_leaf(&self, client: &mut TraceClient, tw: &mut TraceWork, leaf: &CLeaf) {
        for k in 0..leaf.numleafbrushes {
            let brushnum = self.map_leafbrushes[leaf.firstleafbrush + k];
            if !client.check_brush(brushnum) {
                continue;
            }
            let brush = &self.map_brushes[brushnum];
            if !brush.contents.intersects(tw.contents) {
                continue;
            }
            client.stats.brush_traces += 1;
            test_box_in_brush(tw, brush, &self.map_brushsides, &self.map_planes);
            if tw.trace.allsolid {
                return;
            }
        }
    }

    /// Walks the part of the tree the segment `p1..p2` (fractions `p1f..p2f`
    /// of the whole trace) passes through.
    fn trace_through_tree(
        &self,
        client: &mut TraceClient,
        tw: &mut TraceWork,
        num: i32,
        p1f: f32,
        p2f: f32,
        p1: &Vec3,
        p2: &Vec3,
    ) {
        if tw.trace.fraction <= p1f {
            return; // already hit something nearer
        }

        if num < 0 {
            let leaf = &self.map_leafs[(-1 - num) as usize];
            self.trace_through_leaf(client, tw, leaf);
            return;
        }

        let node = &self.map_nodes[num as usize];
        let plane = &self.map_planes[node.plane_idx];
        let t1 = plane.distance(p1);
        let t2 = plane.distance(p2);
        let offset = tw.plane_offset(plane);

        // see which sides we need to consider
        if t1 >= offset + 1.0 && t2 >= offset + 1.0 {
            self.trace_through_tree(client, tw, node.children[0], p1f, p2f, p1, p2);
            return;
        }
        if t1 < -offset - 1.0 && t2 < -offset - 1.0 {
            self.trace_through_tree(client, tw, node.children[1], p1f, p2f, p1, p2);
            return;
        }

        // put the crosspoint DIST_EPSILON pixels on the near side
        let (side, frac, frac2) = if t1 < t2 {
            let idist = 1.0 / (t1 - t2);
            (1, (t1 - offset + DIST_EPSILON) * idist, (t1 + offset + DIST_EPSILON) * idist)
        } else if t1 > t2 {
            let idist = 1.0 / (t1 - t2);
            (0, (t1 + offset + DIST_EPSILON) * idist, (t1 - offset - DIST_EPSILON) * idist)
        } else {
            (0, 1.0, 0.0)
        };
        let frac = frac.clamp(0.0, 1.0);
        let frac2 = frac2.clamp(0.0, 1.0);

        // move up to the node
        let midf = p1f + (p2f - p1f) * frac;
        let mid = vector_lerp(p1, p2, frac);
        self.trace_through_tree(client, tw, node.children[side], p1f, midf, p1, &mid);

        // go past the node
        let midf2 = p1f + (p2f - p1f) * frac2;
        let mid2 = vector_lerp(p1, p2, frac2);
        self.trace_through_tree(client, tw, node.children[side ^ 1], midf2, p2f, &mid2, p2);
    }

    // ============================================================
    // Position test
    // ============================================================

    fn test_position(&self, client: &mut TraceClient, tw: &mut TraceWork, model: ClipHandle) {
        if model == BOX_MODEL_HANDLE {
            let (brush, sides, planes) = client.box_parts();
            if brush.contents.intersects(tw.contents) {
                test_box_in_brush(tw, brush, sides, planes);
            }
            return;
        }
        if model != 0 {
            let leaf = self.cmodel_for_handle(model).leaf;
            self.test_in_leaf(client, tw, &leaf);
            return;
        }

        // grow the box a unit so touching leafs are tested too
        let mut c1 = [0.0f32; 3];
        let mut c2 = [0.0f32; 3];
        for i in 0..3 {
            c1[i] = tw.start[i] + tw.mins[i] - 1.0;
            c2[i] = tw.start[i] + tw.maxs[i] + 1.0;
        }
        let (leafs, _topnode) = self.box_leafnums(&c1, &c2, self.map_leafs.len());
        for leafnum in leafs {
            self.test_in_leaf(client, tw, &self.map_leafs[leafnum]);
            if tw.trace.allsolid {
                break;
            }
        }
    }

    // ============================================================
    // Box traces
    // ============================================================

    /// Sweeps the box `mins..maxs` from `start` to `end` against `model`,
    /// hitting only brushes whose contents meet `brushmask`.
    ///
    /// `cylinder` is accepted for callers that ask for capsule sweeps; every
    /// sweep here is an axial box.
    pub fn box_trace(
        &self,
        client: &mut TraceClient,
        start: &Vec3,
        end: &Vec3,
        mins: &Vec3,
        maxs: &Vec3,
        model: ClipHandle,
        brushmask: ContentFlags,
        cylinder: bool,
    ) -> Trace {
        let _ = cylinder;

        client.next_checkcount(); // for multi-check avoidance
        client.stats.traces += 1;

        let mut tw = TraceWork::new(start, end, mins, maxs, brushmask);

        if !self.loaded && model != BOX_MODEL_HANDLE {
            tw.trace.endpos = *end;
            return tw.trace;
        }

        if vector_compare(start, end) {
            // position test special case
            self.test_position(client, &mut tw, model);
            tw.trace.endpos = *start;
            return tw.trace;
        }

        if model == BOX_MODEL_HANDLE {
            if client.box_brush.contents.intersects(tw.contents) {
                client.stats.brush_traces += 1;
                let (brush, sides, planes) = client.box_parts();
                clip_box_to_brush(&mut tw, brush, sides, planes);
            }
        } else if model != 0 {
            let leaf = self.cmodel_for_handle(model).leaf;
            self.trace_through_leaf(client, &mut tw, &leaf);
        } else if self.map_nodes.is_empty() {
            self.trace_through_leaf(client, &mut tw, &self.map_leafs[0]);
        } else {
            self.trace_through_tree(client, &mut tw, 0, 0.0, 1.0, start, end);
        }

        // generate endpos from the original, unmodified start/end
        tw.trace.endpos = if tw.trace.fraction == 1.0 {
            *end
        } else {
            vector_lerp(start, end, tw.trace.fraction)
        };
        tw.trace
    }

    /// `box_trace` against a model placed at `origin` and turned by
    /// `angles`. The hit plane comes back in world space.
    pub fn transformed_box_trace(
        &self,
        client: &mut TraceClient,
        start: &Vec3,
        end: &Vec3,
        mins: &Vec3,
        maxs: &Vec3,
        model: ClipHandle,
        brushmask: ContentFlags,
        origin: &Vec3,
        angles: &Vec3,
        cylinder: bool,
    ) -> Trace {
        // subtract origin offset
        let mut start_l = vector_subtract(start, origin);
        let mut end_l = vector_subtract(end, origin);

        // rotate start and end into the model's frame of reference
        let rotated = model != BOX_MODEL_HANDLE && !vector_is_zero(angles);
        if rotated {
            start_l = rotate_into_frame(&start_l, angles);
            end_l = rotate_into_frame(&end_l, angles);
        }

        let mut trace = self.box_trace(client, &start_l, &end_l, mins, maxs, model, brushmask, cylinder);

        if trace.fraction != 1.0 {
            let normal = if rotated {
                rotate_out_of_frame(&trace.plane.normal, angles)
            } else {
                trace.plane.normal
            };
            trace.plane = CPlane::new(normal, trace.plane.dist + dot_product(&normal, origin));
        }

        trace.endpos = if trace.fraction == 1.0 {
            *end
        } else {
            vector_lerp(start, end, trace.fraction)
        };
        trace
    }
}

// ============================================================
// Tests
// ============================================================
