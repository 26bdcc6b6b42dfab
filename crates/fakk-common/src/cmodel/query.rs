// query.rs — point, leaf, contents and visibility queries

use super::{CBrush, CBrushSide, CLeaf, CModelContext, ClipHandle, TraceClient, BOX_MODEL_HANDLE};
use crate::q_shared::{
    box_on_plane_side, rotate_into_frame, vector_is_zero, vector_subtract, ContentFlags, CPlane,
    Vec3,
};

/// True when `p` is behind or on every side of the brush.
pub(crate) fn point_in_brush(p: &Vec3, brush: &CBrush, sides: &[CBrushSide], planes: &[CPlane]) -> bool {
    sides[brush.firstbrushside..brush.firstbrushside + brush.numsides]
        .iter()
        .all(|side| planes[side.plane_idx].distance(p) <= 0.0)
}

impl CModelContext {
    // ============================================================
    // Point / leaf queries
    // ============================================================

    /// Leaf containing `p`, descending from node `num`.
    pub fn point_leafnum_r(&self, p: &Vec3, mut num: i32) -> i32 {
        while num >= 0 {
            let node = &self.map_nodes[num as usize];
            let d = self.map_planes[node.plane_idx].distance(p);
            num = if d < 0.0 { node.children[1] } else { node.children[0] };
        }
        -1 - num
    }

    pub fn point_leafnum(&self, p: &Vec3) -> i32 {
        if self.map_nodes.is_empty() {
            return 0; // sound may call this without map loaded
        }
        self.point_leafnum_r(p, 0)
    }

    // ============================================================
    // Box leaf enumeration
    // ============================================================

    fn box_leafnums_r(
        &self,
        mut nodenum: i32,
        leaf_list: &mut Vec<usize>,
        leaf_maxcount: usize,
        leaf_mins: &Vec3,
        leaf_maxs: &Vec3,
        leaf_topnode: &mut i32,
    ) {
        loop {
            if nodenum < 0 {
                if leaf_list.len() < leaf_maxcount {
                    leaf_list.push((-1 - nodenum) as usize);
                }
                return;
            }

            let node = &self.map_nodes[nodenum as usize];
            match box_on_plane_side(leaf_mins, leaf_maxs, &self.map_planes[node.plane_idx]) {
                1 => nodenum = node.children[0],
                2 => nodenum = node.children[1],
                _ => {
                    // go down both
                    if *leaf_topnode == -1 {
                        *leaf_topnode = nodenum;
                    }
                    self.box_leafnums_r(
                        node.children[0],
                        leaf_list,
                        leaf_maxcount,
                        leaf_mins,
                        leaf_maxs,
                        leaf_topnode,
                    );
                    nodenum = node.children[1];
                }
            }
        }
    }

    /// Leafs touched by the box, at most `listsize` of them, and the first
    /// node that splits it (-1 when a single leaf holds it).
    pub fn box_leafnums(&self, mins: &Vec3, maxs: &Vec3, listsize: usize) -> (Vec<usize>, i32) {
        let mut leaf_list = Vec::with_capacity(listsize.min(64));
        let mut topnode = -1;
        if self.map_nodes.is_empty() {
            if listsize > 0 {
                leaf_list.push(0);
            }
            return (leaf_list, topnode);
        }
        self.box_leafnums_r(0, &mut leaf_list, listsize, mins, maxs, &mut topnode);
        (leaf_list, topnode)
    }

    // ============================================================
    // Point contents
    // ============================================================

    fn leaf_contents(&self, p: &Vec3, leaf: &CLeaf) -> ContentFlags {
        let mut contents = ContentFlags::empty();
        for k in 0..leaf.numleafbrushes {
            let brush = &self.map_brushes[self.map_leafbrushes[leaf.firstleafbrush + k]];
            if point_in_brush(p, brush, &self.map_brushsides, &self.map_planes) {
                contents |= brush.contents;
            }
        }
        contents
    }

    /// Contents of every brush of `model` that holds `p`.
    pub fn point_contents(&self, client: &mut TraceClient, p: &Vec3, model: ClipHandle) -> ContentFlags {
        client.stats.point_contents += 1;

        if model == BOX_MODEL_HANDLE {
            let (brush, sides, planes) = client.box_parts();
            return if point_in_brush(p, brush, sides, planes) {
                brush.contents
            } else {
                ContentFlags::empty()
            };
        }

        if !self.loaded {
            return ContentFlags::empty();
        }
        let cmod = self.cmodel_for_handle(model);
        if model == 0 {
            let leafnum = self.point_leafnum(p) as usize;
            self.leaf_contents(p, &self.map_leafs[leafnum])
        } else {
            self.leaf_contents(p, &cmod.leaf)
        }
    }

    /// Like `point_contents`, for a model moved to `origin` and turned by
    /// `angles`.
    pub fn transformed_point_contents(
        &self,
        client: &mut TraceClient,
        p: &Vec3,
        model: ClipHandle,
        origin: &Vec3,
        angles: &Vec3,
    ) -> ContentFlags {
        let mut p_l = vector_subtract(p, origin);

        // rotate start and end into the model's frame of reference
        if model != BOX_MODEL_HANDLE && !vector_is_zero(angles) {
            p_l = rotate_into_frame(&p_l, angles);
        }

        self.point_contents(client, &p_l, model)
    }

    // ============================================================
    // PVS
    // ============================================================

    fn cluster_row(&self, cluster: i32) -> Option<&[u8]> {
        if cluster < 0 || cluster as usize >= self.numclusters {
            return None;
        }
        if self.vis.data.is_empty() {
            return Some(self.all_visible.as_slice());
        }
        let start = cluster as usize * self.vis.clusterbytes;
        Some(&self.vis.data[start..start + self.vis.clusterbytes])
    }

    /// Visibility row of a cluster, one bit per cluster. Empty for clusters
    /// that don't exist.
    pub fn cluster_pvs(&self, cluster: i32) -> &[u8] {
        self.cluster_row(cluster).unwrap_or(&[])
    }

    pub fn in_pvs(&self, p1: &Vec3, p2: &Vec3) -> bool {
        if !self.loaded {
            return false;
        }
        let cluster1 = self.leaf_cluster(self.point_leafnum(p1));
        let cluster2 = self.leaf_cluster(self.point_leafnum(p2));
        let row = match self.cluster_row(cluster1) {
            Some(row) => row,
            None => return false,
        };
        if cluster2 < 0 || cluster2 as usize >= self.numclusters {
            return false;
        }
        let c2 = cluster2 as usize;
        row[c2 >> 3] & (1 << (c2 & 7)) != 0
    }

    /// Same as `in_pvs`; areas are not consulted by either.
    pub fn in_pvs_ignore_portals(&self, p1: &Vec3, p2: &Vec3) -> bool {
        self.in_pvs(p1, p2)
    }
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::super::test_map::{self, BspBuilder};
    use super::*;
    use crate::q_shared::{
        CONTENTS_BODY, CONTENTS_SOLID, CONTENTS_TRIGGER, CONTENTS_WATER,
    };
    use rand::Rng;

    fn sample() -> CModelContext {
        CModelContext::from_bsp("maps/test.bsp", &test_map::build()).unwrap()
    }

    #[test]
    fn test_point_leafnum() {
        let map = sample();
        assert_eq!(map.point_leafnum(&[5.0, 0.0, 0.0]), 1);
        assert_eq!(map.point_leafnum(&[-5.0, 0.0, 0.0]), 2);
        // on the plane goes to the front
        assert_eq!(map.point_leafnum(&[0.0, 100.0, 0.0]), 1);
        assert_eq!(map.point_leafnum_r(&[-5.0, 0.0, 0.0], -3), 2);
    }

    #[test]
    fn test_point_leafnum_nested() {
        let map = CModelContext::from_bsp("maps/corridor.bsp", &BspBuilder::corridor().to_bytes()).unwrap();
        let xs = [100.0, 32.0, -32.0, -100.0];
        for (leaf, &x) in xs.iter().enumerate() {
            let leafnum = map.point_leafnum(&[x, 0.0, 20.0]);
            assert_eq!(leafnum, leaf as i32, "x = {}", x);
            assert_eq!(map.leaf_cluster(leafnum), leaf as i32);
        }

        let (leafs, topnode) = map.box_leafnums(&[56.0, -8.0, 0.0], &[72.0, 8.0, 16.0], 16);
        assert_eq!(leafs, vec![0, 1]);
        assert_eq!(topnode, 1);
        let (leafs, topnode) = map.box_leafnums(&[-70.0, -8.0, 0.0], &[70.0, 8.0, 16.0], 16);
        assert_eq!(leafs, vec![0, 1, 2, 3]);
        assert_eq!(topnode, 0);
    }

    #[test]
    fn test_point_contents_on_ramp() {
        let map = CModelContext::from_bsp("maps/ramp.bsp", &BspBuilder::ramp().to_bytes()).unwrap();
        let mut client = TraceClient::new();
        assert_eq!(map.point_contents(&mut client, &[50.0, 0.0, 10.0], 0), CONTENTS_SOLID);
        assert_eq!(map.point_contents(&mut client, &[50.0, -30.0, 49.0], 0), CONTENTS_SOLID);
        assert_eq!(map.point_contents(&mut client, &[10.0, 0.0, 50.0], 0), ContentFlags::empty());
        assert_eq!(map.point_contents(&mut client, &[-10.0, 0.0, -5.0], 0), ContentFlags::empty());
    }

    #[test]
    fn test_disjoint_brush_leaves_contents_alone() {
        let before = sample();

        let mut b = BspBuilder::sample();
        let extra = b.add_box_brush([100.0, -16.0, -16.0], [120.0, 16.0, 16.0], 0);
        b.leafbrushes = vec![0, 1, 2, extra, 0];
        b.leafs[1].num_brushes = 4;
        b.leafs[2].first_brush = 4;
        let after = CModelContext::from_bsp("maps/test.bsp", &b.to_bytes()).unwrap();

        let mut client = TraceClient::new();
        assert_eq!(after.point_contents(&mut client, &[110.0, 0.0, 0.0], 0), CONTENTS_SOLID);
        for ix in -20..20 {
            for iy in -4..=4 {
                for iz in -4..=4 {
                    let p = [ix as f32 * 5.0, iy as f32 * 6.0, iz as f32 * 6.0];
                    assert_eq!(
                        before.point_contents(&mut client, &p, 0),
                        after.point_contents(&mut client, &p, 0),
                        "{:?}",
                        p
                    );
                }
            }
        }
    }

    #[test]
    fn test_point_leafnum_without_map() {
        let map = CModelContext::new();
        assert_eq!(map.point_leafnum(&[1.0, 2.0, 3.0]), 0);
        assert_eq!(map.leaf_cluster(0), -1);
    }

    #[test]
    fn test_point_contents_world() {
        let map = sample();
        let mut client = TraceClient::new();
        assert_eq!(map.point_contents(&mut client, &[56.0, 0.0, 0.0], 0), CONTENTS_WATER | CONTENTS_TRIGGER);
        assert_eq!(map.point_contents(&mut client, &[40.0, 0.0, 0.0], 0), CONTENTS_WATER);
        assert_eq!(map.point_contents(&mut client, &[-8.0, 0.0, 0.0], 0), CONTENTS_SOLID);
        assert_eq!(map.point_contents(&mut client, &[-100.0, 0.0, 0.0], 0), ContentFlags::empty());
        // faces count as inside
        assert_eq!(map.point_contents(&mut client, &[16.0, 16.0, 16.0], 0), CONTENTS_SOLID);
        // model 1's brush is not in any world leaf
        assert_eq!(map.point_contents(&mut client, &[208.0, 0.0, 0.0], 0), ContentFlags::empty());
        assert_eq!(client.stats.point_contents, 6);
    }

    #[test]
    fn test_point_contents_submodel() {
        let map = sample();
        let mut client = TraceClient::new();
        assert_eq!(map.point_contents(&mut client, &[208.0, 0.0, 0.0], 1), CONTENTS_SOLID);
        assert_eq!(map.point_contents(&mut client, &[0.0, 0.0, 0.0], 1), ContentFlags::empty());
    }

    #[test]
    fn test_point_contents_unloaded() {
        let map = CModelContext::new();
        let mut client = TraceClient::new();
        assert_eq!(map.point_contents(&mut client, &[0.0; 3], 0), ContentFlags::empty());

        let h = client.temp_box_model(&[-16.0, -16.0, -24.0], &[16.0, 16.0, 32.0], CONTENTS_BODY);
        assert_eq!(map.point_contents(&mut client, &[0.0, 0.0, 0.0], h), CONTENTS_BODY);
        assert_eq!(map.point_contents(&mut client, &[0.0, 0.0, 40.0], h), ContentFlags::empty());
    }

    #[test]
    fn test_transformed_point_contents() {
        let map = sample();
        let mut client = TraceClient::new();
        let origin = [100.0, 0.0, 0.0];
        assert_eq!(
            map.transformed_point_contents(&mut client, &[308.0, 0.0, 0.0], 1, &origin, &[0.0; 3]),
            CONTENTS_SOLID
        );
        assert_eq!(
            map.transformed_point_contents(&mut client, &[208.0, 0.0, 0.0], 1, &origin, &[0.0; 3]),
            ContentFlags::empty()
        );

        // turned a quarter left, the brush now lies along +y
        let yaw = [0.0, 90.0, 0.0];
        assert_eq!(
            map.transformed_point_contents(&mut client, &[0.0, 208.0, 0.0], 1, &[0.0; 3], &yaw),
            CONTENTS_SOLID
        );
        assert_eq!(
            map.transformed_point_contents(&mut client, &[208.0, 0.0, 0.0], 1, &[0.0; 3], &yaw),
            ContentFlags::empty()
        );
    }

    #[test]
    fn test_box_is_never_rotated() {
        let map = sample();
        let mut client = TraceClient::new();
        let h = client.temp_box_model(&[0.0, -1.0, -1.0], &[10.0, 1.0, 1.0], CONTENTS_BODY);
        let yaw = [0.0, 90.0, 0.0];
        assert_eq!(map.transformed_point_contents(&mut client, &[5.0, 0.0, 0.0], h, &[0.0; 3], &yaw), CONTENTS_BODY);
        assert_eq!(
            map.transformed_point_contents(&mut client, &[0.0, 5.0, 0.0], h, &[0.0; 3], &yaw),
            ContentFlags::empty()
        );
    }

    #[test]
    fn test_box_leafnums() {
        let map = sample();
        let (leafs, topnode) = map.box_leafnums(&[-4.0; 3], &[4.0; 3], 16);
        assert_eq!(leafs, vec![1, 2]);
        assert_eq!(topnode, 0);

        let (leafs, topnode) = map.box_leafnums(&[10.0; 3], &[20.0; 3], 16);
        assert_eq!(leafs, vec![1]);
        assert_eq!(topnode, -1);

        let (leafs, _) = map.box_leafnums(&[-4.0; 3], &[4.0; 3], 1);
        assert_eq!(leafs, vec![1]);
    }

    #[test]
    fn test_in_pvs() {
        let map = sample();
        let a = [5.0, 0.0, 0.0];
        let b = [-5.0, 0.0, 0.0];
        assert!(map.in_pvs(&a, &[70.0, 0.0, 0.0]));
        assert!(map.in_pvs(&b, &[-70.0, 0.0, 0.0]));
        assert!(!map.in_pvs(&a, &b));
        assert!(!map.in_pvs(&b, &a));
        assert!(!map.in_pvs_ignore_portals(&a, &b));

        assert_eq!(map.cluster_pvs(1), &[0b10]);
        assert!(map.cluster_pvs(-1).is_empty());
        assert!(map.cluster_pvs(2).is_empty());
    }

    #[test]
    fn test_in_pvs_without_vis_data() {
        let mut b = BspBuilder::sample();
        b.vis = None;
        let map = CModelContext::from_bsp("maps/novis.bsp", &b.to_bytes()).unwrap();
        assert!(map.in_pvs(&[5.0, 0.0, 0.0], &[-5.0, 0.0, 0.0]));
        assert_eq!(map.cluster_pvs(0), &[0xff]);
    }

    #[test]
    fn test_in_pvs_invalid_cluster() {
        let mut b = BspBuilder::sample();
        b.leafs[2].cluster = -1;
        let map = CModelContext::from_bsp("maps/t.bsp", &b.to_bytes()).unwrap();
        assert!(!map.in_pvs(&[5.0, 0.0, 0.0], &[-5.0, 0.0, 0.0]));
        assert!(!map.in_pvs(&[-5.0, 0.0, 0.0], &[-6.0, 0.0, 0.0]));
        assert!(!CModelContext::new().in_pvs(&[0.0; 3], &[0.0; 3]));
    }

    #[test]
    fn test_in_pvs_matches_cluster_rows() {
        let map = sample();
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let p1 = [rng.gen_range(-300.0..300.0), rng.gen_range(-50.0..50.0), 0.0];
            let p2 = [rng.gen_range(-300.0..300.0), rng.gen_range(-50.0..50.0), 0.0];
            let same_side = (p1[0] >= 0.0) == (p2[0] >= 0.0);
            assert_eq!(map.in_pvs(&p1, &p2), same_side, "{:?} {:?}", p1, p2);
        }
    }
}
