// test_map.rs — writes small FAKK BSP files for the collision tests
//
// The sample map, seen from above (y and z span -16..16 for every brush):
//
//   x:  -16 .. 16    solid cube, brush 0, top face is a metal grate
//        32 .. 64    water, brush 1
//        48 .. 80    trigger, brush 2
//       200 .. 216   solid, brush 3, only reachable through model 1
//
// One node splits on x = 0: leaf 1 (x >= 0, cluster 1, area 1) holds
// brushes 0 1 2, leaf 2 (x < 0, cluster 0, area 0) holds brush 0.
//
// `corridor` and `ramp` below cover deeper trees and sloped sides.

use crate::q_shared::{
    ContentFlags, SurfaceFlags, Vec3, CONTENTS_SOLID, CONTENTS_TRIGGER, CONTENTS_WATER,
};
use crate::qfiles::*;

pub(crate) struct LeafRec {
    pub cluster: i32,
    pub area: i32,
    pub first_brush: i32,
    pub num_brushes: i32,
}

pub(crate) struct ModelRec {
    pub mins: Vec3,
    pub maxs: Vec3,
    pub first_brush: i32,
    pub num_brushes: i32,
}

/// Lump contents as plain records. Fields are public so tests can break
/// exactly one thing before serializing.
pub(crate) struct BspBuilder {
    pub ident: i32,
    pub version: i32,
    pub checksum: i32,
    /// name, surface flags, content flags
    pub shaders: Vec<(String, u32, u32)>,
    pub planes: Vec<(Vec3, f32)>,
    /// plane, children
    pub nodes: Vec<(i32, [i32; 2])>,
    pub leafs: Vec<LeafRec>,
    pub leafbrushes: Vec<i32>,
    /// plane, shader
    pub brushsides: Vec<(i32, i32)>,
    /// first side, side count, shader
    pub brushes: Vec<(i32, i32, i32)>,
    pub models: Vec<ModelRec>,
    /// cluster count, bytes per row, rows
    pub vis: Option<(i32, i32, Vec<u8>)>,
    pub entities: String,
    /// Overrides the computed descriptor of one lump.
    pub lump_override: Option<(usize, Lump)>,
}

impl BspBuilder {
    pub fn empty() -> Self {
        Self {
            ident: BSP_IDENT,
            version: BSP_VERSION,
            checksum: 0x1234,
            shaders: Vec::new(),
            planes: Vec::new(),
            nodes: Vec::new(),
            leafs: Vec::new(),
            leafbrushes: Vec::new(),
            brushsides: Vec::new(),
            brushes: Vec::new(),
            models: Vec::new(),
            vis: None,
            entities: String::new(),
            lump_override: None,
        }
    }

    /// A brush bounded by `sides`, each a plane the solid lies behind.
    /// Returns the brush number.
    pub fn add_brush(&mut self, sides: &[(Vec3, f32)], shader: i32) -> i32 {
        let first_side = self.brushsides.len() as i32;
        for &(normal, dist) in sides {
            self.planes.push((normal, dist));
            self.brushsides.push((self.planes.len() as i32 - 1, shader));
        }
        self.brushes.push((first_side, sides.len() as i32, shader));
        self.brushes.len() as i32 - 1
    }

    /// Six axial sides, +x -x +y -y +z -z. Returns the brush number.
    pub fn add_box_brush(&mut self, mins: Vec3, maxs: Vec3, shader: i32) -> i32 {
        let mut sides = Vec::with_capacity(6);
        for axis in 0..3 {
            let mut normal = [0.0f32; 3];
            normal[axis] = 1.0;
            sides.push((normal, maxs[axis]));
            normal[axis] = -1.0;
            sides.push((normal, -mins[axis]));
        }
        self.add_brush(&sides, shader)
    }

    /// The map drawn at the top of this file.
    pub fn sample() -> Self {
        let mut b = Self::empty();
        b.shaders = vec![
            ("textures/common/solid".into(), 0, CONTENTS_SOLID.bits()),
            ("textures/liquids/water".into(), SurfaceFlags::NONSOLID.bits(), CONTENTS_WATER.bits()),
            ("textures/common/trigger".into(), SurfaceFlags::NODRAW.bits(), CONTENTS_TRIGGER.bits()),
            (
                "textures/metal/grate".into(),
                SurfaceFlags::METALSTEPS.bits(),
                CONTENTS_SOLID.bits(),
            ),
        ];

        // split plane
        b.planes.push(([1.0, 0.0, 0.0], 0.0));

        let cube = b.add_box_brush([-16.0; 3], [16.0; 3], 0);
        b.add_box_brush([32.0, -16.0, -16.0], [64.0, 16.0, 16.0], 1);
        b.add_box_brush([48.0, -16.0, -16.0], [80.0, 16.0, 16.0], 2);
        b.add_box_brush([200.0, -16.0, -16.0], [216.0, 16.0, 16.0], 0);

        // grate on top of the cube
        let top = b.brushes[cube as usize].0 + 4;
        b.brushsides[top as usize].1 = 3;

        b.nodes.push((0, [-2, -3]));
        b.leafbrushes = vec![0, 1, 2, 0];
        b.leafs = vec![
            LeafRec { cluster: -1, area: -1, first_brush: 0, num_brushes: 0 },
            LeafRec { cluster: 1, area: 1, first_brush: 0, num_brushes: 3 },
            LeafRec { cluster: 0, area: 0, first_brush: 3, num_brushes: 1 },
        ];
        b.models = vec![
            ModelRec { mins: [-16.0; 3], maxs: [80.0, 16.0, 16.0], first_brush: 0, num_brushes: 3 },
            ModelRec {
                mins: [200.0, -16.0, -16.0],
                maxs: [216.0, 16.0, 16.0],
                first_brush: 3,
                num_brushes: 1,
            },
        ];
        // each cluster sees only itself
        b.vis = Some((2, 1, vec![0b01, 0b10]));
        b.entities = "{\n\"classname\" \"worldspawn\"\n}\n{\n\"classname\" \"func_door\"\n\"model\" \"*1\"\n}\n\0"
            .to_string();
        b
    }

    /// A floor under three nested splits, with a wall at the +x end.
    ///
    ///   floor  x -128..128, y -128..128, z -16..0   brush 0
    ///   wall   x   96..112, y -128..128, z   0..64  brush 1
    ///
    /// Node 0 splits x = 0, node 1 splits x = 64, node 2 splits x = -64.
    /// Leafs 0..3 run from +x to -x (clusters 0..3, all area 0); only
    /// leaf 0 holds the wall.
    pub fn corridor() -> Self {
        let mut b = Self::empty();
        b.shaders = vec![("textures/common/solid".into(), 0, CONTENTS_SOLID.bits())];
        b.planes.push(([1.0, 0.0, 0.0], 0.0));
        b.planes.push(([1.0, 0.0, 0.0], 64.0));
        b.planes.push(([1.0, 0.0, 0.0], -64.0));

        b.add_box_brush([-128.0, -128.0, -16.0], [128.0, 128.0, 0.0], 0);
        b.add_box_brush([96.0, -128.0, 0.0], [112.0, 128.0, 64.0], 0);

        b.nodes = vec![(0, [1, 2]), (1, [-1, -2]), (2, [-3, -4])];
        b.leafbrushes = vec![0, 1, 0, 0, 0];
        b.leafs = vec![
            LeafRec { cluster: 0, area: 0, first_brush: 0, num_brushes: 2 },
            LeafRec { cluster: 1, area: 0, first_brush: 2, num_brushes: 1 },
            LeafRec { cluster: 2, area: 0, first_brush: 3, num_brushes: 1 },
            LeafRec { cluster: 3, area: 0, first_brush: 4, num_brushes: 1 },
        ];
        b.models = vec![ModelRec {
            mins: [-128.0, -128.0, -16.0],
            maxs: [128.0, 128.0, 64.0],
            first_brush: 0,
            num_brushes: 2,
        }];
        b.entities = "{\n\"classname\" \"worldspawn\"\n}\n".to_string();
        b
    }

    /// One wedge, 0 <= z <= x <= 64 and |y| <= 64, so its top is a 45
    /// degree slope rising towards +x. The only node splits on the
    /// diagonal x + y = 0 and both leafs hold the wedge.
    pub fn ramp() -> Self {
        let s = std::f32::consts::FRAC_1_SQRT_2;
        let mut b = Self::empty();
        b.shaders = vec![("textures/common/solid".into(), 0, CONTENTS_SOLID.bits())];
        b.planes.push(([s, s, 0.0], 0.0));
        b.add_brush(
            &[
                ([-s, 0.0, s], 0.0),
                ([0.0, 0.0, -1.0], 0.0),
                ([1.0, 0.0, 0.0], 64.0),
                ([0.0, 1.0, 0.0], 64.0),
                ([0.0, -1.0, 0.0], 64.0),
            ],
            0,
        );
        b.nodes = vec![(0, [-1, -2])];
        b.leafbrushes = vec![0, 0];
        b.leafs = vec![
            LeafRec { cluster: 0, area: 0, first_brush: 0, num_brushes: 1 },
            LeafRec { cluster: 0, area: 0, first_brush: 1, num_brushes: 1 },
        ];
        b.models = vec![ModelRec { mins: [0.0, -64.0, 0.0], maxs: [64.0; 3], first_brush: 0, num_brushes: 1 }];
        b
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut lumps: Vec<Vec<u8>> = vec![Vec::new(); HEADER_LUMPS];

        for (name, surf, contents) in &self.shaders {
            let out = &mut lumps[LUMP_SHADERS];
            let mut field = [0u8; MAX_QPATH];
            let n = name.len().min(MAX_QPATH - 1);
            field[..n].copy_from_slice(&name.as_bytes()[..n]);
            out.extend_from_slice(&field);
            out.extend_from_slice(&surf.to_le_bytes());
            out.extend_from_slice(&contents.to_le_bytes());
            out.extend_from_slice(&0i32.to_le_bytes());
        }
        for (normal, dist) in &self.planes {
            put_floats(&mut lumps[LUMP_PLANES], normal);
            put_floats(&mut lumps[LUMP_PLANES], &[*dist]);
        }
        for (plane, children) in &self.nodes {
            put_ints(&mut lumps[LUMP_NODES], &[*plane, children[0], children[1]]);
            put_ints(&mut lumps[LUMP_NODES], &[0; 6]);
        }
        for leaf in &self.leafs {
            put_ints(
                &mut lumps[LUMP_LEAFS],
                &[leaf.cluster, leaf.area, 0, 0, 0, 0, 0, 0, 0, 0, leaf.first_brush, leaf.num_brushes],
            );
        }
        put_ints(&mut lumps[LUMP_LEAFBRUSHES], &self.leafbrushes);
        for (plane, shader) in &self.brushsides {
            put_ints(&mut lumps[LUMP_BRUSHSIDES], &[*plane, *shader]);
        }
        for (first, num, shader) in &self.brushes {
            put_ints(&mut lumps[LUMP_BRUSHES], &[*first, *num, *shader]);
        }
        for m in &self.models {
            put_floats(&mut lumps[LUMP_MODELS], &m.mins);
            put_floats(&mut lumps[LUMP_MODELS], &m.maxs);
            put_ints(&mut lumps[LUMP_MODELS], &[0, 0, m.first_brush, m.num_brushes]);
        }
        if let Some((n, bytes, rows)) = &self.vis {
            put_ints(&mut lumps[LUMP_VISIBILITY], &[*n, *bytes]);
            lumps[LUMP_VISIBILITY].extend_from_slice(rows);
        }
        lumps[LUMP_ENTITIES].extend_from_slice(self.entities.as_bytes());
        // render data the collision code must not care about
        lumps[LUMP_LIGHTMAPS] = vec![0xcd; 7];

        let mut out = Vec::new();
        put_ints(&mut out, &[self.ident, self.version, self.checksum]);
        out.resize(DHEADER_SIZE, 0);

        let mut descriptors = [Lump::default(); HEADER_LUMPS];
        for (i, data) in lumps.iter().enumerate() {
            while out.len() % 4 != 0 {
                out.push(0);
            }
            descriptors[i] = Lump { fileofs: out.len() as i32, filelen: data.len() as i32 };
            out.extend_from_slice(data);
        }
        if let Some((i, lump)) = self.lump_override {
            descriptors[i] = lump;
        }
        for (i, l) in descriptors.iter().enumerate() {
            let at = 12 + i * 8;
            out[at..at + 4].copy_from_slice(&l.fileofs.to_le_bytes());
            out[at + 4..at + 8].copy_from_slice(&l.filelen.to_le_bytes());
        }
        out
    }
}

fn put_ints(out: &mut Vec<u8>, values: &[i32]) {
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
}

fn put_floats(out: &mut Vec<u8>, values: &[f32]) {
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
}

/// The sample map as file bytes.
pub(crate) fn build() -> Vec<u8> {
    BspBuilder::sample().to_bytes()
}

/// Contents of the shader a brush side was given, for assertions.
pub(crate) fn shader_contents(b: &BspBuilder, shader: usize) -> ContentFlags {
    ContentFlags::from_bits_retain(b.shaders[shader].2)
}
