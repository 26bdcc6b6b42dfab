// q_shared.rs — foundational types and math shared by the collision code

// ============================================================
// Basic types
// ============================================================

pub type Vec3 = [f32; 3];

pub const PITCH: usize = 0; // up / down
pub const YAW: usize = 1; // left / right
pub const ROLL: usize = 2; // fall over

// Com_Error codes
pub const ERR_FATAL: i32 = 0;
pub const ERR_DROP: i32 = 1;

// ============================================================
// Content flags
// ============================================================

bitflags::bitflags! {
    /// Material content of a brush, taken from its shader.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ContentFlags: u32 {
        const SOLID       = 0x00000001;
        const LAVA        = 0x00000008;
        const SLIME       = 0x00000010;
        const WATER       = 0x00000020;
        const FOG         = 0x00000040;
        const PLAYERCLIP  = 0x00010000;
        const MONSTERCLIP = 0x00020000;
        const WEAPONCLIP  = 0x00040000;
        const BODY        = 0x02000000;
        const CORPSE      = 0x04000000;
        const DETAIL      = 0x08000000;
        const STRUCTURAL  = 0x10000000;
        const TRANSLUCENT = 0x20000000;
        const TRIGGER     = 0x40000000;
        const NODROP      = 0x80000000;
    }
}
pub const CONTENTS_SOLID: ContentFlags = ContentFlags::SOLID;
pub const CONTENTS_LAVA: ContentFlags = ContentFlags::LAVA;
pub const CONTENTS_SLIME: ContentFlags = ContentFlags::SLIME;
pub const CONTENTS_WATER: ContentFlags = ContentFlags::WATER;
pub const CONTENTS_FOG: ContentFlags = ContentFlags::FOG;
pub const CONTENTS_PLAYERCLIP: ContentFlags = ContentFlags::PLAYERCLIP;
pub const CONTENTS_MONSTERCLIP: ContentFlags = ContentFlags::MONSTERCLIP;
pub const CONTENTS_WEAPONCLIP: ContentFlags = ContentFlags::WEAPONCLIP;
pub const CONTENTS_BODY: ContentFlags = ContentFlags::BODY;
pub const CONTENTS_CORPSE: ContentFlags = ContentFlags::CORPSE;
pub const CONTENTS_DETAIL: ContentFlags = ContentFlags::DETAIL;
pub const CONTENTS_STRUCTURAL: ContentFlags = ContentFlags::STRUCTURAL;
pub const CONTENTS_TRANSLUCENT: ContentFlags = ContentFlags::TRANSLUCENT;
pub const CONTENTS_TRIGGER: ContentFlags = ContentFlags::TRIGGER;
pub const CONTENTS_NODROP: ContentFlags = ContentFlags::NODROP;

// ============================================================
// Content masks
// ============================================================

pub const MASK_ALL: ContentFlags = ContentFlags::all();
pub const MASK_SOLID: ContentFlags = ContentFlags::SOLID;
pub const MASK_PLAYERSOLID: ContentFlags = ContentFlags::SOLID
    .union(ContentFlags::PLAYERCLIP)
    .union(ContentFlags::BODY);
pub const MASK_MONSTERSOLID: ContentFlags = ContentFlags::SOLID
    .union(ContentFlags::MONSTERCLIP)
    .union(ContentFlags::BODY);
pub const MASK_DEADSOLID: ContentFlags = ContentFlags::SOLID.union(ContentFlags::PLAYERCLIP);
pub const MASK_WATER: ContentFlags = ContentFlags::WATER
    .union(ContentFlags::LAVA)
    .union(ContentFlags::SLIME);
pub const MASK_OPAQUE: ContentFlags = ContentFlags::SOLID
    .union(ContentFlags::SLIME)
    .union(ContentFlags::LAVA);
pub const MASK_SHOT: ContentFlags = ContentFlags::SOLID
    .union(ContentFlags::BODY)
    .union(ContentFlags::CORPSE)
    .union(ContentFlags::WEAPONCLIP);

// ============================================================
// Surface flags
// ============================================================

bitflags::bitflags! {
    /// Per-face surface properties, taken from the brush side's shader.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct SurfaceFlags: u32 {
        const NODAMAGE    = 0x00000001; // never give falling damage
        const SLICK       = 0x00000002;
        const SKY         = 0x00000004;
        const LADDER      = 0x00000008;
        const NOIMPACT    = 0x00000010; // don't make missile explosions
        const NOMARKS     = 0x00000020; // don't leave missile marks
        const FLESH       = 0x00000040;
        const NODRAW      = 0x00000080;
        const HINT        = 0x00000100;
        const SKIP        = 0x00000200;
        const NOLIGHTMAP  = 0x00000400;
        const POINTLIGHT  = 0x00000800;
        const METALSTEPS  = 0x00001000;
        const NOSTEPS     = 0x00002000;
        const NONSOLID    = 0x00004000;
        const LIGHTFILTER = 0x00008000;
        const ALPHASHADOW = 0x00010000;
        const NODLIGHT    = 0x00020000;
        const PAPER       = 0x00040000;
        const WOOD        = 0x00080000;
        const ROCK        = 0x00100000;
        const DIRT        = 0x00200000;
        const GRILL       = 0x00400000;
        const GRASS       = 0x00800000;
        const MUD         = 0x01000000;
        const PUDDLE      = 0x02000000;
        const GLASS       = 0x04000000;
        const GRAVEL      = 0x08000000;
        const SAND        = 0x10000000;
    }
}

impl SurfaceFlags {
    /// Flags that pick a footstep / impact material.
    pub const MATERIALS: SurfaceFlags = SurfaceFlags::PAPER
        .union(SurfaceFlags::WOOD)
        .union(SurfaceFlags::ROCK)
        .union(SurfaceFlags::DIRT)
        .union(SurfaceFlags::GRILL)
        .union(SurfaceFlags::GRASS)
        .union(SurfaceFlags::MUD)
        .union(SurfaceFlags::PUDDLE)
        .union(SurfaceFlags::GLASS)
        .union(SurfaceFlags::GRAVEL)
        .union(SurfaceFlags::SAND);
}

// ============================================================
// Cvar flags
// ============================================================

pub const CVAR_NOSET: i32 = 8; // only settable from the command line

// ============================================================
// Plane
// ============================================================

pub const PLANE_X: u8 = 0;
pub const PLANE_Y: u8 = 1;
pub const PLANE_Z: u8 = 2;
pub const PLANE_NON_AXIAL: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CPlane {
    pub normal: Vec3,
    pub dist: f32,
    pub plane_type: u8, // for fast side tests
    pub signbits: u8,   // signx + (signy<<1) + (signz<<2)
}

impl Default for CPlane {
    fn default() -> Self {
        Self {
            normal: [0.0; 3],
            dist: 0.0,
            plane_type: PLANE_NON_AXIAL,
            signbits: 0,
        }
    }
}

impl CPlane {
    /// Build a plane and derive its type and signbits.
    pub fn new(normal: Vec3, dist: f32) -> Self {
        Self {
            normal,
            dist,
            plane_type: plane_type_for_normal(&normal),
            signbits: signbits_for_normal(&normal),
        }
    }

    /// Signed distance from the plane. Axial planes skip the dot product.
    #[inline]
    pub fn distance(&self, p: &Vec3) -> f32 {
        if self.plane_type < PLANE_NON_AXIAL {
            p[self.plane_type as usize] - self.dist
        } else {
            dot_product(&self.normal, p) - self.dist
        }
    }
}

/// Axial only when the component is exactly +1; negative axial normals
/// take the general path so `distance` stays correct.
pub fn plane_type_for_normal(normal: &Vec3) -> u8 {
    if normal[0] == 1.0 {
        PLANE_X
    } else if normal[1] == 1.0 {
        PLANE_Y
    } else if normal[2] == 1.0 {
        PLANE_Z
    } else {
        PLANE_NON_AXIAL
    }
}

pub fn signbits_for_normal(normal: &Vec3) -> u8 {
    let mut bits = 0u8;
    for j in 0..3 {
        if normal[j] < 0.0 {
            bits |= 1 << j;
        }
    }
    bits
}

// ============================================================
// Trace
// ============================================================

/// Result of a swept box query.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    pub allsolid: bool,   // never left solid
    pub startsolid: bool, // started inside a brush
    pub fraction: f32,    // 1.0 = nothing hit
    pub endpos: Vec3,
    pub plane: CPlane,
    pub surface_flags: SurfaceFlags,
    pub contents: ContentFlags,
    // filled in by the entity layer
    pub ent_index: i32,
}

impl Default for Trace {
    fn default() -> Self {
        Self {
            allsolid: false,
            startsolid: false,
            fraction: 1.0,
            endpos: [0.0; 3],
            plane: CPlane::default(),
            surface_flags: SurfaceFlags::empty(),
            contents: ContentFlags::empty(),
            ent_index: -1,
        }
    }
}

// ============================================================
// MATHLIB: vector operations
// ============================================================

#[inline]
pub fn dot_product(a: &Vec3, b: &Vec3) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
pub fn vector_subtract(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

/// Point `frac` of the way from `a` to `b`.
#[inline]
pub fn vector_lerp(a: &Vec3, b: &Vec3, frac: f32) -> Vec3 {
    [
        a[0] + frac * (b[0] - a[0]),
        a[1] + frac * (b[1] - a[1]),
        a[2] + frac * (b[2] - a[2]),
    ]
}

pub fn vector_compare(v1: &Vec3, v2: &Vec3) -> bool {
    v1[0] == v2[0] && v1[1] == v2[1] && v1[2] == v2[2]
}

pub fn vector_is_zero(v: &Vec3) -> bool {
    v[0] == 0.0 && v[1] == 0.0 && v[2] == 0.0
}

// ============================================================
// Angle functions
// ============================================================

/// Forward / right / up for pitch, yaw, roll in degrees.
pub fn angle_vectors(angles: &Vec3) -> (Vec3, Vec3, Vec3) {
    let (sy, cy) = angles[YAW].to_radians().sin_cos();
    let (sp, cp) = angles[PITCH].to_radians().sin_cos();
    let (sr, cr) = angles[ROLL].to_radians().sin_cos();

    let forward = [cp * cy, cp * sy, -sp];
    let right = [
        -sr * sp * cy + -cr * -sy,
        -sr * sp * sy + -cr * cy,
        -sr * cp,
    ];
    let up = [
        cr * sp * cy + -sr * -sy,
        cr * sp * sy + -sr * cy,
        cr * cp,
    ];
    (forward, right, up)
}

/// Express `v` in the frame described by `angles` (x forward, y left, z up).
pub fn rotate_into_frame(v: &Vec3, angles: &Vec3) -> Vec3 {
    let (forward, right, up) = angle_vectors(angles);
    [
        dot_product(v, &forward),
        -dot_product(v, &right),
        dot_product(v, &up),
    ]
}

/// Inverse of `rotate_into_frame`.
pub fn rotate_out_of_frame(v: &Vec3, angles: &Vec3) -> Vec3 {
    let (forward, right, up) = angle_vectors(angles);
    let mut out = [0.0f32; 3];
    for i in 0..3 {
        out[i] = forward[i] * v[0] - right[i] * v[1] + up[i] * v[2];
    }
    out
}

/// Returns 1 (front), 2 (back), or 3 (crossing) for a box vs. plane test.
pub fn box_on_plane_side(emins: &Vec3, emaxs: &Vec3, p: &CPlane) -> i32 {
    // fast axial cases
    if p.plane_type < PLANE_NON_AXIAL {
        let t = p.plane_type as usize;
        if p.dist <= emins[t] {
            return 1;
        }
        if p.dist >= emaxs[t] {
            return 2;
        }
        return 3;
    }

    // general case: pick the nearest and farthest corners from the signbits
    let mut near = [0.0f32; 3];
    let mut far = [0.0f32; 3];
    for j in 0..3 {
        if p.signbits & (1 << j) != 0 {
            far[j] = emins[j];
            near[j] = emaxs[j];
        } else {
            far[j] = emaxs[j];
            near[j] = emins[j];
        }
    }
    let dist1 = dot_product(&p.normal, &far);
    let dist2 = dot_product(&p.normal, &near);

    let mut sides = 0;
    if dist1 >= p.dist {
        sides = 1;
    }
    if dist2 < p.dist {
        sides |= 2;
    }
    sides
}

// ============================================================
// Tests
// ============================================================
