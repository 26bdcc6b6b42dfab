// qfiles.rs — FAKK BSP file format structures
//
// Everything on disk is little-endian. The structs document the record
// layouts and give the loader its strides; records are decoded field by
// field, never transmuted.

use std::mem::size_of;

// ============================================================
// BSP header
// ============================================================

/// "FAKK" in little-endian
pub const BSP_IDENT: i32 =
    (b'K' as i32) << 24 | (b'K' as i32) << 16 | (b'A' as i32) << 8 | b'F' as i32;
pub const BSP_VERSION: i32 = 12;

pub const LUMP_SHADERS: usize = 0;
pub const LUMP_PLANES: usize = 1;
pub const LUMP_LIGHTMAPS: usize = 2;
pub const LUMP_SURFACES: usize = 3;
pub const LUMP_DRAWVERTS: usize = 4;
pub const LUMP_DRAWINDEXES: usize = 5;
pub const LUMP_LEAFBRUSHES: usize = 6;
pub const LUMP_LEAFSURFACES: usize = 7;
pub const LUMP_LEAFS: usize = 8;
pub const LUMP_NODES: usize = 9;
pub const LUMP_BRUSHSIDES: usize = 10;
pub const LUMP_BRUSHES: usize = 11;
pub const LUMP_FOGS: usize = 12;
pub const LUMP_MODELS: usize = 13;
pub const LUMP_ENTITIES: usize = 14;
pub const LUMP_VISIBILITY: usize = 15;
pub const LUMP_LIGHTGRID: usize = 16;
pub const LUMP_ENTLIGHTS: usize = 17;
pub const LUMP_ENTLIGHTSVIS: usize = 18;
pub const LUMP_LIGHTDEFS: usize = 19;
pub const HEADER_LUMPS: usize = 20;

/// Human readable lump names, indexed by LUMP_*.
pub const LUMP_NAMES: [&str; HEADER_LUMPS] = [
    "shaders", "planes", "lightmaps", "surfaces", "drawverts", "drawindexes",
    "leafbrushes", "leafsurfaces", "leafs", "nodes", "brushsides", "brushes",
    "fogs", "models", "entities", "visibility", "lightgrid", "entlights",
    "entlightsvis", "lightdefs",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct Lump {
    pub fileofs: i32,
    pub filelen: i32,
}

#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct DHeader {
    pub ident: i32,
    pub version: i32,
    pub checksum: i32,
    pub lumps: [Lump; HEADER_LUMPS],
}

// ============================================================
// Lump records
// ============================================================

pub const MAX_QPATH: usize = 64;

#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct DShader {
    pub shader: [u8; MAX_QPATH],
    pub surface_flags: i32,
    pub content_flags: i32,
    pub subdivisions: i32,
}

#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct DPlane {
    pub normal: [f32; 3],
    pub dist: f32,
}

#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct DNode {
    pub plane_num: i32,
    pub children: [i32; 2], // negative numbers are -(leafs+1), not nodes
    pub mins: [i32; 3],     // for frustum culling
    pub maxs: [i32; 3],
}

#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct DLeaf {
    pub cluster: i32, // -1 = opaque (solid) leaf
    pub area: i32,
    pub mins: [i32; 3],
    pub maxs: [i32; 3],
    pub first_leaf_surface: i32,
    pub num_leaf_surfaces: i32,
    pub first_leaf_brush: i32,
    pub num_leaf_brushes: i32,
}

#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct DBrushSide {
    pub plane_num: i32, // positive plane side faces out of the leaf
    pub shader_num: i32,
}

#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct DBrush {
    pub first_side: i32,
    pub num_sides: i32,
    pub shader_num: i32, // the shader that determines the contents flags
}

#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct DModel {
    pub mins: [f32; 3],
    pub maxs: [f32; 3],
    pub first_surface: i32,
    pub num_surfaces: i32,
    pub first_brush: i32,
    pub num_brushes: i32,
}

/// Visibility lump header; the cluster bitset follows.
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct DVisHeader {
    pub num_clusters: i32,
    pub cluster_bytes: i32,
}

pub const DHEADER_SIZE: usize = size_of::<DHeader>();
pub const DSHADER_SIZE: usize = size_of::<DShader>();
pub const DPLANE_SIZE: usize = size_of::<DPlane>();
pub const DNODE_SIZE: usize = size_of::<DNode>();
pub const DLEAF_SIZE: usize = size_of::<DLeaf>();
pub const DLEAFBRUSH_SIZE: usize = size_of::<i32>();
pub const DBRUSHSIDE_SIZE: usize = size_of::<DBrushSide>();
pub const DBRUSH_SIZE: usize = size_of::<DBrush>();
pub const DMODEL_SIZE: usize = size_of::<DModel>();
pub const DVISHEADER_SIZE: usize = size_of::<DVisHeader>();

// ============================================================
// Collision limits
// ============================================================

pub const MAX_SUBMODELS: usize = 256;
pub const MAX_CM_SHADERS: usize = 1024;
pub const MAX_CM_PLANES: usize = 65536;
pub const MAX_CM_BRUSHSIDES: usize = 65536;
pub const MAX_CM_BRUSHES: usize = 8192;
pub const MAX_CM_LEAFS: usize = 65536;
pub const MAX_CM_LEAFBRUSHES: usize = 65536;
pub const MAX_CM_NODES: usize = 65536;
pub const MAX_CM_AREAS: usize = 256;
pub const MAX_CM_AREAPORTALS: usize = 1024;

// ============================================================
// Tests
// ============================================================
