// cmodel/mod.rs — collision model: map state, handles and the global surface
//
// The map is immutable while it is being queried. Everything a query needs
// to scribble on (brush dedup stamps, the temporary box brush, counters)
// lives in a `TraceClient` owned by the caller.

mod box_model;
mod load;
mod query;
mod trace;

#[cfg(test)]
pub(crate) mod test_map;

pub use box_model::{CmStats, TraceClient};
pub use load::LoadError;

use std::io::{Read, Write};

use parking_lot::Mutex;
use thiserror::Error;

use crate::common::{com_error, com_printf};
use crate::cvar::{cvar_get, cvar_variable_value};
use crate::files::FileReader;
use crate::q_shared::{
    ContentFlags, CPlane, SurfaceFlags, Trace, Vec3, ERR_DROP,
};
use crate::qfiles::MAX_SUBMODELS;

// ============================================================
// Runtime structures
// ============================================================

/// Index of a clippable model. 0 is the world, 1.. are inline models.
pub type ClipHandle = i32;

/// The temporary box brush. One past the last possible inline model.
pub const BOX_MODEL_HANDLE: ClipHandle = MAX_SUBMODELS as ClipHandle;

/// Keeps traces a hair off the surfaces they hit.
pub(crate) const DIST_EPSILON: f32 = 0.03125;

#[derive(Debug, Clone, Copy, Default)]
pub struct CNode {
    pub plane_idx: usize,
    pub children: [i32; 2], // negative numbers are leafs
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CBrushSide {
    pub plane_idx: usize,
    pub surface_flags: SurfaceFlags,
    pub shader_num: i32,
}

#[derive(Debug, Clone, Copy)]
pub struct CLeaf {
    pub cluster: i32,
    pub area: i32,
    pub firstleafbrush: usize,
    pub numleafbrushes: usize,
}

impl Default for CLeaf {
    fn default() -> Self {
        Self {
            cluster: -1,
            area: 0,
            firstleafbrush: 0,
            numleafbrushes: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CBrush {
    pub contents: ContentFlags,
    pub firstbrushside: usize,
    pub numsides: usize,
    pub shader_num: i32,
}

#[derive(Debug, Clone, Default)]
pub struct CShader {
    pub name: String,
    pub surface_flags: SurfaceFlags,
    pub content_flags: ContentFlags,
}

/// An inline model. Its brushes are gathered into one synthetic leaf.
#[derive(Debug, Clone, Copy, Default)]
pub struct CModel {
    pub mins: Vec3,
    pub maxs: Vec3,
    pub firstbrush: usize,
    pub numbrushes: usize,
    pub leaf: CLeaf,
}

/// Uncompressed cluster-to-cluster visibility.
#[derive(Debug, Clone, Default)]
pub struct VisData {
    pub numclusters: usize,
    pub clusterbytes: usize,
    /// Empty when the map has no vis lump: everything sees everything.
    pub data: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum CmError {
    #[error("area {area} out of range (map has {numareas})")]
    BadArea { area: i32, numareas: usize },

    #[error("portal state holds {got} bytes, map needs {expected}")]
    BadPortalState { got: usize, expected: usize },

    #[error("portal state i/o: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================
// Context: holds all loaded map state
// ============================================================

#[derive(Debug, Clone)]
pub struct CModelContext {
    pub map_name: String,
    pub loaded: bool,
    /// Block checksum of the whole file.
    pub checksum: u32,
    /// Checksum word stored in the header by the compiler.
    pub header_checksum: i32,

    pub map_shaders: Vec<CShader>,
    pub map_planes: Vec<CPlane>,
    pub map_nodes: Vec<CNode>,
    pub map_leafs: Vec<CLeaf>,
    pub map_leafbrushes: Vec<usize>,
    pub map_brushsides: Vec<CBrushSide>,
    pub map_brushes: Vec<CBrush>,
    pub map_cmodels: Vec<CModel>,
    pub vis: VisData,
    pub map_entitystring: String,

    pub numclusters: usize,
    pub numareas: usize,
    /// numareas * numareas, always symmetric.
    pub area_portals: Vec<bool>,
    /// cm_noAreas: every area reaches every other.
    pub no_areas: bool,

    /// Full-visibility row handed out when there is no vis data.
    all_visible: Vec<u8>,
}

impl CModelContext {
    /// An empty map: one leaf, the world model, nothing solid.
    pub fn new() -> Self {
        Self {
            map_name: String::new(),
            loaded: false,
            checksum: 0,
            header_checksum: 0,
            map_shaders: Vec::new(),
            map_planes: Vec::new(),
            map_nodes: Vec::new(),
            map_leafs: vec![CLeaf::default()], // allow leaf funcs to be called without a map
            map_leafbrushes: Vec::new(),
            map_brushsides: Vec::new(),
            map_brushes: Vec::new(),
            map_cmodels: vec![CModel::default()],
            vis: VisData::default(),
            map_entitystring: String::new(),
            numclusters: 0,
            numareas: 1,
            area_portals: vec![false],
            no_areas: false,
            all_visible: Vec::new(),
        }
    }

    // ============================================================
    // CM_LoadMap / CM_ClearMap
    // ============================================================

    /// Loads `name` through `fs`. An empty name clears the map, the name
    /// already loaded is a no-op. On failure the previous map stays.
    pub fn load_map(&mut self, name: &str, fs: &mut dyn FileReader) -> Result<u32, LoadError> {
        if name.is_empty() {
            self.clear_map();
            return Ok(0);
        }
        if self.loaded && self.map_name.eq_ignore_ascii_case(name) {
            return Ok(self.checksum);
        }

        let data = match fs.load_file(name) {
            Some(d) => d,
            None => {
                let err = LoadError::NotFound(name.to_string());
                log::warn!("CM_LoadMap: {}", err);
                return Err(err);
            }
        };

        match Self::from_bsp(name, &data) {
            Ok(mut map) => {
                map.no_areas = self.no_areas;
                *self = map;
                com_printf(&format!(
                    "CM_LoadMap: {}: {} planes, {} brushes, {} nodes, {} leafs, {} models\n",
                    name,
                    self.map_planes.len(),
                    self.map_brushes.len(),
                    self.map_nodes.len(),
                    self.map_leafs.len(),
                    self.map_cmodels.len(),
                ));
                Ok(self.checksum)
            }
            Err(e) => {
                log::warn!("CM_LoadMap: {}: {}", name, e);
                Err(e)
            }
        }
    }

    /// Drops the current map.
    pub fn clear_map(&mut self) {
        let no_areas = self.no_areas;
        *self = Self::new();
        self.no_areas = no_areas;
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Name the current map was loaded under, empty when none is.
    pub fn map_name(&self) -> &str {
        &self.map_name
    }

    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    // ============================================================
    // Public accessors
    // ============================================================

    pub fn num_inline_models(&self) -> usize {
        self.map_cmodels.len()
    }

    pub fn inline_model(&self, index: i32) -> ClipHandle {
        if index < 0 || index as usize >= self.map_cmodels.len() {
            com_error(ERR_DROP, &format!("CM_InlineModel: bad number {}", index));
        }
        index
    }

    pub fn num_clusters(&self) -> usize {
        self.numclusters
    }

    pub fn num_areas(&self) -> usize {
        self.numareas
    }

    pub fn entity_string(&self) -> &str {
        &self.map_entitystring
    }

    pub fn leaf_cluster(&self, leafnum: i32) -> i32 {
        if leafnum < 0 {
            return -1;
        }
        self.map_leafs.get(leafnum as usize).map_or(-1, |l| l.cluster)
    }

    pub fn leaf_area(&self, leafnum: i32) -> i32 {
        if leafnum < 0 {
            return 0;
        }
        self.map_leafs.get(leafnum as usize).map_or(0, |l| l.area)
    }

    /// Bounds of an inline model or of the client's temporary box.
    pub fn model_bounds(&self, client: &TraceClient, handle: ClipHandle) -> (Vec3, Vec3) {
        if handle == BOX_MODEL_HANDLE {
            return client.box_bounds();
        }
        let cmod = self.cmodel_for_handle(handle);
        (cmod.mins, cmod.maxs)
    }

    /// Fatal on anything that is neither an inline model nor the box.
    pub(crate) fn cmodel_for_handle(&self, handle: ClipHandle) -> &CModel {
        if handle < 0 || handle as usize >= self.map_cmodels.len() {
            com_error(ERR_DROP, &format!("CM_ClipHandleToModel: bad handle {}", handle));
        }
        &self.map_cmodels[handle as usize]
    }

    // ============================================================
    // Area portals
    // ============================================================

    fn area_index(&self, area: i32) -> Option<usize> {
        if area < 0 || area as usize >= self.numareas {
            None
        } else {
            Some(area as usize)
        }
    }

    /// Opens or closes the portal between two areas. Both directions are
    /// written together.
    ///
    /// Only areas some leaf of the current map belongs to are accepted
    /// (`0..numareas`), not everything below `MAX_CM_AREAS`. With no map
    /// loaded that leaves area 0 alone.
    pub fn adjust_area_portal_state(&mut self, area1: i32, area2: i32, open: bool) -> Result<(), CmError> {
        let numareas = self.numareas;
        let (a1, a2) = match (self.area_index(area1), self.area_index(area2)) {
            (Some(a1), Some(a2)) => (a1, a2),
            (None, _) => {
                log::warn!("CM_AdjustAreaPortalState: bad area {}", area1);
                return Err(CmError::BadArea { area: area1, numareas });
            }
            (_, None) => {
                log::warn!("CM_AdjustAreaPortalState: bad area {}", area2);
                return Err(CmError::BadArea { area: area2, numareas });
            }
        };
        self.area_portals[a1 * numareas + a2] = open;
        self.area_portals[a2 * numareas + a1] = open;
        Ok(())
    }

    pub fn areas_connected(&self, area1: i32, area2: i32) -> bool {
        if self.no_areas {
            return true;
        }
        match (self.area_index(area1), self.area_index(area2)) {
            (Some(a1), Some(a2)) => a1 == a2 || self.area_portals[a1 * self.numareas + a2],
            _ => false,
        }
    }

    /// Writes a bit per area reachable from `area`. Returns the number of
    /// bytes used; `buffer` is filled as far as it goes.
    pub fn write_area_bits(&self, buffer: &mut [u8], area: i32) -> usize {
        let bytes = self.numareas.div_ceil(8);
        let used = bytes.min(buffer.len());

        if self.no_areas || area < 0 {
            // for debugging, send everything
            buffer[..used].fill(0xff);
            return bytes;
        }

        buffer[..used].fill(0);
        for i in 0..self.numareas {
            if self.areas_connected(area, i as i32) && (i >> 3) < used {
                buffer[i >> 3] |= 1 << (i & 7);
            }
        }
        bytes
    }

    /// Portal matrix for a savegame, one byte per cell.
    pub fn write_portal_state(&self, writer: &mut dyn Write) -> Result<(), CmError> {
        let bytes: Vec<u8> = self.area_portals.iter().map(|&open| open as u8).collect();
        writer.write_all(&bytes)?;
        Ok(())
    }

    /// Restores what `write_portal_state` wrote for this same map.
    pub fn read_portal_state(&mut self, reader: &mut dyn Read) -> Result<(), CmError> {
        let expected = self.area_portals.len();
        let mut bytes = Vec::with_capacity(expected);
        reader.read_to_end(&mut bytes)?;
        if bytes.len() != expected {
            return Err(CmError::BadPortalState { got: bytes.len(), expected });
        }
        let n = self.numareas;
        for a1 in 0..n {
            for a2 in 0..n {
                let open = bytes[a1 * n + a2] != 0 || bytes[a2 * n + a1] != 0;
                self.area_portals[a1 * n + a2] = open;
            }
        }
        Ok(())
    }
}

impl Default for CModelContext {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================
// Global singleton
// ============================================================

/// The process-wide map plus the trace client the engine surface uses.
pub struct CmState {
    pub map: CModelContext,
    pub client: TraceClient,
}

static CMODEL_CTX: Mutex<Option<CmState>> = parking_lot::const_mutex(None);

pub fn cmodel_init() {
    cvar_get("cm_noAreas", "0", 0);
    let mut g = CMODEL_CTX.lock();
    *g = Some(CmState {
        map: CModelContext::new(),
        client: TraceClient::new(),
    });
}

pub fn cmodel_shutdown() {
    *CMODEL_CTX.lock() = None;
}

/// Access the global CMODEL_CTX with a closure. Returns None if not initialized.
pub fn with_cmodel_ctx<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&mut CmState) -> R,
{
    let mut g = CMODEL_CTX.lock();
    g.as_mut().map(|state| {
        state.map.no_areas = cvar_variable_value("cm_noAreas") != 0.0;
        f(state)
    })
}

pub fn cm_load_map(name: &str, fs: &mut dyn FileReader) -> Result<u32, LoadError> {
    with_cmodel_ctx(|s| s.map.load_map(name, fs)).unwrap_or_else(|| {
        Err(LoadError::NotFound(format!("{} (collision model not initialized)", name)))
    })
}

pub fn cm_clear_map() {
    with_cmodel_ctx(|s| s.map.clear_map());
}

pub fn cm_num_inline_models() -> usize {
    with_cmodel_ctx(|s| s.map.num_inline_models()).unwrap_or(0)
}

pub fn cm_inline_model(index: i32) -> ClipHandle {
    with_cmodel_ctx(|s| s.map.inline_model(index)).unwrap_or(0)
}

pub fn cm_entity_string() -> String {
    with_cmodel_ctx(|s| s.map.entity_string().to_string()).unwrap_or_default()
}

pub fn cm_temp_box_model(mins: &Vec3, maxs: &Vec3, contents: ContentFlags) -> ClipHandle {
    with_cmodel_ctx(|s| s.client.temp_box_model(mins, maxs, contents)).unwrap_or(BOX_MODEL_HANDLE)
}

pub fn cm_model_bounds(handle: ClipHandle) -> (Vec3, Vec3) {
    with_cmodel_ctx(|s| s.map.model_bounds(&s.client, handle)).unwrap_or_default()
}

pub fn cm_point_leafnum(p: &Vec3) -> i32 {
    with_cmodel_ctx(|s| s.map.point_leafnum(p)).unwrap_or(0)
}

pub fn cm_leaf_cluster(leafnum: i32) -> i32 {
    with_cmodel_ctx(|s| s.map.leaf_cluster(leafnum)).unwrap_or(-1)
}

pub fn cm_leaf_area(leafnum: i32) -> i32 {
    with_cmodel_ctx(|s| s.map.leaf_area(leafnum)).unwrap_or(0)
}

pub fn cm_point_contents(p: &Vec3, model: ClipHandle) -> ContentFlags {
    with_cmodel_ctx(|s| s.map.point_contents(&mut s.client, p, model)).unwrap_or_default()
}

pub fn cm_transformed_point_contents(
    p: &Vec3,
    model: ClipHandle,
    origin: &Vec3,
    angles: &Vec3,
) -> ContentFlags {
    with_cmodel_ctx(|s| s.map.transformed_point_contents(&mut s.client, p, model, origin, angles))
        .unwrap_or_default()
}

pub fn cm_box_trace(
    start: &Vec3,
    end: &Vec3,
    mins: &Vec3,
    maxs: &Vec3,
    model: ClipHandle,
    brushmask: ContentFlags,
    cylinder: bool,
) -> Trace {
    with_cmodel_ctx(|s| s.map.box_trace(&mut s.client, start, end, mins, maxs, model, brushmask, cylinder))
        .unwrap_or_else(|| Trace { endpos: *end, ..Trace::default() })
}

pub fn cm_transformed_box_trace(
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
    with_cmodel_ctx(|s| {
        s.map.transformed_box_trace(
            &mut s.client, start, end, mins, maxs, model, brushmask, origin, angles, cylinder,
        )
    })
    .unwrap_or_else(|| Trace { endpos: *end, ..Trace::default() })
}

pub fn cm_in_pvs(p1: &Vec3, p2: &Vec3) -> bool {
    with_cmodel_ctx(|s| s.map.in_pvs(p1, p2)).unwrap_or(false)
}

pub fn cm_in_pvs_ignore_portals(p1: &Vec3, p2: &Vec3) -> bool {
    with_cmodel_ctx(|s| s.map.in_pvs_ignore_portals(p1, p2)).unwrap_or(false)
}

pub fn cm_adjust_area_portal_state(area1: i32, area2: i32, open: bool) -> Result<(), CmError> {
    with_cmodel_ctx(|s| s.map.adjust_area_portal_state(area1, area2, open))
        .unwrap_or(Err(CmError::BadArea { area: area1, numareas: 0 }))
}

pub fn cm_areas_connected(area1: i32, area2: i32) -> bool {
    with_cmodel_ctx(|s| s.map.areas_connected(area1, area2)).unwrap_or(false)
}

pub fn cm_write_area_bits(buffer: &mut [u8], area: i32) -> usize {
    with_cmodel_ctx(|s| s.map.write_area_bits(buffer, area)).unwrap_or(0)
}

// ============================================================
// Tests
// ============================================================
