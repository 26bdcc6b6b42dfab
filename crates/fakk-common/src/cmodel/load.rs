// load.rs — FAKK BSP parsing into a CModelContext
//
// Every cross reference is checked here so the query code can index
// without looking.

use rayon::prelude::*;
use thiserror::Error;

use super::{CBrush, CBrushSide, CLeaf, CModel, CModelContext, CNode, CShader, VisData};
use crate::md4::com_block_checksum;
use crate::q_shared::{ContentFlags, CPlane, SurfaceFlags, Vec3};
use crate::qfiles::*;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("couldn't load {0}")]
    NotFound(String),

    #[error("file is {len} bytes, header needs {need}")]
    Truncated { len: usize, need: usize },

    #[error("bad ident {0:#010x}")]
    BadIdent(i32),

    #[error("wrong version number ({found} should be {expected})")]
    BadVersion { found: i32, expected: i32 },

    #[error("{lump} lump ({ofs}, {len}) lies outside the file")]
    BadLumpRange { lump: &'static str, ofs: i32, len: i32 },

    #[error("funny lump size in {lump}: {len} is not a multiple of {record}")]
    FunnyLumpSize { lump: &'static str, len: usize, record: usize },

    #[error("{what} index {index} out of range (0..{limit})")]
    BadIndex { what: &'static str, index: i64, limit: usize },

    #[error("map has too many {what} ({count} > {max})")]
    TooMany { what: &'static str, count: usize, max: usize },

    #[error("map with no {0}")]
    MissingLump(&'static str),

    #[error("bad visibility lump: {0}")]
    BadVisibility(String),
}

/// Below this many records a lump is decoded on the calling thread.
const PARALLEL_LUMP_THRESHOLD: usize = 64;

// ============================================================
// BSP byte helpers
// ============================================================

fn read_i32_le(data: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
}

fn read_f32_le(data: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
}

fn read_vec3(data: &[u8], offset: usize) -> Vec3 {
    [
        read_f32_le(data, offset),
        read_f32_le(data, offset + 4),
        read_f32_le(data, offset + 8),
    ]
}

/// Decodes fixed-size records, on the rayon pool for big lumps.
fn decode_records<T, F>(bytes: &[u8], stride: usize, decode: F) -> Vec<T>
where
    T: Send,
    F: Fn(&[u8]) -> T + Sync + Send,
{
    if bytes.len() / stride >= PARALLEL_LUMP_THRESHOLD {
        bytes.par_chunks_exact(stride).map(&decode).collect()
    } else {
        bytes.chunks_exact(stride).map(&decode).collect()
    }
}

fn check_index(what: &'static str, index: i32, limit: usize) -> Result<usize, LoadError> {
    if index < 0 || index as usize >= limit {
        return Err(LoadError::BadIndex { what, index: index as i64, limit });
    }
    Ok(index as usize)
}

/// `first..first+count` must sit inside `0..limit`.
fn check_range(what: &'static str, first: i32, count: i32, limit: usize) -> Result<(usize, usize), LoadError> {
    if count < 0 || first < 0 || first as i64 + count as i64 > limit as i64 {
        let index = if first < 0 { first as i64 } else { first as i64 + count as i64 };
        return Err(LoadError::BadIndex { what, index, limit });
    }
    Ok((first as usize, count as usize))
}

// ============================================================
// Header
// ============================================================

struct BspFile<'a> {
    data: &'a [u8],
    header: DHeader,
}

impl<'a> BspFile<'a> {
    fn parse(data: &'a [u8]) -> Result<Self, LoadError> {
        if data.len() < DHEADER_SIZE {
            return Err(LoadError::Truncated { len: data.len(), need: DHEADER_SIZE });
        }
        let ident = read_i32_le(data, 0);
        if ident != BSP_IDENT {
            return Err(LoadError::BadIdent(ident));
        }
        let version = read_i32_le(data, 4);
        if version != BSP_VERSION {
            return Err(LoadError::BadVersion { found: version, expected: BSP_VERSION });
        }

        let mut lumps = [Lump::default(); HEADER_LUMPS];
        for (i, lump) in lumps.iter_mut().enumerate() {
            let base = 12 + i * 8;
            lump.fileofs = read_i32_le(data, base);
            lump.filelen = read_i32_le(data, base + 4);
        }

        Ok(Self {
            data,
            header: DHeader {
                ident,
                version,
                checksum: read_i32_le(data, 8),
                lumps,
            },
        })
    }

    /// Raw bytes of a lump, checked against the file and the record size.
    fn lump(&self, index: usize, record: usize) -> Result<&'a [u8], LoadError> {
        let l = self.header.lumps[index];
        let name = LUMP_NAMES[index];
        if l.fileofs < 0 || l.filelen < 0 || l.fileofs as usize + l.filelen as usize > self.data.len() {
            return Err(LoadError::BadLumpRange { lump: name, ofs: l.fileofs, len: l.filelen });
        }
        let len = l.filelen as usize;
        if len % record != 0 {
            return Err(LoadError::FunnyLumpSize { lump: name, len, record });
        }
        let ofs = l.fileofs as usize;
        Ok(&self.data[ofs..ofs + len])
    }
}

// ============================================================
// Lump loaders
// ============================================================

impl CModelContext {
    /// Parses a whole BSP into a fresh context.
    pub(crate) fn from_bsp(name: &str, data: &[u8]) -> Result<Self, LoadError> {
        let bsp = BspFile::parse(data)?;
        let mut map = Self::new();

        map.load_shaders(&bsp)?;
        map.load_planes(&bsp)?;
        map.load_brush_sides(&bsp)?;
        map.load_brushes(&bsp)?;
        map.load_leaf_brushes(&bsp)?;
        map.load_leafs(&bsp)?;
        map.load_nodes(&bsp)?;
        map.load_submodels(&bsp)?;
        map.load_visibility(&bsp)?;
        map.load_entity_string(&bsp)?;

        map.numareas = map
            .map_leafs
            .iter()
            .filter(|l| l.area >= 0)
            .map(|l| l.area as usize + 1)
            .max()
            .unwrap_or(1)
            .clamp(1, MAX_CM_AREAS);
        map.area_portals = vec![false; map.numareas * map.numareas];

        map.checksum = com_block_checksum(data);
        map.header_checksum = bsp.header.checksum;
        map.map_name = name.to_string();
        map.loaded = true;
        Ok(map)
    }

    fn load_shaders(&mut self, bsp: &BspFile) -> Result<(), LoadError> {
        let bytes = bsp.lump(LUMP_SHADERS, DSHADER_SIZE)?;
        let mut shaders = decode_records(bytes, DSHADER_SIZE, |rec| {
            let name = &rec[..MAX_QPATH];
            let end = name.iter().position(|&c| c == 0).unwrap_or(MAX_QPATH);
            CShader {
                name: String::from_utf8_lossy(&name[..end]).into_owned(),
                surface_flags: SurfaceFlags::from_bits_retain(read_i32_le(rec, MAX_QPATH) as u32),
                content_flags: ContentFlags::from_bits_retain(read_i32_le(rec, MAX_QPATH + 4) as u32),
            }
        });
        if shaders.len() > MAX_CM_SHADERS {
            log::warn!("CMod_LoadShaders: {} shaders, keeping {}", shaders.len(), MAX_CM_SHADERS);
            shaders.truncate(MAX_CM_SHADERS);
        }
        self.map_shaders = shaders;
        Ok(())
    }

    /// Flags of a shader, or nothing for a dangling reference.
    fn shader_flags(&self, shader_num: i32) -> (SurfaceFlags, ContentFlags) {
        if shader_num >= 0 {
            if let Some(s) = self.map_shaders.get(shader_num as usize) {
                return (s.surface_flags, s.content_flags);
            }
        }
        log::debug!("bad shader number {}", shader_num);
        (SurfaceFlags::empty(), ContentFlags::empty())
    }

    fn load_planes(&mut self, bsp: &BspFile) -> Result<(), LoadError> {
        let bytes = bsp.lump(LUMP_PLANES, DPLANE_SIZE)?;
        let count = bytes.len() / DPLANE_SIZE;
        if count > MAX_CM_PLANES {
            return Err(LoadError::TooMany { what: "planes", count, max: MAX_CM_PLANES });
        }
        self.map_planes = decode_records(bytes, DPLANE_SIZE, |rec| {
            CPlane::new(read_vec3(rec, 0), read_f32_le(rec, 12))
        });
        Ok(())
    }

    fn load_brush_sides(&mut self, bsp: &BspFile) -> Result<(), LoadError> {
        let bytes = bsp.lump(LUMP_BRUSHSIDES, DBRUSHSIDE_SIZE)?;
        let count = bytes.len() / DBRUSHSIDE_SIZE;
        if count > MAX_CM_BRUSHSIDES {
            return Err(LoadError::TooMany { what: "brushsides", count, max: MAX_CM_BRUSHSIDES });
        }
        let raw = decode_records(bytes, DBRUSHSIDE_SIZE, |rec| (read_i32_le(rec, 0), read_i32_le(rec, 4)));

        let numplanes = self.map_planes.len();
        let mut sides = Vec::with_capacity(raw.len());
        for (plane_num, shader_num) in raw {
            sides.push(CBrushSide {
                plane_idx: check_index("brushside plane", plane_num, numplanes)?,
                surface_flags: self.shader_flags(shader_num).0,
                shader_num,
            });
        }
        self.map_brushsides = sides;
        Ok(())
    }

    fn load_brushes(&mut self, bsp: &BspFile) -> Result<(), LoadError> {
        let bytes = bsp.lump(LUMP_BRUSHES, DBRUSH_SIZE)?;
        let count = bytes.len() / DBRUSH_SIZE;
        if count > MAX_CM_BRUSHES {
            return Err(LoadError::TooMany { what: "brushes", count, max: MAX_CM_BRUSHES });
        }
        let raw = decode_records(bytes, DBRUSH_SIZE, |rec| {
            (read_i32_le(rec, 0), read_i32_le(rec, 4), read_i32_le(rec, 8))
        });

        let numsides = self.map_brushsides.len();
        let mut brushes = Vec::with_capacity(raw.len());
        for (first_side, num_sides, shader_num) in raw {
            let (firstbrushside, numsides) = check_range("brush sides", first_side, num_sides, numsides)?;
            brushes.push(CBrush {
                contents: self.shader_flags(shader_num).1,
                firstbrushside,
                numsides,
                shader_num,
            });
        }
        self.map_brushes = brushes;
        Ok(())
    }

    fn load_leaf_brushes(&mut self, bsp: &BspFile) -> Result<(), LoadError> {
        let bytes = bsp.lump(LUMP_LEAFBRUSHES, DLEAFBRUSH_SIZE)?;
        let count = bytes.len() / DLEAFBRUSH_SIZE;
        if count > MAX_CM_LEAFBRUSHES {
            return Err(LoadError::TooMany { what: "leafbrushes", count, max: MAX_CM_LEAFBRUSHES });
        }
        let numbrushes = self.map_brushes.len();
        self.map_leafbrushes = decode_records(bytes, DLEAFBRUSH_SIZE, |rec| read_i32_le(rec, 0))
            .into_iter()
            .map(|b| check_index("leafbrush", b, numbrushes))
            .collect::<Result<_, _>>()?;
        Ok(())
    }

    fn load_leafs(&mut self, bsp: &BspFile) -> Result<(), LoadError> {
        let bytes = bsp.lump(LUMP_LEAFS, DLEAF_SIZE)?;
        let count = bytes.len() / DLEAF_SIZE;
        if count < 1 {
            return Err(LoadError::MissingLump("leafs"));
        }
        if count > MAX_CM_LEAFS {
            return Err(LoadError::TooMany { what: "leafs", count, max: MAX_CM_LEAFS });
        }
        // cluster, area, first leafbrush, leafbrush count
        let raw = decode_records(bytes, DLEAF_SIZE, |rec| {
            (read_i32_le(rec, 0), read_i32_le(rec, 4), read_i32_le(rec, 40), read_i32_le(rec, 44))
        });

        let numleafbrushes = self.map_leafbrushes.len();
        let mut leafs = Vec::with_capacity(raw.len());
        for (cluster, area, first, num) in raw {
            let (firstleafbrush, numleafbrushes) = check_range("leaf brushes", first, num, numleafbrushes)?;
            leafs.push(CLeaf { cluster, area, firstleafbrush, numleafbrushes });
        }
        self.map_leafs = leafs;
        Ok(())
    }

    fn load_nodes(&mut self, bsp: &BspFile) -> Result<(), LoadError> {
        let bytes = bsp.lump(LUMP_NODES, DNODE_SIZE)?;
        let count = bytes.len() / DNODE_SIZE;
        if count > MAX_CM_NODES {
            return Err(LoadError::TooMany { what: "nodes", count, max: MAX_CM_NODES });
        }
        let raw = decode_records(bytes, DNODE_SIZE, |rec| {
            (read_i32_le(rec, 0), [read_i32_le(rec, 4), read_i32_le(rec, 8)])
        });

        let numplanes = self.map_planes.len();
        let numleafs = self.map_leafs.len();
        let mut nodes = Vec::with_capacity(raw.len());
        for (nodenum, (plane_num, children)) in raw.into_iter().enumerate() {
            let plane_idx = check_index("node plane", plane_num, numplanes)?;
            for &child in &children {
                if child >= 0 {
                    // children are written after their parent, so the walk always terminates
                    if check_index("node child", child, count)? <= nodenum {
                        return Err(LoadError::BadIndex { what: "node child", index: child as i64, limit: count });
                    }
                } else {
                    check_index("node leaf", -1 - child, numleafs)?;
                }
            }
            nodes.push(CNode { plane_idx, children });
        }
        self.map_nodes = nodes;
        Ok(())
    }

    fn load_submodels(&mut self, bsp: &BspFile) -> Result<(), LoadError> {
        let bytes = bsp.lump(LUMP_MODELS, DMODEL_SIZE)?;
        let mut raw = decode_records(bytes, DMODEL_SIZE, |rec| {
            (read_vec3(rec, 0), read_vec3(rec, 12), read_i32_le(rec, 32), read_i32_le(rec, 36))
        });
        if raw.is_empty() {
            return Err(LoadError::MissingLump("models"));
        }
        if raw.len() > MAX_SUBMODELS {
            log::warn!("CMod_LoadSubmodels: {} models, keeping {}", raw.len(), MAX_SUBMODELS);
            raw.truncate(MAX_SUBMODELS);
        }

        let numbrushes = self.map_brushes.len();
        let mut models = Vec::with_capacity(raw.len());
        for (i, (mins, maxs, first, num)) in raw.into_iter().enumerate() {
            let (firstbrush, numbrushes) = check_range("model brushes", first, num, numbrushes)?;
            let mut cmod = CModel {
                // spread the mins / maxs by a unit
                mins: [mins[0] - 1.0, mins[1] - 1.0, mins[2] - 1.0],
                maxs: [maxs[0] + 1.0, maxs[1] + 1.0, maxs[2] + 1.0],
                firstbrush,
                numbrushes,
                leaf: CLeaf::default(),
            };

            // world model doesn't need the leaf, it goes through the tree
            if i > 0 {
                cmod.leaf.firstleafbrush = self.map_leafbrushes.len();
                cmod.leaf.numleafbrushes = numbrushes;
                self.map_leafbrushes.extend(firstbrush..firstbrush + numbrushes);
            }
            models.push(cmod);
        }
        self.map_cmodels = models;
        Ok(())
    }

    fn load_visibility(&mut self, bsp: &BspFile) -> Result<(), LoadError> {
        let bytes = bsp.lump(LUMP_VISIBILITY, 1)?;
        if bytes.is_empty() {
            // no vis: one cluster per distinct leaf cluster, all visible
            let numclusters = self
                .map_leafs
                .iter()
                .map(|l| l.cluster + 1)
                .max()
                .unwrap_or(0)
                .max(0) as usize;
            let clusterbytes = numclusters.div_ceil(8);
            self.numclusters = numclusters;
            self.vis = VisData { numclusters, clusterbytes, data: Vec::new() };
            self.all_visible = vec![0xff; clusterbytes];
            return Ok(());
        }

        if bytes.len() < DVISHEADER_SIZE {
            return Err(LoadError::BadVisibility(format!("{} byte lump", bytes.len())));
        }
        let n = read_i32_le(bytes, 0);
        let b = read_i32_le(bytes, 4);
        if n < 0 || b < 0 {
            return Err(LoadError::BadVisibility(format!("{} clusters of {} bytes", n, b)));
        }
        let (numclusters, clusterbytes) = (n as usize, b as usize);
        if clusterbytes * 8 < numclusters {
            return Err(LoadError::BadVisibility(format!(
                "{} bytes per cluster can't hold {} clusters",
                clusterbytes, numclusters
            )));
        }
        let size = numclusters * clusterbytes;
        if DVISHEADER_SIZE + size > bytes.len() {
            return Err(LoadError::BadVisibility(format!(
                "{} clusters need {} bytes, lump has {}",
                numclusters,
                size,
                bytes.len() - DVISHEADER_SIZE
            )));
        }

        self.numclusters = numclusters;
        self.vis = VisData {
            numclusters,
            clusterbytes,
            data: bytes[DVISHEADER_SIZE..DVISHEADER_SIZE + size].to_vec(),
        };
        self.all_visible = vec![0xff; clusterbytes];
        Ok(())
    }

    fn load_entity_string(&mut self, bsp: &BspFile) -> Result<(), LoadError> {
        let bytes = bsp.lump(LUMP_ENTITIES, 1)?;
        self.map_entitystring = String::from_utf8_lossy(bytes).trim_end_matches('\0').to_string();
        Ok(())
    }
}

// ============================================================
// Tests
// ============================================================
