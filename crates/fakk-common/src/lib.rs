// fakk-common — BSP collision model and the engine services it leans on

#![allow(clippy::too_many_arguments)]
#![allow(clippy::needless_range_loop)]

pub mod cmodel;
pub mod common;
pub mod cvar;
pub mod files;
pub mod md4;
pub mod q_shared;
pub mod qfiles;
