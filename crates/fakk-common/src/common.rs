// common.rs — console printing and engine error reporting
//
// Console output goes through the `log` facade; the front end decides where
// it lands (env_logger in fakk-cm).

use crate::q_shared::{ERR_DROP, ERR_FATAL};

/// Distribution name and version (for banners and version strings)
pub const DISTNAME: &str = "FAKK-CM";
pub const DISTVER: &str = env!("CARGO_PKG_VERSION");

// ============================================================
// Com_Printf / Com_DPrintf / Com_Error
// ============================================================

/// General-purpose print. Trailing newlines are dropped; the logger adds
/// its own.
pub fn com_printf(msg: &str) {
    log::info!(target: "fakk", "{}", msg.trim_end_matches('\n'));
}

/// Developer-only print. Visible when the logger runs at debug level.
pub fn com_dprintf(msg: &str) {
    log::debug!(target: "fakk", "{}", msg.trim_end_matches('\n'));
}

/// Engine error handler.
/// - `ERR_FATAL`: unrecoverable engine state.
/// - `ERR_DROP`: a caller or content bug; the current operation is abandoned.
///
/// Both unwind; the code picks the message a frame loop would show.
pub fn com_error(code: i32, msg: &str) -> ! {
    match code {
        ERR_FATAL => {
            log::error!(target: "fakk", "{}", msg);
            panic!("Fatal error: {}", msg);
        }
        ERR_DROP => {
            log::error!(target: "fakk", "********************\nERROR: {}\n********************", msg);
            panic!("Dropped: {}", msg);
        }
        _ => {
            log::error!(target: "fakk", "{}", msg);
            panic!("{}", msg);
        }
    }
}

// ============================================================
// Tests
// ============================================================
