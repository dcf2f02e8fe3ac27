#![deny(warnings)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::indexing_slicing)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! `ArcWelder` compresses runs of short `G0`/`G1` moves into `G2`/`G3`
//! arcs that stay within a configurable resolution of the original path,
//! preserving extrusion, Z, feedrate, and every non-motion line verbatim.

pub mod config;
pub mod emitter;
pub mod error;
pub mod fitter;
pub mod gcode;
pub mod geometry;
pub mod interpolate;
pub mod stats;
pub mod welder;

use std::io::Cursor;

pub use config::WelderConfig;
pub use error::{ConfigError, GeometryError, ParseError, WeldError};
pub use stats::{Progress, WeldResult};
pub use welder::{ProgressCallback, Welder};

/// Welds a gcode program held in memory, returning the transformed text and
/// the run result.
///
/// A convenience wrapper over [`Welder`] for tests and small inputs; large
/// files should stream through [`Welder::process`] directly.
///
/// # Errors
///
/// Returns [`WeldError::Config`] for an invalid configuration. I/O errors
/// cannot occur against in-memory buffers.
pub fn weld_gcode(config: &WelderConfig, source: &str) -> Result<(String, WeldResult), WeldError> {
    let mut welder =
        Welder::new(config.clone())?.with_source_size(saturate_u64_len(source.len()));
    let mut output = Vec::new();
    let result = welder.process(Cursor::new(source.as_bytes()), &mut output)?;
    Ok((String::from_utf8_lossy(&output).into_owned(), result))
}

fn saturate_u64_len(value: usize) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weld_gcode_passes_non_motion_lines_through() {
        let source = "M104 S200\n; a comment\nM140 S60\n";
        let result = weld_gcode(&WelderConfig::default(), source);
        assert!(result.is_ok(), "expected the weld to run");
        if let Ok((output, result)) = result {
            assert_eq!(output, source);
            assert!(result.success);
            assert!(!result.cancelled);
            assert_eq!(result.statistics.arcs_created, 0);
        }
    }

    #[test]
    fn weld_gcode_rejects_invalid_config() {
        let config = WelderConfig {
            resolution_mm: 0.0,
            ..WelderConfig::default()
        };
        assert!(weld_gcode(&config, "G1 X1").is_err());
    }
}
