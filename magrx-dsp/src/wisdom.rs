//! Wisdom files: persisted implementation rankings.
//!
//! A wisdom file is UTF-8 text with one directive per line:
//!
//! ```text
//! # prefer the plain lookup kernel on this machine
//! magnitude_uc8 lookup_generic
//! magnitude_uc8 exact_generic
//! mean_power_u16 float_generic
//! ```
//!
//! For each operation, the named implementations are moved to the front of
//! the registry in file order; unnamed implementations keep their relative
//! order behind them. Unknown operation or implementation names are
//! silently ignored so that wisdom written by a newer or differently
//! configured build still loads.

use std::{
    fmt::Write as _,
    path::Path,
};

use crate::DspDispatcher;

#[derive(Debug, thiserror::Error)]
pub enum WisdomError {
    #[error("can't read wisdom file {path}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("can't write wisdom file {path}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Parse wisdom text into `(operation, implementation)` pairs, in file
/// order. Comments (`#` to end of line) and blank lines are skipped.
pub fn parse(text: &str) -> Vec<(&str, &str)> {
    let mut pairs = Vec::new();
    for line in text.lines() {
        let line = line.split('#').next().unwrap_or("");
        let mut fields = line.split_whitespace();
        let (Some(op), Some(implementation)) = (fields.next(), fields.next()) else {
            continue;
        };
        pairs.push((op, implementation));
    }
    pairs
}

/// Re-rank the dispatcher's registries from parsed wisdom pairs.
pub fn apply(dispatcher: &DspDispatcher, pairs: &[(&str, &str)]) {
    for &op in dispatcher.operation_names() {
        let preferred: Vec<&str> = pairs
            .iter()
            .filter(|(pair_op, _)| *pair_op == op)
            .map(|(_, implementation)| *implementation)
            .collect();
        if !preferred.is_empty() {
            // also ignores implementation names the registry doesn't know
            dispatcher
                .kernel(op)
                .expect("operation_names listed an unknown op")
                .apply_wisdom(&preferred);
        }
    }
}

/// Load a wisdom file and apply it. On read failure the caller decides
/// whether to warn and continue with default rankings.
pub fn load(dispatcher: &DspDispatcher, path: &Path) -> Result<(), WisdomError> {
    let text = std::fs::read_to_string(path).map_err(|source| {
        WisdomError::Read {
            path: path.display().to_string(),
            source,
        }
    })?;

    let pairs = parse(&text);
    tracing::debug!(path = %path.display(), directives = pairs.len(), "loaded wisdom");
    apply(dispatcher, &pairs);
    Ok(())
}

/// Serialize the current registry order of every operation.
///
/// Feeding the output back through [`parse`] and [`apply`] reproduces the
/// same order.
pub fn dump(dispatcher: &DspDispatcher) -> String {
    let mut out = String::new();
    for &op in dispatcher.operation_names() {
        let kernel = dispatcher.kernel(op).expect("operation_names listed an unknown op");
        for implementation in kernel.implementation_names() {
            let _ = writeln!(out, "{op} {implementation}");
        }
    }
    out
}

pub fn save(dispatcher: &DspDispatcher, path: &Path) -> Result<(), WisdomError> {
    std::fs::write(path, dump(dispatcher)).map_err(|source| {
        WisdomError::Write {
            path: path.display().to_string(),
            source,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        DspDispatcher,
        Uc8Sample,
    };

    #[test]
    fn parses_comments_and_whitespace() {
        let pairs = parse(
            "# header comment\n\
             \n\
             magnitude_uc8 exact_generic # trailing comment\n\
             \t mean_power_u16\tfloat_generic\n\
             dangling_token\n",
        );
        assert_eq!(
            pairs,
            vec![
                ("magnitude_uc8", "exact_generic"),
                ("mean_power_u16", "float_generic"),
            ]
        );
    }

    #[test]
    fn wisdom_overrides_default_selection() {
        let dispatcher = DspDispatcher::new();

        let input = [Uc8Sample::default(); 16];
        let mut output = [0u16; 16];
        dispatcher.magnitude_uc8(&input, &mut output);
        let default_name = dispatcher.kernel("magnitude_uc8").unwrap().selected_name();
        assert!(default_name.is_some());

        apply(&dispatcher, &parse("magnitude_uc8 exact_generic"));
        assert_eq!(dispatcher.kernel("magnitude_uc8").unwrap().selected_name(), None);

        dispatcher.magnitude_uc8(&input, &mut output);
        assert_eq!(
            dispatcher.kernel("magnitude_uc8").unwrap().selected_name(),
            Some("exact_generic")
        );
    }

    #[test]
    fn unknown_names_are_ignored() {
        let dispatcher = DspDispatcher::new();
        let before = dump(&dispatcher);

        apply(
            &dispatcher,
            &parse("no_such_op lookup_generic\nmagnitude_uc8 no_such_impl"),
        );
        assert_eq!(dump(&dispatcher), before);
    }

    #[test]
    fn dump_and_reload_round_trips() {
        let dispatcher = DspDispatcher::new();
        apply(&dispatcher, &parse("magnitude_uc8 approx_generic"));

        let first = dump(&dispatcher);
        apply(&dispatcher, &parse(&first));
        assert_eq!(dump(&dispatcher), first);
    }

    #[test]
    fn load_and_save_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dsp.wisdom");

        let dispatcher = DspDispatcher::new();
        apply(&dispatcher, &parse("boxcar_u16 u32_generic"));
        save(&dispatcher, &path).unwrap();

        let reloaded = DspDispatcher::new();
        load(&reloaded, &path).unwrap();
        assert_eq!(dump(&reloaded), dump(&dispatcher));

        assert!(load(&reloaded, &dir.path().join("missing.wisdom")).is_err());
    }
}
