//! Pre-parse argument normalisation.
//!
//! The launcher's historical surface spells its long options with a
//! single dash (`-instances 4`, `-cluster`). clap only matches long
//! options behind a double dash, so known single-dash spellings are
//! rewritten before parsing; everything else passes through untouched.

use std::ffi::OsString;

/// Single-dash spellings accepted for compatibility.
const SINGLE_DASH_FLAGS: &[&str] = &[
    "-instances",
    "-cluster",
    "-cluster-host",
    "-cluster-port",
    "-cluster-public-host",
    "-cluster-public-port",
    "-options",
    "-conf",
    "-ha",
    "-vt",
    "-help",
];

/// Rewrites known single-dash long flags to their double-dash form.
pub(crate) fn normalize_arguments<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter().map(rewrite).collect()
}

fn rewrite(argument: OsString) -> OsString {
    let Some(text) = argument.to_str() else {
        return argument;
    };
    if !text.starts_with('-') || text.starts_with("--") {
        return argument;
    }
    let flag = text.split_once('=').map_or(text, |(flag, _)| flag);
    if SINGLE_DASH_FLAGS.contains(&flag) {
        OsString::from(format!("-{text}"))
    } else {
        argument
    }
}
