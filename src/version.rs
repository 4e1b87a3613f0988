use std::cmp::Ordering;

use log::warn;
use semver::Version;

use crate::error::LauncherError;

/// Version assumed for games with no marker on disk and for catalog entries
/// that omit the field.
pub const DEFAULT_VERSION: &str = "0.0.0";

/// Parse a semantic version string.
pub fn parse(value: &str) -> Result<Version, LauncherError> {
    Version::parse(value.trim()).map_err(|_| LauncherError::InvalidVersionFormat(value.to_owned()))
}

/// Total-order comparison of two semantic version strings. Pre-release tags
/// order below the corresponding normal release, per semver precedence.
pub fn compare(a: &str, b: &str) -> Result<Ordering, LauncherError> {
    Ok(parse(a)?.cmp(&parse(b)?))
}

/// Lenient parse for version strings read from local state. A corrupt or
/// missing marker must classify the game as outdated rather than break the
/// resolver, so anything unparsable degrades to `0.0.0`.
pub fn parse_or_default(value: &str) -> Version {
    parse(value).unwrap_or_else(|_| {
        warn!("version: {value:?} does not parse as semver, treating as {DEFAULT_VERSION}");
        Version::new(0, 0, 0)
    })
}
