//! Geo bundle recognition.
//!
//! Some multi-file archives are one logical dataset: a shapefile component
//! set, or a GeoTIFF with its sidecar files. Those are exempt from the
//! single/multi-member unwrap rules and are scored as a bundle.

/// Extensions that mark a dataset whose meaning spans several files.
///
/// An archive whose *declared* outer extension is in this set is never
/// unwrapped, even when it holds a single member.
pub const RESERVED_BUNDLE_EXTENSIONS: &[&str] = &["shp", "shx", "dbf", "prj", "tif", "tiff"];

/// Check whether the outer extension reserves bundle handling.
pub fn is_reserved_bundle_extension(ext: &str) -> bool {
    RESERVED_BUNDLE_EXTENSIONS
        .iter()
        .any(|e| ext.eq_ignore_ascii_case(e))
}

/// Check whether a member list jointly forms a geo bundle.
///
/// Recognized sets:
/// - shapefile: at least one `.shp` plus a `.shx` or `.dbf` companion
/// - GeoTIFF: a `.tif`/`.tiff` plus a world file (`.tfw`/`.wld`)
pub fn is_geo_bundle<'a>(member_names: impl IntoIterator<Item = &'a str>) -> bool {
    let mut has_shp = false;
    let mut has_shp_companion = false;
    let mut has_tiff = false;
    let mut has_world_file = false;

    for name in member_names {
        let ext = name.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
        match ext.as_str() {
            "shp" => has_shp = true,
            "shx" | "dbf" => has_shp_companion = true,
            "tif" | "tiff" => has_tiff = true,
            "tfw" | "wld" => has_world_file = true,
            _ => {}
        }
    }

    (has_shp && has_shp_companion) || (has_tiff && has_world_file)
}
