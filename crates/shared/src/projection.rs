//! Web mercator helpers shared by the view configuration and the geocoding jump.

use std::f64::consts::PI;

const TILE_SIZE: f64 = 256.0;
/// Half the circumference of the web mercator world, in metres.
pub const HALF_WORLD_METRES: f64 = 20037508.342789244;

/// Resolution (metres per pixel) of a standard 256px tile pyramid at `zoom`.
pub fn resolution_from_zoom_level(zoom: f64) -> f64 {
    HALF_WORLD_METRES / 2f64.powf(zoom - 1.0) / TILE_SIZE
}

/// Projects a WGS84 longitude/latitude pair into EPSG:3857.
pub fn lonlat_to_web_mercator(lon: f64, lat: f64) -> [f64; 2] {
    let x = lon * HALF_WORLD_METRES / 180.0;
    let y = (PI / 4.0 + lat.to_radians() / 2.0).tan().ln() * HALF_WORLD_METRES / PI;
    [x, y]
}
