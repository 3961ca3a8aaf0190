//! CRS extraction from `.prj` files
//!
//! Handles OGC WKT carrying `AUTHORITY["EPSG", ...]` clauses as well as the
//! bare ESRI flavour, which names the CRS but carries no authority code.

use crate::models::Crs;

/// Resolve a CRS from WKT text
pub fn crs_from_wkt(wkt: &str) -> Option<Crs> {
    parse_epsg_from_wkt(wkt)
        .or_else(|| epsg_from_esri_name(wkt))
        .map(Crs::from_epsg)
}

/// Parse the EPSG code of the outermost CRS in a WKT string
///
/// WKT1 lists the authority of the whole CRS last, after the authorities of
/// its datum, spheroid and units, so the last clause is the one that counts.
pub fn parse_epsg_from_wkt(wkt: &str) -> Option<u32> {
    let compact: String = wkt.chars().filter(|c| !c.is_whitespace()).collect();
    let upper = compact.to_ascii_uppercase();

    let pattern = "AUTHORITY[\"EPSG\",";
    if let Some(start) = upper.rfind(pattern) {
        let rest = &upper[start + pattern.len()..];
        let digits: String = rest
            .trim_start_matches('"')
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if let Ok(code) = digits.parse::<u32>() {
            return Some(code);
        }
    }

    // WKT2 form: ID["EPSG",4326]
    if let Some(start) = upper.rfind("ID[\"EPSG\",") {
        let rest = &upper[start + 10..];
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        if let Ok(code) = digits.parse::<u32>() {
            return Some(code);
        }
    }

    if let Some(start) = upper.find("EPSG:") {
        let digits: String = upper[start + 5..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if let Ok(code) = digits.parse::<u32>() {
            return Some(code);
        }
    }

    None
}

/// Map the CRS name of an ESRI-style WKT to an EPSG code
fn epsg_from_esri_name(wkt: &str) -> Option<u32> {
    let trimmed = wkt.trim_start();
    let (kind, rest) = trimmed.split_once('[')?;
    let name = rest.trim_start_matches('"').split('"').next()?.to_ascii_uppercase();

    match kind.trim().to_ascii_uppercase().as_str() {
        "GEOGCS" => match name.as_str() {
            "GCS_WGS_1984" | "WGS 84" | "WGS84" => Some(4326),
            "GCS_NORTH_AMERICAN_1983" | "NAD83" => Some(4269),
            "GCS_NORTH_AMERICAN_1927" | "NAD27" => Some(4267),
            "GCS_ETRS_1989" | "ETRS89" => Some(4258),
            _ => None,
        },
        "PROJCS" => {
            if name.contains("WEB_MERCATOR") || name.contains("PSEUDO-MERCATOR") {
                return Some(3857);
            }
            utm_zone_epsg(&name)
        }
        _ => None,
    }
}

/// `NAD_1927_UTM_Zone_13N` style names
fn utm_zone_epsg(name: &str) -> Option<u32> {
    let normalized = name.replace([' ', '/'], "_");
    let zone_start = normalized.find("UTM_ZONE_")? + "UTM_ZONE_".len();
    let zone_part = &normalized[zone_start..];
    let digits: String = zone_part.chars().take_while(|c| c.is_ascii_digit()).collect();
    let zone: u32 = digits.parse().ok()?;
    if !(1..=60).contains(&zone) {
        return None;
    }
    let hemisphere = zone_part[digits.len()..].chars().next()?;

    let base = if normalized.contains("NAD_1927") || normalized.contains("NAD27") {
        26700
    } else if normalized.contains("NAD_1983") || normalized.contains("NAD83") {
        26900
    } else if normalized.contains("WGS_1984") || normalized.contains("WGS_84") {
        if hemisphere == 'S' {
            return Some(32700 + zone);
        }
        32600
    } else {
        return None;
    };

    (hemisphere == 'N').then_some(base + zone)
}
