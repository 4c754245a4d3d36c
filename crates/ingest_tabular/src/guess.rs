//! Per-cell type candidate generation.
//!
//! For every cell value the guesser emits the ordered list of types the
//! value could cast to, most specific first, always terminated by `Any`.
//! String-shape pre-checks run before the permissive casts so that
//! locale-ambiguous separators ("1.050" vs "10:30:05.5") do not produce
//! false date/time positives.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

/// Cell types, in fixed priority order (most specific first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CellType {
    Missing,
    Duration,
    GeoJson,
    GeoPoint,
    Object,
    Array,
    Time,
    Date,
    DateTime,
    Integer,
    Number,
    Boolean,
    String,
    /// Universal fallback; matches every non-missing value.
    Any,
}

impl CellType {
    /// Position in the priority order; lower is more specific.
    pub fn priority(&self) -> u8 {
        *self as u8
    }
}

/// One `(type, format)` candidate for a cell value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub struct Candidate {
    #[serde(rename = "type")]
    pub ty: CellType,
    /// `"default"`, `"any"`, or a concrete datetime pattern.
    pub format: &'static str,
}

impl Candidate {
    fn new(ty: CellType, format: &'static str) -> Self {
        Self { ty, format }
    }
}

/// Date patterns attempted, in order; the matching pattern becomes the
/// candidate's format label.
const DATE_PATTERNS: &[&str] = &["%Y-%m-%d", "%d.%m.%Y", "%d/%m/%Y", "%Y/%m/%d"];

/// Datetime patterns attempted after RFC 3339.
const DATETIME_PATTERNS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%d.%m.%Y %H:%M:%S",
];

/// Time patterns attempted.
const TIME_PATTERNS: &[&str] = &["%H:%M:%S", "%H:%M", "%H:%M:%S%.f"];

/// Markers treated as missing data by default.
pub const DEFAULT_MISSING_VALUES: &[&str] = &["", "-", "n/a", "na", "null", "none"];

/// Generates type candidates for cell values.
#[derive(Debug, Clone)]
pub struct TypeGuesser {
    missing_values: Vec<String>,
}

impl Default for TypeGuesser {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeGuesser {
    pub fn new() -> Self {
        Self {
            missing_values: DEFAULT_MISSING_VALUES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    /// Override the missing-value markers.
    pub fn with_missing_values(mut self, markers: impl IntoIterator<Item = String>) -> Self {
        self.missing_values = markers.into_iter().collect();
        self
    }

    /// All casts the value succeeds at, most specific first.
    ///
    /// Never empty: missing markers yield `[Missing]`, everything else ends
    /// with `Any`.
    pub fn candidates(&self, raw: &str) -> Vec<Candidate> {
        let value = raw.trim();
        if self
            .missing_values
            .iter()
            .any(|m| m.eq_ignore_ascii_case(value))
        {
            return vec![Candidate::new(CellType::Missing, "default")];
        }

        let mut out = Vec::new();

        if is_iso_duration(value) {
            out.push(Candidate::new(CellType::Duration, "default"));
        }

        match parse_json_shape(value) {
            JsonShape::GeoJson => {
                out.push(Candidate::new(CellType::GeoJson, "default"));
                out.push(Candidate::new(CellType::Object, "default"));
            }
            JsonShape::Object => out.push(Candidate::new(CellType::Object, "default")),
            JsonShape::Array => out.push(Candidate::new(CellType::Array, "default")),
            JsonShape::None => {}
        }

        if is_geopoint(value) {
            out.push(Candidate::new(CellType::GeoPoint, "default"));
        }

        if let Some(format) = cast_time(value) {
            out.push(Candidate::new(CellType::Time, format));
        }
        if let Some(format) = cast_date(value) {
            out.push(Candidate::new(CellType::Date, format));
        }
        if let Some(format) = cast_datetime(value) {
            out.push(Candidate::new(CellType::DateTime, format));
        }

        // Embedded whitespace means thousand separators or free text;
        // neither may be read as a number.
        let has_inner_whitespace = value.chars().any(char::is_whitespace);
        if !has_inner_whitespace {
            if value.parse::<i64>().is_ok() {
                out.push(Candidate::new(CellType::Integer, "default"));
            }
            if is_plain_number(value) {
                out.push(Candidate::new(CellType::Number, "default"));
            }
        }

        if matches!(
            value.to_ascii_lowercase().as_str(),
            "true" | "false" | "yes" | "no" | "t" | "f"
        ) {
            out.push(Candidate::new(CellType::Boolean, "default"));
        }

        out.push(Candidate::new(CellType::String, "default"));
        out.push(Candidate::new(CellType::Any, "any"));
        out
    }
}

/// ISO 8601 duration: `P` followed by at least one designated component.
fn is_iso_duration(value: &str) -> bool {
    let rest = match value.strip_prefix('P') {
        Some(rest) if !rest.is_empty() => rest,
        _ => return false,
    };
    let mut saw_component = false;
    let mut digits = false;
    for ch in rest.chars() {
        match ch {
            '0'..='9' | '.' | ',' => digits = true,
            'T' => {}
            'Y' | 'M' | 'D' | 'H' | 'S' | 'W' => {
                if !digits {
                    return false;
                }
                saw_component = true;
                digits = false;
            }
            _ => return false,
        }
    }
    saw_component && !digits
}

enum JsonShape {
    GeoJson,
    Object,
    Array,
    None,
}

const GEOJSON_TYPES: &[&str] = &[
    "Point",
    "MultiPoint",
    "LineString",
    "MultiLineString",
    "Polygon",
    "MultiPolygon",
    "GeometryCollection",
    "Feature",
    "FeatureCollection",
];

fn parse_json_shape(value: &str) -> JsonShape {
    if !value.starts_with('{') && !value.starts_with('[') {
        return JsonShape::None;
    }
    match serde_json::from_str::<serde_json::Value>(value) {
        Ok(serde_json::Value::Object(map)) => {
            let is_geojson = map
                .get("type")
                .and_then(|t| t.as_str())
                .is_some_and(|t| GEOJSON_TYPES.contains(&t))
                && (map.contains_key("coordinates")
                    || map.contains_key("geometry")
                    || map.contains_key("geometries")
                    || map.contains_key("features"));
            if is_geojson {
                JsonShape::GeoJson
            } else {
                JsonShape::Object
            }
        }
        Ok(serde_json::Value::Array(_)) => JsonShape::Array,
        _ => JsonShape::None,
    }
}

/// "lon,lat" with both halves parsing as in-range coordinates.
fn is_geopoint(value: &str) -> bool {
    let Some((lon, lat)) = value.split_once(',') else {
        return false;
    };
    let (Ok(lon), Ok(lat)) = (lon.trim().parse::<f64>(), lat.trim().parse::<f64>()) else {
        return false;
    };
    (-180.0..=180.0).contains(&lon) && (-90.0..=90.0).contains(&lat)
}

/// Shape gate: a time has a colon and no date separators.
fn cast_time(value: &str) -> Option<&'static str> {
    if !value.contains(':') || value.contains('-') || value.contains('/') {
        return None;
    }
    // A dot is only acceptable as fractional seconds, after the colons.
    if let Some(dot) = value.find('.') {
        if dot < value.rfind(':')? {
            return None;
        }
    }
    TIME_PATTERNS
        .iter()
        .find(|p| NaiveTime::parse_from_str(value, p).is_ok())
        .copied()
}

/// Shape gate: a date has separators, no colon, and a plausible length.
fn cast_date(value: &str) -> Option<&'static str> {
    if value.contains(':') || !(8..=10).contains(&value.len()) {
        return None;
    }
    if !value.contains('-') && !value.contains('/') && !value.contains('.') {
        return None;
    }
    DATE_PATTERNS
        .iter()
        .find(|p| NaiveDate::parse_from_str(value, p).is_ok())
        .copied()
}

/// Shape gate: a datetime carries both a date part and a time part. A dot
/// before the first colon would be a decimal separator, not fractional
/// seconds, and disqualifies the value.
fn cast_datetime(value: &str) -> Option<&'static str> {
    let colon = value.find(':')?;
    if value.len() < 14 {
        return None;
    }
    if let Some(dot) = value.find('.') {
        // "31.12.2020 10:30" keeps its dots before the colon and is fine;
        // "1.5:" shapes are not. Only reject when the dot-led prefix parses
        // as a plain number.
        if dot < colon && is_plain_number(&value[..colon]) {
            return None;
        }
    }
    if DateTime::parse_from_rfc3339(value).is_ok() {
        return Some("%Y-%m-%dT%H:%M:%S%:z");
    }
    DATETIME_PATTERNS
        .iter()
        .find(|p| NaiveDateTime::parse_from_str(value, p).is_ok())
        .copied()
}

/// Finite float made only of numeric characters.
fn is_plain_number(value: &str) -> bool {
    if value.is_empty()
        || !value
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
    {
        return false;
    }
    value.parse::<f64>().map(|v| v.is_finite()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn types_of(raw: &str) -> Vec<CellType> {
        TypeGuesser::new()
            .candidates(raw)
            .into_iter()
            .map(|c| c.ty)
            .collect()
    }

    #[test]
    fn test_missing_markers() {
        assert_eq!(types_of(""), vec![CellType::Missing]);
        assert_eq!(types_of("n/a"), vec![CellType::Missing]);
        assert_eq!(types_of("-"), vec![CellType::Missing]);
    }

    #[rstest]
    #[case("-123")]
    #[case("10")]
    #[case("007")]
    fn integers(#[case] raw: &str) {
        let types = types_of(raw);
        assert!(types.contains(&CellType::Integer), "{raw}: {types:?}");
        assert!(types.contains(&CellType::Number));
        assert_eq!(types.last(), Some(&CellType::Any));
    }

    #[test]
    fn test_thousand_separator_is_not_numeric() {
        let types = types_of("1 000");
        assert!(!types.contains(&CellType::Integer));
        assert!(!types.contains(&CellType::Number));
        assert!(types.contains(&CellType::String));
    }

    #[test]
    fn test_ordering_most_specific_first() {
        let candidates = TypeGuesser::new().candidates("10");
        let priorities: Vec<u8> = candidates.iter().map(|c| c.ty.priority()).collect();
        let mut sorted = priorities.clone();
        sorted.sort_unstable();
        assert_eq!(priorities, sorted);
    }

    #[test]
    fn test_time_shapes() {
        assert!(types_of("23:15").contains(&CellType::Time));
        assert!(types_of("23:15:30").contains(&CellType::Time));
        // Date separators exclude the time cast.
        assert!(!types_of("2023-01-01").contains(&CellType::Time));
    }

    #[test]
    fn test_date_formats_carry_pattern() {
        let candidates = TypeGuesser::new().candidates("31.12.2020");
        let date = candidates
            .iter()
            .find(|c| c.ty == CellType::Date)
            .expect("date candidate");
        assert_eq!(date.format, "%d.%m.%Y");
    }

    #[test]
    fn test_plain_float_is_not_datetime() {
        let types = types_of("1050.25");
        assert!(types.contains(&CellType::Number));
        assert!(!types.contains(&CellType::DateTime));
        assert!(!types.contains(&CellType::Time));
    }

    #[test]
    fn test_fractional_seconds_datetime() {
        let types = types_of("2023-01-01T10:30:05.500");
        assert!(types.contains(&CellType::DateTime));
    }

    #[test]
    fn test_rfc3339() {
        assert!(types_of("2023-01-01T10:30:05+01:00").contains(&CellType::DateTime));
    }

    #[test]
    fn test_duration() {
        assert!(types_of("P1Y2M10D").contains(&CellType::Duration));
        assert!(types_of("PT1H30M").contains(&CellType::Duration));
        assert!(!types_of("Premature").contains(&CellType::Duration));
        assert!(!types_of("P").contains(&CellType::Duration));
    }

    #[test]
    fn test_geojson_is_also_object() {
        let types = types_of(r#"{"type": "Point", "coordinates": [21.0, 52.2]}"#);
        assert_eq!(types[0], CellType::GeoJson);
        assert!(types.contains(&CellType::Object));
    }

    #[test]
    fn test_plain_object_and_array() {
        assert_eq!(types_of(r#"{"a": 1}"#)[0], CellType::Object);
        assert_eq!(types_of("[1, 2]")[0], CellType::Array);
    }

    #[test]
    fn test_geopoint() {
        assert!(types_of("21.01, 52.23").contains(&CellType::GeoPoint));
        assert!(!types_of("200.0, 95.0").contains(&CellType::GeoPoint));
    }

    #[test]
    fn test_boolean() {
        assert!(types_of("true").contains(&CellType::Boolean));
        assert!(types_of("No").contains(&CellType::Boolean));
        assert!(!types_of("2").contains(&CellType::Boolean));
    }
}
