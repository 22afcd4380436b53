use csv::ReaderBuilder;

use super::{strip_bom, SourceError, UnreadableRow};

/// One row of an administrative feeder export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeederRow {
    pub line: u64,
    pub feeder_name: String,
    pub area: i64,
}

fn parse_area(raw: &str) -> Option<i64> {
    let s = raw.trim();
    s.parse::<i64>().ok().or_else(|| {
        s.parse::<f64>()
            .ok()
            .filter(|v| v.fract() == 0.0 && v.is_finite())
            .map(|v| v as i64)
    })
}

/// Reads `feeder_id,area_code` exports. `feeder_id` carries the feeder
/// name (e.g. `Fdr-101`), `area_code` the integer area.
pub fn read_feeders(input: &[u8]) -> Result<Vec<Result<FeederRow, UnreadableRow>>, SourceError> {
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .from_reader(strip_bom(input));

    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| SourceError::Header(e.to_string()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let name_idx = headers.iter().position(|h| h == "feeder_id");
    let area_idx = headers.iter().position(|h| h == "area_code");
    let (name_idx, area_idx) = match (name_idx, area_idx) {
        (Some(n), Some(a)) => (n, a),
        (n, a) => {
            let mut missing = Vec::new();
            if n.is_none() {
                missing.push("feeder_id".to_string());
            }
            if a.is_none() {
                missing.push("area_code".to_string());
            }
            return Err(SourceError::MissingColumns(missing));
        }
    };

    let mut rows = Vec::new();
    for (n, result) in rdr.records().enumerate() {
        let fallback_line = n as u64 + 2;
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                rows.push(Err(UnreadableRow {
                    line: e.position().map(|p| p.line()).unwrap_or(fallback_line),
                    reason: e.to_string(),
                }));
                continue;
            }
        };
        let line = record.position().map(|p| p.line()).unwrap_or(fallback_line);

        let name = record.get(name_idx).map(str::trim).unwrap_or("");
        let area = record.get(area_idx).and_then(parse_area);
        match (name.is_empty(), area) {
            (false, Some(area)) => rows.push(Ok(FeederRow {
                line,
                feeder_name: name.to_string(),
                area,
            })),
            _ => rows.push(Err(UnreadableRow {
                line,
                reason: "feeder_id and an integer area_code are required".to_string(),
            })),
        }
    }

    Ok(rows)
}
