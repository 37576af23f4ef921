//! File formats for the drive-mode host: drivecard catalogs (NDJSON or CSV),
//! recorded routes (CSV) and a JSON-file settings store.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Read, Write};
use std::{fs::File, path::Path};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use model::*;

mod settings;
pub use settings::FileSettingsStore;

/// One NDJSON line per drivecard, in the model's camelCase shape. Blank lines
/// are skipped; a malformed line fails the import with its line number.
pub fn read_catalog_ndjson<R: Read>(r: R) -> Result<Vec<PlayableItem>> {
    let mut items = vec![];
    for (n, line) in BufReader::new(r).lines().enumerate() {
        let s = line?;
        if s.trim().is_empty() {
            continue;
        }
        let item: PlayableItem =
            serde_json::from_str(&s).with_context(|| format!("catalog line {}", n + 1))?;
        items.push(item);
    }
    Ok(items)
}

pub fn write_catalog_ndjson<W: Write>(items: &[PlayableItem], w: W) -> Result<()> {
    let mut w = std::io::BufWriter::new(w);
    for item in items {
        serde_json::to_writer(&mut w, item)?;
        writeln!(w)?;
    }
    w.flush()?;
    Ok(())
}

pub fn import_catalog_ndjson(path: &Path) -> Result<Vec<PlayableItem>> {
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    read_catalog_ndjson(f)
}

pub fn export_catalog_ndjson(items: &[PlayableItem], path: &Path) -> Result<()> {
    let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
    write_catalog_ndjson(items, f)
}

/// Flat catalog row. Only URL audio survives CSV; blobs are dropped on export.
#[derive(Serialize, Deserialize)]
struct CatalogRow {
    id: String,
    title: String,
    latitude: f64,
    longitude: f64,
    category: String,
    audio_url: Option<String>,
    username: String,
    user_id: String,
    created_at: Option<String>,
    updated_at: Option<String>,
}

pub fn read_catalog_csv<R: Read>(r: R) -> Result<Vec<PlayableItem>> {
    let mut rdr = csv::Reader::from_reader(r);
    let mut items = vec![];
    for rec in rdr.deserialize() {
        let row: CatalogRow = rec?;
        let created_at = parse_time(row.created_at.as_deref())?;
        let updated_at = match row.updated_at.as_deref() {
            Some(_) => parse_time(row.updated_at.as_deref())?,
            None => created_at,
        };
        items.push(PlayableItem {
            id: row.id,
            title: row.title,
            geo: GeoPoint::new(row.latitude, row.longitude),
            category: row.category,
            audio: AudioRef { blob: None, url: row.audio_url.filter(|u| !u.is_empty()) },
            username: row.username,
            user_id: row.user_id,
            created_at,
            updated_at,
        });
    }
    Ok(items)
}

pub fn write_catalog_csv<W: Write>(items: &[PlayableItem], w: W) -> Result<()> {
    let mut w = csv::Writer::from_writer(w);
    for i in items {
        w.serialize(CatalogRow {
            id: i.id.clone(),
            title: i.title.clone(),
            latitude: i.geo.latitude,
            longitude: i.geo.longitude,
            category: i.category.clone(),
            audio_url: i.audio.url.clone(),
            username: i.username.clone(),
            user_id: i.user_id.clone(),
            created_at: Some(i.created_at.format(&Rfc3339)?),
            updated_at: Some(i.updated_at.format(&Rfc3339)?),
        })?;
    }
    w.flush()?;
    Ok(())
}

pub fn import_catalog_csv(path: &Path) -> Result<Vec<PlayableItem>> {
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    read_catalog_csv(f)
}

pub fn export_catalog_csv(items: &[PlayableItem], path: &Path) -> Result<()> {
    let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
    write_catalog_csv(items, f)
}

/// Picks the format from the extension: `.csv` is CSV, anything else NDJSON.
pub fn import_catalog(path: &Path) -> Result<Vec<PlayableItem>> {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("csv") => import_catalog_csv(path),
        _ => import_catalog_ndjson(path),
    }
}

fn parse_time(s: Option<&str>) -> Result<OffsetDateTime> {
    match s.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => OffsetDateTime::parse(s, &Rfc3339).with_context(|| format!("bad timestamp {s:?}")),
        None => Ok(OffsetDateTime::UNIX_EPOCH),
    }
}

/// A recorded position sample, `t_ms` from the start of the route.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteSample {
    #[serde(rename = "lat")]
    pub latitude: f64,
    #[serde(rename = "lon")]
    pub longitude: f64,
    pub speed_mph: f64,
    pub t_ms: u64,
}

impl RouteSample {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// Reads `lat,lon,speed_mph,t_ms` rows. Samples must be in time order.
pub fn read_route_csv<R: Read>(r: R) -> Result<Vec<RouteSample>> {
    let mut rdr = csv::Reader::from_reader(r);
    let mut out: Vec<RouteSample> = vec![];
    for (n, rec) in rdr.deserialize().enumerate() {
        let s: RouteSample = rec.with_context(|| format!("route row {}", n + 1))?;
        if let Some(prev) = out.last() {
            anyhow::ensure!(s.t_ms >= prev.t_ms, "route row {}: t_ms goes backwards", n + 1);
        }
        out.push(s);
    }
    Ok(out)
}

pub fn import_route_csv(path: &Path) -> Result<Vec<RouteSample>> {
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    read_route_csv(f)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NDJSON: &str = r#"{"id":"a","title":"Old Pier","geo":{"latitude":40.7135,"longitude":-74.006},"category":"history","audio":{"url":"https://cdn.example/a.mp3"},"username":"sam","userId":"u1","createdAt":"2024-05-01T10:00:00Z","updatedAt":"2024-05-01T10:00:00Z"}

{"id":"b","title":"Market","geo":{"latitude":40.72,"longitude":-74.0},"category":"food","audio":{"url":"https://cdn.example/b.mp3"},"username":"sam","userId":"u1","createdAt":"2024-05-02T10:00:00Z","updatedAt":"2024-05-03T10:00:00Z"}
"#;

    #[test]
    fn test_ndjson_catalog_import() {
        let items = read_catalog_ndjson(NDJSON.as_bytes()).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "a");
        assert_eq!(items[0].geo, GeoPoint::new(40.7135, -74.006));
        assert_eq!(items[1].category, "food");
        assert!(items[1].updated_at > items[1].created_at);

        let mut buf = Vec::new();
        write_catalog_ndjson(&items, &mut buf).unwrap();
        assert_eq!(read_catalog_ndjson(buf.as_slice()).unwrap(), items);
    }

    #[test]
    fn test_ndjson_error_names_line() {
        let bad = "{\"id\":\"a\"}\n";
        let err = read_catalog_ndjson(bad.as_bytes()).unwrap_err();
        assert!(format!("{err:#}").contains("catalog line 1"));
    }

    #[test]
    fn test_csv_catalog_import() {
        let csv = "id,title,latitude,longitude,category,audio_url,username,user_id,created_at,updated_at\n\
                   a,Old Pier,40.7135,-74.006,history,https://cdn.example/a.mp3,sam,u1,2024-05-01T10:00:00Z,\n\
                   b,Silent,40.72,-74.0,food,,sam,u1,,\n";
        let items = read_catalog_csv(csv.as_bytes()).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].audio.url.as_deref(), Some("https://cdn.example/a.mp3"));
        assert_eq!(items[0].updated_at, items[0].created_at);
        assert!(items[1].audio.is_empty());
        assert_eq!(items[1].created_at, OffsetDateTime::UNIX_EPOCH);
    }

    #[test]
    fn test_route_csv_import() {
        let csv = "lat,lon,speed_mph,t_ms\n40.7128,-74.0060,0,0\n40.7135,-74.0060,12.5,2000\n";
        let route = read_route_csv(csv.as_bytes()).unwrap();
        assert_eq!(route.len(), 2);
        assert_eq!(route[1].speed_mph, 12.5);
        assert_eq!(route[1].t_ms, 2000);
        assert_eq!(route[0].point(), GeoPoint::new(40.7128, -74.0060));
    }

    #[test]
    fn test_route_rejects_time_going_backwards() {
        let csv = "lat,lon,speed_mph,t_ms\n40.0,-74.0,0,5000\n40.1,-74.0,0,1000\n";
        assert!(read_route_csv(csv.as_bytes()).is_err());
    }
}
