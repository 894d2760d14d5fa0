use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::cache::CacheEntry;
use crate::config::ColumnNames;
use crate::errors::{AppError, AppResult};
use crate::model::ResolutionStatus;

const CANDIDATE_DELIMITERS: &[u8] = b",;\t|";

/// One station row. The typed fields mirror their cells in `fields`, which
/// also carries every column the pipeline does not touch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StationRecord {
    pub station_code: Option<String>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub status: Option<ResolutionStatus>,
    fields: Vec<String>,
}

impl StationRecord {
    pub fn new(station_code: Option<&str>, address: Option<&str>) -> Self {
        Self {
            station_code: station_code.map(str::to_string),
            address: address.map(str::to_string),
            ..Self::default()
        }
    }

    pub fn has_coordinates(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }

    pub fn apply(&mut self, entry: &CacheEntry) {
        self.latitude = entry.latitude();
        self.longitude = entry.longitude();
        self.status = Some(entry.status());
    }
}

#[derive(Debug, Clone, Copy)]
struct ColumnLayout {
    station_code: Option<usize>,
    address: usize,
    latitude: usize,
    longitude: usize,
    status: usize,
}

/// The working table, kept in input order.
#[derive(Debug, Clone)]
pub struct Dataset {
    headers: Vec<String>,
    delimiter: u8,
    layout: ColumnLayout,
    records: Vec<StationRecord>,
}

impl Dataset {
    /// Reads a CSV file, appending the coordinate and status columns when absent.
    pub fn load(path: &Path, columns: &ColumnNames, delimiter: Option<u8>) -> AppResult<Self> {
        let contents = fs::read_to_string(path)?;
        let delimiter = delimiter.unwrap_or_else(|| sniff_delimiter(&contents));
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .from_reader(contents.as_bytes());

        let mut headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        let position = |headers: &[String], name: &str| headers.iter().position(|h| h == name);

        let address = position(&headers, &columns.address).ok_or_else(|| {
            AppError::Config(format!(
                "column '{}' does not exist in {}",
                columns.address,
                path.display()
            ))
        })?;
        let source_width = headers.len();
        let station_code = position(&headers, &columns.station_code);
        if station_code.is_none() {
            warn!(column = %columns.station_code, "station code column missing; only address lookups are possible");
        }
        let mut ensure = |name: &str| {
            position(&headers, name).unwrap_or_else(|| {
                headers.push(name.to_string());
                headers.len() - 1
            })
        };
        let layout = ColumnLayout {
            station_code,
            address,
            latitude: ensure(&columns.latitude),
            longitude: ensure(&columns.longitude),
            status: ensure(&columns.status),
        };

        let mut records = Vec::new();
        for (index, row) in reader.records().enumerate() {
            let row = row?;
            let mut fields: Vec<String> = row.iter().map(str::to_string).collect();
            // Cells past the header go after the appended columns so they are written back untouched.
            let overflow = fields.split_off(fields.len().min(source_width));
            if !overflow.is_empty() {
                warn!(row = index, extra_cells = overflow.len(), "row is wider than the header; keeping trailing cells");
            }
            fields.resize(headers.len(), String::new());
            fields.extend(overflow);
            records.push(parse_record(index, fields, layout));
        }

        debug!(
            path = %path.display(),
            rows = records.len(),
            delimiter = %char::from(delimiter),
            "dataset loaded"
        );
        Ok(Self {
            headers,
            delimiter,
            layout,
            records,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn records(&self) -> &[StationRecord] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut [StationRecord] {
        &mut self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Rows whose status is `OK` or `FALLBACK_NO_NUMBER`.
    pub fn resolved_count(&self) -> usize {
        self.records
            .iter()
            .filter(|record| record.status.is_some_and(|status| status.is_resolved()))
            .count()
    }

    /// Overwrites `path` with the current table, replacing the file only once fully written.
    pub fn save(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let staging = path.with_extension("csv.partial");
        {
            let mut writer = csv::WriterBuilder::new()
                .delimiter(self.delimiter)
                .flexible(true)
                .from_path(&staging)?;
            writer.write_record(&self.headers)?;
            for record in &self.records {
                writer.write_record(self.render(record))?;
            }
            writer.flush()?;
        }
        fs::rename(&staging, path)?;
        Ok(())
    }

    fn render(&self, record: &StationRecord) -> Vec<String> {
        let mut fields = record.fields.clone();
        if fields.len() < self.headers.len() {
            fields.resize(self.headers.len(), String::new());
        }
        let layout = self.layout;
        if let Some(index) = layout.station_code {
            fields[index] = record.station_code.clone().unwrap_or_default();
        }
        fields[layout.address] = record.address.clone().unwrap_or_default();
        fields[layout.latitude] = record.latitude.map(|v| v.to_string()).unwrap_or_default();
        fields[layout.longitude] = record.longitude.map(|v| v.to_string()).unwrap_or_default();
        fields[layout.status] = record
            .status
            .map(|s| s.as_str().to_string())
            .unwrap_or_default();
        fields
    }
}

impl FromIterator<StationRecord> for Dataset {
    /// Builds an in-memory table using the default column names.
    fn from_iter<T: IntoIterator<Item = StationRecord>>(iter: T) -> Self {
        let columns = ColumnNames::default();
        let headers = vec![
            columns.station_code,
            columns.address,
            columns.latitude,
            columns.longitude,
            columns.status,
        ];
        let records = iter
            .into_iter()
            .map(|mut record| {
                if record.fields.len() < headers.len() {
                    record.fields.resize(headers.len(), String::new());
                }
                record
            })
            .collect();
        Self {
            headers,
            delimiter: b',',
            layout: ColumnLayout {
                station_code: Some(0),
                address: 1,
                latitude: 2,
                longitude: 3,
                status: 4,
            },
            records,
        }
    }
}

fn parse_record(index: usize, fields: Vec<String>, layout: ColumnLayout) -> StationRecord {
    let cell = |position: usize| {
        let value = fields[position].trim();
        (!value.is_empty()).then(|| value.to_string())
    };
    let coordinate = |position: usize| {
        cell(position).and_then(|value| match value.parse::<f64>() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                warn!(row = index, %value, "unparsable coordinate; row will be resolved again");
                None
            }
        })
    };

    StationRecord {
        station_code: layout.station_code.and_then(cell),
        address: cell(layout.address),
        latitude: coordinate(layout.latitude),
        longitude: coordinate(layout.longitude),
        status: cell(layout.status).and_then(|value| ResolutionStatus::parse(&value).ok()),
        fields,
    }
}

fn sniff_delimiter(contents: &str) -> u8 {
    let header = contents.lines().next().unwrap_or_default();
    CANDIDATE_DELIMITERS
        .iter()
        .copied()
        .map(|candidate| (candidate, header.bytes().filter(|b| *b == candidate).count()))
        .filter(|(_, count)| *count > 0)
        .max_by_key(|(_, count)| *count)
        .map(|(candidate, _)| candidate)
        .unwrap_or(b',')
}
