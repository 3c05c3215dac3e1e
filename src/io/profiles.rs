//! CSV import of hourly solar and load tables.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

/// One row of a profile CSV file: `hour,solar_kwh,load_kwh`.
#[derive(Debug, Deserialize)]
struct ProfileRecord {
    hour: usize,
    solar_kwh: f64,
    load_kwh: f64,
}

/// Solar and load tables read from CSV, one value per hour.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileTables {
    pub solar_kwh: Vec<f64>,
    pub load_kwh: Vec<f64>,
}

/// Reads profile tables from a CSV file.
///
/// # Errors
///
/// Returns a `ConfigError` if the file cannot be opened or its contents are
/// invalid (see [`read_profiles`]).
pub fn read_profiles_csv(path: &Path) -> Result<ProfileTables, ConfigError> {
    let file = File::open(path).map_err(|e| {
        ConfigError::new(
            "profiles.csv",
            format!("cannot read \"{}\": {e}", path.display()),
        )
    })?;
    read_profiles(file)
}

/// Reads profile tables from any CSV source.
///
/// Rows must be in hour order starting at 0.
///
/// # Errors
///
/// Returns a `ConfigError` on malformed rows, out-of-order hours, or an
/// empty table.
pub fn read_profiles(reader: impl Read) -> Result<ProfileTables, ConfigError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut tables = ProfileTables {
        solar_kwh: Vec::new(),
        load_kwh: Vec::new(),
    };

    for (expected_hour, record) in rdr.deserialize::<ProfileRecord>().enumerate() {
        let record = record.map_err(|e| ConfigError::new("profiles.csv", e.to_string()))?;
        if record.hour != expected_hour {
            return Err(ConfigError::new(
                "profiles.csv",
                format!("expected hour {expected_hour}, found {}", record.hour),
            ));
        }
        tables.solar_kwh.push(record.solar_kwh);
        tables.load_kwh.push(record.load_kwh);
    }

    if tables.solar_kwh.is_empty() {
        return Err(ConfigError::new("profiles.csv", "contains no rows"));
    }
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_rows_in_order() {
        let data = "hour,solar_kwh,load_kwh\n0,0.0,0.5\n1, 1.5 ,0.7\n";
        let tables = read_profiles(data.as_bytes()).unwrap();
        assert_eq!(tables.solar_kwh, vec![0.0, 1.5]);
        assert_eq!(tables.load_kwh, vec![0.5, 0.7]);
    }

    #[test]
    fn rejects_gap_in_hours() {
        let data = "hour,solar_kwh,load_kwh\n0,0.0,0.5\n2,0.0,0.5\n";
        let err = read_profiles(data.as_bytes()).unwrap_err();
        assert!(err.message.contains("expected hour 1"));
    }

    #[test]
    fn rejects_non_numeric_value() {
        let data = "hour,solar_kwh,load_kwh\n0,sunny,0.5\n";
        assert!(read_profiles(data.as_bytes()).is_err());
    }

    #[test]
    fn rejects_empty_table() {
        let data = "hour,solar_kwh,load_kwh\n";
        let err = read_profiles(data.as_bytes()).unwrap_err();
        assert_eq!(err.field, "profiles.csv");
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = read_profiles_csv(Path::new("/nonexistent/profile.csv")).unwrap_err();
        assert!(err.message.contains("/nonexistent/profile.csv"));
    }
}
