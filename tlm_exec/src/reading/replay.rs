//! # Replay Source
//!
//! Replays snapshots from a CSV file recorded from the robot. The file must have a header row; the
//! `timestamp` column is kept as text and every other column is read as a floating point number.
//! Columns which are absent from the file, or cells which are empty, give `None` values.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::debug;
use serde::Deserialize;
use std::{io::Read, path::{Path, PathBuf}};

use super::{digital_from_f64, ReadingError, ReadingSource, Snapshot};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A reading source backed by recorded data.
pub struct ReplaySource {
    readings: Vec<Snapshot>,

    /// Index of the next reading to return
    cursor: usize,

    /// If true the cursor wraps back to the first reading once all have been returned
    wrap: bool,
}

/// One row of the replay file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ReplayRow {
    timestamp: Option<String>,
    power: Option<f64>,
    #[serde(rename = "X")]
    x: Option<f64>,
    #[serde(rename = "Y")]
    y: Option<f64>,
    #[serde(rename = "Z")]
    z: Option<f64>,
    #[serde(rename = "W")]
    w: Option<f64>,
    #[serde(rename = "P")]
    p: Option<f64>,
    #[serde(rename = "R")]
    r: Option<f64>,
    #[serde(rename = "J1")]
    j1: Option<f64>,
    #[serde(rename = "J2")]
    j2: Option<f64>,
    #[serde(rename = "J3")]
    j3: Option<f64>,
    #[serde(rename = "J4")]
    j4: Option<f64>,
    #[serde(rename = "J5")]
    j5: Option<f64>,
    #[serde(rename = "J6")]
    j6: Option<f64>,
    rdo: Option<f64>,
    rdi101: Option<f64>,
    rdi102: Option<f64>,
    rdi103: Option<f64>,
    rdi104: Option<f64>,
    rdi105: Option<f64>,
    rdi106: Option<f64>,
    rdi107: Option<f64>,
    rdi108: Option<f64>,
    do101: Option<f64>,
    do102: Option<f64>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ReplaySource {
    /// Load every row of the given CSV file.
    ///
    /// If `wrap` is false the source fails with [`ReadingError::OutOfRange`] once every reading
    /// has been returned.
    pub fn new<P: AsRef<Path>>(path: P, wrap: bool) -> Result<Self, ReadingError> {
        let path = path.as_ref();

        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| ReadingError::ReplayOpenError(path.to_path_buf(), e))?;

        let readings = Self::parse(reader)?;

        if readings.is_empty() {
            return Err(ReadingError::EmptyReplay(path.to_path_buf()));
        }

        debug!("Loaded {} readings from {:?}", readings.len(), path);

        Ok(Self::from_readings(readings, wrap))
    }

    /// Load readings from any CSV formatted reader.
    pub fn from_reader<R: Read>(rdr: R, wrap: bool) -> Result<Self, ReadingError> {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(rdr);

        let readings = Self::parse(reader)?;

        if readings.is_empty() {
            return Err(ReadingError::EmptyReplay(PathBuf::new()));
        }

        Ok(Self::from_readings(readings, wrap))
    }

    /// Build a source directly from a set of snapshots.
    pub fn from_readings(readings: Vec<Snapshot>, wrap: bool) -> Self {
        Self {
            readings,
            cursor: 0,
            wrap,
        }
    }

    /// Return the reading at the cursor and advance.
    ///
    /// When `reset` is true and the end of the data is reached the cursor goes back to the start.
    /// Otherwise it is left past the end and the following call fails.
    pub fn next_reading(&mut self, reset: bool) -> Result<Snapshot, ReadingError> {
        let reading = self
            .readings
            .get(self.cursor)
            .cloned()
            .ok_or(ReadingError::OutOfRange {
                index: self.cursor,
                len: self.readings.len(),
            })?;

        self.cursor += 1;

        if reset && self.cursor >= self.readings.len() {
            self.cursor = 0;
        }

        Ok(reading)
    }

    /// Number of readings in the source
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    /// Index of the next reading to be returned
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    fn parse<R: Read>(mut reader: csv::Reader<R>) -> Result<Vec<Snapshot>, ReadingError> {
        reader
            .deserialize::<ReplayRow>()
            .enumerate()
            .map(|(i, row)| {
                row.map(ReplayRow::into_snapshot)
                    .map_err(|err| ReadingError::ReplayParseError { row: i + 1, err })
            })
            .collect()
    }
}

impl ReadingSource for ReplaySource {
    fn get_next_reading(&mut self) -> Result<Snapshot, ReadingError> {
        self.next_reading(self.wrap)
    }
}

impl ReplayRow {
    fn into_snapshot(self) -> Snapshot {
        let digital = |v: Option<f64>| v.and_then(digital_from_f64);

        Snapshot {
            timestamp: self.timestamp,
            power_w: self.power,
            pose: [self.x, self.y, self.z, self.w, self.p, self.r],
            joints: [self.j1, self.j2, self.j3, self.j4, self.j5, self.j6],
            rdo: digital(self.rdo),
            rdi: [
                digital(self.rdi101),
                digital(self.rdi102),
                digital(self.rdi103),
                digital(self.rdi104),
                digital(self.rdi105),
                digital(self.rdi106),
                digital(self.rdi107),
                digital(self.rdi108),
            ],
            dout: [digital(self.do101), digital(self.do102)],
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const LOG: &str = "\
timestamp,power,X,Y,Z,W,P,R,J1,J2,J3,J4,J5,J6,rdo,rdi101,rdi102,rdi103,rdi104,rdi105,rdi106,rdi107,rdi108,do101,do102
2023-05-02 10:00:00,850.0,100,0,300,180,0,0,0,10,-20,0,-60,0,1,1,0,0,0,0,0,0,0,1,0
2023-05-02 10:00:01,910.5,110,5,300,180,0,0,1,11,-21,0,-59,0,0,1,1,0,0,0,0,0,0,1,1
2023-05-02 10:00:02,700.0,120,10,290,180,0,0,2,12,-22,0,-58,0,0,1,1,0,0,1,0,0,0,0,1
";

    #[test]
    fn test_parse_full_row() {
        let mut src = ReplaySource::from_reader(LOG.as_bytes(), true).unwrap();
        assert_eq!(src.len(), 3);

        let s = src.get_next_reading().unwrap();
        assert_eq!(s.timestamp.as_deref(), Some("2023-05-02 10:00:00"));
        assert_eq!(s.power_w, Some(850.0));
        assert_eq!(s.pose[0], Some(100.0));
        assert_eq!(s.pose[2], Some(300.0));
        assert_eq!(s.joints[4], Some(-60.0));
        assert_eq!(s.rdo, Some(1));
        assert_eq!(s.din(101), Some(1));
        assert_eq!(s.din(102), Some(0));
        assert_eq!(s.dout(101), Some(1));
        assert_eq!(s.dout(102), Some(0));
    }

    #[test]
    fn test_cyclic_replay() {
        let mut src = ReplaySource::from_reader(LOG.as_bytes(), true).unwrap();

        let first = src.get_next_reading().unwrap();
        src.get_next_reading().unwrap();
        src.get_next_reading().unwrap();
        assert_eq!(src.cursor(), 0);

        assert_eq!(src.get_next_reading().unwrap(), first);
    }

    #[test]
    fn test_replay_without_wrap() {
        let mut src = ReplaySource::from_reader(LOG.as_bytes(), false).unwrap();

        for _ in 0..3 {
            src.get_next_reading().unwrap();
        }

        assert!(matches!(
            src.get_next_reading(),
            Err(ReadingError::OutOfRange { index: 3, len: 3 })
        ));
    }

    #[test]
    fn test_missing_columns_and_cells() {
        let log = "timestamp,power,X,rdo\n2023-05-02 10:00:00,,12.5,0\n";
        let mut src = ReplaySource::from_reader(log.as_bytes(), true).unwrap();

        let s = src.get_next_reading().unwrap();
        assert_eq!(s.power_w, None);
        assert_eq!(s.pose[0], Some(12.5));
        assert_eq!(s.pose[1], None);
        assert_eq!(s.joints, [None; 6]);
        assert_eq!(s.rdo, Some(0));
        assert_eq!(s.rdi, [None; 8]);
    }

    #[test]
    fn test_non_finite_digital_cells() {
        let log = "timestamp,rdo,rdi101,rdi102,do101\n2023-05-02 10:00:00,NaN,inf,-inf,1\n";
        let mut src = ReplaySource::from_reader(log.as_bytes(), true).unwrap();

        let s = src.get_next_reading().unwrap();
        assert_eq!(s.rdo, None);
        assert_eq!(s.din(101), None);
        assert_eq!(s.din(102), None);
        assert_eq!(s.dout(101), Some(1));
    }

    #[test]
    fn test_invalid_and_empty_data() {
        let log = "timestamp,power\n2023-05-02 10:00:00,lots\n";
        assert!(matches!(
            ReplaySource::from_reader(log.as_bytes(), true),
            Err(ReadingError::ReplayParseError { row: 1, .. })
        ));

        assert!(matches!(
            ReplaySource::from_reader("timestamp,power\n".as_bytes(), true),
            Err(ReadingError::EmptyReplay(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("tlm_replay_{}.csv", std::process::id()));
        std::fs::write(&path, LOG).unwrap();

        let src = ReplaySource::new(&path, true);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(src.unwrap().len(), 3);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            ReplaySource::new("/nonexistent/robot_log.csv", true),
            Err(ReadingError::ReplayOpenError(..))
        ));
    }
}
