use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use serde::Deserialize;

use crate::error::{AnimeError, Result};
use crate::types::PoseSample;

const TIME_COLUMNS: &[&str] = &["timestamp", "time", "TimeStamp"];
const X_COLUMNS: &[&str] = &["x", "pose_x", "pose.x"];
const Y_COLUMNS: &[&str] = &["y", "pose_y", "pose.y"];
const Z_COLUMNS: &[&str] = &["z", "pose_z", "pose.z"];
const ROLL_COLUMNS: &[&str] = &["roll", "pose_roll", "pose.roll"];
const PITCH_COLUMNS: &[&str] = &["pitch", "pose_pitch", "pose.pitch"];
const YAW_COLUMNS: &[&str] = &["yaw", "pose_yaw", "pose.yaw"];

/// Which optional column groups a pose file carried.
///
/// Position (x, y, z) is always required. Without a time column the samples
/// are stamped with their row index and the time/speed readout is hidden.
/// Without orientation the heading arrow is hidden.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoseSchema {
    pub time: bool,
    pub orientation: bool,
}

impl PoseSchema {
    pub const FULL: PoseSchema = PoseSchema {
        time: true,
        orientation: true,
    };
    pub const POSITION_ONLY: PoseSchema = PoseSchema {
        time: false,
        orientation: false,
    };

    /// Resolve the schema from a CSV header row
    fn from_headers(headers: &csv::StringRecord, source_name: &str) -> Result<Self> {
        let has = |aliases: &[&str]| headers.iter().any(|h| aliases.contains(&h));

        for (name, aliases) in [("x", X_COLUMNS), ("y", Y_COLUMNS), ("z", Z_COLUMNS)] {
            if !has(aliases) {
                return Err(AnimeError::data_format(
                    source_name,
                    format!("missing required column {} (one of {:?})", name, aliases),
                ));
            }
        }

        let orientation = [ROLL_COLUMNS, PITCH_COLUMNS, YAW_COLUMNS].map(has);
        let orientation = match orientation {
            [true, true, true] => true,
            [false, false, false] => false,
            _ => {
                return Err(AnimeError::data_format(
                    source_name,
                    "orientation needs all of roll, pitch and yaw columns",
                ))
            }
        };

        Ok(PoseSchema {
            time: has(TIME_COLUMNS),
            orientation,
        })
    }
}

#[derive(Deserialize)]
struct PoseRow {
    #[serde(alias = "time", alias = "TimeStamp")]
    timestamp: Option<f64>,
    #[serde(alias = "pose_x", alias = "pose.x")]
    x: f64,
    #[serde(alias = "pose_y", alias = "pose.y")]
    y: f64,
    #[serde(alias = "pose_z", alias = "pose.z")]
    z: f64,
    #[serde(alias = "pose_roll", alias = "pose.roll")]
    roll: Option<f64>,
    #[serde(alias = "pose_pitch", alias = "pose.pitch")]
    pitch: Option<f64>,
    #[serde(alias = "pose_yaw", alias = "pose.yaw")]
    yaw: Option<f64>,
}

/// Ordered, immutable sequence of pose samples for one replay.
#[derive(Clone, Debug)]
pub struct TrajectoryStore {
    samples: Vec<PoseSample>,
    schema: PoseSchema,
}

impl TrajectoryStore {
    /// Build a store from already parsed samples.
    ///
    /// Fails on an empty sequence or on timestamps that go backwards.
    pub fn from_samples(samples: Vec<PoseSample>, schema: PoseSchema) -> Result<Self> {
        Self::validate(&samples, "trajectory")?;
        Ok(TrajectoryStore { samples, schema })
    }

    /// Load a pose CSV from disk. `*.gz` files are decompressed on the fly.
    pub fn load(path: &Path) -> Result<Self> {
        let source_name = path.display().to_string();
        let file = File::open(path).map_err(|e| AnimeError::data_format(&source_name, e.to_string()))?;

        let store = if path.extension().map(|e| e == "gz").unwrap_or(false) {
            Self::from_reader(BufReader::new(GzDecoder::new(file)), &source_name)?
        } else {
            Self::from_reader(BufReader::new(file), &source_name)?
        };

        log::info!(
            "Loaded {} poses from {} (time: {}, orientation: {})",
            store.len(),
            source_name,
            store.schema.time,
            store.schema.orientation
        );
        Ok(store)
    }

    /// Parse pose rows from any CSV reader; `source_name` is used in error messages.
    pub fn from_reader<R: Read>(reader: R, source_name: &str) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = rdr
            .headers()
            .map_err(|e| AnimeError::data_format(source_name, e.to_string()))?
            .clone();
        let schema = PoseSchema::from_headers(&headers, source_name)?;

        let mut samples = Vec::new();
        for (row, rec) in rdr.deserialize::<PoseRow>().enumerate() {
            let rec = rec.map_err(|e| {
                AnimeError::data_format(source_name, format!("row {}: {}", row + 1, e))
            })?;
            samples.push(Self::to_sample(rec, row, schema, source_name)?);
        }

        Self::validate(&samples, source_name)?;
        Ok(TrajectoryStore { samples, schema })
    }

    fn to_sample(rec: PoseRow, row: usize, schema: PoseSchema, source_name: &str) -> Result<PoseSample> {
        let missing = |column: &str| {
            AnimeError::data_format(source_name, format!("row {}: empty {} cell", row + 1, column))
        };

        let timestamp = if schema.time {
            rec.timestamp.ok_or_else(|| missing("time"))?
        } else {
            row as f64
        };
        let (roll, pitch, yaw) = if schema.orientation {
            (
                rec.roll.ok_or_else(|| missing("roll"))?,
                rec.pitch.ok_or_else(|| missing("pitch"))?,
                rec.yaw.ok_or_else(|| missing("yaw"))?,
            )
        } else {
            (0.0, 0.0, 0.0)
        };

        let sample = PoseSample {
            timestamp,
            x: rec.x,
            y: rec.y,
            z: rec.z,
            roll,
            pitch,
            yaw,
        };
        let values = [sample.timestamp, sample.x, sample.y, sample.z, roll, pitch, yaw];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(AnimeError::data_format(
                source_name,
                format!("row {}: non-finite value", row + 1),
            ));
        }
        Ok(sample)
    }

    fn validate(samples: &[PoseSample], source_name: &str) -> Result<()> {
        if samples.is_empty() {
            return Err(AnimeError::data_format(source_name, "trajectory has no samples"));
        }
        if let Some(i) = samples
            .windows(2)
            .position(|w| w[1].timestamp < w[0].timestamp)
        {
            return Err(AnimeError::data_format(
                source_name,
                format!("timestamps decrease between rows {} and {}", i + 1, i + 2),
            ));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Always false for a constructed store
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn schema(&self) -> PoseSchema {
        self.schema
    }

    pub fn has_time(&self) -> bool {
        self.schema.time
    }

    pub fn has_heading(&self) -> bool {
        self.schema.orientation
    }

    pub fn samples(&self) -> &[PoseSample] {
        &self.samples
    }

    pub fn first(&self) -> &PoseSample {
        // Non-empty by construction
        &self.samples[0]
    }

    pub fn sample_at(&self, index: usize) -> Result<&PoseSample> {
        self.samples.get(index).ok_or(AnimeError::IndexOutOfRange {
            index,
            len: self.samples.len(),
        })
    }

    /// Planar positions for samples `0..=index`
    pub fn prefix_up_to(&self, index: usize) -> Result<Vec<(f64, f64)>> {
        self.sample_at(index)?;
        Ok(self.samples[..=index].iter().map(PoseSample::xy).collect())
    }

    /// Grow `acc` so it holds the planar positions for `0..=index`.
    ///
    /// Only the samples not yet in `acc` are appended, so a replay that walks
    /// forward pays for each sample once.
    pub fn extend_prefix(&self, acc: &mut Vec<(f64, f64)>, index: usize) -> Result<()> {
        self.sample_at(index)?;
        if acc.len() <= index {
            acc.extend(self.samples[acc.len()..=index].iter().map(PoseSample::xy));
        }
        Ok(())
    }

    /// Elapsed seconds since the first sample
    pub fn elapsed(&self, index: usize) -> Result<f64> {
        Ok(self.sample_at(index)?.timestamp - self.first().timestamp)
    }
}

/// Trajectory base name used for titles and output files: the file name with
/// a trailing `.csv` / `.csv.gz` removed.
pub fn base_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = name.strip_suffix(".gz").unwrap_or(&name);
    name.strip_suffix(".csv").unwrap_or(name).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(n: usize) -> TrajectoryStore {
        let samples = (0..n)
            .map(|i| PoseSample::at(i as f64, i as f64 * 2.0, 1.0))
            .collect();
        TrajectoryStore::from_samples(samples, PoseSchema::FULL).unwrap()
    }

    #[test]
    fn test_full_schema_with_aliases() {
        let csv = "time,pose_x,pose_y,pose_z,pose_roll,pose_pitch,pose_yaw,extra\n\
                   10.0,1.0,2.0,0.5,0.0,0.0,1.57,foo\n\
                   10.5,2.0,3.0,0.5,0.0,0.0,1.60,bar\n";
        let store = TrajectoryStore::from_reader(csv.as_bytes(), "full.csv").unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.schema(), PoseSchema::FULL);
        let s = store.sample_at(1).unwrap();
        assert_eq!(s.timestamp, 10.5);
        assert_eq!(s.xy(), (2.0, 3.0));
        assert!((s.yaw - 1.60).abs() < 1e-12);
    }

    #[test]
    fn test_position_only_schema() {
        let csv = "pose.x,pose.y,pose.z\n0,0,0\n1,0,0\n2,1,0\n";
        let store = TrajectoryStore::from_reader(csv.as_bytes(), "reduced.csv").unwrap();

        assert_eq!(store.schema(), PoseSchema::POSITION_ONLY);
        assert!(!store.has_time());
        assert!(!store.has_heading());
        assert_eq!(store.sample_at(2).unwrap().timestamp, 2.0);
        assert_eq!(store.sample_at(2).unwrap().yaw, 0.0);
    }

    #[test]
    fn test_missing_position_column() {
        let csv = "time,pose_x,pose_z\n0,1,2\n";
        let err = TrajectoryStore::from_reader(csv.as_bytes(), "bad.csv").unwrap_err();
        match err {
            AnimeError::DataFormat { source_name, reason } => {
                assert_eq!(source_name, "bad.csv");
                assert!(reason.contains("y"), "{}", reason);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_partial_orientation_rejected() {
        let csv = "x,y,z,yaw\n0,0,0,1\n";
        let err = TrajectoryStore::from_reader(csv.as_bytes(), "yaw_only.csv").unwrap_err();
        assert!(matches!(err, AnimeError::DataFormat { .. }));
    }

    #[test]
    fn test_unparsable_cell() {
        let csv = "x,y,z\n0,0,0\n1,abc,0\n";
        let err = TrajectoryStore::from_reader(csv.as_bytes(), "junk.csv").unwrap_err();
        match err {
            AnimeError::DataFormat { reason, .. } => assert!(reason.contains("row 2"), "{}", reason),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_empty_trajectory_fails_fast() {
        let csv = "x,y,z\n";
        let err = TrajectoryStore::from_reader(csv.as_bytes(), "empty.csv").unwrap_err();
        assert!(matches!(err, AnimeError::DataFormat { .. }));

        let err = TrajectoryStore::from_samples(Vec::new(), PoseSchema::FULL).unwrap_err();
        assert!(matches!(err, AnimeError::DataFormat { .. }));
    }

    #[test]
    fn test_decreasing_timestamps_rejected() {
        let samples = vec![PoseSample::at(1.0, 0.0, 0.0), PoseSample::at(0.5, 1.0, 0.0)];
        let err = TrajectoryStore::from_samples(samples, PoseSchema::FULL).unwrap_err();
        assert!(matches!(err, AnimeError::DataFormat { .. }));
    }

    #[test]
    fn test_duplicate_timestamps_allowed() {
        let samples = vec![PoseSample::at(1.0, 0.0, 0.0), PoseSample::at(1.0, 1.0, 0.0)];
        assert!(TrajectoryStore::from_samples(samples, PoseSchema::FULL).is_ok());
    }

    #[test]
    fn test_sample_at_out_of_range() {
        let store = line(3);
        assert!(store.sample_at(2).is_ok());
        match store.sample_at(3) {
            Err(AnimeError::IndexOutOfRange { index, len }) => {
                assert_eq!(index, 3);
                assert_eq!(len, 3);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_prefixes_nest() {
        let store = line(20);
        for i in 0..20 {
            let p = store.prefix_up_to(i).unwrap();
            assert_eq!(p.len(), i + 1);
            for j in i + 1..20 {
                let q = store.prefix_up_to(j).unwrap();
                assert_eq!(&q[..=i], &p[..]);
            }
        }
        assert!(store.prefix_up_to(20).is_err());
    }

    #[test]
    fn test_extend_prefix_matches_prefix() {
        let store = line(25);
        let mut acc = Vec::new();
        for i in (0..25).step_by(7) {
            store.extend_prefix(&mut acc, i).unwrap();
            assert_eq!(acc, store.prefix_up_to(i).unwrap());
        }
        // Asking for an earlier index never shrinks the accumulator
        store.extend_prefix(&mut acc, 3).unwrap();
        assert_eq!(acc.len(), 22);
    }

    #[test]
    fn test_elapsed() {
        let samples = vec![PoseSample::at(100.0, 0.0, 0.0), PoseSample::at(102.25, 1.0, 0.0)];
        let store = TrajectoryStore::from_samples(samples, PoseSchema::FULL).unwrap();
        assert_eq!(store.elapsed(0).unwrap(), 0.0);
        assert_eq!(store.elapsed(1).unwrap(), 2.25);
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name(Path::new("/data/run_01.csv")), "run_01");
        assert_eq!(base_name(Path::new("logs/run_02.csv.gz")), "run_02");
        assert_eq!(base_name(Path::new("plain")), "plain");
    }

    #[test]
    fn test_load_gzip() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let path = std::env::temp_dir().join(format!("traj_anime_gz_{}.csv.gz", std::process::id()));
        let mut enc = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        enc.write_all(b"x,y,z\n0,0,0\n1,1,0\n").unwrap();
        enc.finish().unwrap();

        let store = TrajectoryStore::load(&path).unwrap();
        assert_eq!(store.len(), 2);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_missing_file() {
        let err = TrajectoryStore::load(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, AnimeError::DataFormat { .. }));
    }
}
