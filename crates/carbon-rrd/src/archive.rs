//! A fixed-format round-robin archive file: one slot per `(precision,
//! duration)` retention level, each slot holding an aggregated sample.
//!
//! This is the on-disk collaborator `carbon-storage` treats as opaque. It is
//! not byte-compatible with Whisper — `StorageWriter` only needs
//! `create`/`open`/`update_many`/`fetch`/`close`, so the file format here is
//! the simplest thing that implements those operations correctly: one ring
//! buffer per retention level, each slot tagged with the time bucket it last
//! held so stale data is distinguishable from a genuine update. A raw point
//! lands in the finest archive only; every coarser archive is recomputed
//! from its next-finer neighbor by [`ArchiveFile::propagate`], gated on
//! `x_files_factor`, same as Whisper's own rollup.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use carbon_core::DataPoint;

use crate::error::{ArchiveError, Result};
use crate::retention::{AggregationMethod, Retention};

const MAGIC: &[u8; 4] = b"CRRD";
const HEADER_FIXED_LEN: u64 = 4 + 1 + 4 + 4; // magic + aggregation tag + xff + archive count
const RETENTION_ENTRY_LEN: u64 = 8; // seconds_per_point (u32) + num_points (u32)
const SLOT_LEN: u64 = 8 + 8 + 4; // bucket index (i64) + value (f64) + sample count (u32)

/// An open round-robin archive file.
#[derive(Debug)]
pub struct ArchiveFile {
    file: File,
    retentions: Vec<Retention>,
    aggregation: AggregationMethod,
    x_files_factor: f32,
    data_offsets: Vec<u64>,
}

impl ArchiveFile {
    /// Create a new archive at `path`. Fails with `ArchiveError::Io` wrapping
    /// `io::ErrorKind::AlreadyExists` if the file is already there — callers
    /// that want create-or-open semantics should catch that and call
    /// [`ArchiveFile::open`] instead.
    pub fn create(
        path: &Path,
        retentions: Vec<Retention>,
        aggregation: AggregationMethod,
        x_files_factor: f32,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&x_files_factor) {
            return Err(ArchiveError::InvalidXFilesFactor(x_files_factor));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .write(true)
            .read(true)
            .create_new(true)
            .open(path)?;

        let data_offsets = compute_offsets(&retentions);
        write_header(&mut file, &retentions, aggregation, x_files_factor)?;

        let total_len = *data_offsets.last().unwrap_or(&header_len(&retentions))
            + retentions.last().map_or(0, |r| u64::from(r.num_points) * SLOT_LEN);
        file.set_len(total_len)?;

        Ok(Self {
            file,
            retentions,
            aggregation,
            x_files_factor,
            data_offsets,
        })
    }

    /// Open an existing archive, reading its retention schedule and
    /// aggregation settings from the on-disk header.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;

        let mut fixed = [0u8; HEADER_FIXED_LEN as usize];
        file.read_exact(&mut fixed)?;
        if &fixed[0..4] != MAGIC {
            return Err(ArchiveError::CorruptHeader { path: path.to_path_buf() });
        }
        let aggregation = AggregationMethod::from_tag(fixed[4])?;
        let x_files_factor = f32::from_le_bytes(fixed[5..9].try_into().unwrap());
        let archive_count = u32::from_le_bytes(fixed[9..13].try_into().unwrap());

        let mut retentions = Vec::with_capacity(archive_count as usize);
        for _ in 0..archive_count {
            let mut entry = [0u8; RETENTION_ENTRY_LEN as usize];
            file.read_exact(&mut entry)?;
            retentions.push(Retention {
                seconds_per_point: u32::from_le_bytes(entry[0..4].try_into().unwrap()),
                num_points: u32::from_le_bytes(entry[4..8].try_into().unwrap()),
            });
        }

        let data_offsets = compute_offsets(&retentions);

        Ok(Self {
            file,
            retentions,
            aggregation,
            x_files_factor,
            data_offsets,
        })
    }

    /// The archive's retention schedule, finest first.
    #[must_use]
    pub fn retentions(&self) -> &[Retention] {
        &self.retentions
    }

    /// The aggregation method this archive was created with.
    #[must_use]
    pub const fn aggregation(&self) -> AggregationMethod {
        self.aggregation
    }

    /// The x-files-factor this archive was created with.
    #[must_use]
    pub const fn x_files_factor(&self) -> f32 {
        self.x_files_factor
    }

    /// Write `points` into the finest archive, then roll each point's bucket
    /// up through successively coarser archives: archive `n` is recomputed
    /// from archive `n-1`'s slots only if at least `x_files_factor` of them
    /// hold data, the same gate Whisper applies before propagating a value
    /// up the retention schedule. Propagation stops at the first archive
    /// that doesn't meet the threshold.
    pub fn update_many(&mut self, points: &[DataPoint]) -> Result<()> {
        for point in points {
            self.update_one(0, point)?;
            let mut archive_index = 0;
            while self.propagate(archive_index, point.timestamp)? {
                archive_index += 1;
            }
        }
        Ok(())
    }

    fn update_one(&mut self, archive_index: usize, point: &DataPoint) -> Result<()> {
        let retention = self.retentions[archive_index];
        let spp = i64::from(retention.seconds_per_point);
        let num_points = i64::from(retention.num_points);
        let bucket = point.timestamp.div_euclid(spp);
        let slot = bucket.rem_euclid(num_points) as u64;
        let offset = self.data_offsets[archive_index] + slot * SLOT_LEN;

        let existing = self.read_slot(offset)?;
        let next = if existing.count > 0 && existing.bucket == bucket {
            Slot {
                bucket,
                value: self
                    .aggregation
                    .combine(existing.value, existing.count, point.value),
                count: existing.count + 1,
            }
        } else {
            Slot {
                bucket,
                value: point.value,
                count: 1,
            }
        };
        self.write_slot(offset, next)
    }

    /// Recompute the archive just coarser than `from_archive_index` for the
    /// window containing `timestamp`, from that window's slots in
    /// `from_archive_index`. Returns `Ok(false)` without writing anything if
    /// there is no coarser archive, or if fewer than `x_files_factor` of the
    /// window's finer slots hold data for their expected bucket — the same
    /// "not enough known data to aggregate" rule that keeps Whisper from
    /// propagating a value computed mostly from gaps.
    fn propagate(&mut self, from_archive_index: usize, timestamp: i64) -> Result<bool> {
        let to_archive_index = from_archive_index + 1;
        if to_archive_index >= self.retentions.len() {
            return Ok(false);
        }

        let from = self.retentions[from_archive_index];
        let to = self.retentions[to_archive_index];
        let from_spp = i64::from(from.seconds_per_point);
        let to_spp = i64::from(to.seconds_per_point);
        let points_per_bucket = to_spp / from_spp;

        let to_bucket = timestamp.div_euclid(to_spp);
        let first_from_bucket = to_bucket * points_per_bucket;

        let mut known = Vec::with_capacity(points_per_bucket as usize);
        for i in 0..points_per_bucket {
            let from_bucket = first_from_bucket + i;
            let slot_index = from_bucket.rem_euclid(i64::from(from.num_points)) as u64;
            let offset = self.data_offsets[from_archive_index] + slot_index * SLOT_LEN;
            let slot = self.read_slot(offset)?;
            if slot.count > 0 && slot.bucket == from_bucket {
                known.push(slot.value);
            }
        }

        let known_fraction = known.len() as f32 / points_per_bucket as f32;
        if known.is_empty() || known_fraction < self.x_files_factor {
            return Ok(false);
        }

        let value = self.aggregation.reduce(&known);
        let to_slot_index = to_bucket.rem_euclid(i64::from(to.num_points)) as u64;
        let to_offset = self.data_offsets[to_archive_index] + to_slot_index * SLOT_LEN;
        self.write_slot(
            to_offset,
            Slot {
                bucket: to_bucket,
                value,
                count: known.len() as u32,
            },
        )?;
        Ok(true)
    }

    /// Read back all samples in `[from, until]` (inclusive), using the
    /// finest archive whose retention window covers the requested span,
    /// exactly as Whisper's `fetch` selects an archive.
    pub fn fetch(&mut self, from: i64, until: i64) -> Result<Vec<DataPoint>> {
        let span = until.saturating_sub(from).max(0) as u64;
        let archive_index = self
            .retentions
            .iter()
            .position(|r| r.duration_secs() >= span)
            .unwrap_or(self.retentions.len() - 1);

        let retention = self.retentions[archive_index];
        let spp = i64::from(retention.seconds_per_point);
        let num_points = i64::from(retention.num_points);
        let base_offset = self.data_offsets[archive_index];

        let first_bucket = from.div_euclid(spp);
        let last_bucket = until.div_euclid(spp);

        let mut points = Vec::new();
        let mut bucket = first_bucket;
        while bucket <= last_bucket {
            let slot_index = bucket.rem_euclid(num_points) as u64;
            let slot = self.read_slot(base_offset + slot_index * SLOT_LEN)?;
            if slot.count > 0 && slot.bucket == bucket {
                points.push(DataPoint::new(slot.value, bucket * spp));
            }
            bucket += 1;
        }
        Ok(points)
    }

    /// Flush and close the underlying file handle.
    pub fn close(mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    fn read_slot(&mut self, offset: u64) -> Result<Slot> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buf = [0u8; SLOT_LEN as usize];
        self.file.read_exact(&mut buf)?;
        Ok(Slot {
            bucket: i64::from_le_bytes(buf[0..8].try_into().unwrap()),
            value: f64::from_le_bytes(buf[8..16].try_into().unwrap()),
            count: u32::from_le_bytes(buf[16..20].try_into().unwrap()),
        })
    }

    fn write_slot(&mut self, offset: u64, slot: Slot) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buf = [0u8; SLOT_LEN as usize];
        buf[0..8].copy_from_slice(&slot.bucket.to_le_bytes());
        buf[8..16].copy_from_slice(&slot.value.to_le_bytes());
        buf[16..20].copy_from_slice(&slot.count.to_le_bytes());
        self.file.write_all(&buf)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    bucket: i64,
    value: f64,
    count: u32,
}

fn header_len(retentions: &[Retention]) -> u64 {
    HEADER_FIXED_LEN + retentions.len() as u64 * RETENTION_ENTRY_LEN
}

fn compute_offsets(retentions: &[Retention]) -> Vec<u64> {
    let mut offsets = Vec::with_capacity(retentions.len());
    let mut cursor = header_len(retentions);
    for retention in retentions {
        offsets.push(cursor);
        cursor += u64::from(retention.num_points) * SLOT_LEN;
    }
    offsets
}

fn write_header(
    file: &mut File,
    retentions: &[Retention],
    aggregation: AggregationMethod,
    x_files_factor: f32,
) -> Result<()> {
    file.seek(SeekFrom::Start(0))?;
    file.write_all(MAGIC)?;
    file.write_all(&[aggregation.as_tag()])?;
    file.write_all(&x_files_factor.to_le_bytes())?;
    file.write_all(&(retentions.len() as u32).to_le_bytes())?;
    for retention in retentions {
        file.write_all(&retention.seconds_per_point.to_le_bytes())?;
        file.write_all(&retention.num_points.to_le_bytes())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retention::parse_retention_defs;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn write_then_fetch_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("foo.crrd");
        let retentions = parse_retention_defs("1s:5m,1m:30m").unwrap();

        let mut archive =
            ArchiveFile::create(&path, retentions, AggregationMethod::Sum, 0.5).unwrap();

        let now = 1_700_000_000i64;
        let points: Vec<DataPoint> = (0..10).map(|i| DataPoint::new(100.0, now - 9 + i)).collect();
        archive.update_many(&points).unwrap();

        let fetched = archive.fetch(now - 10, now).unwrap();
        assert_eq!(fetched.len(), 10);
        assert!(fetched.iter().all(|p| p.value == 100.0));
        archive.close().unwrap();
    }

    #[test]
    fn create_fails_when_file_exists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("foo.crrd");
        let retentions = parse_retention_defs("1s:5m").unwrap();
        ArchiveFile::create(&path, retentions.clone(), AggregationMethod::Average, 0.5)
            .unwrap()
            .close()
            .unwrap();

        let err = ArchiveFile::create(&path, retentions, AggregationMethod::Average, 0.5)
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Io(e) if e.kind() == std::io::ErrorKind::AlreadyExists));
    }

    #[test]
    fn open_reads_back_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("foo.crrd");
        let retentions = parse_retention_defs("1s:5m,1m:1h").unwrap();
        ArchiveFile::create(&path, retentions.clone(), AggregationMethod::Max, 0.3)
            .unwrap()
            .close()
            .unwrap();

        let reopened = ArchiveFile::open(&path).unwrap();
        assert_eq!(reopened.retentions(), retentions.as_slice());
        assert_eq!(reopened.aggregation(), AggregationMethod::Max);
        assert!((reopened.x_files_factor() - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn propagates_to_coarser_archive_once_x_files_factor_is_met() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("foo.crrd");
        let retentions = parse_retention_defs("1s:20s,10s:10m").unwrap();
        let mut archive =
            ArchiveFile::create(&path, retentions, AggregationMethod::Sum, 0.5).unwrap();

        // Ten consecutive 1s points fill the entire 10s window [0, 10).
        let points: Vec<DataPoint> = (0..10).map(|i| DataPoint::new(1.0, i)).collect();
        archive.update_many(&points).unwrap();

        // A span wider than the finest archive's 20s coverage forces fetch
        // onto the 10s:10m archive, which should now hold the rolled-up sum.
        let fetched = archive.fetch(0, 300).unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].value, 10.0);
    }

    #[test]
    fn propagation_withholds_a_sparse_window_below_x_files_factor() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("foo.crrd");
        let retentions = parse_retention_defs("1s:20s,10s:10m").unwrap();
        let mut archive =
            ArchiveFile::create(&path, retentions, AggregationMethod::Sum, 0.5).unwrap();

        // Only 2 of the 10 finer slots in this window are ever written.
        let points = vec![DataPoint::new(1.0, 0), DataPoint::new(1.0, 1)];
        archive.update_many(&points).unwrap();

        let fetched = archive.fetch(0, 300).unwrap();
        assert!(fetched.is_empty());
    }

    #[test]
    fn duplicate_points_are_not_deduplicated_before_aggregation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("foo.crrd");
        let retentions = parse_retention_defs("10s:1h").unwrap();
        let mut archive =
            ArchiveFile::create(&path, retentions, AggregationMethod::Sum, 0.5).unwrap();

        // Both points land in the same 10s bucket and should be summed.
        let points = vec![DataPoint::new(1.0, 1000), DataPoint::new(2.0, 1001)];
        archive.update_many(&points).unwrap();

        let fetched = archive.fetch(1000, 1009).unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].value, 3.0);
    }
}
