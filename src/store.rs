//! Append-only telemetry store.
//!
//! One producer appends, any number of consumers read. The SQLite backend
//! runs in WAL journal mode so readers and the writer never block each
//! other; consumers open the database read-only. Each insert commits in its
//! own transaction, so an interrupted producer leaves either the whole
//! record or nothing.

use crate::error::StoreError;
use crate::record::TelemetryRecord;

/// Store column order.
pub const COLUMNS: [&str; 46] = [
    "timestamp",
    "dt",
    "date",
    "altitude",
    "gps_alt",
    "gps_lat",
    "gps_lon",
    "heading",
    "pitch",
    "roll",
    "yaw",
    "ground_speed",
    "airspeed",
    "vertical_speed",
    "accel_x",
    "accel_y",
    "accel_z",
    "gyro_x",
    "gyro_y",
    "gyro_z",
    "battery_level",
    "battery_voltage",
    "battery_current",
    "temperature_battery",
    "motor_rpm_1",
    "motor_rpm_2",
    "motor_rpm_3",
    "motor_rpm_4",
    "motor_temp_1",
    "motor_temp_2",
    "motor_temp_3",
    "motor_temp_4",
    "throttle_position",
    "payload_weight",
    "lidar_altitude",
    "obstacle_distance",
    "sat_count",
    "gps_fix_type",
    "link_quality",
    "signal_strength",
    "phase",
    "mode",
    "system_status",
    "mission_id",
    "waypoint_id",
    "event",
];

/// Durable telemetry table.
pub trait TelemetryStore {
    /// Append one record atomically.
    fn insert(&mut self, record: &TelemetryRecord) -> Result<(), StoreError>;

    /// Up to `limit` most recent records, newest first.
    fn latest(&self, limit: usize) -> Result<Vec<TelemetryRecord>, StoreError>;

    /// Total number of rows.
    fn count(&self) -> Result<u64, StoreError>;

    /// Most recent record, if any.
    fn last(&self) -> Result<Option<TelemetryRecord>, StoreError> {
        Ok(self.latest(1)?.into_iter().next())
    }
}

/// Vector-backed store for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Vec<TelemetryRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records in insertion order.
    pub fn records(&self) -> &[TelemetryRecord] {
        &self.records
    }
}

impl TelemetryStore for MemoryStore {
    fn insert(&mut self, record: &TelemetryRecord) -> Result<(), StoreError> {
        self.records.push(record.clone());
        Ok(())
    }

    fn latest(&self, limit: usize) -> Result<Vec<TelemetryRecord>, StoreError> {
        let mut out: Vec<TelemetryRecord> = self.records.iter().rev().cloned().collect();
        out.sort_by_key(|r| std::cmp::Reverse(r.timestamp));
        out.truncate(limit);
        Ok(out)
    }

    fn count(&self) -> Result<u64, StoreError> {
        Ok(self.records.len() as u64)
    }
}

#[cfg(feature = "sqlite")]
pub use self::sqlite::SqliteStore;

#[cfg(feature = "sqlite")]
mod sqlite {
    use super::{TelemetryStore, COLUMNS};
    use crate::error::StoreError;
    use crate::record::{FlightMode, FlightPhase, SystemStatus, TelemetryRecord};
    use log::info;
    use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
    use rusqlite::{params, Connection, OpenFlags, Row};
    use std::path::Path;

    const TABLE: &str = "telemetry";

    fn column_type(name: &str) -> &'static str {
        match name {
            "timestamp" | "sat_count" | "gps_fix_type" | "waypoint_id" => "INTEGER",
            "dt" | "date" | "phase" | "mode" | "system_status" | "mission_id" | "event" => "TEXT",
            _ => "REAL",
        }
    }

    fn create_table_sql() -> String {
        let defs: Vec<String> = COLUMNS
            .iter()
            .map(|c| format!("{} {}", c, column_type(c)))
            .collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {TABLE} ({});
             CREATE INDEX IF NOT EXISTS idx_{TABLE}_timestamp ON {TABLE} (timestamp);",
            defs.join(", ")
        )
    }

    fn insert_sql() -> String {
        let placeholders: Vec<String> = (1..=COLUMNS.len()).map(|i| format!("?{}", i)).collect();
        format!(
            "INSERT INTO {TABLE} ({}) VALUES ({})",
            COLUMNS.join(", "),
            placeholders.join(", ")
        )
    }

    fn select_latest_sql() -> String {
        format!(
            "SELECT {} FROM {TABLE} ORDER BY timestamp DESC LIMIT ?1",
            COLUMNS.join(", ")
        )
    }

    macro_rules! text_enum_sql {
        ($ty:ty, $column:literal) => {
            impl ToSql for $ty {
                fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                    Ok(ToSqlOutput::from(self.as_str()))
                }
            }

            impl FromSql for $ty {
                fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                    let text = value.as_str()?;
                    <$ty>::parse(text).ok_or_else(|| {
                        FromSqlError::Other(Box::new(StoreError::InvalidRow {
                            column: $column.to_string(),
                            reason: format!("unknown value {:?}", text),
                        }))
                    })
                }
            }
        };
    }

    text_enum_sql!(FlightPhase, "phase");
    text_enum_sql!(FlightMode, "mode");
    text_enum_sql!(SystemStatus, "system_status");

    fn record_from_row(row: &Row<'_>) -> rusqlite::Result<TelemetryRecord> {
        Ok(TelemetryRecord {
            timestamp: row.get("timestamp")?,
            dt: row.get("dt")?,
            date: row.get("date")?,
            altitude: row.get("altitude")?,
            gps_alt: row.get("gps_alt")?,
            gps_lat: row.get("gps_lat")?,
            gps_lon: row.get("gps_lon")?,
            heading: row.get("heading")?,
            pitch: row.get("pitch")?,
            roll: row.get("roll")?,
            yaw: row.get("yaw")?,
            ground_speed: row.get("ground_speed")?,
            airspeed: row.get("airspeed")?,
            vertical_speed: row.get("vertical_speed")?,
            accel_x: row.get("accel_x")?,
            accel_y: row.get("accel_y")?,
            accel_z: row.get("accel_z")?,
            gyro_x: row.get("gyro_x")?,
            gyro_y: row.get("gyro_y")?,
            gyro_z: row.get("gyro_z")?,
            battery_level: row.get("battery_level")?,
            battery_voltage: row.get("battery_voltage")?,
            battery_current: row.get("battery_current")?,
            temperature_battery: row.get("temperature_battery")?,
            motor_rpm_1: row.get("motor_rpm_1")?,
            motor_rpm_2: row.get("motor_rpm_2")?,
            motor_rpm_3: row.get("motor_rpm_3")?,
            motor_rpm_4: row.get("motor_rpm_4")?,
            motor_temp_1: row.get("motor_temp_1")?,
            motor_temp_2: row.get("motor_temp_2")?,
            motor_temp_3: row.get("motor_temp_3")?,
            motor_temp_4: row.get("motor_temp_4")?,
            throttle_position: row.get("throttle_position")?,
            payload_weight: row.get("payload_weight")?,
            lidar_altitude: row.get("lidar_altitude")?,
            obstacle_distance: row.get("obstacle_distance")?,
            sat_count: row.get("sat_count")?,
            gps_fix_type: row.get("gps_fix_type")?,
            link_quality: row.get("link_quality")?,
            signal_strength: row.get("signal_strength")?,
            phase: row.get("phase")?,
            mode: row.get("mode")?,
            system_status: row.get("system_status")?,
            mission_id: row.get("mission_id")?,
            waypoint_id: row.get("waypoint_id")?,
            event: row.get("event")?,
        })
    }

    /// SQLite-backed store.
    pub struct SqliteStore {
        conn: Connection,
        insert_sql: String,
        select_sql: String,
    }

    impl std::fmt::Debug for SqliteStore {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("SqliteStore")
                .field("path", &self.conn.path())
                .finish()
        }
    }

    impl SqliteStore {
        fn wrap(conn: Connection) -> Self {
            Self {
                conn,
                insert_sql: insert_sql(),
                select_sql: select_latest_sql(),
            }
        }

        /// Open read-write for the producer, creating the table if needed
        /// and switching the journal to WAL.
        pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
            let conn = Connection::open(path.as_ref())?;
            let mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            conn.execute_batch(&create_table_sql())?;
            info!(
                "Opened telemetry store {} (journal_mode={})",
                path.as_ref().display(),
                mode
            );
            Ok(Self::wrap(conn))
        }

        /// Open read-only for consumers. The table must already exist.
        pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self, StoreError> {
            let conn = Connection::open_with_flags(
                path.as_ref(),
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            Ok(Self::wrap(conn))
        }

        /// Private in-memory database.
        pub fn in_memory() -> Result<Self, StoreError> {
            let conn = Connection::open_in_memory()?;
            conn.execute_batch(&create_table_sql())?;
            Ok(Self::wrap(conn))
        }
    }

    impl TelemetryStore for SqliteStore {
        fn insert(&mut self, r: &TelemetryRecord) -> Result<(), StoreError> {
            let tx = self.conn.transaction()?;
            tx.execute(
                &self.insert_sql,
                params![
                    r.timestamp,
                    r.dt,
                    r.date,
                    r.altitude,
                    r.gps_alt,
                    r.gps_lat,
                    r.gps_lon,
                    r.heading,
                    r.pitch,
                    r.roll,
                    r.yaw,
                    r.ground_speed,
                    r.airspeed,
                    r.vertical_speed,
                    r.accel_x,
                    r.accel_y,
                    r.accel_z,
                    r.gyro_x,
                    r.gyro_y,
                    r.gyro_z,
                    r.battery_level,
                    r.battery_voltage,
                    r.battery_current,
                    r.temperature_battery,
                    r.motor_rpm_1,
                    r.motor_rpm_2,
                    r.motor_rpm_3,
                    r.motor_rpm_4,
                    r.motor_temp_1,
                    r.motor_temp_2,
                    r.motor_temp_3,
                    r.motor_temp_4,
                    r.throttle_position,
                    r.payload_weight,
                    r.lidar_altitude,
                    r.obstacle_distance,
                    r.sat_count,
                    r.gps_fix_type,
                    r.link_quality,
                    r.signal_strength,
                    r.phase,
                    r.mode,
                    r.system_status,
                    r.mission_id,
                    r.waypoint_id,
                    r.event,
                ],
            )?;
            tx.commit()?;
            Ok(())
        }

        fn latest(&self, limit: usize) -> Result<Vec<TelemetryRecord>, StoreError> {
            let mut stmt = self.conn.prepare_cached(&self.select_sql)?;
            let limit = i64::try_from(limit).unwrap_or(i64::MAX);
            let rows = stmt.query_map([limit], record_from_row)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        }

        fn count(&self) -> Result<u64, StoreError> {
            let n: i64 = self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {TABLE}"), [], |row| row.get(0))?;
            Ok(n.max(0) as u64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(ts: i64) -> TelemetryRecord {
        TelemetryRecord::grounded(Utc.timestamp_opt(ts, 0).unwrap(), "M002")
    }

    #[test]
    fn test_memory_store_latest() {
        let mut store = MemoryStore::new();
        for ts in [10, 30, 20] {
            store.insert(&record(ts)).unwrap();
        }
        let latest = store.latest(2).unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].timestamp, 30);
        assert_eq!(latest[1].timestamp, 20);
        assert_eq!(store.count().unwrap(), 3);
        assert_eq!(store.last().unwrap().map(|r| r.timestamp), Some(30));
    }

    #[test]
    fn test_empty_store() {
        let store = MemoryStore::new();
        assert!(store.latest(150).unwrap().is_empty());
        assert!(store.last().unwrap().is_none());
    }

    #[cfg(feature = "sqlite")]
    mod sqlite {
        use super::*;
        use crate::record::{FlightPhase, SystemStatus};

        #[test]
        fn test_roundtrip_preserves_optional_sensors() {
            let mut store = SqliteStore::in_memory().unwrap();
            let mut r = record(100);
            r.lidar_altitude = None;
            r.phase = FlightPhase::Cruise;
            r.system_status = SystemStatus::Warning;
            r.event = "GPS Drift".into();
            store.insert(&r).unwrap();

            let back = store.latest(10).unwrap();
            assert_eq!(back, vec![r]);
        }

        #[test]
        fn test_latest_orders_by_timestamp() {
            let mut store = SqliteStore::in_memory().unwrap();
            for ts in [5, 1, 9, 3] {
                store.insert(&record(ts)).unwrap();
            }
            let ts: Vec<i64> = store.latest(3).unwrap().iter().map(|r| r.timestamp).collect();
            assert_eq!(ts, vec![9, 5, 3]);
            assert_eq!(store.count().unwrap(), 4);
        }

        #[test]
        fn test_reader_sees_writer_rows() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("telemetry.db");
            let mut writer = SqliteStore::open(&path).unwrap();
            writer.insert(&record(1)).unwrap();

            let reader = SqliteStore::open_read_only(&path).unwrap();
            assert_eq!(reader.count().unwrap(), 1);

            writer.insert(&record(2)).unwrap();
            assert_eq!(reader.count().unwrap(), 2);
            assert_eq!(reader.last().unwrap().map(|r| r.timestamp), Some(2));
        }

        #[test]
        fn test_read_only_rejects_writes() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("telemetry.db");
            drop(SqliteStore::open(&path).unwrap());
            let mut reader = SqliteStore::open_read_only(&path).unwrap();
            assert!(reader.insert(&record(1)).is_err());
        }

        #[test]
        fn test_unknown_phase_is_rejected() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("telemetry.db");
            let mut store = SqliteStore::open(&path).unwrap();
            store.insert(&record(1)).unwrap();

            let raw = rusqlite::Connection::open(&path).unwrap();
            raw.execute("UPDATE telemetry SET phase = 'HOVER'", []).unwrap();

            assert!(store.latest(1).is_err());
        }
    }
}
