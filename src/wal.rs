use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::model::Event;

/// Append-only write-ahead log.
///
/// Format per entry: `[u32: len][bincode: Event][u32: crc32]`
/// - `len` is the byte length of the bincode payload (not including the CRC).
/// - A truncated or corrupt trailing entry (crash mid-write) is discarded on
///   replay; everything before it is kept.
pub struct Wal {
    writer: BufWriter<File>,
}

impl Wal {
    /// Open (or create) the WAL file at `path`.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    /// Append a single event and fsync. Tests only — production code batches
    /// via `append_buffered` + `flush_sync` (group commit).
    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Buffer one event without flushing. Call `flush_sync` once per batch to
    /// durably commit everything buffered so far.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        let payload = bincode::serialize(event)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let len = payload.len() as u32;
        let crc = crc32fast::hash(&payload);
        self.writer.write_all(&len.to_le_bytes())?;
        self.writer.write_all(&payload)?;
        self.writer.write_all(&crc.to_le_bytes())?;
        Ok(())
    }

    /// Flush the buffer and fsync the underlying file.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    /// Replay the WAL from disk, returning all valid events in append order.
    /// A missing file is an empty log.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut events = Vec::new();

        loop {
            let mut len_buf = [0u8; 4];
            match reader.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            }
            let len = u32::from_le_bytes(len_buf) as usize;

            let mut payload = vec![0u8; len];
            match reader.read_exact(&mut payload) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break, // truncated
                Err(e) => return Err(e),
            }

            let mut crc_buf = [0u8; 4];
            match reader.read_exact(&mut crc_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break, // truncated
                Err(e) => return Err(e),
            }
            if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
                break; // corrupt entry — stop replaying
            }

            match bincode::deserialize::<Event>(&payload) {
                Ok(event) => events.push(event),
                Err(_) => break, // corrupt payload
            }
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PaymentStatus, SessionStatus};
    use std::fs;
    use ulid::Ulid;

    fn tmp_path(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join("parkd_test_wal");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = fs::remove_file(&path);
        path
    }

    fn spot_created(id: Ulid) -> Event {
        Event::SpotCreated {
            id,
            name: "Castro & Market".into(),
            address: "Castro St & Market St, San Francisco, CA".into(),
            lat: 37.7614,
            lng: -122.4350,
            rate_cents: 275,
            total_spots: 8,
            available_spots: 3,
            zone: "Castro".into(),
            restrictions: vec!["1 hour limit".into()],
            at: 1_000,
        }
    }

    #[test]
    fn append_and_replay() {
        let path = tmp_path("append_and_replay.wal");

        let events = vec![
            spot_created(Ulid::new()),
            Event::SessionStarted {
                id: Ulid::new(),
                plate: "ABC123".into(),
                spot_id: Ulid::new(),
                duration_min: 60,
                start: 5_000,
                cost_cents: 255,
                fee_paid_cents: 5,
                fee_saved_cents: 32,
                payment_id: None,
            },
            Event::SessionExpired {
                id: Ulid::new(),
                at: 9_000,
            },
        ];

        {
            let mut wal = Wal::open(&path).unwrap();
            for e in &events {
                wal.append(e).unwrap();
            }
        }

        let replayed = Wal::replay(&path).unwrap();
        assert_eq!(replayed, events);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn replay_handles_truncation() {
        let path = tmp_path("truncation.wal");

        let event = spot_created(Ulid::new());
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&event).unwrap();
        }

        // Append garbage to simulate a truncated second entry
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[0u8; 6]).unwrap(); // partial length + some bytes
        }

        let replayed = Wal::replay(&path).unwrap();
        assert_eq!(replayed, vec![event]);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn replay_nonexistent_file() {
        let path = tmp_path("nonexistent.wal");
        let replayed = Wal::replay(&path).unwrap();
        assert!(replayed.is_empty());
    }

    #[test]
    fn replay_corrupt_crc() {
        let path = tmp_path("corrupt_crc.wal");

        let event = Event::SessionCancelled {
            id: Ulid::new(),
            at: 42,
        };

        // Manually write an entry with bad CRC
        {
            let payload = bincode::serialize(&event).unwrap();
            let len = payload.len() as u32;
            let bad_crc: u32 = 0xDEADBEEF;

            let mut f = File::create(&path).unwrap();
            f.write_all(&len.to_le_bytes()).unwrap();
            f.write_all(&payload).unwrap();
            f.write_all(&bad_crc.to_le_bytes()).unwrap();
        }

        let replayed = Wal::replay(&path).unwrap();
        assert!(replayed.is_empty());

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn corrupt_middle_entry_keeps_prefix() {
        let path = tmp_path("corrupt_middle.wal");

        let first = spot_created(Ulid::new());
        let second = Event::PaymentStatusChanged {
            id: Ulid::new(),
            status: PaymentStatus::Succeeded,
            receipt: Some("https://pay.example/r/1".into()),
        };

        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&first).unwrap();
        }

        // Bad CRC on the second entry, then a valid third entry that must
        // never be reached.
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            let payload = bincode::serialize(&second).unwrap();
            f.write_all(&(payload.len() as u32).to_le_bytes()).unwrap();
            f.write_all(&payload).unwrap();
            f.write_all(&0xBAD_C0DEu32.to_le_bytes()).unwrap();
        }
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&Event::SessionExpired {
                id: Ulid::new(),
                at: 1,
            })
            .unwrap();
        }

        let replayed = Wal::replay(&path).unwrap();
        assert_eq!(replayed, vec![first]);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn append_buffered_then_flush_sync() {
        let path = tmp_path("buffered_flush.wal");

        let events: Vec<Event> = (0..5)
            .map(|i| Event::SpotAvailabilityChanged {
                id: Ulid::new(),
                available_spots: i,
                at: i64::from(i),
            })
            .collect();

        {
            let mut wal = Wal::open(&path).unwrap();
            for e in &events {
                wal.append_buffered(e).unwrap();
            }
            wal.flush_sync().unwrap();
        }

        let replayed = Wal::replay(&path).unwrap();
        assert_eq!(replayed, events);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn all_event_variants_roundtrip() {
        let path = tmp_path("all_variants.wal");
        let sid = Ulid::new();
        let pid = Ulid::new();

        let events = vec![
            spot_created(Ulid::new()),
            Event::SpotAvailabilityChanged {
                id: Ulid::new(),
                available_spots: 2,
                at: 10,
            },
            Event::SpotDeactivated {
                id: Ulid::new(),
                at: 20,
            },
            Event::SessionStarted {
                id: sid,
                plate: "XYZ789".into(),
                spot_id: Ulid::new(),
                duration_min: 120,
                start: 30,
                cost_cents: 500,
                fee_paid_cents: 5,
                fee_saved_cents: 32,
                payment_id: Some(pid),
            },
            Event::SessionExtended {
                id: sid,
                additional_min: 30,
                additional_cost_cents: 125,
            },
            Event::SessionCancelled { id: sid, at: 40 },
            Event::SessionExpired { id: sid, at: 50 },
            Event::PaymentRecorded {
                id: pid,
                session_id: Some(sid),
                plate: "XYZ789".into(),
                amount_cents: 500,
                fee_cents: 5,
                status: PaymentStatus::Pending,
                charge_ref: "ch_test_1".into(),
            },
            Event::PaymentStatusChanged {
                id: pid,
                status: PaymentStatus::Refunded,
                receipt: None,
            },
        ];

        {
            let mut wal = Wal::open(&path).unwrap();
            for e in &events {
                wal.append_buffered(e).unwrap();
            }
            wal.flush_sync().unwrap();
        }

        assert_eq!(Wal::replay(&path).unwrap(), events);
        // sanity: the status type itself survives too
        assert_eq!(SessionStatus::parse("expired"), Some(SessionStatus::Expired));

        let _ = fs::remove_file(&path);
    }
}
