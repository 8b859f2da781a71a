//! Shared test doubles: scripted capture sources, a marker-pixel
//! encoder, and in-memory collaborator implementations.
//!
//! The marker convention: an image or frame "contains" one face whose
//! embedding is the value of its first byte. Distances between markers
//! are exact, so recognition outcomes in tests are deterministic.

use crate::cache::GalleryCache;
use crate::interfaces::{
    AttendanceSink, IdentityRef, IdentitySource, Notifier, NotifyEvent, SourceError,
};
use crate::sink::{PresentationSink, SinkAction, SinkError};
use crate::tracker::AttendanceTracker;
use crate::worker::{EncoderFactory, SourceFactory, WorkerContext};
use chrono::{DateTime, NaiveDate, Utc};
use rollcall_core::{BoundingBox, DetectedFace, EncodeError, Encoder, Embedding};
use rollcall_hw::{CaptureError, Frame, FrameSource, Overlay};
use rollcall_store::{AttendanceRecord, CameraConfig};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const MARKER_DIM: u32 = 8;

/// Write an 8x8 PNG whose top-left byte is `marker`.
pub fn write_marker_image(dir: &Path, name: &str, marker: u8) -> PathBuf {
    let path = dir.join(name);
    let img = image::RgbImage::from_fn(MARKER_DIM, MARKER_DIM, |x, y| {
        if x == 0 && y == 0 {
            image::Rgb([marker, 0, 0])
        } else {
            image::Rgb([0, 0, 0])
        }
    });
    img.save(&path).unwrap();
    path
}

/// An 8x8 RGB frame carrying `marker` in its first byte.
pub fn marker_frame(marker: u8, sequence: u64) -> Frame {
    let mut data = vec![0u8; (MARKER_DIM * MARKER_DIM * 3) as usize];
    data[0] = marker;
    Frame::new(data, MARKER_DIM, MARKER_DIM, sequence)
}

/// Sees exactly one face per image, embedded as the first byte's value.
pub struct MarkerEncoder;

impl Encoder for MarkerEncoder {
    fn encode(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<DetectedFace>, EncodeError> {
        let Some(&marker) = rgb.first() else {
            return Err(EncodeError::MalformedFrame {
                width,
                height,
                expected: (width * height * 3) as usize,
                actual: 0,
            });
        };
        Ok(vec![DetectedFace {
            bbox: BoundingBox { x: 1.0, y: 1.0, width: 4.0, height: 4.0, confidence: 1.0 },
            embedding: Embedding { values: vec![marker as f32] },
        }])
    }
}

pub struct MarkerEncoderFactory;

impl EncoderFactory for MarkerEncoderFactory {
    fn create(&self) -> Result<Box<dyn Encoder>, EncodeError> {
        Ok(Box::new(MarkerEncoder))
    }
}

/// Fails the first `failures` encode calls, then behaves like
/// [`MarkerEncoder`].
pub struct FlakyEncoder {
    remaining: u32,
}

impl Encoder for FlakyEncoder {
    fn encode(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<DetectedFace>, EncodeError> {
        if self.remaining > 0 {
            self.remaining -= 1;
            return Err(EncodeError::MalformedFrame {
                width,
                height,
                expected: (width * height * 3) as usize,
                actual: rgb.len().saturating_sub(1),
            });
        }
        MarkerEncoder.encode(rgb, width, height)
    }
}

pub struct FlakyEncoderFactory {
    pub failures: u32,
}

impl EncoderFactory for FlakyEncoderFactory {
    fn create(&self) -> Result<Box<dyn Encoder>, EncodeError> {
        Ok(Box::new(FlakyEncoder { remaining: self.failures }))
    }
}

/// Fixed roster with a call counter for cache-staleness assertions.
pub struct StaticIdentitySource {
    identities: Vec<IdentityRef>,
    calls: AtomicUsize,
}

impl StaticIdentitySource {
    pub fn new(identities: Vec<IdentityRef>) -> Self {
        Self { identities, calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl IdentitySource for StaticIdentitySource {
    fn list_active(&self) -> Result<Vec<IdentityRef>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.identities.clone())
    }
}

/// In-memory attendance store keyed by (identity, day).
#[derive(Default)]
pub struct MemoryAttendance {
    records: Mutex<HashMap<(i64, NaiveDate), AttendanceRecord>>,
    next_id: AtomicI64,
}

impl MemoryAttendance {
    pub fn record(&self, identity_id: i64, date: NaiveDate) -> Option<AttendanceRecord> {
        self.records.lock().unwrap().get(&(identity_id, date)).cloned()
    }

    /// Seed a corrupt record: check-out set, check-in missing.
    pub fn seed_checkout_only(&self, identity_id: i64, date: NaiveDate, at: DateTime<Utc>) {
        self.records.lock().unwrap().insert(
            (identity_id, date),
            AttendanceRecord {
                id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
                identity_id,
                date,
                check_in_time: None,
                check_out_time: Some(at),
            },
        );
    }
}

impl AttendanceSink for MemoryAttendance {
    fn get_or_create(
        &self,
        identity_id: i64,
        date: NaiveDate,
    ) -> Result<AttendanceRecord, SourceError> {
        let mut records = self.records.lock().unwrap();
        let record = records.entry((identity_id, date)).or_insert_with(|| AttendanceRecord {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            identity_id,
            date,
            check_in_time: None,
            check_out_time: None,
        });
        Ok(record.clone())
    }

    fn update(&self, record: &AttendanceRecord) -> Result<(), SourceError> {
        self.records
            .lock()
            .unwrap()
            .insert((record.identity_id, record.date), record.clone());
        Ok(())
    }
}

/// Counts cues per kind.
#[derive(Default)]
pub struct CountingNotifier {
    check_ins: AtomicUsize,
    check_outs: AtomicUsize,
}

impl CountingNotifier {
    pub fn count(&self, event: NotifyEvent) -> usize {
        match event {
            NotifyEvent::CheckIn => self.check_ins.load(Ordering::SeqCst),
            NotifyEvent::CheckOut => self.check_outs.load(Ordering::SeqCst),
        }
    }

    pub fn total(&self) -> usize {
        self.count(NotifyEvent::CheckIn) + self.count(NotifyEvent::CheckOut)
    }
}

impl Notifier for CountingNotifier {
    fn notify(&self, event: NotifyEvent) {
        match event {
            NotifyEvent::CheckIn => self.check_ins.fetch_add(1, Ordering::SeqCst),
            NotifyEvent::CheckOut => self.check_outs.fetch_add(1, Ordering::SeqCst),
        };
    }
}

/// What a scripted camera does when opened.
#[derive(Clone)]
pub enum SourceBehavior {
    /// Open fails immediately.
    Unopenable,
    /// Deliver these marker frames in order, then end of stream.
    Frames(Vec<u8>),
    /// Fail this many reads, then deliver frames, then end of stream.
    FlakyReads { failures: u32, then_frames: Vec<u8> },
    /// Deliver the same marker frame until told to stop.
    Endless(u8),
}

struct ScriptedSource {
    fail_reads: u32,
    frames: VecDeque<u8>,
    endless: Option<u8>,
    sequence: u64,
}

impl FrameSource for ScriptedSource {
    fn read_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        if self.fail_reads > 0 {
            self.fail_reads -= 1;
            return Err(CaptureError::ReadFailed("scripted read failure".into()));
        }
        if let Some(marker) = self.frames.pop_front() {
            self.sequence += 1;
            return Ok(Some(marker_frame(marker, self.sequence)));
        }
        if let Some(marker) = self.endless {
            // Pace the endless stream so cancellation tests don't spin.
            std::thread::sleep(Duration::from_millis(1));
            self.sequence += 1;
            return Ok(Some(marker_frame(marker, self.sequence)));
        }
        Ok(None)
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

/// Looks up a [`SourceBehavior`] by camera name.
pub struct ScriptedSourceFactory {
    behaviors: HashMap<String, SourceBehavior>,
}

impl ScriptedSourceFactory {
    pub fn new(behaviors: Vec<(&str, SourceBehavior)>) -> Self {
        Self {
            behaviors: behaviors
                .into_iter()
                .map(|(name, behavior)| (name.to_string(), behavior))
                .collect(),
        }
    }
}

impl SourceFactory for ScriptedSourceFactory {
    fn open(&self, config: &CameraConfig) -> Result<Box<dyn FrameSource>, CaptureError> {
        let behavior = self.behaviors.get(&config.name).cloned().ok_or_else(|| {
            CaptureError::DeviceNotFound(config.name.clone())
        })?;
        let source = match behavior {
            SourceBehavior::Unopenable => {
                return Err(CaptureError::OpenFailed {
                    source_name: config.source.clone(),
                    reason: "scripted open failure".into(),
                })
            }
            SourceBehavior::Frames(markers) => ScriptedSource {
                fail_reads: 0,
                frames: markers.into(),
                endless: None,
                sequence: 0,
            },
            SourceBehavior::FlakyReads { failures, then_frames } => ScriptedSource {
                fail_reads: failures,
                frames: then_frames.into(),
                endless: None,
                sequence: 0,
            },
            SourceBehavior::Endless(marker) => ScriptedSource {
                fail_reads: 0,
                frames: VecDeque::new(),
                endless: Some(marker),
                sequence: 0,
            },
        };
        Ok(Box::new(source))
    }
}

/// Records show/close calls; optionally requests a stop or fails.
#[derive(Default)]
pub struct CollectingSink {
    shows: Mutex<HashMap<String, usize>>,
    banners: Mutex<HashMap<String, String>>,
    closed: Mutex<HashSet<String>>,
    stop_after: AtomicUsize,
    fail: AtomicBool,
}

impl CollectingSink {
    pub fn shows(&self, camera: &str) -> usize {
        self.shows.lock().unwrap().get(camera).copied().unwrap_or(0)
    }

    pub fn last_banner(&self, camera: &str) -> Option<String> {
        self.banners.lock().unwrap().get(camera).cloned()
    }

    pub fn closed(&self, camera: &str) -> bool {
        self.closed.lock().unwrap().contains(camera)
    }

    /// Return [`SinkAction::Stop`] on the nth show for any one camera.
    pub fn stop_after(&self, shows: usize) {
        self.stop_after.store(shows, Ordering::SeqCst);
    }

    /// Make every subsequent show call fail.
    pub fn fail_shows(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

impl PresentationSink for CollectingSink {
    fn show(&self, camera: &str, _frame: &Frame, overlay: &Overlay) -> Result<SinkAction, SinkError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SinkError::Encode("scripted show failure".into()));
        }
        let count = {
            let mut shows = self.shows.lock().unwrap();
            let count = shows.entry(camera.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        if let Some(banner) = &overlay.banner {
            self.banners.lock().unwrap().insert(camera.to_string(), banner.clone());
        }
        let stop_after = self.stop_after.load(Ordering::SeqCst);
        if stop_after > 0 && count >= stop_after {
            return Ok(SinkAction::Stop);
        }
        Ok(SinkAction::Continue)
    }

    fn close(&self, camera: &str) {
        self.closed.lock().unwrap().insert(camera.to_string());
    }
}

pub fn camera_config(name: &str) -> CameraConfig {
    CameraConfig {
        id: 1,
        name: name.to_string(),
        source: "0".to_string(),
        threshold: 0.5,
    }
}

/// Assemble a [`WorkerContext`] over scripted sources, the marker
/// encoder, and in-memory collaborators. `roster` entries are
/// (identity id, name, marker).
pub fn test_context(
    behaviors: Vec<(&str, SourceBehavior)>,
    roster: &[(i64, &str, u8)],
) -> (WorkerContext, Arc<CollectingSink>, Arc<MemoryAttendance>) {
    // Marker images must outlive the returned context.
    let dir = tempfile::tempdir().unwrap().keep();
    let identities = roster
        .iter()
        .map(|(id, name, marker)| IdentityRef {
            id: *id,
            name: name.to_string(),
            reference_image_path: write_marker_image(&dir, &format!("{name}.png"), *marker),
        })
        .collect();

    let cache = GalleryCache::new(
        Arc::new(StaticIdentitySource::new(identities)),
        Box::new(MarkerEncoder),
        Duration::from_secs(60),
    );

    let attendance = Arc::new(MemoryAttendance::default());
    let tracker = AttendanceTracker::new(
        attendance.clone(),
        Arc::new(CountingNotifier::default()),
        Duration::from_secs(60),
    );

    let sink = Arc::new(CollectingSink::default());
    let ctx = WorkerContext {
        roster: Arc::new(cache),
        tracker: Arc::new(tracker),
        sink: sink.clone(),
        sources: Arc::new(ScriptedSourceFactory::new(behaviors)),
        encoders: Arc::new(MarkerEncoderFactory),
        max_consecutive_failures: 5,
    };
    (ctx, sink, attendance)
}
