/// Background platform generation
///
/// Requests are queued on a dedicated single-thread pool. Each request
/// produces one batch of descriptors that is published on the results
/// channel as a whole, so a consumer never sees half a chunk.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use glam::Vec3;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::{ThreadPool, ThreadPoolBuilder};

use super::platform::{PlatformDescriptor, PlatformKind};
use crate::config::GenerationConfig;
use crate::error::{initialization_error, EngineResult};

/// Asynchronous supplier of platform batches
pub trait ChunkSource: Send + Sync {
    /// Queue generation of `count` platforms chained from `anchor`.
    /// Returns immediately.
    fn request_chunk(&self, count: usize, anchor: Vec3);

    /// One completed batch, if any
    fn poll_chunk(&self) -> Option<Vec<PlatformDescriptor>>;

    /// Stop accepting requests
    fn shutdown(&self) {}
}

/// Chain `count` platforms outward from `anchor`
pub fn generate_chunk<R: Rng>(
    settings: &GenerationConfig,
    rng: &mut R,
    count: usize,
    anchor: Vec3,
) -> Vec<PlatformDescriptor> {
    let settings = settings.clone().normalized();
    let mut platforms = Vec::with_capacity(count);
    let mut x = anchor.x;
    let mut y = anchor.y;

    for _ in 0..count {
        let step = rng.gen_range(settings.min_jump_distance..=settings.max_jump_distance);
        let backwards = rng.gen_bool(f64::from(settings.backtrack_chance));
        x += if backwards { -step } else { step };

        let rise = rng.gen_range(settings.min_jump_height..=settings.max_jump_height);
        y = (y + rise).clamp(settings.world_min_y, settings.world_max_y);

        let width = rng.gen_range(settings.min_width..=settings.max_width);
        let kind = PlatformKind::ALL[rng.gen_range(0..PlatformKind::ALL.len())];

        platforms.push(PlatformDescriptor::new(
            Vec3::new(x, y, anchor.z),
            Vec3::new(width, settings.platform_height, settings.platform_depth),
            kind,
        ));
    }

    platforms
}

/// `ChunkSource` backed by a `chunk-generator` worker thread
pub struct ChunkGenerator {
    pool: Mutex<Option<ThreadPool>>,
    settings: Arc<GenerationConfig>,
    rng: Arc<Mutex<StdRng>>,
    accepting: Arc<AtomicBool>,
    completed_sender: Sender<Vec<PlatformDescriptor>>,
    completed_receiver: Receiver<Vec<PlatformDescriptor>>,
    requests: AtomicU64,
}

impl ChunkGenerator {
    pub fn new(settings: GenerationConfig) -> EngineResult<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(1)
            .thread_name(|_| "chunk-generator".to_string())
            .panic_handler(|_| log::error!("[ChunkGenerator] Generation job panicked"))
            .build()
            .map_err(|e| initialization_error("chunk generator", e))?;

        let rng = match settings.seed {
            Some(seed) => {
                log::info!("[ChunkGenerator::new] Using fixed seed {}", seed);
                StdRng::seed_from_u64(seed)
            }
            None => StdRng::from_entropy(),
        };

        let (completed_sender, completed_receiver) = unbounded();

        Ok(Self {
            pool: Mutex::new(Some(pool)),
            settings: Arc::new(settings.normalized()),
            rng: Arc::new(Mutex::new(rng)),
            accepting: Arc::new(AtomicBool::new(true)),
            completed_sender,
            completed_receiver,
            requests: AtomicU64::new(0),
        })
    }

    /// Block up to `timeout` for the next batch
    pub fn recv_chunk_timeout(&self, timeout: Duration) -> Option<Vec<PlatformDescriptor>> {
        self.completed_receiver.recv_timeout(timeout).ok()
    }

    pub fn requests_made(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }
}

impl ChunkSource for ChunkGenerator {
    fn request_chunk(&self, count: usize, anchor: Vec3) {
        if !self.is_accepting() {
            log::debug!("[ChunkGenerator::request_chunk] Shut down, dropping request at x={:.2}", anchor.x);
            return;
        }

        let pool = self.pool.lock();
        let Some(pool) = pool.as_ref() else {
            return;
        };

        self.requests.fetch_add(1, Ordering::Relaxed);
        let settings = Arc::clone(&self.settings);
        let rng = Arc::clone(&self.rng);
        let accepting = Arc::clone(&self.accepting);
        let sender = self.completed_sender.clone();

        pool.spawn_fifo(move || {
            // Requests still queued at shutdown are dropped
            if !accepting.load(Ordering::Acquire) {
                return;
            }

            let batch = {
                let mut rng = rng.lock();
                generate_chunk(&settings, &mut *rng, count, anchor)
            };
            log::debug!(
                "[ChunkGenerator] Generated {} platforms from x={:.2}",
                batch.len(),
                anchor.x
            );
            let _ = sender.send(batch);
        });
    }

    fn poll_chunk(&self) -> Option<Vec<PlatformDescriptor>> {
        self.completed_receiver.try_recv().ok()
    }

    fn shutdown(&self) {
        if !self.accepting.swap(false, Ordering::AcqRel) {
            return;
        }

        // Dropping the pool lets the worker exit once its current job ends
        if self.pool.lock().take().is_some() {
            log::info!(
                "[ChunkGenerator::shutdown] Stopped after {} requests",
                self.requests_made()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(seed: u64) -> StdRng {
        StdRng::seed_from_u64(seed)
    }

    #[test]
    fn test_consecutive_platforms_are_within_jump_range() {
        let settings = GenerationConfig::default();
        let mut rng = seeded(7);

        for round in 0..50 {
            let anchor = Vec3::new(round as f32 * 3.0, -0.2, 0.0);
            let chunk = generate_chunk(&settings, &mut rng, 5, anchor);
            assert_eq!(chunk.len(), 5);

            let mut previous = anchor;
            for platform in &chunk {
                let dx = (platform.position.x - previous.x).abs();
                assert!(dx >= settings.min_jump_distance - 1e-5 && dx <= settings.max_jump_distance + 1e-5);
                let dy = platform.position.y - previous.y;
                assert!(dy >= settings.min_jump_height - 1e-5 && dy <= settings.max_jump_height + 1e-5);
                assert!(platform.position.y >= settings.world_min_y && platform.position.y <= settings.world_max_y);
                assert!(platform.size.x >= settings.min_width && platform.size.x <= settings.max_width);
                previous = platform.position;
            }
        }
    }

    #[test]
    fn test_same_seed_same_world() {
        let settings = GenerationConfig::default();
        let a = generate_chunk(&settings, &mut seeded(3), 8, Vec3::ZERO);
        let b = generate_chunk(&settings, &mut seeded(3), 8, Vec3::ZERO);
        assert_eq!(a, b);
    }

    #[test]
    fn test_no_backtracking_when_chance_is_zero() {
        let settings = GenerationConfig {
            backtrack_chance: 0.0,
            ..Default::default()
        };
        let chunk = generate_chunk(&settings, &mut seeded(11), 20, Vec3::ZERO);
        assert!(chunk.windows(2).all(|w| w[1].position.x > w[0].position.x));
    }

    #[test]
    fn test_non_finite_ranges_still_produce_a_batch() {
        let generator = ChunkGenerator::new(GenerationConfig {
            max_jump_distance: f32::INFINITY,
            min_width: f32::NAN,
            seed: Some(4),
            ..Default::default()
        })
        .unwrap();

        generator.request_chunk(5, Vec3::new(8.0, -0.2, 0.0));
        let batch = generator.recv_chunk_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(batch.len(), 5);
        assert!(batch.iter().all(|p| p.position.is_finite() && p.size.is_finite()));
    }

    #[test]
    fn test_request_delivers_one_whole_batch() {
        let generator = ChunkGenerator::new(GenerationConfig {
            seed: Some(1),
            ..Default::default()
        })
        .unwrap();

        generator.request_chunk(5, Vec3::new(8.0, -0.2, 0.0));
        let batch = generator.recv_chunk_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(batch.len(), 5);
        assert!(generator.poll_chunk().is_none());
        assert_eq!(generator.requests_made(), 1);
    }

    #[test]
    fn test_requests_after_shutdown_are_ignored() {
        let generator = ChunkGenerator::new(GenerationConfig::default()).unwrap();
        generator.shutdown();
        generator.shutdown();

        generator.request_chunk(5, Vec3::ZERO);
        assert!(!generator.is_accepting());
        assert_eq!(generator.requests_made(), 0);
        assert!(generator.recv_chunk_timeout(Duration::from_millis(50)).is_none());
    }
}
