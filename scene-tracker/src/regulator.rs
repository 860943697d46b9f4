use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use analytics_types::SceneMessage;
use tracing::{debug, warn};

use crate::scene::SceneTracker;

/// Drives periodic publish of fused scene state at a configured cadence
/// (section 4.4). Runs on a dedicated thread; if the previous publish
/// callback has not returned when the next tick fires, the tick is skipped
/// rather than queued (the next snapshot is already fresher).
pub struct RateRegulator {
    shutdown: Arc<AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl RateRegulator {
    pub fn spawn<F>(
        scene: Arc<SceneTracker>,
        scene_name: String,
        period: Duration,
        now: impl Fn() -> f64 + Send + 'static,
        mut publish: F,
    ) -> Self
    where
        F: FnMut(SceneMessage) + Send + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let loop_shutdown = shutdown.clone();
        let publishing = Arc::new(AtomicBool::new(false));

        let handle = std::thread::spawn(move || {
            loop {
                std::thread::sleep(period);
                if loop_shutdown.load(Ordering::SeqCst) {
                    break;
                }
                if publishing.swap(true, Ordering::SeqCst) {
                    warn!("previous scene publish still in flight, skipping this tick");
                    continue;
                }
                let objects = scene.current_objects(None);
                let timestamp = now();
                let message = SceneMessage::new(scene.scene_id(), scene_name.clone(), timestamp, objects);
                debug!(scene = %scene.scene_id(), count = message.objects.len(), "publishing regulated scene state");
                publish(message);
                publishing.store(false, Ordering::SeqCst);
            }
        });

        RateRegulator {
            shutdown,
            handle: Some(handle),
        }
    }

    pub fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RateRegulator {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analytics_types::TrackerConfig;
    use crate::scene::CategoryRegistry;
    use std::sync::Mutex;

    #[test]
    fn tick_publishes_periodically() {
        let scene = Arc::new(SceneTracker::new("scene-1", TrackerConfig::default(), CategoryRegistry::new()));
        let published = Arc::new(Mutex::new(Vec::new()));
        let published_clone = published.clone();
        let regulator = RateRegulator::spawn(
            scene.clone(),
            "test scene".to_string(),
            Duration::from_millis(20),
            || 0.0,
            move |msg| published_clone.lock().unwrap().push(msg),
        );
        std::thread::sleep(Duration::from_millis(90));
        regulator.shutdown();
        assert!(published.lock().unwrap().len() >= 2);
    }
}
