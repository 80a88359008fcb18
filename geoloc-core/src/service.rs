use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use log::{debug, warn};
use tokio::sync::watch;

use crate::{
    capability::{AcquisitionOptions, GeoCapability, PositionError},
    model::{AcquisitionState, Coordinates, ErrorReason},
};

impl From<PositionError> for ErrorReason {
    fn from(err: PositionError) -> Self {
        match err {
            PositionError::PermissionDenied => ErrorReason::PermissionDenied,
            PositionError::PositionUnavailable => ErrorReason::PositionUnavailable,
            PositionError::Timeout => ErrorReason::Timeout,
            PositionError::Other(_) => ErrorReason::Unknown,
        }
    }
}

/// Acquires the current position from an injected [`GeoCapability`] and
/// tracks the request lifecycle as an [`AcquisitionState`].
///
/// The constructor issues the first acquisition itself; callers re-trigger
/// with [`request_location`](Self::request_location). Every state change is
/// published on a watch channel, so a rendering layer can subscribe and
/// redraw on updates.
#[derive(Debug)]
pub struct LocationService {
    capability: Arc<dyn GeoCapability>,
    options: AcquisitionOptions,
    state: Arc<watch::Sender<AcquisitionState>>,
    issued: Arc<AtomicU64>,
}

impl LocationService {
    /// Create the service and immediately issue the first acquisition.
    ///
    /// Must be called within a tokio runtime: acquisitions run as spawned
    /// tasks.
    pub fn new(capability: Arc<dyn GeoCapability>) -> Self {
        let (state, _) = watch::channel(AcquisitionState::Loading);

        let service = Self {
            capability,
            options: AcquisitionOptions::default(),
            state: Arc::new(state),
            issued: Arc::new(AtomicU64::new(0)),
        };
        service.request_location();
        service
    }

    /// Read the current lifecycle state.
    pub fn state(&self) -> AcquisitionState {
        *self.state.borrow()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<AcquisitionState> {
        self.state.subscribe()
    }

    /// Wait until the in-flight request settles and return the settled state.
    /// Returns immediately when no request is in flight.
    pub async fn settled(&self) -> AcquisitionState {
        let mut updates = self.subscribe();
        loop {
            let current = *updates.borrow_and_update();
            if !current.is_loading() {
                return current;
            }
            if updates.changed().await.is_err() {
                return *updates.borrow();
            }
        }
    }

    /// Issue a new acquisition.
    ///
    /// The `Loading` transition (clearing any previous error) is applied
    /// before this returns; the outcome is applied asynchronously once the
    /// capability resolves. If the capability is unsupported, the request
    /// fails synchronously without an acquisition call.
    pub fn request_location(&self) {
        let seq = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_replace(AcquisitionState::Loading);

        if !self.capability.supported() {
            let failed = AcquisitionState::Failed(ErrorReason::Unsupported);
            settle(&self.state, &self.issued, seq, failed);
            return;
        }

        let capability = Arc::clone(&self.capability);
        let options = self.options;
        let state = Arc::clone(&self.state);
        let issued = Arc::clone(&self.issued);

        tokio::spawn(async move {
            let outcome = match capability.current_position(options).await {
                Ok(position) => AcquisitionState::Success(Coordinates {
                    lat: position.latitude,
                    lon: position.longitude,
                }),
                Err(err) => AcquisitionState::Failed(err.into()),
            };
            settle(&state, &issued, seq, outcome);
        });
    }
}

/// Apply `outcome` only while `seq` is still the latest issued request, so a
/// stale resolution never overwrites a newer request's state.
fn settle(
    state: &watch::Sender<AcquisitionState>,
    issued: &AtomicU64,
    seq: u64,
    outcome: AcquisitionState,
) {
    let applied = state.send_if_modified(|current| {
        if issued.load(Ordering::SeqCst) == seq {
            *current = outcome;
            true
        } else {
            false
        }
    });

    if applied {
        debug!("location request #{seq} settled: {outcome:?}");
    } else {
        warn!("discarding stale resolution of location request #{seq}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Position;
    use std::{collections::VecDeque, sync::Mutex, time::Duration};
    use tokio::sync::Notify;

    /// Test double for the platform capability: records the options it was
    /// called with and plays back queued outcomes, optionally holding an
    /// outcome until released.
    #[derive(Debug)]
    struct ScriptedCapability {
        supported: bool,
        outcomes: Mutex<VecDeque<Scripted>>,
        seen_options: Mutex<Vec<AcquisitionOptions>>,
    }

    #[derive(Debug)]
    struct Scripted {
        gate: Option<Arc<Notify>>,
        result: Result<Position, PositionError>,
    }

    impl ScriptedCapability {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                supported: true,
                outcomes: Mutex::new(VecDeque::new()),
                seen_options: Mutex::new(Vec::new()),
            })
        }

        fn unsupported() -> Arc<Self> {
            Arc::new(Self {
                supported: false,
                outcomes: Mutex::new(VecDeque::new()),
                seen_options: Mutex::new(Vec::new()),
            })
        }

        fn push(&self, result: Result<Position, PositionError>) {
            self.outcomes.lock().unwrap().push_back(Scripted { gate: None, result });
        }

        fn push_gated(&self, result: Result<Position, PositionError>) -> Arc<Notify> {
            let gate = Arc::new(Notify::new());
            self.outcomes
                .lock()
                .unwrap()
                .push_back(Scripted { gate: Some(Arc::clone(&gate)), result });
            gate
        }

        fn calls(&self) -> usize {
            self.seen_options.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl GeoCapability for ScriptedCapability {
        fn supported(&self) -> bool {
            self.supported
        }

        async fn current_position(
            &self,
            options: AcquisitionOptions,
        ) -> Result<Position, PositionError> {
            self.seen_options.lock().unwrap().push(options);

            let scripted = self
                .outcomes
                .lock()
                .unwrap()
                .pop_front()
                .expect("no scripted outcome left");

            if let Some(gate) = scripted.gate {
                gate.notified().await;
            }
            scripted.result
        }
    }

    #[tokio::test]
    async fn starts_loading_and_settles_on_success() {
        let capability = ScriptedCapability::new();
        capability.push(Ok(Position { latitude: 37.77, longitude: -122.42 }));

        let service = LocationService::new(capability.clone());

        // Before the spawned acquisition runs, the state is Loading with
        // neither a fix nor an error.
        let state = service.state();
        assert!(state.is_loading());
        assert_eq!(state.coordinates(), None);
        assert_eq!(state.error(), None);

        let settled = service.settled().await;
        assert_eq!(
            settled,
            AcquisitionState::Success(Coordinates { lat: 37.77, lon: -122.42 })
        );
        assert!(!settled.is_loading());
    }

    #[tokio::test]
    async fn classifies_every_platform_error() {
        let cases = [
            (PositionError::PermissionDenied, ErrorReason::PermissionDenied),
            (PositionError::PositionUnavailable, ErrorReason::PositionUnavailable),
            (PositionError::Timeout, ErrorReason::Timeout),
            (PositionError::Other("code 42".into()), ErrorReason::Unknown),
        ];

        for (platform, expected) in cases {
            let capability = ScriptedCapability::new();
            capability.push(Err(platform));

            let service = LocationService::new(capability);
            assert_eq!(service.settled().await, AcquisitionState::Failed(expected));
        }
    }

    #[tokio::test]
    async fn unsupported_capability_fails_synchronously() {
        let capability = ScriptedCapability::unsupported();
        let service = LocationService::new(capability.clone());

        // No await between construction and this assertion: the failure is
        // applied on the calling tick.
        assert_eq!(
            service.state(),
            AcquisitionState::Failed(ErrorReason::Unsupported)
        );
        assert_eq!(capability.calls(), 0);
    }

    #[tokio::test]
    async fn retry_clears_previous_error() {
        let capability = ScriptedCapability::new();
        capability.push(Err(PositionError::Timeout));

        let service = LocationService::new(capability.clone());
        assert_eq!(
            service.settled().await,
            AcquisitionState::Failed(ErrorReason::Timeout)
        );

        capability.push(Ok(Position { latitude: 50.45, longitude: 30.52 }));
        service.request_location();

        let state = service.state();
        assert!(state.is_loading());
        assert_eq!(state.error(), None);

        assert_eq!(
            service.settled().await,
            AcquisitionState::Success(Coordinates { lat: 50.45, lon: 30.52 })
        );
    }

    #[tokio::test]
    async fn capability_always_receives_fixed_options() {
        let capability = ScriptedCapability::new();
        capability.push(Ok(Position { latitude: 1.0, longitude: 2.0 }));
        capability.push(Err(PositionError::PositionUnavailable));

        let service = LocationService::new(capability.clone());
        service.settled().await;
        service.request_location();
        service.settled().await;

        let seen = capability.seen_options.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        for options in seen {
            assert_eq!(
                options,
                AcquisitionOptions {
                    high_accuracy: false,
                    timeout: Duration::from_millis(15_000),
                    maximum_age: Duration::from_millis(300_000),
                }
            );
        }
    }

    #[tokio::test]
    async fn stale_resolution_does_not_overwrite_newer_request() {
        let capability = ScriptedCapability::new();
        let gate = capability.push_gated(Ok(Position { latitude: 0.0, longitude: 0.0 }));
        capability.push(Ok(Position { latitude: 37.77, longitude: -122.42 }));

        let service = LocationService::new(capability.clone());

        // Let the first acquisition start and park on its gate.
        tokio::task::yield_now().await;
        assert_eq!(capability.calls(), 1);

        // A second request supersedes the first and settles first.
        service.request_location();
        let newer = service.settled().await;
        assert_eq!(
            newer,
            AcquisitionState::Success(Coordinates { lat: 37.77, lon: -122.42 })
        );

        // Release the stale acquisition; its outcome must be discarded.
        gate.notify_one();
        tokio::task::yield_now().await;

        assert_eq!(service.state(), newer);
    }

    #[tokio::test]
    async fn subscribers_observe_transitions() {
        let capability = ScriptedCapability::new();
        capability.push(Ok(Position { latitude: 37.77, longitude: -122.42 }));

        let service = LocationService::new(capability);
        let mut updates = service.subscribe();

        assert!(updates.borrow_and_update().is_loading());
        updates.changed().await.expect("sender alive");
        assert_eq!(
            updates.borrow().coordinates(),
            Some(Coordinates { lat: 37.77, lon: -122.42 })
        );
    }
}
