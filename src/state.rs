use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::Config;
use crate::engine::queue::DispatchJob;
use crate::models::offer::AssignmentOffer;
use crate::observability::metrics::Metrics;
use crate::realtime::gateway::Gateway;
use crate::realtime::locations::LocationHub;
use crate::store::RideStore;

pub struct AppState {
    pub config: Config,
    pub rides: RideStore,
    pub hub: LocationHub,
    pub gateway: Gateway,
    pub offers: DashMap<Uuid, AssignmentOffer>,
    pub dispatch_tx: mpsc::Sender<DispatchJob>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: Config) -> (Self, mpsc::Receiver<DispatchJob>) {
        let (dispatch_tx, dispatch_rx) = mpsc::channel(config.dispatch_queue_size);
        let rides = RideStore::new(config.event_buffer_size);

        (
            Self {
                config,
                rides,
                hub: LocationHub::new(),
                gateway: Gateway::new(),
                offers: DashMap::new(),
                dispatch_tx,
                metrics: Metrics::new(),
            },
            dispatch_rx,
        )
    }
}
