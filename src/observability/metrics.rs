use prometheus::{
    Encoder, GaugeVec, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub rides_total: IntCounterVec,
    pub rides_active: IntGauge,
    pub rides_awaiting_dispatch: IntGauge,
    pub dispatch_search_seconds: HistogramVec,
    pub offer_waves_total: IntCounterVec,
    pub location_updates_total: IntCounter,
    pub connected_clients: GaugeVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let rides_total = IntCounterVec::new(
            Opts::new("rides_total", "Total finished rides by outcome"),
            &["outcome"],
        )
        .expect("valid rides_total metric");

        let rides_active = IntGauge::new("rides_active", "Rides currently in a non-terminal state")
            .expect("valid rides_active metric");

        let rides_awaiting_dispatch = IntGauge::new(
            "rides_awaiting_dispatch",
            "Rides queued for a captain search",
        )
        .expect("valid rides_awaiting_dispatch metric");

        let dispatch_search_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "dispatch_search_seconds",
                "Duration of captain searches in seconds",
            ),
            &["outcome"],
        )
        .expect("valid dispatch_search_seconds metric");

        let offer_waves_total = IntCounterVec::new(
            Opts::new("offer_waves_total", "Offer waves by outcome"),
            &["outcome"],
        )
        .expect("valid offer_waves_total metric");

        let location_updates_total = IntCounter::new(
            "location_updates_total",
            "Captain location pings ingested",
        )
        .expect("valid location_updates_total metric");

        let connected_clients = GaugeVec::new(
            Opts::new("connected_clients", "Live realtime connections by role"),
            &["role"],
        )
        .expect("valid connected_clients metric");

        registry
            .register(Box::new(rides_total.clone()))
            .expect("register rides_total");
        registry
            .register(Box::new(rides_active.clone()))
            .expect("register rides_active");
        registry
            .register(Box::new(rides_awaiting_dispatch.clone()))
            .expect("register rides_awaiting_dispatch");
        registry
            .register(Box::new(dispatch_search_seconds.clone()))
            .expect("register dispatch_search_seconds");
        registry
            .register(Box::new(offer_waves_total.clone()))
            .expect("register offer_waves_total");
        registry
            .register(Box::new(location_updates_total.clone()))
            .expect("register location_updates_total");
        registry
            .register(Box::new(connected_clients.clone()))
            .expect("register connected_clients");

        Self {
            registry,
            rides_total,
            rides_active,
            rides_awaiting_dispatch,
            dispatch_search_seconds,
            offer_waves_total,
            location_updates_total,
            connected_clients,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
