use prometheus::{
    Encoder, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub bookings_total: IntCounterVec,
    pub pending_bookings: IntGauge,
    pub accepts_total: IntCounterVec,
    pub accept_latency_seconds: HistogramVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let bookings_total = IntCounterVec::new(
            Opts::new("bookings_total", "Booking lifecycle events by kind"),
            &["event"],
        )
        .expect("valid bookings_total metric");

        let pending_bookings =
            IntGauge::new("pending_bookings", "Bookings currently awaiting a helper")
                .expect("valid pending_bookings metric");

        let accepts_total = IntCounterVec::new(
            Opts::new("accepts_total", "Lead accept attempts by outcome"),
            &["outcome"],
        )
        .expect("valid accepts_total metric");

        let accept_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "accept_latency_seconds",
                "Latency of accept processing in seconds",
            ),
            &["outcome"],
        )
        .expect("valid accept_latency_seconds metric");

        registry
            .register(Box::new(bookings_total.clone()))
            .expect("register bookings_total");
        registry
            .register(Box::new(pending_bookings.clone()))
            .expect("register pending_bookings");
        registry
            .register(Box::new(accepts_total.clone()))
            .expect("register accepts_total");
        registry
            .register(Box::new(accept_latency_seconds.clone()))
            .expect("register accept_latency_seconds");

        Self {
            registry,
            bookings_total,
            pending_bookings,
            accepts_total,
            accept_latency_seconds,
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
