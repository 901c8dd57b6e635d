use crate::store::IndicatorStore;
use chrono::{DateTime, TimeZone, Utc};
use oncall_core::{sleep_or_cancel, CancellationToken, Result};
use oncall_metrics::{IndicatorRecord, RatioIndicator, TimeSeries};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Samples indicator counters from a time-series backend and appends one
/// record per indicator per tick.
pub struct SlaRecorder<T, S> {
    timeseries: T,
    store: S,
    indicators: Vec<RatioIndicator>,
}

impl<T: TimeSeries, S: IndicatorStore> SlaRecorder<T, S> {
    /// Recorder for web availability, the only indicator defined today.
    pub fn new(timeseries: T, store: S) -> Self {
        Self::with_indicators(timeseries, store, vec![RatioIndicator::availability()])
    }

    pub fn with_indicators(timeseries: T, store: S, indicators: Vec<RatioIndicator>) -> Self {
        Self {
            timeseries,
            store,
            indicators,
        }
    }

    /// Reads the good and total counters at `at` (missing or failed reads
    /// count as 0) and evaluates `indicator`.
    pub async fn evaluate(&self, indicator: &RatioIndicator, at: DateTime<Utc>) -> IndicatorRecord {
        let unix = at.timestamp();
        let good = self
            .timeseries
            .last_value(&indicator.good_series, unix, 0.0)
            .await;
        let total = self
            .timeseries
            .last_value(&indicator.total_series, unix, 0.0)
            .await;

        indicator.evaluate(good, total, at)
    }

    /// Evaluates and stores every indicator at `at`. The first store failure
    /// is returned; later indicators are not attempted.
    pub async fn tick_at(&self, at: DateTime<Utc>) -> Result<Vec<IndicatorRecord>> {
        let mut records = Vec::with_capacity(self.indicators.len());

        for indicator in &self.indicators {
            let record = self.evaluate(indicator, at).await;
            self.store.insert(&record).await?;

            if record.is_bad() {
                warn!(
                    "{} = {} at {} is below SLO {}",
                    record.name(),
                    record.value(),
                    record.formatted_timestamp(),
                    record.slo()
                );
            } else {
                debug!(
                    "{} = {} at {}",
                    record.name(),
                    record.value(),
                    record.formatted_timestamp()
                );
            }

            records.push(record);
        }

        Ok(records)
    }

    pub async fn tick(&self) -> Result<Vec<IndicatorRecord>> {
        self.tick_at(whole_second(Utc::now())).await
    }

    /// Records every `interval` until `shutdown` is cancelled. Query
    /// problems are absorbed by the fail-soft reads; a store failure is
    /// fatal and ends the loop with the error.
    pub async fn run(&self, interval: Duration, shutdown: CancellationToken) -> Result<()> {
        info!(
            "Recording {} indicator(s) every {:?}",
            self.indicators.len(),
            interval
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            debug!("Running recorder tick");
            // Reads never fail a tick, so any error here comes from the store.
            if let Err(e) = self.tick().await {
                error!("Stopping recorder: {}", e);
                return Err(e);
            }

            debug!("Waiting {:?} for next tick", interval);
            if !sleep_or_cancel(&shutdown, interval).await {
                break;
            }
        }

        info!("Recorder loop stopped");
        Ok(())
    }

    pub fn into_store(self) -> S {
        self.store
    }
}

/// Drops sub-second precision; records are stored at one-second resolution.
fn whole_second(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_opt(now.timestamp(), 0).single().unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryIndicatorStore;
    use async_trait::async_trait;
    use axum::{extract::Query, routing::get, Router};
    use mockall::mock;
    use oncall_core::OncallError;
    use oncall_metrics::PrometheusClient;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const SUCCESS: &str = "oncall_web_probe_requests_success_total";
    const TOTAL: &str = "oncall_web_probe_requests_total";
    const T: i64 = 1_700_000_000;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    /// Backend answering from a fixed table and remembering what was asked.
    #[derive(Default)]
    struct FixedSeries {
        values: HashMap<String, f64>,
        queries: Mutex<Vec<(String, i64)>>,
    }

    impl FixedSeries {
        fn with(values: &[(&str, f64)]) -> Self {
            Self {
                values: values.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
                queries: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TimeSeries for FixedSeries {
        async fn query_instant(&self, series: &str, at: i64) -> Result<Option<f64>> {
            self.queries.lock().unwrap().push((series.to_string(), at));
            Ok(self.values.get(series).copied())
        }
    }

    /// Backend that is always down.
    struct FailingSeries;

    #[async_trait]
    impl TimeSeries for FailingSeries {
        async fn query_instant(&self, _series: &str, _at: i64) -> Result<Option<f64>> {
            Err(OncallError::Query("connection refused".into()))
        }
    }

    mock! {
        Store {}

        #[async_trait]
        impl IndicatorStore for Store {
            async fn ensure_schema(&self) -> Result<()>;
            async fn insert(&self, record: &IndicatorRecord) -> Result<()>;
        }
    }

    #[tokio::test]
    async fn test_tick_records_availability() {
        let series = FixedSeries::with(&[(SUCCESS, 999.0), (TOTAL, 1000.0)]);
        let recorder = SlaRecorder::new(series, MemoryIndicatorStore::new());

        let records = recorder.tick_at(at(T)).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value(), 0.999);
        assert!(!records[0].is_bad());

        let queries = recorder.timeseries.queries.lock().unwrap().clone();
        assert_eq!(
            queries,
            vec![(SUCCESS.to_string(), T), (TOTAL.to_string(), T)]
        );

        let stored = recorder.into_store().records();
        assert_eq!(stored, records);
    }

    #[tokio::test]
    async fn test_below_slo_is_bad() {
        let series = FixedSeries::with(&[(SUCCESS, 998.0), (TOTAL, 1000.0)]);
        let recorder = SlaRecorder::new(series, MemoryIndicatorStore::new());

        let records = recorder.tick_at(at(T)).await.unwrap();
        assert_eq!(records[0].value(), 0.998);
        assert!(records[0].is_bad());
    }

    #[tokio::test]
    async fn test_no_data_counts_as_healthy() {
        let recorder = SlaRecorder::new(FixedSeries::default(), MemoryIndicatorStore::new());

        let records = recorder.tick_at(at(T)).await.unwrap();
        assert_eq!(records[0].value(), 1.0);
        assert!(!records[0].is_bad());
    }

    #[tokio::test]
    async fn test_backend_outage_still_records() {
        let recorder = SlaRecorder::new(FailingSeries, MemoryIndicatorStore::new());

        let records = recorder.tick_at(at(T)).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value(), 1.0);
        assert_eq!(recorder.into_store().records().len(), 1);
    }

    #[tokio::test]
    async fn test_each_indicator_gets_a_record() {
        let series = FixedSeries::with(&[
            (SUCCESS, 1000.0),
            (TOTAL, 1000.0),
            ("login_ok_total", 90.0),
            ("login_total", 100.0),
        ]);
        let indicators = vec![
            RatioIndicator::availability(),
            RatioIndicator::new("login_sli", 0.95, "login_ok_total", "login_total"),
        ];
        let recorder = SlaRecorder::with_indicators(series, MemoryIndicatorStore::new(), indicators);

        let records = recorder.tick_at(at(T)).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name(), "oncall_web_availability_sli");
        assert!(!records[0].is_bad());
        assert_eq!(records[1].name(), "login_sli");
        assert_eq!(records[1].value(), 0.9);
        assert!(records[1].is_bad());
    }

    #[tokio::test]
    async fn test_store_failure_is_fatal() {
        let mut store = MockStore::new();
        store.expect_ensure_schema().never();
        store
            .expect_insert()
            .times(1)
            .returning(|_| Err(OncallError::Persistence("server has gone away".into())));

        let series = FixedSeries::with(&[(SUCCESS, 1.0), (TOTAL, 1.0)]);
        let recorder = SlaRecorder::new(series, store);

        let err = recorder
            .run(Duration::from_millis(10), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OncallError::Persistence(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_run_stops_on_cancellation() {
        let series = FixedSeries::with(&[(SUCCESS, 1.0), (TOTAL, 1.0)]);
        let recorder = SlaRecorder::new(series, MemoryIndicatorStore::new());
        let shutdown = CancellationToken::new();

        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        recorder
            .run(Duration::from_millis(10), shutdown)
            .await
            .unwrap();
        assert!(!recorder.into_store().records().is_empty());
    }

    #[tokio::test]
    async fn test_run_checks_cancellation_before_recording() {
        let store = MemoryIndicatorStore::new();
        let recorder = SlaRecorder::new(FixedSeries::default(), store);
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        recorder.run(Duration::from_secs(60), shutdown).await.unwrap();

        let store = recorder.into_store();
        assert!(store.records().is_empty());
        assert_eq!(store.schema_calls(), 0);
    }

    #[test]
    fn test_whole_second() {
        let now = Utc.timestamp_opt(T, 987_654_321).unwrap();
        assert_eq!(whole_second(now), at(T));
    }

    /// Fake Prometheus with `success=500, total=1000` at `T` only.
    async fn seeded_prometheus() -> String {
        let app = Router::new().route(
            "/api/v1/query",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                let at_t = params.get("time").map(String::as_str) == Some("1700000000");
                let value = match params.get("query").map(String::as_str) {
                    Some(SUCCESS) if at_t => Some("500"),
                    Some(TOTAL) if at_t => Some("1000"),
                    _ => None,
                };
                match value {
                    Some(v) => format!(
                        r#"{{"status":"success","data":{{"resultType":"vector","result":[{{"metric":{{}},"value":[1700000000,"{}"]}}]}}}}"#,
                        v
                    ),
                    None => r#"{"status":"success","data":{"resultType":"vector","result":[]}}"#
                        .to_string(),
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_end_to_end_half_available() {
        let url = seeded_prometheus().await;
        let client = PrometheusClient::new(url).unwrap();
        let recorder = SlaRecorder::new(client, MemoryIndicatorStore::new());

        recorder.tick_at(at(T)).await.unwrap();

        let stored = recorder.into_store().records();
        assert_eq!(stored.len(), 1);
        let record = &stored[0];
        assert_eq!(record.name(), "oncall_web_availability_sli");
        assert_eq!(record.slo(), 0.999);
        assert_eq!(record.value(), 0.5);
        assert!(record.is_bad());
        assert_eq!(record.timestamp(), at(T));
        assert_eq!(record.formatted_timestamp(), "2023-11-14 22:13:20");
    }
}
