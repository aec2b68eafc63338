use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use acct_schemas::{
    parse_instant, CloudRecord, EnergyRecord, IpRecord, Overridable, Record, RecordKind,
    ResourceStatus, StorageRecord,
};
use acct_sink::{
    DeliveryOutcome, JsonLinesSink, KindFilter, LogstashSink, RecordSink, SinkError, SinkRouter,
};
use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;

fn cloud(id: &str) -> Record {
    let t = parse_instant("2024-01-01T00:00:00").unwrap();
    Record::Cloud(CloudRecord {
        resource_id: id.to_string(),
        name: id.to_string(),
        site_name: "SITE".to_string(),
        compute_service: "svc".to_string(),
        owner_id: "u".to_string(),
        group_id: "p".to_string(),
        vo: "vo".to_string(),
        status: ResourceStatus::Active,
        created_at: t,
        start_time: t,
        end_time: None,
        wall: Overridable::computed(3600),
        cpu: Overridable::computed(3600).with_override(1800),
        cpu_count: 1,
        memory_mb: 512,
        disk_gb: 1,
        image_id: "img".to_string(),
        public_ip_count: 0,
        benchmark: None,
    })
}

fn storage(id: &str) -> Record {
    let t = parse_instant("2024-01-01T00:00:00").unwrap();
    Record::Storage(StorageRecord {
        resource_id: id.to_string(),
        name: id.to_string(),
        site_name: "SITE".to_string(),
        compute_service: "svc".to_string(),
        owner_id: "u".to_string(),
        group_id: "p".to_string(),
        vo: "vo".to_string(),
        status: "available".to_string(),
        capacity_gb: 10,
        created_at: t,
        start_time: t,
        measure_time: t,
        active_duration: 0,
        attached_to: None,
        attached_duration: 0,
    })
}

fn energy(id: &str) -> Record {
    let t = parse_instant("2024-01-01T00:00:00").unwrap();
    Record::Energy(EnergyRecord {
        resource_id: id.to_string(),
        site_name: "SITE".to_string(),
        compute_service: "svc".to_string(),
        owner_id: "u".to_string(),
        group_id: "p".to_string(),
        vo: "vo".to_string(),
        status: ResourceStatus::Active,
        start_time: t,
        end_time: t,
        energy_wh: 1.5,
        work: 0.0,
        efficiency: 0.0,
        wall_duration: 0,
        cpu_duration: 0,
        suspend_duration: 0,
        cpu_normalization_factor: 1.0,
        finished: false,
    })
}

fn ip() -> Record {
    Record::Ip(IpRecord {
        site_name: "SITE".to_string(),
        compute_service: "svc".to_string(),
        owner_id: Some("u".to_string()),
        group_id: "p".to_string(),
        vo: "vo".to_string(),
        measure_time: parse_instant("2024-01-02T00:00:00").unwrap(),
        ip_version: 4,
        public_ip_count: 2,
    })
}

#[derive(Default)]
struct CountingSink {
    pushed: Arc<AtomicUsize>,
    fail: bool,
}

#[async_trait]
impl RecordSink for CountingSink {
    fn name(&self) -> &str {
        if self.fail {
            "broken"
        } else {
            "counting"
        }
    }

    async fn push(&self, records: &[Record]) -> Result<(), SinkError> {
        if self.fail {
            return Err(SinkError::Io {
                sink: "broken".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed"),
            });
        }
        self.pushed.fetch_add(records.len(), Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn scenario_failing_sink_does_not_block_others() {
    let pushed = Arc::new(AtomicUsize::new(0));
    let router = SinkRouter::new()
        .with(
            Box::new(CountingSink {
                fail: true,
                ..CountingSink::default()
            }),
            KindFilter::all(),
        )
        .with(
            Box::new(CountingSink {
                pushed: pushed.clone(),
                fail: false,
            }),
            KindFilter::all(),
        );

    let report = router.push_to_all(&[cloud("a"), storage("b")]).await;

    assert!(!report.all_delivered());
    assert_eq!(pushed.load(Ordering::SeqCst), 2);
    let failed: Vec<&str> = report.failures().map(|(name, _)| name).collect();
    assert_eq!(failed, vec!["broken"]);
}

#[tokio::test]
async fn scenario_kind_filter_routes_and_skips() {
    let pushed = Arc::new(AtomicUsize::new(0));
    let router = SinkRouter::new().with(
        Box::new(CountingSink {
            pushed: pushed.clone(),
            fail: false,
        }),
        KindFilter::only([RecordKind::Storage]),
    );

    let report = router.push_to_all(&[cloud("a"), storage("b")]).await;
    assert!(matches!(
        report.outcomes[0].1,
        DeliveryOutcome::Delivered { count: 1 }
    ));

    let report = router.push_to_all(&[cloud("a")]).await;
    assert!(matches!(report.outcomes[0].1, DeliveryOutcome::Skipped));
    assert!(report.all_delivered());
    assert_eq!(pushed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn scenario_energy_and_ip_records_route_by_kind() {
    let energy_only = Arc::new(AtomicUsize::new(0));
    let ip_only = Arc::new(AtomicUsize::new(0));
    let router = SinkRouter::new()
        .with(
            Box::new(CountingSink {
                pushed: energy_only.clone(),
                fail: false,
            }),
            KindFilter::only([RecordKind::Energy]),
        )
        .with(
            Box::new(CountingSink {
                pushed: ip_only.clone(),
                fail: false,
            }),
            KindFilter::only([RecordKind::Ip]),
        );

    let batch = [cloud("a"), energy("a"), energy("b"), ip()];
    let report = router.push_to_all(&batch).await;

    assert!(report.all_delivered());
    assert_eq!(energy_only.load(Ordering::SeqCst), 2);
    assert_eq!(ip_only.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn scenario_jsonl_sink_writes_energy_and_ip_tags() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.jsonl");
    let sink = JsonLinesSink::new(&path);

    sink.push(&[energy("vm-1"), ip()]).await.unwrap();

    let body = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<serde_json::Value> = body
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines[0]["record_type"], "energy");
    assert_eq!(lines[0]["energy_wh"], 1.5);
    assert_eq!(lines[1]["record_type"], "ip");
    assert_eq!(lines[1]["public_ip_count"], 2);
}

#[tokio::test]
async fn scenario_jsonl_sink_appends_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out").join("records.jsonl");
    let sink = JsonLinesSink::new(&path);

    sink.push(&[cloud("a")]).await.unwrap();
    sink.push(&[storage("b")]).await.unwrap();

    let body = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<serde_json::Value> = body
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["record_type"], "cloud");
    assert_eq!(lines[0]["cpu_duration"], 1800);
    assert_eq!(lines[1]["record_type"], "storage");
}

#[tokio::test]
async fn scenario_logstash_sink_sends_json_lines_over_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let mut body = String::new();
        sock.read_to_string(&mut body).await.unwrap();
        body
    });

    LogstashSink::new("127.0.0.1", port)
        .push(&[cloud("a"), cloud("b")])
        .await
        .unwrap();

    let body = server.await.unwrap();
    let lines: Vec<serde_json::Value> = body
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[1]["resource_id"], "b");
    assert!(lines[0]["acct_sent_at"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn scenario_logstash_unreachable_is_connect_error() {
    // Bind then drop to obtain a port with nothing listening.
    let port = {
        let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
        l.local_addr().unwrap().port()
    };

    let err = LogstashSink::new("127.0.0.1", port)
        .push(&[cloud("a")])
        .await
        .unwrap_err();
    assert!(matches!(err, SinkError::Connect { .. }));
}
