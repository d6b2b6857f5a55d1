//! A supervised poller feeding the real Prometheus endpoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use radiovisor::devices::Device;
use radiovisor::metrics::{MetricsSink, PrometheusSink, serve_metrics};
use radiovisor::radio::{Operation, RadioManager, mock::MockFactory};
use radiovisor::subscribers::{MetricsWriter, Subscribe};
use radiovisor::{BackoffPolicy, Config, Context, Supervisor};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

async fn scrape(addr: SocketAddr) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut body = String::new();
    stream.read_to_string(&mut body).await.unwrap();
    body
}

fn quick_config() -> Config {
    let mut cfg = Config::default();
    cfg.measurement_interval = Duration::from_millis(200);
    cfg.min_retry_interval = Duration::from_millis(50);
    cfg.retry_backoff = BackoffPolicy::new(Duration::from_millis(5), 2.0);
    cfg.notification_window = Duration::from_millis(10);
    cfg.reset_poll_interval = Duration::from_millis(50);
    cfg
}

#[tokio::test]
async fn readings_and_errors_reach_the_scrape() {
    let factory = MockFactory::new();
    // 10.00 °C, 50 %, 5.000 V
    factory.set_payloads(vec![vec![0xE8, 0x03, 0x32, 0x88, 0x13]]);
    factory.fail_next(Operation::Connect, 1);

    let prometheus = PrometheusSink::new().unwrap();
    let token = CancellationToken::new();
    let server = serve_metrics(
        "127.0.0.1:0".parse().unwrap(),
        prometheus.registry().clone(),
        token.clone(),
    )
    .unwrap();
    let addr = server.local_addr();

    let sink: Arc<dyn MetricsSink> = Arc::new(prometheus);
    let radio = RadioManager::new(Arc::new(factory)).await.unwrap();
    let ctx = Context::new(quick_config(), radio, Arc::clone(&sink));
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(MetricsWriter::new(sink))];
    let sup = Supervisor::new(ctx, subs);

    let run = tokio::spawn({
        let token = token.clone();
        async move {
            sup.run(vec![Device::new("kitchen", "A4:C1:38:00:00:01")], token)
                .await
        }
    });

    let mut body = String::new();
    for _ in 0..100 {
        body = scrape(addr).await;
        if body.contains("mi_temperature{") && body.contains("mi_device_errors_total{") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert!(body.contains(r#"mi_temperature{location="kitchen"} 10"#), "{body}");
    assert!(body.contains(r#"mi_humidity{location="kitchen"} 50"#), "{body}");
    assert!(body.contains(r#"mi_voltage{location="kitchen"} 5"#), "{body}");
    assert!(body.contains(r#"mi_battery{location="kitchen"} 100"#), "{body}");
    assert!(body.contains(r#"mi_device_connection_failed{location="kitchen"} 0"#), "{body}");
    assert!(body.contains(r#"mi_device_errors_total{location="kitchen"} 1"#), "{body}");

    token.cancel();
    run.await.unwrap();
    server.join().await;
}
