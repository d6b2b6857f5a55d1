//! radiovisor binary: polls the configured sensors and serves `/metrics`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgAction, Parser, ValueEnum};
use tokio_util::sync::CancellationToken;

use radiovisor::devices::load_devices;
use radiovisor::metrics::{MetricsSink, PrometheusSink, serve_metrics};
use radiovisor::radio::{RadioFactory, RadioManager, mock::MockFactory};
use radiovisor::subscribers::{LogWriter, MetricsWriter, Subscribe};
use radiovisor::{Config, Context, StartupError, Supervisor, init_logging};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Backend {
    /// Local Bluetooth LE adapter (needs the `bluetooth` feature)
    Bluetooth,
    /// Scripted in-process radio, for dry runs
    Mock,
}

impl Backend {
    #[cfg(feature = "bluetooth")]
    const DEFAULT: &'static str = "bluetooth";
    #[cfg(not(feature = "bluetooth"))]
    const DEFAULT: &'static str = "mock";
}

#[derive(Parser)]
#[command(name = "radiovisor", version, disable_version_flag = true)]
#[command(about = "Export BLE thermometer readings as Prometheus metrics", long_about = None)]
struct Args {
    /// INI file with a [Devices] section of `name = address` pairs
    #[arg(long, default_value = "config.ini")]
    config_file: PathBuf,

    /// Address to serve /metrics and /health on
    #[arg(long, default_value = "0.0.0.0:9999")]
    listen_address: SocketAddr,

    /// Seconds between successful readings of one device
    #[arg(long, default_value = "60", value_parser = clap::value_parser!(u64).range(1..))]
    measurement_interval: u64,

    /// Radio backend
    #[arg(long, value_enum, default_value = Backend::DEFAULT)]
    backend: Backend,

    /// Print version
    #[arg(short = 'v', long, action = ArgAction::Version)]
    version: Option<bool>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging() {
        eprintln!("logging already initialized: {e}");
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, label = e.as_label(), "startup failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), StartupError> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting");

    let devices = load_devices(&args.config_file)?;
    tracing::info!(count = devices.len(), path = %args.config_file.display(), "devices loaded");

    let mut cfg = Config::default();
    cfg.measurement_interval = Duration::from_secs(args.measurement_interval);

    // the adapter is often not ready right after boot
    tokio::time::sleep(cfg.startup_delay).await;
    let radio =
        RadioManager::with_create_timeout(factory(args.backend)?, cfg.reset_lock_timeout).await?;

    let sink = PrometheusSink::new()?;
    let token = CancellationToken::new();
    let server = serve_metrics(args.listen_address, sink.registry().clone(), token.clone())?;
    tracing::info!(addr = %server.local_addr(), "metrics endpoint listening");

    let sink: Arc<dyn MetricsSink> = Arc::new(sink);
    let ctx = Context::new(cfg, radio, Arc::clone(&sink));
    let subs: Vec<Arc<dyn Subscribe>> = vec![
        Arc::new(LogWriter::new()),
        Arc::new(MetricsWriter::new(sink)),
    ];

    Supervisor::new(ctx, subs).run(devices, token).await;
    server.join().await;
    Ok(())
}

fn factory(backend: Backend) -> Result<Arc<dyn RadioFactory>, StartupError> {
    match backend {
        Backend::Mock => {
            let factory = MockFactory::new().with_failure_rate(0.05);
            // 23.50 °C, 45 %, 2.860 V
            factory.set_payloads(vec![vec![0x2E, 0x09, 0x2D, 0x2C, 0x0B]]);
            Ok(Arc::new(factory))
        }
        #[cfg(feature = "bluetooth")]
        Backend::Bluetooth => Ok(Arc::new(radiovisor::radio::bluetooth::BluetoothFactory)),
        #[cfg(not(feature = "bluetooth"))]
        Backend::Bluetooth => Err(radiovisor::ResourceError::creation(
            "built without the `bluetooth` feature; rebuild with --features bluetooth or use --backend mock",
        )
        .into()),
    }
}
