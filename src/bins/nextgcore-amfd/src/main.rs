//! NextGCore AMF (Access and Mobility Management Function)
//!
//! This is the main entry point for the AMF network function.

use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nextgcore_amfd::{
    AmfConfig, AmfContext, GlobalMetric, GmmDownlink, GmmHandler, MemoryRepository,
};
use ogs_core::{ogs_log_init, OgsLogLevel};

/// NextGCore AMF - Access and Mobility Management Function
#[derive(Parser, Debug)]
#[command(name = "nextgcore-amfd")]
#[command(author = "NextGCore")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "5G Core Access and Mobility Management Function")]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/nextgcore/amf.yaml")]
    config: String,

    /// Log level (trace, debug, info, warn, error); overrides logger.level
    #[arg(short, long)]
    log_level: Option<String>,

    /// NGAP bind address (e.g., "0.0.0.0:38412")
    #[arg(long, default_value = "0.0.0.0:38412")]
    ngap_addr: String,

    /// Timer tick in milliseconds
    #[arg(long, default_value_t = 100)]
    tick_ms: u64,
}

/// AMF application state
pub struct AmfApp {
    /// Running flag
    running: Arc<AtomicBool>,
    handler: GmmHandler,
    /// Address the NGAP SCTP listener accepts gNB associations on
    ngap_addr: SocketAddr,
}

impl AmfApp {
    /// Create the AMF context and procedure driver from a loaded configuration
    pub fn new(config: AmfConfig, ngap_addr: SocketAddr) -> Result<Self> {
        let context = Arc::new(AmfContext::new(config)?);
        // Subscriber data is provisioned by the AUSF/UDM clients
        let repository = Arc::new(MemoryRepository::new());
        Ok(Self {
            running: Arc::new(AtomicBool::new(true)),
            handler: GmmHandler::new(context, repository),
            ngap_addr,
        })
    }

    /// Route a retransmission to the gNB serving its UE
    fn deliver(&self, downlink: &GmmDownlink) {
        let Some(gnb) = self.handler.downlink_gnb(downlink) else {
            log::warn!(
                "[amf_ue_id={}] No serving gNB, dropping message type 0x{:02x}",
                downlink.amf_ue_id,
                downlink.message.message_type()
            );
            return;
        };
        // NAS encoding and DownlinkNASTransport framing belong to the NGAP
        // codec, which hands the PDU to GmmHandler::send_downlink
        log::debug!(
            "[amf_ue_id={}] Retransmit message type 0x{:02x} via gNB {}",
            downlink.amf_ue_id,
            downlink.message.message_type(),
            gnb.addr
        );
    }

    /// Run the AMF main loop
    pub async fn run(&mut self, tick: std::time::Duration) -> Result<()> {
        log::info!("AMF running, NGAP on {}", self.ngap_addr);

        let mut interval = tokio::time::interval(tick);
        while self.running.load(Ordering::SeqCst) {
            interval.tick().await;

            for downlink in self.handler.handle_timers() {
                self.deliver(&downlink);
            }
        }

        log::info!("AMF main loop exited");
        Ok(())
    }

    /// Shutdown the AMF application
    pub fn shutdown(&mut self) {
        log::info!("Shutting down AMF...");

        self.handler.shutdown();

        let metrics = &self.handler.context().metrics;
        log::info!(
            "Registrations: {} succeeded, {} failed",
            metrics.get(GlobalMetric::RmRegInitSucc),
            metrics.get(GlobalMetric::RmRegInitFail)
        );
        log::debug!("Final metrics:\n{}", metrics.export_prometheus());

        log::info!("AMF shutdown complete");
    }

    /// Get the running flag for signal handlers
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    let config = AmfConfig::load(&args.config)?;

    // The command line wins over logger.level
    let level = args
        .log_level
        .as_deref()
        .or(config.log_level.as_deref())
        .map(OgsLogLevel::from_name)
        .unwrap_or_default();
    ogs_log_init(level);

    log::info!("NextGCore AMF v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Configuration: {}", args.config);

    let ngap_addr: SocketAddr = args
        .ngap_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid NGAP address '{}': {}", args.ngap_addr, e))?;

    // Create AMF application
    let mut app = AmfApp::new(config, ngap_addr)?;

    // Setup signal handlers
    let running = app.running_flag();
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        running.store(false, Ordering::SeqCst);
    })?;

    app.run(std::time::Duration::from_millis(args.tick_ms.max(1))).await?;

    app.shutdown();

    Ok(())
}
